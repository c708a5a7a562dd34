//! Response normalizer
//!
//! A successful body can take several shapes depending on the backend.
//! Each recognizer below handles one shape, is total and has no side
//! effects; they are tried in order and the first hit wins.

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::failover::Candidate;
use crate::request::{CompletionRequest, StructuredOutput};

pub const TRUNCATED_PLACEHOLDER: &str
  = "The analysis was cut short before it was complete. \
     Please try again with less material.";
pub const FILTERED_PLACEHOLDER: &str
  = "The analysis was withheld by the model provider's content filter.";

const TRUNCATION_REASONS: &[&str] = &["length", "max_tokens", "max_output_tokens"];
const FILTER_REASONS: &[&str] = &["content_filter", "safety", "blocked"];
const FINISH_KEYS: &[&str] = &["finish_reason", "native_finish_reason"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason
{   Truncated
  , Filtered
}

impl DegradedReason
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   DegradedReason::Truncated => "truncated"
          , DegradedReason::Filtered => "filtered"
        }
    }

    fn placeholder(&self) -> &'static str
    {   match self
        {   DegradedReason::Truncated => TRUNCATED_PLACEHOLDER
          , DegradedReason::Filtered => FILTERED_PLACEHOLDER
        }
    }
}

/// Why a nominal success is incomplete. The result text is always the
/// placeholder for `reason`; whatever the model did produce is in `partial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded
{   pub reason: DegradedReason
  , pub partial: Option<String>
}

/// What the caller gets back. A degraded result is still a success.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult
{   pub text: String
  , pub structured: Option<Value>
  , pub degraded: Option<Degraded>
  , /// Model that served the answer; set by the controller
    pub candidate: Option<Candidate>
}

impl NormalizedResult
{   pub fn is_degraded(&self) -> bool
    {   self.degraded.is_some()
    }
}

/// Content pulled out of a choice before degradation is applied
#[derive(Debug, Clone, PartialEq)]
enum Extracted
{   Structured
    {   value: Value
      , raw: String
    }
  , Text(String)
}

type Recognizer = fn(&Value, Option<&StructuredOutput>) -> Option<Extracted>;

const RECOGNIZERS: &[(&str, Recognizer)] = &[
    ("tool_arguments", recognize_tool_arguments)
  , ("string_content", recognize_string_content)
  , ("parted_content", recognize_parted_content)
  , ("legacy_text", recognize_legacy_text)
  ];

fn first_choice(raw: &Value) -> Option<&Value>
{   raw.get("choices").and_then(|c| c.get(0))
}

fn non_blank(text: &str) -> Option<String>
{   if text.trim().is_empty()
    {   None
    } else
    {   Some(text.to_string())
    }
}

fn raw_arguments(message: &Value) -> Option<&Value>
{   let from_tools = message
      .get("tool_calls")
      .and_then(|t| t.get(0))
      .and_then(|t| t.get("function"))
      .and_then(|f| f.get("arguments"));
    from_tools.or_else(|| {
      message.get("function_call").and_then(|f| f.get("arguments"))
    })
}

fn parse_arguments(
  arguments: &Value
, schema: &StructuredOutput
) -> Option<Map<String, Value>>
{   let object = match arguments
    {   Value::String(s) => {
          match serde_json::from_str::<Value>(s)
          {   Ok(Value::Object(map)) => map
            , _ => return None
          }
        }
      , Value::Object(map) => map.clone()
      , _ => return None
    };
    if schema.required_keys().iter().all(|k| object.contains_key(*k))
    {   Some(object)
    } else
    {   None
    }
}

fn arguments_text(arguments: &Value) -> String
{   match arguments
    {   Value::String(s) => s.clone()
      , other => other.to_string()
    }
}

fn recognize_tool_arguments(
  choice: &Value
, schema: Option<&StructuredOutput>
) -> Option<Extracted>
{   let schema = schema?;
    let arguments = raw_arguments(choice.get("message")?)?;
    match parse_arguments(arguments, schema)
    {   Some(object) => Some(Extracted::Structured
        {   value: Value::Object(object)
          , raw: arguments_text(arguments)
        })
      , None => {
          warn!(
            "Structured arguments for '{}' did not parse, falling back to text",
            schema.name
          );
          None
        }
    }
}

fn recognize_string_content(
  choice: &Value
, _schema: Option<&StructuredOutput>
) -> Option<Extracted>
{   let content = choice.get("message")?.get("content")?.as_str()?;
    non_blank(content).map(Extracted::Text)
}

fn recognize_parted_content(
  choice: &Value
, _schema: Option<&StructuredOutput>
) -> Option<Extracted>
{   let parts = choice.get("message")?.get("content")?.as_array()?;
    let texts: Vec<&str> = parts
      .iter()
      .filter(|p| {
        p.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text"
      })
      .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
      .collect();
    if texts.is_empty()
    {   return None;
    }
    non_blank(&texts.join("\n")).map(Extracted::Text)
}

fn recognize_legacy_text(
  choice: &Value
, _schema: Option<&StructuredOutput>
) -> Option<Extracted>
{   let text = choice.get("text")?.as_str()?;
    non_blank(text).map(Extracted::Text)
}

/// Arguments that failed to parse still count as unstructured text
fn unparsed_arguments(
  choice: &Value
, schema: Option<&StructuredOutput>
) -> Option<Extracted>
{   schema?;
    let arguments = raw_arguments(choice.get("message")?)?;
    non_blank(&arguments_text(arguments)).map(Extracted::Text)
}

/// Filtering outranks truncation when the finish keys disagree.
fn degradation(choice: &Value) -> Option<DegradedReason>
{   let reasons: Vec<String> = FINISH_KEYS
      .iter()
      .filter_map(|key| choice.get(*key).and_then(|r| r.as_str()))
      .map(|r| r.to_ascii_lowercase())
      .collect();
    let any_of = |set: &[&str]| reasons.iter().any(|r| set.contains(&r.as_str()));
    if any_of(FILTER_REASONS)
    {   Some(DegradedReason::Filtered)
    } else if any_of(TRUNCATION_REASONS)
    {   Some(DegradedReason::Truncated)
    } else
    {   None
    }
}

/// Turn a successful body into a result.
///
/// Returns `None` for a shape nothing recognizes; the controller treats
/// that the same as an empty response.
pub fn normalize(
  raw: &Value
, request: &CompletionRequest
) -> Option<NormalizedResult>
{   let choice = first_choice(raw)?;
    let schema = request.structured_output();

    let extracted = RECOGNIZERS
      .iter()
      .find_map(|(name, recognize)| {
        let hit = recognize(choice, schema);
        if hit.is_some()
        {   debug!("Response matched {} shape", name);
        }
        hit
      })
      .or_else(|| unparsed_arguments(choice, schema));

    if let Some(reason) = degradation(choice)
    {   let partial = match extracted
        {   Some(Extracted::Structured { raw, .. }) => Some(raw)
          , Some(Extracted::Text(text)) => Some(text)
          , None => None
        };
        debug!("Response degraded: {}", reason.as_str());
        return Some(NormalizedResult
        {   text: reason.placeholder().to_string()
          , structured: None
          , degraded: Some(Degraded { reason, partial })
          , candidate: None
        });
    }

    let (text, structured) = match extracted?
    {   Extracted::Structured { value, raw } => (raw, Some(value))
      , Extracted::Text(text) => (text, None)
    };

    Some(NormalizedResult
    {   text
      , structured
      , degraded: None
      , candidate: None
    })
}
