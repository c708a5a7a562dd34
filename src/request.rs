//! Completion request types
//!
//! A `CompletionRequest` is assembled by the calling feature and never
//! changes once built. The orchestrator only reads it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on embedded documents per request
pub const MAX_DOCUMENT_PARTS: usize = 3;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MAX_OUTPUT_TOKENS: u32 = 32_768;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError
{   #[error("at most {max} document parts allowed, got {got}")]
    TooManyDocuments
    {   max: usize
      , got: usize
    }
  , #[error("request payload has no parts")]
    EmptyPayload
  , #[error("{knob} out of range: {value}")]
    KnobOutOfRange
    {   knob: &'static str
      , value: String
    }
  , #[error("structured output needs a name")]
    UnnamedSchema
}

/// One element of a multi-part user payload
#[derive(Debug, Clone, PartialEq)]
pub enum Part
{   Text(String)
  , Document
    {   mime_type: String
      , data: Vec<u8>
    }
}

impl Part
{   pub fn text(text: impl Into<String>) -> Self
    {   Part::Text(text.into())
    }

    pub fn document(
      mime_type: impl Into<String>
    , data: Vec<u8>
    ) -> Self
    {   Part::Document
        {   mime_type: mime_type.into()
          , data
        }
    }

    pub fn is_document(&self) -> bool
    {   matches!(self, Part::Document { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload
{   Text(String)
  , Parted(Vec<Part>)
}

/// Caller-chosen schema the backend must fill instead of writing prose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput
{   pub name: String
  , #[serde(default)]
    pub description: Option<String>
  , /// JSON Schema of the expected arguments object
    pub schema: serde_json::Value
}

impl StructuredOutput
{   pub fn new(
      name: impl Into<String>
    , schema: serde_json::Value
    ) -> Self
    {   StructuredOutput
        {   name: name.into()
          , description: None
          , schema
        }
    }

    /// Top-level keys the schema marks as required
    pub fn required_keys(&self) -> Vec<&str>
    {   self.schema
          .get("required")
          .and_then(|r| r.as_array())
          .map(|keys| keys.iter().filter_map(|k| k.as_str()).collect())
          .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest
{   system_instruction: String
  , payload: Payload
  , structured_output: Option<StructuredOutput>
  , temperature: f32
  , max_output_tokens: u32
}

impl CompletionRequest
{   pub fn builder(
      system_instruction: impl Into<String>
    ) -> CompletionRequestBuilder
    {   CompletionRequestBuilder::new(system_instruction)
    }

    pub fn system_instruction(&self) -> &str
    {   &self.system_instruction
    }

    pub fn payload(&self) -> &Payload
    {   &self.payload
    }

    pub fn structured_output(&self) -> Option<&StructuredOutput>
    {   self.structured_output.as_ref()
    }

    pub fn temperature(&self) -> f32
    {   self.temperature
    }

    pub fn max_output_tokens(&self) -> u32
    {   self.max_output_tokens
    }

    pub fn has_documents(&self) -> bool
    {   match &self.payload
        {   Payload::Text(_) => false
          , Payload::Parted(parts) => parts.iter().any(Part::is_document)
        }
    }

    pub fn wants_structured(&self) -> bool
    {   self.structured_output.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequestBuilder
{   system_instruction: String
  , parts: Vec<Part>
  , plain: Option<String>
  , structured_output: Option<StructuredOutput>
  , temperature: f32
  , max_output_tokens: u32
}

impl CompletionRequestBuilder
{   fn new(system_instruction: impl Into<String>) -> Self
    {   CompletionRequestBuilder
        {   system_instruction: system_instruction.into()
          , parts: Vec::new()
          , plain: None
          , structured_output: None
          , temperature: 0.3
          , max_output_tokens: 4096
        }
    }

    /// Plain text payload; replaces any parts added so far
    pub fn text(mut self, text: impl Into<String>) -> Self
    {   self.parts.clear();
        self.plain = Some(text.into());
        self
    }

    pub fn part(mut self, part: Part) -> Self
    {   if let Some(plain) = self.plain.take()
        {   self.parts.push(Part::Text(plain));
        }
        self.parts.push(part);
        self
    }

    pub fn structured(mut self, output: StructuredOutput) -> Self
    {   self.structured_output = Some(output);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self
    {   self.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self
    {   self.max_output_tokens = tokens;
        self
    }

    pub fn build(self) -> Result<CompletionRequest, RequestError>
    {   if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature)
        {   return Err(RequestError::KnobOutOfRange
            {   knob: "temperature"
              , value: self.temperature.to_string()
            });
        }
        if self.max_output_tokens == 0
          || self.max_output_tokens > MAX_OUTPUT_TOKENS
        {   return Err(RequestError::KnobOutOfRange
            {   knob: "max_output_tokens"
              , value: self.max_output_tokens.to_string()
            });
        }
        if let Some(output) = &self.structured_output
        {   if output.name.trim().is_empty()
            {   return Err(RequestError::UnnamedSchema);
            }
        }

        let payload = match self.plain
        {   Some(text) => Payload::Text(text)
          , None => {
              if self.parts.is_empty()
              {   return Err(RequestError::EmptyPayload);
              }
              let documents
                = self.parts.iter().filter(|p| p.is_document()).count();
              if documents > MAX_DOCUMENT_PARTS
              {   return Err(RequestError::TooManyDocuments
                  {   max: MAX_DOCUMENT_PARTS
                    , got: documents
                  });
              }
              Payload::Parted(self.parts)
            }
        };

        Ok(CompletionRequest
        {   system_instruction: self.system_instruction
          , payload
          , structured_output: self.structured_output
          , temperature: self.temperature
          , max_output_tokens: self.max_output_tokens
        })
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn text_request_has_no_documents()
    {   let req = CompletionRequest::builder("sys")
          .text("hello")
          .build()
          .unwrap();
        assert!(!req.has_documents());
        assert!(!req.wants_structured());
        assert_eq!(req.payload(), &Payload::Text("hello".to_string()));
    }

    #[test]
    fn part_after_text_keeps_text_first()
    {   let req = CompletionRequest::builder("sys")
          .text("summary")
          .part(Part::document("application/pdf", vec![1, 2, 3]))
          .build()
          .unwrap();
        assert!(req.has_documents());
        match req.payload()
        {   Payload::Parted(parts) => {
              assert_eq!(parts.len(), 2);
              assert_eq!(parts[0], Part::text("summary"));
            }
          , other => panic!("unexpected payload {:?}", other)
        }
    }

    #[test]
    fn fourth_document_is_rejected()
    {   let mut builder = CompletionRequest::builder("sys")
          .part(Part::text("see attached"));
        for _ in 0..4
        {   builder = builder.part(Part::document("image/png", vec![0]));
        }
        assert_eq!(
          builder.build().unwrap_err(),
          RequestError::TooManyDocuments { max: 3, got: 4 }
        );
    }

    #[test]
    fn empty_payload_is_rejected()
    {   let err = CompletionRequest::builder("sys").build().unwrap_err();
        assert_eq!(err, RequestError::EmptyPayload);
    }

    #[test]
    fn knobs_are_bounded()
    {   let hot = CompletionRequest::builder("sys")
          .text("x")
          .temperature(2.5)
          .build();
        assert!(matches!(
          hot,
          Err(RequestError::KnobOutOfRange { knob: "temperature", .. })
        ));

        let none = CompletionRequest::builder("sys")
          .text("x")
          .max_output_tokens(0)
          .build();
        assert!(matches!(
          none,
          Err(RequestError::KnobOutOfRange { knob: "max_output_tokens", .. })
        ));
    }

    #[test]
    fn required_keys_come_from_schema()
    {   let output = StructuredOutput::new(
          "score"
        , serde_json::json!({
            "type": "object",
            "properties": { "score": { "type": "number" } },
            "required": ["score", "rationale"]
          })
        );
        assert_eq!(output.required_keys(), vec!["score", "rationale"]);
    }
}
