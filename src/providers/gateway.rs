use async_trait::async_trait;
use base64::Engine;
use log::{debug, error, trace};
use serde::Serialize;

use crate::attempt::{RawResponse, Transport, TransportError};
use crate::config::{ConfigError, OrchestratorConfig};
use crate::failover::Candidate;
use crate::request::{CompletionRequest, Part, Payload, StructuredOutput};

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionBody
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub max_tokens: u32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: MessageContent
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent
{   Text(String)
  , Parts(Vec<ContentPart>)
}

/// The gateway has no document part type; documents ride in `image_url`
/// as data URIs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart
{   Text
    {   text: String
    }
  , ImageUrl
    {   image_url: ImageUrl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl
{   pub url: String
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec
{   #[serde(rename = "type")]
    pub kind: String
  , pub function: FunctionSpec
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec
{   pub name: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>
  , pub parameters: serde_json::Value
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChoice
{   #[serde(rename = "type")]
    pub kind: String
  , pub function: ToolChoiceFunction
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChoiceFunction
{   pub name: String
}

pub fn data_uri(mime_type: &str, data: &[u8]) -> String
{   format!(
      "data:{};base64,{}",
      mime_type,
      base64::engine::general_purpose::STANDARD.encode(data)
    )
}

fn content_part(part: &Part) -> ContentPart
{   match part
    {   Part::Text(text) => ContentPart::Text
        {   text: text.clone()
        }
      , Part::Document { mime_type, data } => ContentPart::ImageUrl
        {   image_url: ImageUrl
            {   url: data_uri(mime_type, data)
            }
        }
    }
}

fn tool_for(output: &StructuredOutput) -> (ToolSpec, ToolChoice)
{   let spec = ToolSpec
    {   kind: "function".to_string()
      , function: FunctionSpec
        {   name: output.name.clone()
          , description: output.description.clone()
          , parameters: output.schema.clone()
        }
    };
    let choice = ToolChoice
    {   kind: "function".to_string()
      , function: ToolChoiceFunction
        {   name: output.name.clone()
        }
    };
    (spec, choice)
}

impl ChatCompletionBody
{   pub fn from_request(
      candidate: &Candidate
    , request: &CompletionRequest
    ) -> Self
    {   let user_content = match request.payload()
        {   Payload::Text(text) => MessageContent::Text(text.clone())
          , Payload::Parted(parts) => {
              MessageContent::Parts(parts.iter().map(content_part).collect())
            }
        };

        let mut messages = Vec::with_capacity(2);
        if !request.system_instruction().is_empty()
        {   messages.push(ChatMessage
            {   role: "system".to_string()
              , content: MessageContent::Text(
                  request.system_instruction().to_string()
                )
            });
        }
        messages.push(ChatMessage
        {   role: "user".to_string()
          , content: user_content
        });

        let (tools, tool_choice) = match request.structured_output()
        {   Some(output) => {
              let (spec, choice) = tool_for(output);
              (Some(vec![spec]), Some(choice))
            }
          , None => (None, None)
        };

        ChatCompletionBody
        {   model: candidate.id().to_string()
          , messages
          , temperature: request.temperature()
          , max_tokens: request.max_output_tokens()
          , tools
          , tool_choice
        }
    }
}

// ===== HTTP Transport =====

/// `reqwest` transport against an OpenAI-compatible gateway
#[derive(Debug, Clone)]
pub struct HttpTransport
{   http_client: reqwest::Client
  , url: String
  , api_key: String
  , referer: Option<String>
  , title: Option<String>
}

impl HttpTransport
{   pub fn new(config: &OrchestratorConfig) -> Result<Self, ConfigError>
    {   let api_key = config.api_key()?.to_string();
        let http_client = reqwest::Client::builder()
          .timeout(config.call_timeout())
          .build()
          .map_err(|e| ConfigError::Invalid(
            format!("failed to build HTTP client: {}", e)
          ))?;
        debug!(
          "Created gateway transport for {} (timeout {}s)",
          config.api_base, config.call_timeout_secs
        );
        Ok(HttpTransport
        {   http_client
          , url: config.chat_completions_url()
          , api_key
          , referer: config.referer.clone()
          , title: config.title.clone()
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError
{   if e.is_timeout()
    {   TransportError::Timeout
    } else if e.is_connect()
    {   TransportError::Connect(e.to_string())
    } else
    {   TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport
{   async fn send(
      &self
    , candidate: &Candidate
    , request: &CompletionRequest
    ) -> Result<RawResponse, TransportError>
    {   let body = ChatCompletionBody::from_request(candidate, request);
        trace!(
          "Gateway request: model={} messages={} tools={}",
          body.model,
          body.messages.len(),
          body.tools.is_some()
        );

        let mut builder = self.http_client
          .post(&self.url)
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(&body);
        if let Some(referer) = &self.referer
        {   builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title
        {   builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| {
          error!("HTTP error calling {}: {}", candidate, e);
          map_send_error(e)
        })?;

        let status = response.status().as_u16();
        trace!("Gateway response status: {}", status);

        let text = response.text().await.map_err(|e| {
          if e.is_timeout()
          {   TransportError::Timeout
          } else
          {   TransportError::Body(e.to_string())
          }
        })?;

        Ok(RawResponse
        {   status
          , body: text
        })
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn text_payload_serializes_as_string()
    {   let request = CompletionRequest::builder("You draft letters.")
          .text("Write a denial letter.")
          .temperature(0.2)
          .max_output_tokens(800)
          .build()
          .unwrap();
        let body = ChatCompletionBody::from_request(
          &Candidate::new("openai/gpt-4o"),
          &request
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], json!("openai/gpt-4o"));
        assert_eq!(value["messages"][0]["role"], json!("system"));
        assert_eq!(value["messages"][1]["content"], json!("Write a denial letter."));
        assert_eq!(value["max_tokens"], json!(800));
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn documents_travel_as_image_url_data_uris()
    {   let request = CompletionRequest::builder("sys")
          .part(Part::text("Estimate from this invoice"))
          .part(Part::document("application/pdf", b"%PDF".to_vec()))
          .build()
          .unwrap();
        let body = ChatCompletionBody::from_request(
          &Candidate::new("google/gemini-2.5-flash"),
          &request
        );
        let value = serde_json::to_value(&body).unwrap();
        let parts = &value["messages"][1]["content"];
        assert_eq!(parts[0], json!({ "type": "text", "text": "Estimate from this invoice" }));
        assert_eq!(parts[1]["type"], json!("image_url"));
        assert_eq!(
          parts[1]["image_url"]["url"],
          json!("data:application/pdf;base64,JVBERg==")
        );
    }

    #[test]
    fn structured_output_forces_tool_choice()
    {   let request = CompletionRequest::builder("sys")
          .text("score it")
          .structured(StructuredOutput::new(
            "score_claim",
            json!({ "type": "object", "properties": {} })
          ))
          .build()
          .unwrap();
        let body = ChatCompletionBody::from_request(&Candidate::new("m"), &request);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["tools"][0]["type"], json!("function"));
        assert_eq!(value["tools"][0]["function"]["name"], json!("score_claim"));
        assert_eq!(
          value["tool_choice"],
          json!({ "type": "function", "function": { "name": "score_claim" } })
        );
    }

    #[test]
    fn transport_requires_api_key()
    {   let config = OrchestratorConfig::default();
        assert!(matches!(
          HttpTransport::new(&config),
          Err(ConfigError::MissingApiKey)
        ));
    }
}
