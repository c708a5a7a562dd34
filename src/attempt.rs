//! Attempt executor: one call for one candidate, classified
//!
//! Classification is the single source of truth for what the fallback
//! controller does next. Non-2xx statuses and error objects embedded in
//! a 200 body go through the same code thresholds.

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde_json::Value;
use thiserror::Error;

use crate::failover::Candidate;
use crate::request::CompletionRequest;

const MESSAGE_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass
{   RateLimited
  , BillingRequired
  , ClientError
  , ServerError
  , EmptyResponse
  , Transport
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome
{   Success(Value)
  , Failure
    {   class: FailureClass
      , message: String
    }
}

impl AttemptOutcome
{   fn failure(class: FailureClass, message: impl Into<String>) -> Self
    {   AttemptOutcome::Failure
        {   class
          , message: message.into()
        }
    }
}

/// Whatever came back over the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse
{   pub status: u16
  , pub body: String
}

/// No response at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError
{   #[error("request timed out")]
    Timeout
  , #[error("connection failed: {0}")]
    Connect(String)
  , #[error("failed to read response body: {0}")]
    Body(String)
  , #[error("transport error: {0}")]
    Other(String)
}

/// Seam between the orchestrator and the network
#[async_trait]
pub trait Transport: Send + Sync
{   async fn send(
      &self
    , candidate: &Candidate
    , request: &CompletionRequest
    ) -> Result<RawResponse, TransportError>;
}

/// Map a numeric status or embedded error code to a failure class.
/// `None` means the code is not a failure at all (2xx).
pub fn classify_status(code: u16) -> Option<FailureClass>
{   match code
    {   200..=299 => None
      , 429 => Some(FailureClass::RateLimited)
      , 402 => Some(FailureClass::BillingRequired)
      , 400..=499 => Some(FailureClass::ClientError)
      , _ => Some(FailureClass::ServerError)
    }
}

/// Embedded error codes may be numbers or numeric strings.
/// Anything unreadable is treated as a server-side fault.
pub fn classify_error_code(code: Option<&Value>) -> FailureClass
{   let numeric = code.and_then(|c| match c
    {   Value::Number(n) => n.as_u64()
      , Value::String(s) => s.trim().parse::<u64>().ok()
      , _ => None
    });
    match numeric.and_then(|n| u16::try_from(n).ok())
    {   Some(code) => {
          classify_status(code).unwrap_or(FailureClass::ServerError)
        }
      , None => FailureClass::ServerError
    }
}

fn embedded_error(body: &Value) -> Option<&Value>
{   let top = body.get("error").filter(|e| !e.is_null());
    top.or_else(|| {
      body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("error"))
        .filter(|e| !e.is_null())
    })
}

fn error_message(error: &Value) -> String
{   match error
    {   Value::String(s) => s.clone()
      , other => other
          .get("message")
          .and_then(|m| m.as_str())
          .map(str::to_string)
          .unwrap_or_else(|| other.to_string())
    }
}

fn preview(body: &str) -> String
{   let trimmed = body.trim();
    if trimmed.is_empty()
    {   return "empty body".to_string();
    }
    trimmed.chars().take(MESSAGE_PREVIEW_CHARS).collect()
}

fn message_from_body(body: &str) -> String
{   serde_json::from_str::<Value>(body)
      .ok()
      .as_ref()
      .and_then(embedded_error)
      .map(error_message)
      .unwrap_or_else(|| preview(body))
}

/// Classify a response the transport did deliver
pub fn classify_response(raw: &RawResponse) -> AttemptOutcome
{   if let Some(class) = classify_status(raw.status)
    {   return AttemptOutcome::failure(
          class
        , format!("HTTP {}: {}", raw.status, message_from_body(&raw.body))
        );
    }

    let body: Value = match serde_json::from_str(&raw.body)
    {   Ok(body) => body
      , Err(e) => {
          return AttemptOutcome::failure(
            FailureClass::EmptyResponse
          , format!("undecodable body: {}", e)
          );
        }
    };

    if let Some(error) = embedded_error(&body)
    {   let class = classify_error_code(error.get("code"));
        return AttemptOutcome::failure(
          class
        , format!("embedded error: {}", error_message(error))
        );
    }

    let has_choices = body
      .get("choices")
      .and_then(|c| c.as_array())
      .map(|c| !c.is_empty())
      .unwrap_or(false);
    if !has_choices
    {   return AttemptOutcome::failure(
          FailureClass::EmptyResponse
        , "response carried no choices"
        );
    }

    AttemptOutcome::Success(body)
}

/// One network call for one candidate
pub async fn attempt(
  transport: &dyn Transport
, candidate: &Candidate
, request: &CompletionRequest
) -> AttemptOutcome
{   debug!("Dispatching attempt to {}", candidate);
    let outcome = match transport.send(candidate, request).await
    {   Ok(raw) => {
          trace!("{} answered HTTP {}", candidate, raw.status);
          classify_response(&raw)
        }
      , Err(e) => AttemptOutcome::failure(FailureClass::Transport, e.to_string())
    };
    if let AttemptOutcome::Failure { class, message } = &outcome
    {   warn!("Attempt on {} failed: {:?} ({})", candidate, class, message);
    }
    outcome
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn raw(status: u16, body: Value) -> RawResponse
    {   RawResponse
        {   status
          , body: body.to_string()
        }
    }

    fn class_of(outcome: &AttemptOutcome) -> Option<FailureClass>
    {   match outcome
        {   AttemptOutcome::Success(_) => None
          , AttemptOutcome::Failure { class, .. } => Some(*class)
        }
    }

    #[test]
    fn status_thresholds()
    {   assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(429), Some(FailureClass::RateLimited));
        assert_eq!(classify_status(402), Some(FailureClass::BillingRequired));
        assert_eq!(classify_status(400), Some(FailureClass::ClientError));
        assert_eq!(classify_status(404), Some(FailureClass::ClientError));
        assert_eq!(classify_status(500), Some(FailureClass::ServerError));
        assert_eq!(classify_status(503), Some(FailureClass::ServerError));
    }

    #[test]
    fn embedded_error_uses_same_thresholds()
    {   let cases = [
            (json!(429), FailureClass::RateLimited)
          , (json!("402"), FailureClass::BillingRequired)
          , (json!(400), FailureClass::ClientError)
          , (json!(502), FailureClass::ServerError)
          , (json!("oops"), FailureClass::ServerError)
          ];
        for (code, expected) in cases
        {   let outcome = classify_response(&raw(
              200,
              json!({ "error": { "code": code, "message": "nope" } })
            ));
            assert_eq!(class_of(&outcome), Some(expected));
        }
    }

    #[test]
    fn embedded_error_on_choice()
    {   let outcome = classify_response(&raw(
          200,
          json!({ "choices": [{ "error": { "code": 503, "message": "down" } }] })
        ));
        assert_eq!(class_of(&outcome), Some(FailureClass::ServerError));
        match outcome
        {   AttemptOutcome::Failure { message, .. } => {
              assert!(message.contains("down"));
            }
          , _ => panic!("expected failure")
        }
    }

    #[test]
    fn missing_or_empty_choices_is_empty_response()
    {   for body in [json!({}), json!({ "choices": [] }), json!({ "choices": null })]
        {   let outcome = classify_response(&raw(200, body));
            assert_eq!(class_of(&outcome), Some(FailureClass::EmptyResponse));
        }
    }

    #[test]
    fn garbage_body_is_empty_response()
    {   let outcome = classify_response(&RawResponse
        {   status: 200
          , body: "<html>gateway hiccup</html>".to_string()
        });
        assert_eq!(class_of(&outcome), Some(FailureClass::EmptyResponse));
    }

    #[test]
    fn status_failure_carries_gateway_message()
    {   let outcome = classify_response(&raw(
          429,
          json!({ "error": { "code": 429, "message": "Rate limit exceeded" } })
        ));
        match outcome
        {   AttemptOutcome::Failure { class, message } => {
              assert_eq!(class, FailureClass::RateLimited);
              assert!(message.contains("Rate limit exceeded"));
            }
          , _ => panic!("expected failure")
        }
    }

    #[test]
    fn choices_present_is_success()
    {   let outcome = classify_response(&raw(
          200,
          json!({ "choices": [{ "message": { "content": "hi" } }] })
        ));
        assert!(matches!(outcome, AttemptOutcome::Success(_)));
    }
}
