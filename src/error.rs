//! Outbound error kinds of the orchestrator
//!
//! Only account-level failures and total exhaustion ever reach a caller.
//! Everything else is absorbed inside the fallback controller.

use std::fmt;
use thiserror::Error;

use crate::attempt::FailureClass;
use crate::failover::Candidate;

/// One abandoned candidate in an exhaustion trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailEntry
{   pub candidate: Candidate
  , pub class: FailureClass
  , /// Calls issued to this candidate before it was abandoned
    pub attempts: usize
  , pub message: String
}

impl fmt::Display for TrailEntry
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   write!(f, "{} {:?} x{}", self.candidate, self.class, self.attempts)
    }
}

/// Why the upstream was declared unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason
{   /// Every candidate was tried and none produced a result
    Exhausted
  , /// The caller's outer deadline expired first
    DeadlineExceeded
}

impl fmt::Display for UnavailableReason
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   UnavailableReason::Exhausted => {
              write!(f, "all candidates exhausted")
            }
          , UnavailableReason::DeadlineExceeded => {
              write!(f, "deadline exceeded")
            }
        }
    }
}

/// The three error kinds a caller can receive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error
{   /// Gateway rate limit hit; applies account-wide
    #[error("rate limit reached on {candidate}: {message}")]
    RateLimited
    {   candidate: Candidate
      , message: String
    }
  , /// Gateway refused for lack of credits
    #[error("billing required on {candidate}: {message}")]
    BillingRequired
    {   candidate: Candidate
      , message: String
    }
  , /// Nothing usable came back
    #[error("upstream unavailable ({reason}){}", render_trail(.trail, .last_message))]
    UpstreamUnavailable
    {   reason: UnavailableReason
      , trail: Vec<TrailEntry>
      , last_message: Option<String>
    }
}

fn render_trail(
  trail: &[TrailEntry]
, last_message: &Option<String>
) -> String
{   let mut out = String::new();
    if !trail.is_empty()
    {   let entries: Vec<String>
          = trail.iter().map(|e| e.to_string()).collect();
        out.push_str(": ");
        out.push_str(&entries.join(", "));
    }
    if let Some(msg) = last_message
    {   out.push_str("; last error: ");
        out.push_str(msg);
    }
    out
}

impl Error
{   /// HTTP status a calling service should answer with
    pub fn http_status(&self) -> u16
    {   match self
        {   Error::RateLimited { .. } => 429
          , Error::BillingRequired { .. } => 402
          , Error::UpstreamUnavailable { .. } => 503
        }
    }

    /// Guidance suitable for showing to an end user
    pub fn user_message(&self) -> &'static str
    {   match self
        {   Error::RateLimited { .. } => {
              "The analysis service is busy. Please try again shortly."
            }
          , Error::BillingRequired { .. } => {
              "The analysis service is out of credits. \
               Please add credits to the gateway account."
            }
          , Error::UpstreamUnavailable { .. } => {
              "The analysis service is temporarily unavailable."
            }
        }
    }

    pub fn trail(&self) -> &[TrailEntry]
    {   match self
        {   Error::UpstreamUnavailable { trail, .. } => trail
          , _ => &[]
        }
    }
}
