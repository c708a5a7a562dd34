//! Fallback controller
//!
//! Walks the candidate list one call at a time. What happens after each
//! call is decided in exactly one place, `next_step`.

use log::{debug, error, info};

use crate::attempt::{attempt, AttemptOutcome, FailureClass, Transport};
use crate::error::{Error, TrailEntry, UnavailableReason};
use crate::failover::{Candidate, CandidateList, RetryPolicy};
use crate::normalize::{normalize, NormalizedResult};
use crate::request::CompletionRequest;

/// Account-wide limits that stop the whole request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLimit
{   RateLimit
  , Billing
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step
{   /// Same candidate again after the retry delay
    Retry
  , /// Next candidate, fresh budget
    Advance
  , Abort(AccountLimit)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason
{   RateLimit
    {   candidate: Candidate
      , message: String
    }
  , Billing
    {   candidate: Candidate
      , message: String
    }
  , Exhausted
    {   trail: Vec<TrailEntry>
      , last_message: Option<String>
    }
}

impl From<AbortReason> for Error
{   fn from(reason: AbortReason) -> Self
    {   match reason
        {   AbortReason::RateLimit { candidate, message } => {
              Error::RateLimited { candidate, message }
            }
          , AbortReason::Billing { candidate, message } => {
              Error::BillingRequired { candidate, message }
            }
          , AbortReason::Exhausted { trail, last_message } => {
              Error::UpstreamUnavailable
              {   reason: UnavailableReason::Exhausted
                , trail
                , last_message
              }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum State
{   TryingCandidate
    {   index: usize
      , attempt: usize
    }
  , Succeeded(NormalizedResult)
  , Aborted(AbortReason)
}

/// The transition table.
///
/// `attempt` is zero-based; `budget` is the number of calls a candidate
/// may receive.
pub fn next_step(
  class: FailureClass
, attempt: usize
, budget: usize
) -> Step
{   match class
    {   FailureClass::RateLimited => Step::Abort(AccountLimit::RateLimit)
      , FailureClass::BillingRequired => Step::Abort(AccountLimit::Billing)
      , FailureClass::ClientError => Step::Advance
      , FailureClass::ServerError
      | FailureClass::EmptyResponse
      | FailureClass::Transport => {
          if attempt + 1 < budget
          {   Step::Retry
          } else
          {   Step::Advance
          }
        }
    }
}

pub struct FallbackController<'a>
{   transport: &'a dyn Transport
  , policy: &'a RetryPolicy
}

impl<'a> FallbackController<'a>
{   pub fn new(
      transport: &'a dyn Transport
    , policy: &'a RetryPolicy
    ) -> Self
    {   FallbackController
        {   transport
          , policy
        }
    }

    /// Drive the state machine to a terminal state
    pub async fn run(
      &self
    , candidates: &CandidateList
    , request: &CompletionRequest
    ) -> Result<NormalizedResult, Error>
    {   let budget = self.policy.retries_per_candidate(request.has_documents());
        let mut trail: Vec<TrailEntry> = Vec::new();
        let mut last_message: Option<String> = None;
        let mut state = State::TryingCandidate { index: 0, attempt: 0 };

        loop
        {   let (index, attempt_no) = match state
            {   State::TryingCandidate { index, attempt } => (index, attempt)
              , State::Succeeded(result) => return Ok(result)
              , State::Aborted(reason) => {
                  error!("Completion aborted: {:?}", reason);
                  return Err(reason.into());
                }
            };

            let candidate = match candidates.get(index)
            {   Some(candidate) => candidate
              , None => {
                  state = State::Aborted(AbortReason::Exhausted
                  {   trail: std::mem::take(&mut trail)
                    , last_message: last_message.take()
                  });
                  continue;
                }
            };

            debug!(
              "Candidate {}/{} {} attempt {}/{}",
              index + 1, candidates.len(), candidate, attempt_no + 1, budget
            );

            let (class, message)
              = match attempt(self.transport, candidate, request).await
            {   AttemptOutcome::Success(raw) => {
                  match normalize(&raw, request)
                  {   Some(mut result) => {
                        result.candidate = Some(candidate.clone());
                        info!("Completion served by {}", candidate);
                        state = State::Succeeded(result);
                        continue;
                      }
                    , None => (
                        FailureClass::EmptyResponse
                      , "response shape not recognized".to_string()
                      )
                  }
                }
              , AttemptOutcome::Failure { class, message } => (class, message)
            };

            state = match next_step(class, attempt_no, budget)
            {   Step::Retry => {
                  last_message = Some(message);
                  tokio::time::sleep(self.policy.retry_delay).await;
                  State::TryingCandidate
                  {   index
                    , attempt: attempt_no + 1
                  }
                }
              , Step::Advance => {
                  info!(
                    "Abandoning {} after {} call(s): {:?}",
                    candidate, attempt_no + 1, class
                  );
                  last_message = Some(message.clone());
                  trail.push(TrailEntry
                  {   candidate: candidate.clone()
                    , class
                    , attempts: attempt_no + 1
                    , message
                  });
                  State::TryingCandidate
                  {   index: index + 1
                    , attempt: 0
                  }
                }
              , Step::Abort(AccountLimit::RateLimit) => {
                  State::Aborted(AbortReason::RateLimit
                  {   candidate: candidate.clone()
                    , message
                  })
                }
              , Step::Abort(AccountLimit::Billing) => {
                  State::Aborted(AbortReason::Billing
                  {   candidate: candidate.clone()
                    , message
                  })
                }
            };
        }
    }
}
