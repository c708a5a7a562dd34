use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::attempt::Transport;
use crate::config::{CandidateTemplates, ConfigError, OrchestratorConfig};
use crate::controller::FallbackController;
use crate::error::{Error, UnavailableReason};
use crate::failover::{select_candidates, CandidateList, RetryPolicy};
use crate::normalize::NormalizedResult;
use crate::providers::HttpTransport;
use crate::request::CompletionRequest;

/// Public entry point: one logical request in, one result out.
///
/// Holds only read-only configuration and a shared transport, so a single
/// instance can serve any number of concurrent callers.
#[derive(Clone)]
pub struct Orchestrator
{   templates: Arc<CandidateTemplates>
  , policy: Arc<RetryPolicy>
  , transport: Arc<dyn Transport>
}

impl Orchestrator
{   pub fn new(
      config: &OrchestratorConfig
    , transport: Arc<dyn Transport>
    ) -> Result<Self, ConfigError>
    {   config.validate()?;
        debug!(
          "Creating orchestrator: {} document / {} text candidates",
          config.templates.documents.len(),
          config.templates.text_only.len()
        );
        Ok(Orchestrator
        {   templates: Arc::new(config.templates.clone())
          , policy: Arc::new(RetryPolicy::from(&config.retry))
          , transport
        })
    }

    /// Orchestrator over the real gateway
    pub fn with_http(config: &OrchestratorConfig) -> Result<Self, ConfigError>
    {   let transport = HttpTransport::new(config)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn candidates_for(&self, request: &CompletionRequest) -> CandidateList
    {   select_candidates(
          &self.templates
        , request.has_documents()
        , request.wants_structured()
        )
    }

    pub fn retry_policy(&self) -> &RetryPolicy
    {   &self.policy
    }

    pub async fn complete(
      &self
    , request: &CompletionRequest
    ) -> Result<NormalizedResult, Error>
    {   let candidates = self.candidates_for(request);
        FallbackController::new(self.transport.as_ref(), &self.policy)
          .run(&candidates, request)
          .await
    }

    /// Like `complete`, but gives up once `deadline` has elapsed. Any
    /// attempt still in flight is dropped.
    pub async fn complete_within(
      &self
    , request: &CompletionRequest
    , deadline: Duration
    ) -> Result<NormalizedResult, Error>
    {   match tokio::time::timeout(deadline, self.complete(request)).await
        {   Ok(result) => result
          , Err(_) => {
              warn!("Completion exceeded deadline of {:?}", deadline);
              Err(Error::UpstreamUnavailable
              {   reason: UnavailableReason::DeadlineExceeded
                , trail: Vec::new()
                , last_message: None
              })
            }
        }
    }
}
