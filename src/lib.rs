//! darwin-llm: resilient completion orchestrator for Darwin analyses
//!
//! Turns one logical "ask the model to do X" request into a best-effort
//! text or structured result over an unreliable model gateway.
//!
//! ```text
//! CompletionRequest
//!   -> select_candidates   (failover.rs)
//!   -> FallbackController  (controller.rs, drives attempt.rs)
//!   -> normalize           (normalize.rs)
//!   -> NormalizedResult | Error::{RateLimited, BillingRequired, UpstreamUnavailable}
//! ```
//!
//! Layout:
//!
//! ```text
//! src/
//! ├── lib.rs          # Re-exports and main documentation
//! ├── error.rs        # Outbound error kinds and diagnostics trail
//! ├── config.rs       # Gateway, candidate templates, retry budgets
//! ├── request.rs      # CompletionRequest and its builder
//! ├── failover.rs     # Candidate selection and retry policy
//! ├── attempt.rs      # One call, classified into a FailureClass
//! ├── controller.rs   # Retry / advance / abort state machine
//! ├── normalize.rs    # Response shape recognizers
//! ├── client.rs       # Orchestrator entry point
//! └── providers/      # Gateway wire format and HTTP transport
//! ```

pub mod error;
pub mod config;
pub mod request;
pub mod failover;
pub mod attempt;
pub mod controller;
pub mod normalize;
pub mod providers;
pub mod client;

pub use attempt::{AttemptOutcome, FailureClass, RawResponse, Transport, TransportError};
pub use client::Orchestrator;
pub use config::{CandidateTemplates, ConfigError, OrchestratorConfig, RetrySettings};
pub use error::{Error, TrailEntry, UnavailableReason};
pub use failover::{select_candidates, Candidate, CandidateList, RetryPolicy};
pub use normalize::{Degraded, DegradedReason, NormalizedResult};
pub use request::{
  CompletionRequest, CompletionRequestBuilder, Part, Payload, RequestError,
  StructuredOutput, MAX_DOCUMENT_PARTS,
};
