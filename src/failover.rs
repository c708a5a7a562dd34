//! Candidate selection and retry policy
//!
//! Both are pure reads of the startup configuration.

use std::fmt;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{CandidateTemplates, RetrySettings};

/// One backend model identifier on the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate
{   pub fn new(id: impl Into<String>) -> Self
    {   Candidate(id.into())
    }

    pub fn id(&self) -> &str
    {   &self.0
    }
}

impl fmt::Display for Candidate
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(&self.0)
    }
}

/// Ordered, non-empty list of candidates for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList
{   candidates: Vec<Candidate>
}

impl CandidateList
{   pub fn len(&self) -> usize
    {   self.candidates.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate>
    {   self.candidates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate>
    {   self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate]
    {   &self.candidates
    }
}

/// Pick the template matching the request shape.
///
/// Document-bearing requests only ever see the document-capable template.
/// `wants_structured` does not change the order; every candidate must be
/// able to fill a schema on demand.
pub fn select_candidates(
  templates: &CandidateTemplates
, has_documents: bool
, wants_structured: bool
) -> CandidateList
{   let template = if has_documents
    {   &templates.documents
    } else
    {   &templates.text_only
    };
    debug!(
      "Selected {} candidates (documents: {}, structured: {})",
      template.len(), has_documents, wants_structured
    );
    CandidateList
    {   candidates: template.clone()
    }
}

/// Fixed per-candidate budgets and inter-retry delay
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy
{   pub with_documents: usize
  , pub text_only: usize
  , pub retry_delay: Duration
}

impl RetryPolicy
{   /// Budgets are taken as given; `OrchestratorConfig::validate` rejects
    /// zero. A zero budget built by hand still makes one call per candidate.
    pub fn new(
      with_documents: usize
    , text_only: usize
    , retry_delay: Duration
    ) -> Self
    {   RetryPolicy
        {   with_documents
          , text_only
          , retry_delay
        }
    }

    /// Calls allowed per candidate. Fewer candidates read documents, so
    /// each one gets a larger budget.
    pub fn retries_per_candidate(&self, has_documents: bool) -> usize
    {   if has_documents
        {   self.with_documents
        } else
        {   self.text_only
        }
    }
}

impl From<&RetrySettings> for RetryPolicy
{   fn from(settings: &RetrySettings) -> Self
    {   RetryPolicy::new(
          settings.retries_with_documents
        , settings.retries_text_only
        , Duration::from_millis(settings.retry_delay_ms)
        )
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::from(&RetrySettings::default())
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn document_requests_use_document_template()
    {   let templates = CandidateTemplates::default();
        for structured in [false, true]
        {   let list = select_candidates(&templates, true, structured);
            assert!(!list.is_empty());
            for c in list.iter()
            {   assert!(templates.documents.contains(c));
            }
            assert_eq!(list.as_slice(), templates.documents.as_slice());
        }
    }

    #[test]
    fn selection_is_deterministic()
    {   let templates = CandidateTemplates::default();
        let first = select_candidates(&templates, false, false);
        let second = select_candidates(&templates, false, false);
        assert_eq!(first, second);
        assert_eq!(
          select_candidates(&templates, false, true),
          first
        );
        assert_eq!(first.as_slice(), templates.text_only.as_slice());
    }

    #[test]
    fn document_budget_is_larger()
    {   let policy = RetryPolicy::default();
        assert_eq!(policy.retries_per_candidate(true), 3);
        assert_eq!(policy.retries_per_candidate(false), 2);
        assert_eq!(policy.retry_delay, Duration::from_millis(2000));
    }

    #[test]
    fn budgets_come_straight_from_settings()
    {   let policy = RetryPolicy::from(&RetrySettings
        {   retries_with_documents: 5
          , retries_text_only: 1
          , retry_delay_ms: 10
        });
        assert_eq!(policy.retries_per_candidate(true), 5);
        assert_eq!(policy.retries_per_candidate(false), 1);
        assert_eq!(policy.retry_delay, Duration::from_millis(10));
    }
}
