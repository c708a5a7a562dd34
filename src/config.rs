//! Configuration for the gateway, candidate templates and retry budgets
//!
//! Loaded once at startup and treated as immutable afterwards.

use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::failover::Candidate;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const ENV_API_BASE: &str = "DARWIN_GATEWAY_URL";
pub const ENV_API_KEY: &str = "DARWIN_GATEWAY_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError
{   #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error)
  , #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error)
  , #[error("candidate list '{0}' is empty")]
    EmptyCandidateList(&'static str)
  , #[error("invalid configuration: {0}")]
    Invalid(String)
  , #[error("missing gateway API key (set DARWIN_GATEWAY_API_KEY)")]
    MissingApiKey
}

/// Per-candidate retry budgets and the fixed delay between retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings
{   /// Calls per candidate when the request embeds documents
    pub retries_with_documents: usize
  , /// Calls per candidate for text-only requests
    pub retries_text_only: usize
  , pub retry_delay_ms: u64
}

impl Default for RetrySettings
{   fn default() -> Self
    {   RetrySettings
        {   retries_with_documents: 3
          , retries_text_only: 2
          , retry_delay_ms: 2000
        }
    }
}

/// Ordered "try these models in this order" templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateTemplates
{   /// Only models known to read embedded documents
    pub documents: Vec<Candidate>
  , /// Broader pool for text-only requests
    pub text_only: Vec<Candidate>
}

impl Default for CandidateTemplates
{   fn default() -> Self
    {   let documents: Vec<Candidate> = [
            "google/gemini-2.5-flash"
          , "anthropic/claude-3.5-sonnet"
          , "openai/gpt-4o"
          , "google/gemini-2.0-flash-001"
          ].iter().map(|id| Candidate::new(*id)).collect();

        let text_only: Vec<Candidate> = [
            "google/gemini-2.5-flash"
          , "openai/gpt-4o-mini"
          , "meta-llama/llama-3.3-70b-instruct"
          , "mistralai/mistral-small-3.1-24b-instruct"
          , "deepseek/deepseek-chat"
          , "anthropic/claude-3.5-sonnet"
          ].iter().map(|id| Candidate::new(*id)).collect();

        CandidateTemplates
        {   documents
          , text_only
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig
{   /// Gateway base URL, without the `/chat/completions` suffix
    pub api_base: String
  , /// Bearer credential; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>
  , /// Per-attempt timeout in seconds
    pub call_timeout_secs: u64
  , pub retry: RetrySettings
  , pub templates: CandidateTemplates
  , /// Optional attribution headers some gateways ask for
    pub referer: Option<String>
  , pub title: Option<String>
}

impl Default for OrchestratorConfig
{   fn default() -> Self
    {   OrchestratorConfig
        {   api_base: DEFAULT_API_BASE.to_string()
          , api_key: None
          , call_timeout_secs: 90
          , retry: RetrySettings::default()
          , templates: CandidateTemplates::default()
          , referer: None
          , title: None
        }
    }
}

impl OrchestratorConfig
{   pub fn from_json_str(raw: &str) -> Result<Self, ConfigError>
    {   let config: OrchestratorConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(
      path: impl AsRef<Path>
    ) -> Result<Self, ConfigError>
    {   let path = path.as_ref();
        debug!("Loading orchestrator config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `DARWIN_GATEWAY_URL` / `DARWIN_GATEWAY_API_KEY` if set
    pub fn with_env_overrides(mut self) -> Self
    {   if let Ok(base) = std::env::var(ENV_API_BASE)
        {   if !base.trim().is_empty()
            {   debug!("Gateway base overridden from environment");
                self.api_base = base;
            }
        }
        if let Ok(key) = std::env::var(ENV_API_KEY)
        {   if !key.trim().is_empty()
            {   self.api_key = Some(key);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError>
    {   if self.templates.documents.is_empty()
        {   return Err(ConfigError::EmptyCandidateList("documents"));
        }
        if self.templates.text_only.is_empty()
        {   return Err(ConfigError::EmptyCandidateList("text_only"));
        }
        if self.retry.retries_with_documents == 0
          || self.retry.retries_text_only == 0
        {   return Err(ConfigError::Invalid(
              "retry budgets must allow at least one call".to_string()
            ));
        }
        if self.call_timeout_secs == 0
        {   return Err(ConfigError::Invalid(
              "call_timeout_secs must be positive".to_string()
            ));
        }
        if self.api_base.trim().is_empty()
        {   return Err(ConfigError::Invalid(
              "api_base is empty".to_string()
            ));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, ConfigError>
    {   match self.api_key.as_deref()
        {   Some(key) if !key.trim().is_empty() => Ok(key)
          , _ => Err(ConfigError::MissingApiKey)
        }
    }

    pub fn call_timeout(&self) -> Duration
    {   Duration::from_secs(self.call_timeout_secs)
    }

    pub fn chat_completions_url(&self) -> String
    {   format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn defaults_are_valid()
    {   let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert!(
          config.retry.retries_with_documents
            > config.retry.retries_text_only
        );
    }

    #[test]
    fn partial_json_keeps_defaults()
    {   let config = OrchestratorConfig::from_json_str(
          r#"{ "api_base": "http://localhost:9000/v1/",
               "retry": { "retry_delay_ms": 5 } }"#
        ).unwrap();
        assert_eq!(
          config.chat_completions_url(),
          "http://localhost:9000/v1/chat/completions"
        );
        assert_eq!(config.retry.retry_delay_ms, 5);
        assert_eq!(config.retry.retries_text_only, 2);
        assert_eq!(config.templates, CandidateTemplates::default());
    }

    #[test]
    fn empty_template_is_rejected()
    {   let err = OrchestratorConfig::from_json_str(
          r#"{ "templates": { "documents": [] } }"#
        ).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCandidateList("documents")));
    }

    #[test]
    fn zero_budget_is_rejected()
    {   let err = OrchestratorConfig::from_json_str(
          r#"{ "retry": { "retries_text_only": 0 } }"#
        ).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_json_file()
    {   use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
          file,
          r#"{{ "call_timeout_secs": 30,
               "templates": {{ "text_only": ["fast/model"] }} }}"#
        ).unwrap();

        let config = OrchestratorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.templates.text_only, vec![Candidate::new("fast/model")]);
        assert_eq!(
          config.templates.documents,
          CandidateTemplates::default().documents
        );
    }

    #[test]
    fn missing_or_broken_file_is_an_error()
    {   let err = OrchestratorConfig::from_json_file(
          "/nonexistent/darwin/config.json"
        ).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        let err = OrchestratorConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_base_and_key()
    {   std::env::set_var(ENV_API_BASE, "http://gateway.internal/v1");
        std::env::set_var(ENV_API_KEY, "env-key");
        let config = OrchestratorConfig::default().with_env_overrides();
        std::env::remove_var(ENV_API_BASE);
        std::env::remove_var(ENV_API_KEY);

        assert_eq!(config.api_base, "http://gateway.internal/v1");
        assert_eq!(config.api_key().unwrap(), "env-key");

        let untouched = OrchestratorConfig::default().with_env_overrides();
        assert_eq!(untouched.api_base, DEFAULT_API_BASE);
        assert!(untouched.api_key.is_none());
    }

    #[test]
    fn api_key_is_not_serialized()
    {   let config = OrchestratorConfig
        {   api_key: Some("secret".to_string())
          , ..OrchestratorConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(config.api_key().is_ok());
        assert!(OrchestratorConfig::default().api_key().is_err());
    }
}
