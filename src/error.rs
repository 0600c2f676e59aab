//! Error types for the generation pipeline and the uniform error envelope

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for failures whose detail must stay server-side
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate content";

/// Rejection produced by the validator.
/// Always a client fault, always HTTP 400, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError
{   /// Payload is not a JSON object
    #[error("invalid body")]
    InvalidBody
  , /// Prompt missing, not a string, or whitespace only
    #[error("prompt required")]
    PromptRequired
  , /// Prompt longer than the configured ceiling
    #[error("prompt too long (max {limit} chars, got {actual})")]
    PromptTooLong
    {   limit: usize
      , actual: usize
    }
  , /// Model not on the allow-list
    #[error("invalid model: {0}")]
    InvalidModel(String)
  , /// max_tokens not an integer in 1..=2000
    #[error("max_tokens out of range: got {0}, expected 1 to {}", crate::request::MAX_TOKENS_CEILING)]
    MaxTokensOutOfRange(String)
}

impl ValidationError
{   /// Reason without caller-supplied values echoed back
    pub fn terse_message(&self) -> String
    {   match self
        {   ValidationError::PromptTooLong { limit, .. } => {
              format!("prompt too long (max {} chars)", limit)
            }
          , ValidationError::InvalidModel(_) => {
              "invalid model".to_string()
            }
          , ValidationError::MaxTokensOutOfRange(_) => {
              "max_tokens out of range".to_string()
            }
          , other => other.to_string()
        }
    }
}

/// Classified failure of the one outbound call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError
{   /// No response within the hard timeout; the call was aborted
    #[error("Request timeout after {secs}s")]
    Timeout
    {   secs: u64
    }
  , /// Provider answered with a non-success status
    #[error("{message}")]
    Http
    {   status: u16
      , message: String
      , error_type: Option<String>
    }
  , /// Network-level failure reaching the provider
    #[error("transport error: {0}")]
    Transport(String)
  , /// Success status but the body did not match the provider shape
    #[error("invalid provider response: {0}")]
    InvalidResponse(String)
}

impl UpstreamError
{   /// Upstream HTTP status, if the provider answered at all
    pub fn http_status(&self) -> Option<u16>
    {   match self
        {   UpstreamError::Http { status, .. } => Some(*status)
          , _ => None
        }
    }

    /// Provider-supplied error type tag
    pub fn provider_error_type(&self) -> Option<&str>
    {   match self
        {   UpstreamError::Http { error_type, .. } => error_type.as_deref()
          , _ => None
        }
    }
}

/// Everything the pipeline can fail with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError
{   #[error(transparent)]
    Validation(#[from] ValidationError)
  , #[error(transparent)]
    Upstream(#[from] UpstreamError)
}

impl GenerateError
{   /// HTTP status this failure is reported with
    pub fn status(&self) -> u16
    {   match self
        {   GenerateError::Validation(_) => 400
          , GenerateError::Upstream(e) => e.http_status().unwrap_or(500)
        }
    }

    /// Map into the caller-facing envelope.
    /// Transport detail never leaves the process.
    pub fn to_envelope(&self, echo_invalid_values: bool) -> ErrorEnvelope
    {   let status = self.status();
        match self
        {   GenerateError::Validation(e) => {
              let message = if echo_invalid_values
              {   e.to_string()
              } else
              {   e.terse_message()
              };
              ErrorEnvelope::new(message, status)
            }
          , GenerateError::Upstream(e @ UpstreamError::Http { .. }) => {
              ErrorEnvelope::new(e.to_string(), status)
                .with_details(e.provider_error_type().map(str::to_string))
            }
          , GenerateError::Upstream(e @ UpstreamError::Timeout { .. }) => {
              ErrorEnvelope::new(e.to_string(), status)
            }
          , GenerateError::Upstream(_) => {
              ErrorEnvelope::new(GENERIC_FAILURE_MESSAGE, status)
            }
        }
    }
}

/// Startup configuration problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError
{   #[error("missing required setting: {0}")]
    Missing(&'static str)
  , #[error("invalid value for {key}: {value}")]
    Invalid
    {   key: &'static str
      , value: String
    }
}

/// Uniform error body: `{"error": {"message", "status", "details"?}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope
{   pub error: ErrorBody
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody
{   pub message: String
  , pub status: u16
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>
}

impl ErrorEnvelope
{   pub fn new(message: impl Into<String>, status: u16) -> Self
    {   ErrorEnvelope
        {   error: ErrorBody
            {   message: message.into()
              , status
              , details: None
            }
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self
    {   self.error.details = details;
        self
    }
}
