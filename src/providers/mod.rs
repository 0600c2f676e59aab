//! Upstream provider implementations.
//!
//! Every provider family implements [`UpstreamCaller`]; which one runs is
//! picked from configuration by [`build_caller`]. The outbound exchange
//! itself (send, read body, classify failures, enforce the deadline) is
//! shared in [`exchange`] so all providers time out and fail the same way.

pub mod anthropic;
pub mod openai_chat;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, trace};
use serde_json::Value;

use crate::config::{Credential, UpstreamConfig};
use crate::error::UpstreamError;
use crate::request::{GenerationRequest, NormalizedResponse};
use crate::Provider;

pub use anthropic::AnthropicClient;
pub use openai_chat::OpenAiChatClient;

/// One outbound generation call to a hosted model
#[async_trait]
pub trait UpstreamCaller: Send + Sync
{   /// Provider family this caller speaks to
    fn provider(&self) -> Provider;

    /// Perform exactly one call. No retries.
    async fn call(
      &self
    , credential: &Credential
    , request: &GenerationRequest
    ) -> Result<NormalizedResponse, UpstreamError>;
}

/// Build the caller selected by `config`, sharing `http_client`'s
/// connection pool
pub fn build_caller(
  config: &UpstreamConfig
, http_client: reqwest::Client
) -> Arc<dyn UpstreamCaller>
{   debug!(
      "Building {:?} caller for {}",
      config.provider, config.endpoint
    );
    match config.provider
    {   Provider::Anthropic => {
          Arc::new(AnthropicClient::new(config.clone(), http_client))
        }
      , Provider::OpenAiChat => {
          Arc::new(OpenAiChatClient::new(config.clone(), http_client))
        }
    }
}

/// Send `request` and read the whole body, all within `timeout`.
///
/// When the deadline passes first the in-flight future is dropped, which
/// aborts the HTTP exchange and releases its connection.
pub(crate) async fn exchange(
  request: reqwest::RequestBuilder
, timeout: Duration
) -> Result<Vec<u8>, UpstreamError>
{   let in_flight = async {
      let response = request
        .send()
        .await
        .map_err(|e| {
          error!("HTTP error: {}", e);
          UpstreamError::Transport(e.to_string())
        })?;

      let status = response.status();
      trace!("Upstream response status: {}", status);

      let body = response.bytes().await;

      if !status.is_success()
      {   // An unreadable error body still carries the upstream status.
          let err = match &body
          {   Ok(bytes) => http_error(status, bytes)
            , Err(e) => {
                debug!("Unreadable upstream error body: {}", e);
                http_error(status, &[])
              }
          };
          error!("Upstream API error: {:?}", err);
          return Err(err);
      }

      let body = body.map_err(|e| {
        error!("Failed reading upstream body: {}", e);
        UpstreamError::Transport(e.to_string())
      })?;

      Ok::<_, UpstreamError>(body.to_vec())
    };

    match tokio::time::timeout(timeout, in_flight).await
    {   Ok(result) => result
      , Err(_) => {
          error!("Upstream call aborted after {:?}", timeout);
          Err(UpstreamError::Timeout { secs: timeout.as_secs() })
        }
    }
}

/// Classify a non-success response.
/// Message preference: `error.message`, then `message`, then the status
/// line; a body that is not JSON falls back to the status text.
pub(crate) fn http_error(
  status: reqwest::StatusCode
, body: &[u8]
) -> UpstreamError
{   let (message, error_type) = match serde_json::from_slice::<Value>(body)
    {   Ok(payload) => {
          let text_at = |pointer: &str| payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
          let message = text_at("/error/message")
            .or_else(|| text_at("/message"))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
          (message, text_at("/error/type"))
        }
      , Err(_) => {
          let status_text = status.canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
          (status_text, None)
        }
    };

    UpstreamError::Http
    {   status: status.as_u16()
      , message
      , error_type
    }
}

/// Wrap a provider body parse failure
pub(crate) fn invalid_response(e: serde_json::Error) -> UpstreamError
{   error!("Parse error: {}", e);
    UpstreamError::InvalidResponse(e.to_string())
}
