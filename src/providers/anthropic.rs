use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::{Credential, UpstreamConfig};
use crate::error::UpstreamError;
use crate::request::{GenerationRequest, NormalizedResponse};
use crate::Provider;

pub const ANTHROPIC_MESSAGES_URL: &str
  = "https://api.anthropic.com/v1/messages";

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest
{   pub model: String
  , pub max_tokens: u32
  , pub messages: Vec<Message>
}

// ===== Client =====

/// Native-format provider. Its response already has the normalized
/// shape, so success bodies are passed through.
pub struct AnthropicClient
{   config: UpstreamConfig
  , http_client: reqwest::Client
}

impl AnthropicClient
{   pub fn new(
      config: UpstreamConfig
    , http_client: reqwest::Client
    ) -> Self
    {   debug!("Creating AnthropicClient for {}", config.endpoint);
        AnthropicClient
        {   config
          , http_client
        }
    }

    /// Outbound body for `request`
    pub fn build_body(&self, request: &GenerationRequest) -> MessagesRequest
    {   MessagesRequest
        {   model: self.config
              .resolve_model(request.model.as_deref())
              .to_string()
          , max_tokens: request.effective_max_tokens()
          , messages: vec![
              Message
              {   role: "user".to_string()
                , content: request.prompt.clone()
              }
            ]
        }
    }
}

#[async_trait]
impl crate::providers::UpstreamCaller for AnthropicClient
{   fn provider(&self) -> Provider
    {   Provider::Anthropic
    }

    async fn call(
      &self
    , credential: &Credential
    , request: &GenerationRequest
    ) -> Result<NormalizedResponse, UpstreamError>
    {   let body = self.build_body(request);
        debug!("Anthropic call for model: {}", body.model);
        trace!("Anthropic request: {:?}", body);

        let outbound = self.http_client
          .post(&self.config.endpoint)
          .header("x-api-key", credential.expose())
          .header("anthropic-version", ANTHROPIC_VERSION)
          .json(&body);

        let bytes = crate::providers::exchange(
          outbound,
          self.config.timeout()
        ).await?;

        serde_json::from_slice::<NormalizedResponse>(&bytes)
          .map_err(crate::providers::invalid_response)
    }
}
