use async_trait::async_trait;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::config::{Credential, UpstreamConfig};
use crate::error::UpstreamError;
use crate::request::{GenerationRequest, NormalizedResponse};
use crate::Provider;

pub const GROQ_CHAT_URL: &str
  = "https://api.groq.com/openai/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const TEMPERATURE: f32 = 0.7;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   #[serde(default)]
    pub role: String
  , #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub max_tokens: u32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   pub id: String
  , pub model: String
  , pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

impl ChatCompletionResponse
{   /// Translate the first choice into the normalized shape
    pub fn into_normalized(self) -> Result<NormalizedResponse, UpstreamError>
    {   let ChatCompletionResponse { id, model, choices } = self;
        let choice = choices.into_iter().next()
          .ok_or_else(|| {
            error!("No choices in response");
            UpstreamError::InvalidResponse(
              "response contained no choices".to_string()
            )
          })?;

        Ok(NormalizedResponse::assistant_text(
          id,
          model,
          choice.message.content.unwrap_or_default(),
          choice.finish_reason
        ))
    }
}

// ===== Client =====

/// Provider speaking the OpenAI chat-completions format
/// (Groq by default). Responses are translated field by field.
pub struct OpenAiChatClient
{   config: UpstreamConfig
  , http_client: reqwest::Client
}

impl OpenAiChatClient
{   pub fn new(
      config: UpstreamConfig
    , http_client: reqwest::Client
    ) -> Self
    {   debug!("Creating OpenAiChatClient for {}", config.endpoint);
        OpenAiChatClient
        {   config
          , http_client
        }
    }

    pub fn build_body(
      &self
    , request: &GenerationRequest
    ) -> ChatCompletionRequest
    {   ChatCompletionRequest
        {   model: self.config
              .resolve_model(request.model.as_deref())
              .to_string()
          , messages: vec![
              ChatMessage
              {   role: "user".to_string()
                , content: Some(request.prompt.clone())
              }
            ]
          , max_tokens: request.effective_max_tokens()
          , temperature: Some(TEMPERATURE)
        }
    }
}

#[async_trait]
impl crate::providers::UpstreamCaller for OpenAiChatClient
{   fn provider(&self) -> Provider
    {   Provider::OpenAiChat
    }

    async fn call(
      &self
    , credential: &Credential
    , request: &GenerationRequest
    ) -> Result<NormalizedResponse, UpstreamError>
    {   let body = self.build_body(request);
        debug!("Chat completion call for model: {}", body.model);
        trace!("Chat completion request: {:?}", body);

        let outbound = self.http_client
          .post(&self.config.endpoint)
          .header("Authorization", format!("Bearer {}", credential.expose()))
          .json(&body);

        let bytes = crate::providers::exchange(
          outbound,
          self.config.timeout()
        ).await?;

        serde_json::from_slice::<ChatCompletionResponse>(&bytes)
          .map_err(crate::providers::invalid_response)?
          .into_normalized()
    }
}
