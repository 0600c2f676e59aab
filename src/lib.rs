pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod validate;
pub mod pipeline;
pub mod rate_limit;
pub mod server;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/*

genproxy: a small backend that sits between a trusted frontend and a
hosted LLM API. The frontend never sees the API key.

  inbound JSON ──> validate ──> UpstreamCaller ──> NormalizedResponse
                      │                │
                      └── 400 ─────────┴── error envelope

genproxy/
├── src/
│   ├── lib.rs          # Provider enum and re-exports
│   ├── error.rs        # Error taxonomy and the error envelope
│   ├── config.rs       # Environment-driven configuration
│   ├── request.rs      # GenerationRequest / NormalizedResponse
│   ├── validate.rs     # Input validation
│   ├── providers/      # One UpstreamCaller per provider family
│   │   ├── mod.rs
│   │   ├── anthropic.rs
│   │   └── openai_chat.rs
│   ├── pipeline.rs     # validate -> call
│   ├── rate_limit.rs   # Fixed-window per-client limiter
│   ├── server.rs       # axum routes and middleware
│   └── main.rs
└── tests/

*/

pub use config::{Credential, ProxyConfig, UpstreamConfig, ValidationPolicy};
pub use error::{ErrorEnvelope, GenerateError, UpstreamError, ValidationError};
pub use pipeline::GenerateService;
pub use providers::{build_caller, UpstreamCaller};
pub use request::{ContentBlock, GenerationRequest, NormalizedResponse};
pub use validate::validate;

/// Provider families the proxy can forward to.
/// Both are mapped onto the same `NormalizedResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Provider
{
  /// Anthropic Messages API; responses already have the normalized shape
  Anthropic
  ,
  /// Any OpenAI chat-completions compatible API (Groq, OpenAI, ...)
  #[serde(rename = "openai-chat")]
  OpenAiChat
}

impl Provider
{   pub fn default_endpoint(self) -> &'static str
    {   match self
        {   Provider::Anthropic => providers::anthropic::ANTHROPIC_MESSAGES_URL
          , Provider::OpenAiChat => providers::openai_chat::GROQ_CHAT_URL
        }
    }

    pub fn default_model(self) -> &'static str
    {   match self
        {   Provider::Anthropic => providers::anthropic::DEFAULT_MODEL
          , Provider::OpenAiChat => providers::openai_chat::DEFAULT_MODEL
        }
    }
}

impl FromStr for Provider
{   type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s.to_ascii_lowercase().as_str()
        {   "anthropic" | "native" => Ok(Provider::Anthropic)
          , "openai-chat" | "openai" | "groq" => Ok(Provider::OpenAiChat)
          , other => Err(format!("unknown provider: {}", other))
        }
    }
}
