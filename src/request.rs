//! Request and response types shared by every provider

use serde::{Deserialize, Serialize};

/// Hard ceiling on generated tokens, enforced by the validator
/// and again when building the outbound body
pub const MAX_TOKENS_CEILING: u32 = 2000;

/// max_tokens sent upstream when the caller gave none
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// A generation request that passed validation.
/// `prompt` is non-empty after trimming and within the prompt ceiling,
/// `model` is on the allow-list, `max_tokens` is in 1..=2000.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest
{   /// The prompt text, as received
    pub prompt: String
  , /// Requested model, `None` when the caller left it to the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>
  , /// Requested generation budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>
}

impl GenerationRequest
{   pub fn new(prompt: impl Into<String>) -> Self
    {   GenerationRequest
        {   prompt: prompt.into()
          , model: None
          , max_tokens: None
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self
    {   self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = Some(max_tokens);
        self
    }

    /// Token budget for the outbound call: the requested value capped
    /// at the ceiling, or the default when absent
    pub fn effective_max_tokens(&self) -> u32
    {   self.max_tokens
          .unwrap_or(DEFAULT_MAX_TOKENS)
          .min(MAX_TOKENS_CEILING)
    }
}

/// One block of generated content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock
{   Text
    {   text: String
    }
}

impl ContentBlock
{   pub fn text(text: impl Into<String>) -> Self
    {   ContentBlock::Text { text: text.into() }
    }
}

/// The single response shape returned to callers,
/// whichever provider produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse
{   pub id: String
  , #[serde(rename = "type", default = "message_type")]
    pub kind: String
  , #[serde(default = "assistant_role")]
    pub role: String
  , pub content: Vec<ContentBlock>
  , pub model: String
  , #[serde(default)]
    pub stop_reason: Option<String>
}

fn message_type() -> String
{   "message".to_string()
}

fn assistant_role() -> String
{   "assistant".to_string()
}

impl NormalizedResponse
{   /// Assistant message holding a single text block
    pub fn assistant_text(
      id: impl Into<String>
    , model: impl Into<String>
    , text: impl Into<String>
    , stop_reason: Option<String>
    ) -> Self
    {   NormalizedResponse
        {   id: id.into()
          , kind: message_type()
          , role: assistant_role()
          , content: vec![ContentBlock::text(text)]
          , model: model.into()
          , stop_reason
        }
    }

    /// Concatenated text of all content blocks
    pub fn text(&self) -> String
    {   self.content.iter()
          .map(|block| match block
          {   ContentBlock::Text { text } => text.as_str()
          })
          .collect()
    }
}
