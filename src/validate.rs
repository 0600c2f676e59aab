//! Validation of untrusted generation payloads.
//!
//! Rules run in a fixed order and stop at the first violation, so the
//! reported reason is always the first rule the payload breaks:
//!
//! 1. the payload is a JSON object
//! 2. `prompt` is a string that is non-empty after trimming
//! 3. `prompt` is at most `max_prompt_chars` characters
//! 4. `model`, when present, is on the allow-list
//! 5. `max_tokens`, when present, is an integer in `1..=2000`
//!
//! Validation is pure: no I/O, no state, same input same answer.

use serde_json::{Map, Value};

use crate::config::ValidationPolicy;
use crate::error::ValidationError;
use crate::request::{GenerationRequest, MAX_TOKENS_CEILING};

/// Check `payload` against `policy` and return the accepted request
pub fn validate(
  payload: &Value
, policy: &ValidationPolicy
) -> Result<GenerationRequest, ValidationError>
{   let body = payload.as_object()
      .ok_or(ValidationError::InvalidBody)?;

    let prompt = check_prompt(body, policy)?;
    let model = check_model(body, policy)?;
    let max_tokens = check_max_tokens(body)?;

    Ok(GenerationRequest
    {   prompt
      , model
      , max_tokens
    })
}

fn check_prompt(
  body: &Map<String, Value>
, policy: &ValidationPolicy
) -> Result<String, ValidationError>
{   let prompt = match body.get("prompt")
    {   Some(Value::String(s)) if !s.trim().is_empty() => s
      , _ => return Err(ValidationError::PromptRequired)
    };

    let length = prompt.chars().count();
    if length > policy.max_prompt_chars
    {   return Err(ValidationError::PromptTooLong
        {   limit: policy.max_prompt_chars
          , actual: length
        });
    }

    Ok(prompt.clone())
}

/// `null` and `""` count as "not given"
fn check_model(
  body: &Map<String, Value>
, policy: &ValidationPolicy
) -> Result<Option<String>, ValidationError>
{   match body.get("model")
    {   None | Some(Value::Null) => Ok(None)
      , Some(Value::String(s)) if s.is_empty() => Ok(None)
      , Some(Value::String(s)) => {
          if policy.allowed_models.iter().any(|m| m == s)
          {   Ok(Some(s.clone()))
          } else
          {   Err(ValidationError::InvalidModel(s.clone()))
          }
        }
      , Some(other) => Err(ValidationError::InvalidModel(other.to_string()))
    }
}

/// Present means present: `0` and `null` are rejected, not defaulted
fn check_max_tokens(
  body: &Map<String, Value>
) -> Result<Option<u32>, ValidationError>
{   let value = match body.get("max_tokens")
    {   None => return Ok(None)
      , Some(v) => v
    };

    let out_of_range = || ValidationError::MaxTokensOutOfRange(value.to_string());

    let number = value.as_f64().ok_or_else(out_of_range)?;
    if number.fract() != 0.0
      || number < 1.0
      || number > f64::from(MAX_TOKENS_CEILING)
    {   return Err(out_of_range());
    }

    Ok(Some(number as u32))
}
