//! Deployment configuration for the proxy

use std::fmt;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::Provider;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DEV_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_PROMPT_MAX_CHARS: usize = 50_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024;

/// Models accepted when no allow-list is configured
pub const DEFAULT_ALLOWED_MODELS: &[&str] = &[
  "claude-haiku-4-5-20251001"
, "claude-sonnet-4-5-20250929"
, "claude-opus-4-5-20251101"
];

/// Server-held API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential
{   pub fn new(key: impl Into<String>) -> Self
    {   Credential(key.into())
    }

    pub fn expose(&self) -> &str
    {   &self.0
    }
}

impl fmt::Debug for Credential
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("Credential(***)")
    }
}

/// Runtime mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment
{   Development
  , Production
}

impl Environment
{   pub fn is_production(self) -> bool
    {   self == Environment::Production
    }
}

/// Rules the validator applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy
{   /// Maximum prompt length, counted in Unicode scalar values (`char`s),
    /// not UTF-16 code units: an astral-plane character such as an emoji
    /// counts once here where a browser's `String.length` counts it twice
    pub max_prompt_chars: usize
  , /// Models a caller may name explicitly
    pub allowed_models: Vec<String>
  , /// Echo the offending value back in rejection reasons
    pub echo_invalid_values: bool
}

impl Default for ValidationPolicy
{   fn default() -> Self
    {   ValidationPolicy
        {   max_prompt_chars: DEFAULT_PROMPT_MAX_CHARS
          , allowed_models: DEFAULT_ALLOWED_MODELS.iter()
              .map(|m| m.to_string())
              .collect()
          , echo_invalid_values: true
        }
    }
}

/// Outbound provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig
{   /// Which provider family to speak to
    pub provider: Provider
  , /// Full endpoint URL
    pub endpoint: String
  , /// Model used when the request names none
    pub default_model: String
  , /// Ignore the requested model and always send `default_model`
    pub force_default_model: bool
  , /// Hard wall-clock limit on one call
    pub timeout_secs: u64
}

impl UpstreamConfig
{   /// Provider defaults: endpoint, model and model forcing
    pub fn for_provider(provider: Provider) -> Self
    {   UpstreamConfig
        {   endpoint: provider.default_endpoint().to_string()
          , default_model: provider.default_model().to_string()
          , force_default_model: provider == Provider::OpenAiChat
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , provider
        }
    }

    pub fn timeout(&self) -> Duration
    {   Duration::from_secs(self.timeout_secs)
    }

    /// Model to send for a request that asked for `requested`
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str
    {   if self.force_default_model
        {   return &self.default_model;
        }
        requested.unwrap_or(&self.default_model)
    }
}

/// Per-client request budgets, per one-minute window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig
{   pub api_per_minute: u32
  , pub health_per_minute: u32
}

impl Default for RateLimitConfig
{   fn default() -> Self
    {   RateLimitConfig
        {   api_per_minute: 20
          , health_per_minute: 100
        }
    }
}

/// Complete proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig
{   pub credential: Credential
  , pub upstream: UpstreamConfig
  , pub validation: ValidationPolicy
  , pub rate_limits: RateLimitConfig
  , pub frontend_origin: String
  , pub port: u16
  , pub environment: Environment
  , pub max_body_bytes: usize
}

impl ProxyConfig
{   /// Configuration with defaults for everything but the key
    pub fn new(credential: Credential, provider: Provider) -> Self
    {   ProxyConfig
        {   credential
          , upstream: UpstreamConfig::for_provider(provider)
          , validation: ValidationPolicy::default()
          , rate_limits: RateLimitConfig::default()
          , frontend_origin: DEFAULT_DEV_ORIGIN.to_string()
          , port: DEFAULT_PORT
          , environment: Environment::Development
          , max_body_bytes: DEFAULT_MAX_BODY_BYTES
        }
    }

    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
      F: Fn(&str) -> Option<String>
    {   let get = |key: &str| {
          lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };

        let credential = get("UPSTREAM_API_KEY")
          .or_else(|| get("ANTHROPIC_API_KEY"))
          .map(Credential::new)
          .ok_or(ConfigError::Missing("UPSTREAM_API_KEY"))?;

        let environment = match get("APP_ENV").as_deref()
        {   None | Some("development") => Environment::Development
          , Some("production") => Environment::Production
          , Some(other) => {
              return Err(ConfigError::Invalid
              {   key: "APP_ENV"
                , value: other.to_string()
              });
            }
        };

        let provider = match get("UPSTREAM_PROVIDER")
        {   Some(value) => value.parse::<Provider>()
              .map_err(|_| ConfigError::Invalid
              {   key: "UPSTREAM_PROVIDER"
                , value
              })?
          , None => Provider::Anthropic
        };

        let mut config = ProxyConfig::new(credential, provider);
        config.environment = environment;

        match get("FRONTEND_ORIGIN")
        {   Some(origin) => config.frontend_origin = origin
          , None if environment.is_production() => {
              return Err(ConfigError::Missing("FRONTEND_ORIGIN"));
            }
          , None => {
              warn!(
                "FRONTEND_ORIGIN not set, allowing {} (development only)",
                DEFAULT_DEV_ORIGIN
              );
            }
        }

        if let Some(url) = get("UPSTREAM_URL")
        {   config.upstream.endpoint = url;
        }
        if let Some(model) = get("UPSTREAM_DEFAULT_MODEL")
        {   config.upstream.default_model = model;
        }
        if let Some(v) = get("UPSTREAM_FORCE_MODEL")
        {   config.upstream.force_default_model
              = parse_flag("UPSTREAM_FORCE_MODEL", &v)?;
        }
        if let Some(v) = get("UPSTREAM_TIMEOUT_SECS")
        {   config.upstream.timeout_secs
              = parse_number("UPSTREAM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PORT")
        {   config.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = get("PROMPT_MAX_CHARS")
        {   config.validation.max_prompt_chars
              = parse_number("PROMPT_MAX_CHARS", &v)?;
        }
        if let Some(v) = get("ALLOWED_MODELS")
        {   config.validation.allowed_models = v
              .split(',')
              .map(str::trim)
              .filter(|m| !m.is_empty())
              .map(str::to_string)
              .collect();
        }
        if let Some(v) = get("ECHO_INVALID_VALUES")
        {   config.validation.echo_invalid_values
              = parse_flag("ECHO_INVALID_VALUES", &v)?;
        }
        if let Some(v) = get("MAX_BODY_BYTES")
        {   config.max_body_bytes = parse_number("MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = get("API_RATE_LIMIT_PER_MIN")
        {   config.rate_limits.api_per_minute
              = parse_number("API_RATE_LIMIT_PER_MIN", &v)?;
        }
        if let Some(v) = get("HEALTH_RATE_LIMIT_PER_MIN")
        {   config.rate_limits.health_per_minute
              = parse_number("HEALTH_RATE_LIMIT_PER_MIN", &v)?;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(
  key: &'static str
, value: &str
) -> Result<T, ConfigError>
{   value.parse().map_err(|_| ConfigError::Invalid
    {   key
      , value: value.to_string()
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError>
{   match value.to_ascii_lowercase().as_str()
    {   "1" | "true" | "yes" | "on" => Ok(true)
      , "0" | "false" | "no" | "off" => Ok(false)
      , _ => Err(ConfigError::Invalid
        {   key
          , value: value.to_string()
        })
    }
}
