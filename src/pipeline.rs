//! The generate pipeline: validate, then make one upstream call

use std::sync::Arc;

use log::{debug, error, warn};
use serde_json::Value;

use crate::config::{Credential, ValidationPolicy};
use crate::error::{GenerateError, UpstreamError};
use crate::providers::UpstreamCaller;
use crate::request::NormalizedResponse;

/// Everything one `generate` needs. Immutable after startup and
/// cheap to clone, so it is shared across requests as-is.
#[derive(Clone)]
pub struct GenerateService
{   credential: Credential
  , policy: ValidationPolicy
  , caller: Arc<dyn UpstreamCaller>
}

impl GenerateService
{   pub fn new(
      credential: Credential
    , policy: ValidationPolicy
    , caller: Arc<dyn UpstreamCaller>
    ) -> Self
    {   debug!("Creating GenerateService for {:?}", caller.provider());
        GenerateService
        {   credential
          , policy
          , caller
        }
    }

    pub fn policy(&self) -> &ValidationPolicy
    {   &self.policy
    }

    /// Validate `payload` and forward it upstream.
    /// Rejected payloads never reach the provider.
    pub async fn generate(
      &self
    , payload: &Value
    ) -> Result<NormalizedResponse, GenerateError>
    {   let request = crate::validate::validate(payload, &self.policy)
          .map_err(|e| {
            warn!("Validation failed: {}", e);
            GenerateError::from(e)
          })?;

        debug!(
          "Forwarding prompt of {} chars, model {:?}",
          request.prompt.chars().count(),
          request.model
        );

        self.caller
          .call(&self.credential, &request)
          .await
          .map_err(|e| {
            match &e
            {   UpstreamError::Http { status, .. } => {
                  error!("Upstream rejected request ({}): {}", status, e);
                }
              , UpstreamError::Timeout { .. } => {
                  error!("{}", e);
                }
              , other => {
                  error!("Upstream call failed: {}", other);
                }
            }
            GenerateError::from(e)
          })
    }
}
