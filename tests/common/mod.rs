#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use genproxy::config::{Credential, ProxyConfig};
use genproxy::{
  GenerateService, GenerationRequest, NormalizedResponse, Provider,
  UpstreamCaller, UpstreamError
};

pub const TEST_KEY: &str = "test-key";

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_upstream(router: Router) -> String
{   let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
      .await
      .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    tokio::spawn(async move {
      let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Caller that returns a canned result and counts invocations
pub struct FakeCaller
{   result: Result<NormalizedResponse, UpstreamError>
  , calls: AtomicUsize
  , last_request: std::sync::Mutex<Option<GenerationRequest>>
  , stall: Option<Duration>
}

impl FakeCaller
{   pub fn returning(
      result: Result<NormalizedResponse, UpstreamError>
    ) -> Arc<Self>
    {   Arc::new(FakeCaller
        {   result
          , calls: AtomicUsize::new(0)
          , last_request: std::sync::Mutex::new(None)
          , stall: None
        })
    }

    /// Caller that sleeps for `stall` before answering
    pub fn stalling(
      stall: Duration
    , result: Result<NormalizedResponse, UpstreamError>
    ) -> Arc<Self>
    {   Arc::new(FakeCaller
        {   result
          , calls: AtomicUsize::new(0)
          , last_request: std::sync::Mutex::new(None)
          , stall: Some(stall)
        })
    }

    pub fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest>
    {   self.last_request.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UpstreamCaller for FakeCaller
{   fn provider(&self) -> Provider
    {   Provider::Anthropic
    }

    async fn call(
      &self
    , credential: &Credential
    , request: &GenerationRequest
    ) -> Result<NormalizedResponse, UpstreamError>
    {   assert_eq!(credential.expose(), TEST_KEY);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("lock") = Some(request.clone());
        if let Some(stall) = self.stall
        {   tokio::time::sleep(stall).await;
        }
        self.result.clone()
    }
}

pub fn sample_response() -> NormalizedResponse
{   NormalizedResponse::assistant_text(
      "msg_1",
      "claude-haiku-4-5-20251001",
      "Hello there",
      Some("end_turn".to_string())
    )
}

pub fn test_config() -> ProxyConfig
{   ProxyConfig::new(Credential::new(TEST_KEY), Provider::Anthropic)
}

pub fn service_with(
  config: &ProxyConfig
, caller: Arc<FakeCaller>
) -> GenerateService
{   GenerateService::new(
      config.credential.clone(),
      config.validation.clone(),
      caller
    )
}
