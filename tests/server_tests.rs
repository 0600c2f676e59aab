mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use genproxy::config::{Environment, ProxyConfig};
use genproxy::server::build_router;
use genproxy::UpstreamError;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{sample_response, service_with, test_config, FakeCaller};

fn router_with(
  config: &ProxyConfig
, result: Result<genproxy::NormalizedResponse, UpstreamError>
) -> (Router, std::sync::Arc<FakeCaller>)
{   let caller = FakeCaller::returning(result);
    let router = build_router(config, service_with(config, caller.clone()))
      .expect("router");
    (router, caller)
}

fn generate_request(body: impl Into<Body>) -> Request<Body>
{   Request::builder()
      .method("POST")
      .uri("/api/generate")
      .header(header::CONTENT_TYPE, "application/json")
      .body(body.into())
      .expect("request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value)
{   let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_generate_success_returns_normalized_body()
{   let (router, caller) = router_with(&test_config(), Ok(sample_response()));

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "hi", "max_tokens": 100 }).to_string())
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::to_value(sample_response()).expect("json"));
    assert_eq!(caller.calls(), 1);
    assert_eq!(
      caller.last_request().and_then(|r| r.max_tokens),
      Some(100)
    );
}

#[tokio::test]
async fn test_validation_failure_is_400_and_never_calls_upstream()
{   let (router, caller) = router_with(&test_config(), Ok(sample_response()));

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "   " }).to_string())
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": { "message": "prompt required", "status": 400 } }));
    assert_eq!(caller.calls(), 0);
}

#[tokio::test]
async fn test_unparseable_json_is_invalid_body()
{   let (router, caller) = router_with(&test_config(), Ok(sample_response()));

    let (status, body) = send(&router, generate_request("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "invalid body");
    assert_eq!(caller.calls(), 0);
}

#[tokio::test]
async fn test_invalid_model_echo_follows_configuration()
{   let payload = json!({ "prompt": "hi", "model": "gpt-4" }).to_string();

    let (router, _) = router_with(&test_config(), Ok(sample_response()));
    let (_, body) = send(&router, generate_request(payload.clone())).await;
    assert_eq!(body["error"]["message"], "invalid model: gpt-4");

    let mut quiet = test_config();
    quiet.validation.echo_invalid_values = false;
    let (router, _) = router_with(&quiet, Ok(sample_response()));
    let (status, body) = send(&router, generate_request(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "invalid model");
}

#[tokio::test]
async fn test_upstream_http_error_status_passed_through()
{   let (router, _) = router_with(
      &test_config(),
      Err(UpstreamError::Http
      {   status: 429
        , message: "slow down".to_string()
        , error_type: Some("rate_limit_error".to_string())
      })
    );

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "hi" }).to_string())
    ).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
      body,
      json!({ "error": {
        "message": "slow down",
        "status": 429,
        "details": "rate_limit_error"
      } })
    );
}

#[tokio::test]
async fn test_timeout_reported_as_500_with_timeout_message()
{   let (router, _) = router_with(
      &test_config(),
      Err(UpstreamError::Timeout { secs: 30 })
    );

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "hi" }).to_string())
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      body,
      json!({ "error": { "message": "Request timeout after 30s", "status": 500 } })
    );
}

#[tokio::test]
async fn test_transport_error_detail_not_exposed()
{   let (router, _) = router_with(
      &test_config(),
      Err(UpstreamError::Transport(
        "error trying to connect: tcp connect error: Connection refused (os error 111)".to_string()
      ))
    );

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "hi" }).to_string())
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "Failed to generate content");
    assert!(!body.to_string().contains("os error"));
}

#[tokio::test]
async fn test_oversized_body_rejected()
{   let mut config = test_config();
    config.max_body_bytes = 1024;
    let (router, caller) = router_with(&config, Ok(sample_response()));

    let payload = json!({ "prompt": "x".repeat(4096) }).to_string();
    let (status, body) = send(&router, generate_request(payload)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["status"], 413);
    assert_eq!(caller.calls(), 0);
}

#[tokio::test]
async fn test_api_rate_limit()
{   let mut config = test_config();
    config.rate_limits.api_per_minute = 2;
    let (router, caller) = router_with(&config, Ok(sample_response()));
    let payload = json!({ "prompt": "hi" }).to_string();

    for _ in 0..2
    {   let (status, _) = send(&router, generate_request(payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, generate_request(payload)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
      body["error"]["message"],
      "Too many requests, please try again later"
    );
    assert_eq!(caller.calls(), 2);
}

#[tokio::test]
async fn test_rate_limit_is_per_client()
{   let mut config = test_config();
    config.rate_limits.api_per_minute = 1;
    let (router, _) = router_with(&config, Ok(sample_response()));
    let payload = json!({ "prompt": "hi" }).to_string();

    let from = |ip: &str| Request::builder()
      .method("POST")
      .uri("/api/generate")
      .header(header::CONTENT_TYPE, "application/json")
      .header("x-forwarded-for", ip)
      .body(Body::from(payload.clone()))
      .expect("request");

    assert_eq!(send(&router, from("10.0.0.1")).await.0, StatusCode::OK);
    assert_eq!(send(&router, from("10.0.0.2")).await.0, StatusCode::OK);
    assert_eq!(
      send(&router, from("172.16.0.1, 10.0.0.1")).await.0,
      StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_rate_limit_ignores_client_supplied_forwarded_hops()
{   let mut config = test_config();
    config.rate_limits.api_per_minute = 1;
    let (router, caller) = router_with(&config, Ok(sample_response()));
    let payload = json!({ "prompt": "hi" }).to_string();

    let mut accepted = 0;
    for i in 0..10
    {   let request = Request::builder()
          .method("POST")
          .uri("/api/generate")
          .header(header::CONTENT_TYPE, "application/json")
          .header("x-forwarded-for", format!("1.2.3.{}, 203.0.113.9", i))
          .body(Body::from(payload.clone()))
          .expect("request");
        if send(&router, request).await.0 == StatusCode::OK
        {   accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(caller.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_timeout_uses_error_envelope()
{   let config = test_config();
    let caller = FakeCaller::stalling(
      Duration::from_secs(3600),
      Ok(sample_response())
    );
    let router = build_router(&config, service_with(&config, caller))
      .expect("router");

    let (status, body) = send(
      &router,
      generate_request(json!({ "prompt": "hi" }).to_string())
    ).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
      body,
      json!({ "error": { "message": "Request timeout", "status": 408 } })
    );
}

#[tokio::test]
async fn test_health()
{   let (router, _) = router_with(&test_config(), Ok(sample_response()));

    let request = Request::builder()
      .uri("/health")
      .body(Body::empty())
      .expect("request");
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let timestamp = body["timestamp"].as_str().expect("timestamp");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_health_rate_limit()
{   let mut config = test_config();
    config.rate_limits.health_per_minute = 1;
    let (router, _) = router_with(&config, Ok(sample_response()));
    let health = || Request::builder()
      .uri("/health")
      .body(Body::empty())
      .expect("request");

    assert_eq!(send(&router, health()).await.0, StatusCode::OK);
    let (status, body) = send(&router, health()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], "Too many health check requests");
}

#[tokio::test]
async fn test_unknown_route_is_404_envelope()
{   let (router, _) = router_with(&test_config(), Ok(sample_response()));

    let request = Request::builder()
      .uri("/api/unknown")
      .body(Body::empty())
      .expect("request");
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
      body,
      json!({ "error": { "message": "Endpoint not found", "status": 404 } })
    );
}

#[tokio::test]
async fn test_cors_preflight_allows_only_configured_origin()
{   let mut config = test_config();
    config.frontend_origin = "https://app.example.com".to_string();
    let (router, _) = router_with(&config, Ok(sample_response()));

    let preflight = |origin: &str| Request::builder()
      .method("OPTIONS")
      .uri("/api/generate")
      .header(header::ORIGIN, origin)
      .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
      .body(Body::empty())
      .expect("request");

    let allowed = router.clone()
      .oneshot(preflight("https://app.example.com"))
      .await
      .expect("response");
    assert_eq!(
      allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|v| v.to_str().ok()),
      Some("https://app.example.com")
    );

    let denied = router.clone()
      .oneshot(preflight("https://evil.example.com"))
      .await
      .expect("response");
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_security_headers_present()
{   let (router, _) = router_with(&test_config(), Ok(sample_response()));

    let response = router
      .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
      .await
      .expect("response");

    assert_eq!(
      response.headers().get(header::X_CONTENT_TYPE_OPTIONS)
        .and_then(|v| v.to_str().ok()),
      Some("nosniff")
    );
    assert_eq!(
      response.headers().get(header::X_FRAME_OPTIONS)
        .and_then(|v| v.to_str().ok()),
      Some("DENY")
    );
    assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_none());
}

#[tokio::test]
async fn test_production_redirects_plain_http()
{   let mut config = test_config();
    config.environment = Environment::Production;
    config.frontend_origin = "https://app.example.com".to_string();
    let (router, caller) = router_with(&config, Ok(sample_response()));

    let plain = Request::builder()
      .method("POST")
      .uri("/api/generate?x=1")
      .header(header::HOST, "proxy.example.com")
      .header("x-forwarded-proto", "http")
      .body(Body::from(json!({ "prompt": "hi" }).to_string()))
      .expect("request");
    let response = router.clone().oneshot(plain).await.expect("response");
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
      response.headers().get(header::LOCATION)
        .and_then(|v| v.to_str().ok()),
      Some("https://proxy.example.com/api/generate?x=1")
    );
    assert_eq!(caller.calls(), 0);

    let secure = Request::builder()
      .method("POST")
      .uri("/api/generate")
      .header(header::CONTENT_TYPE, "application/json")
      .header("x-forwarded-proto", "https")
      .body(Body::from(json!({ "prompt": "hi" }).to_string()))
      .expect("request");
    let response = router.oneshot(secure).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_some());
}

#[test]
fn test_invalid_origin_is_config_error()
{   let mut config = test_config();
    config.frontend_origin = "bad\norigin".to_string();
    let caller = FakeCaller::returning(Ok(sample_response()));
    assert!(build_router(&config, service_with(&config, caller)).is_err());
}
