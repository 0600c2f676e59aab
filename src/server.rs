//! HTTP surface: routes, middleware and the serve loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::error_handling::HandleErrorLayer;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use log::{debug, error, info};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::ProxyConfig;
use crate::error::{ConfigError, ErrorEnvelope, GENERIC_FAILURE_MESSAGE};
use crate::pipeline::GenerateService;
use crate::providers::build_caller;
use crate::rate_limit::RateLimiter;

/// Grace on top of the upstream timeout before the server gives up
const SERVER_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

impl IntoResponse for ErrorEnvelope
{   fn into_response(self) -> Response
    {   let status = StatusCode::from_u16(self.error.status)
          .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[derive(Clone)]
struct AppState
{   service: GenerateService
}

#[derive(Clone)]
struct LimitState
{   limiter: Arc<RateLimiter>
  , message: &'static str
}

/// Build the full application router for `config`
pub fn build_router(
  config: &ProxyConfig
, service: GenerateService
) -> Result<Router, ConfigError>
{   let origin = HeaderValue::from_str(&config.frontend_origin)
      .map_err(|_| ConfigError::Invalid
      {   key: "FRONTEND_ORIGIN"
        , value: config.frontend_origin.clone()
      })?;

    let api_limit = LimitState
    {   limiter: Arc::new(RateLimiter::per_minute(
          config.rate_limits.api_per_minute
        ))
      , message: "Too many requests, please try again later"
    };
    let health_limit = LimitState
    {   limiter: Arc::new(RateLimiter::per_minute(
          config.rate_limits.health_per_minute
        ))
      , message: "Too many health check requests"
    };

    let cors = CorsLayer::new()
      .allow_origin(origin)
      .allow_methods([Method::GET, Method::POST])
      .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
      .route(
        "/api/generate",
        post(generate)
          .route_layer(middleware::from_fn_with_state(api_limit, rate_limit))
      )
      .route(
        "/health",
        get(health)
          .route_layer(middleware::from_fn_with_state(health_limit, rate_limit))
      )
      .fallback(not_found)
      .with_state(AppState { service })
      .layer(DefaultBodyLimit::max(config.max_body_bytes))
      .layer(
        ServiceBuilder::new()
          .layer(HandleErrorLayer::new(server_timeout))
          .timeout(config.upstream.timeout() + SERVER_TIMEOUT_GRACE)
      )
      .layer(cors)
      .layer(SetResponseHeaderLayer::if_not_present(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff")
      ))
      .layer(SetResponseHeaderLayer::if_not_present(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY")
      ))
      .layer(SetResponseHeaderLayer::if_not_present(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer")
      ));

    if config.environment.is_production()
    {   router = router
          .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains")
          ))
          .layer(middleware::from_fn(require_https));
    }

    Ok(router.layer(middleware::from_fn(log_errors)))
}

/// Bind the configured port and serve until Ctrl-C
pub async fn serve(config: ProxyConfig) -> anyhow::Result<()>
{   let http_client = reqwest::Client::builder()
      .pool_max_idle_per_host(10)
      .build()?;
    let caller = build_caller(&config.upstream, http_client);
    let service = GenerateService::new(
      config.credential.clone(),
      config.validation.clone(),
      caller
    );
    let app = build_router(&config, service)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Proxy running on {}", listener.local_addr()?);
    info!("CORS allowed: {}", config.frontend_origin);
    info!(
      "Forwarding to {:?} at {}",
      config.upstream.provider, config.upstream.endpoint
    );

    axum::serve(
      listener,
      app.into_make_service_with_connect_info::<SocketAddr>()
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Proxy shut down");
    Ok(())
}

async fn shutdown_signal()
{   if let Err(e) = tokio::signal::ctrl_c().await
    {   error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ===== Handlers =====

async fn generate(
  State(state): State<AppState>
, body: Result<Bytes, BytesRejection>
) -> Response
{   let bytes = match body
    {   Ok(bytes) => bytes
      , Err(rejection) => {
          let status = rejection.status();
          let message = if status == StatusCode::PAYLOAD_TOO_LARGE
          {   "Payload too large"
          } else
          {   "invalid body"
          };
          return ErrorEnvelope::new(message, status.as_u16()).into_response();
        }
    };

    // Unparseable JSON is rejected by the validator as "invalid body".
    let payload = serde_json::from_slice::<Value>(&bytes)
      .unwrap_or(Value::Null);

    match state.service.generate(&payload).await
    {   Ok(response) => Json(response).into_response()
      , Err(e) => {
          e.to_envelope(state.service.policy().echo_invalid_values)
            .into_response()
        }
    }
}

async fn health() -> Json<Value>
{   Json(json!({
      "status": "ok",
      "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn not_found() -> ErrorEnvelope
{   ErrorEnvelope::new("Endpoint not found", 404)
}

/// Requests cut off by the server-side deadline still get an envelope
async fn server_timeout(err: BoxError) -> ErrorEnvelope
{   if err.is::<tower::timeout::error::Elapsed>()
    {   ErrorEnvelope::new("Request timeout", 408)
    } else
    {   error!("Unhandled middleware error: {}", err);
        ErrorEnvelope::new(GENERIC_FAILURE_MESSAGE, 500)
    }
}

// ===== Middleware =====

/// Client key: the last X-Forwarded-For hop, else the peer address.
/// Only the hop appended by the single trusted proxy in front of us is
/// used; earlier entries are whatever the client chose to send.
fn client_key(request: &Request) -> String
{   let forwarded = request.headers()
      .get_all("x-forwarded-for")
      .iter()
      .last()
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.rsplit(',').next())
      .map(str::trim)
      .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded
    {   return ip.to_string();
    }

    request.extensions()
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip().to_string())
      .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(
  State(limit): State<LimitState>
, request: Request
, next: Next
) -> Response
{   let client = client_key(&request);
    if !limit.limiter.check(&client)
    {   return ErrorEnvelope::new(limit.message, 429).into_response();
    }
    next.run(request).await
}

async fn require_https(request: Request, next: Next) -> Response
{   let secure = request.headers()
      .get("x-forwarded-proto")
      .and_then(|v| v.to_str().ok())
      == Some("https");
    if secure
    {   return next.run(request).await;
    }

    let host = request.headers()
      .get(header::HOST)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default();
    let target = format!("https://{}{}", host, request.uri());
    debug!("Redirecting plain HTTP request to {}", target);
    Redirect::permanent(&target).into_response()
}

async fn log_errors(request: Request, next: Next) -> Response
{   let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error()
    {   error!(
          "{} {} {} {}ms",
          method,
          path,
          status.as_u16(),
          started.elapsed().as_millis()
        );
    }
    response
}
