//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, default headers)
//! - Answer `OPTIONS` and CORS without touching the pool
//! - Parse requests, dispatch them, apply the returned events
//! - Observability (metrics, request log)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::{LimitsConfig, MessagesConfig, ServerConfig};
use crate::dispatch::DispatchPool;
use crate::http::request::{build_envelope, origin};
use crate::http::response::{collect_response, error_response};
use crate::observability::metrics;

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Length, Content-Type, Authorization, Range, *";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DispatchPool,
    pub limits: Arc<LimitsConfig>,
    pub messages: Arc<MessagesConfig>,
}

/// HTTP edge in front of the dispatch pool.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig, pool: DispatchPool) -> Self {
        let state = AppState {
            pool,
            limits: Arc::new(config.limits.clone()),
            messages: Arc::new(config.messages.clone()),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(SetResponseHeaderLayer::if_not_present(
                        header::ACCEPT_RANGES,
                        HeaderValue::from_static("bytes"),
                    ))
                    .layer(SetResponseHeaderLayer::if_not_present(
                        header::SERVER,
                        HeaderValue::from_static("treeroute"),
                    ))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The router, for in-process use (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Parse, dispatch, and assemble the response for any request.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let allow_origin = allow_origin(&parts.headers, &state.limits);

    let mut response = if method == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
    } else {
        match build_envelope(parts, body, peer, &state.limits).await {
            Ok(envelope) => match state.pool.dispatch(envelope) {
                Ok(stream) => collect_response(stream, &state.messages).await,
                Err(e) => error_response(&e, &state.messages).await,
            },
            Err(e) => {
                tracing::debug!(method = %method, path = %path, error = %e, "Rejected at edge");
                error_response(&e, &state.messages).await
            }
        }
    };

    apply_cors(response.headers_mut(), &allow_origin, &state.limits);

    let status = response.status().as_u16();
    let latency = start_time.elapsed();
    metrics::record_request(method.as_str(), status, latency);
    tracing::info!(
        method = %method,
        path = %path,
        status,
        latency_ms = latency.as_secs_f64() * 1000.0,
        "Request completed"
    );
    response
}

/// `Access-Control-Allow-Origin` value for a request.
///
/// With an allow-list, the first entry the request origin ends with, else `*`.
/// Without one, the request origin itself.
pub fn allow_origin(headers: &HeaderMap, limits: &LimitsConfig) -> String {
    let request_origin = origin(headers, None).url;

    if limits.allow_origins.is_empty() {
        return request_origin.unwrap_or_else(|| "*".to_string());
    }

    let bare = request_origin
        .as_deref()
        .map(strip_scheme)
        .unwrap_or_default();
    limits
        .allow_origins
        .iter()
        .map(|o| strip_scheme(o))
        .find(|o| !bare.is_empty() && bare.ends_with(o))
        .map(str::to_string)
        .unwrap_or_else(|| "*".to_string())
}

fn strip_scheme(origin: &str) -> &str {
    origin.split_once("://").map_or(origin, |(_, rest)| rest)
}

fn apply_cors(headers: &mut HeaderMap, allow_origin: &str, limits: &LimitsConfig) {
    let mut allow_headers = ALLOW_HEADERS.to_string();
    for extra in &limits.allow_headers {
        allow_headers.push_str(", ");
        allow_headers.push_str(extra);
    }

    let defaults = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.to_string()),
        (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS.to_string()),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers),
        (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string()),
        (header::ACCESS_CONTROL_MAX_AGE, "86400".to_string()),
    ];
    for (name, value) in defaults {
        if headers.contains_key(&name) {
            continue;
        }
        match HeaderValue::try_from(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Invalid CORS header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_origin_echo() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, "https://app.example.com".parse().unwrap());
        assert_eq!(
            allow_origin(&headers, &LimitsConfig::default()),
            "https://app.example.com"
        );
        assert_eq!(allow_origin(&HeaderMap::new(), &LimitsConfig::default()), "*");
    }

    #[test]
    fn test_allow_origin_list() {
        let limits = LimitsConfig {
            allow_origins: vec!["https://example.com".into()],
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, "https://app.example.com".parse().unwrap());
        assert_eq!(allow_origin(&headers, &limits), "example.com");

        headers.insert(header::ORIGIN, "https://evil.test".parse().unwrap());
        assert_eq!(allow_origin(&headers, &limits), "*");
    }

    #[test]
    fn test_cors_keeps_handler_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, "10".parse().unwrap());
        let limits = LimitsConfig {
            allow_headers: vec!["X-Api-Key".into()],
            ..Default::default()
        };
        apply_cors(&mut headers, "*", &limits);
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "10");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Length, Content-Type, Authorization, Range, *, X-Api-Key"
        );
    }
}
