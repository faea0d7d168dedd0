//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tower::ServiceExt;

use treeroute::config::{PoolConfig, ServerConfig};
use treeroute::dispatch::{DispatchPool, ResponseStream};
use treeroute::lifecycle::{self, Shutdown};
use treeroute::{Error, HttpServer, RouteManifest, TransferEvent};

/// Config with a small pool and a short middleware timeout.
pub fn test_config(min_size: usize, max_size: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.pool = PoolConfig { min_size, max_size };
    config.timeouts.middleware_ms = 200;
    config.limits.body_max_size = 1024;
    config
}

pub fn start_pool(manifest: &RouteManifest, min_size: usize, max_size: usize) -> DispatchPool {
    lifecycle::start_pool(&test_config(min_size, max_size), manifest).unwrap()
}

/// In-process router backed by a fresh pool.
pub fn app(manifest: &RouteManifest) -> Router {
    let config = test_config(1, 4);
    let pool = lifecycle::start_pool(&config, manifest).unwrap();
    HttpServer::new(config, pool).router()
}

/// Send one request through the router.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (status, Response::from_parts(parts, Body::empty()), bytes)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Everything a dispatched request produced.
#[derive(Debug, Default)]
pub struct Collected {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub status: Option<u16>,
    pub ended: bool,
    pub error: Option<Error>,
}

pub async fn collect(mut stream: ResponseStream) -> Collected {
    let mut out = Collected::default();
    while let Some(item) = stream.recv().await {
        match item {
            Ok(TransferEvent::Set { name, value }) => out.headers.push((name, value)),
            Ok(TransferEvent::Write(chunk)) => out.body.extend_from_slice(&chunk),
            Ok(TransferEvent::Status(code)) => out.status = Some(code),
            Ok(TransferEvent::End) => out.ended = true,
            Ok(_) => {}
            Err(e) => out.error = Some(e),
        }
    }
    out
}

/// Poll until `check` holds or the deadline passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Start a real server on an ephemeral port.
pub async fn start_server(manifest: &RouteManifest) -> (SocketAddr, Shutdown, DispatchPool) {
    let config = test_config(2, 8);
    let pool = lifecycle::start_pool(&config, manifest).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, pool.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown, pool)
}
