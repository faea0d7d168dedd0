//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile the route manifest
//! - Start the dispatch pool
//! - Bind the listener and build the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::dispatch::DispatchPool;
use crate::error::Error;
use crate::http::HttpServer;
use crate::middleware::ChainExecutor;
use crate::routing::{RouteManifest, RouteTable};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("route table: {0}")]
    Routes(#[source] Error),

    #[error("dispatch pool: {0}")]
    Pool(#[source] Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to serve, not yet serving.
pub struct Application {
    pub server: HttpServer,
    pub listener: TcpListener,
    pub pool: DispatchPool,
}

/// Compile routes and start the pool.
pub fn start_pool(
    config: &ServerConfig,
    manifest: &RouteManifest,
) -> Result<DispatchPool, StartupError> {
    let table = RouteTable::build(manifest).map_err(StartupError::Routes)?;
    tracing::info!(routes = table.len(), "Routes compiled");

    let executor = ChainExecutor::new(Duration::from_millis(config.timeouts.middleware_ms));
    DispatchPool::start(&config.pool, table, executor, config.messages.clone())
        .map_err(StartupError::Pool)
}

/// Start the core and bind the listener.
pub async fn start(
    config: ServerConfig,
    manifest: &RouteManifest,
) -> Result<Application, StartupError> {
    let pool = start_pool(&config, manifest)?;

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let server = HttpServer::new(config, pool.clone());
    Ok(Application {
        server,
        listener,
        pool,
    })
}
