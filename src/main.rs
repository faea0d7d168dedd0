//! treeroute server binary.
//!
//! Serves a small demo route tree; embedders build their own
//! `RouteManifest` and call `lifecycle::start` the same way.

use std::path::PathBuf;

use axum::http::StatusCode;
use clap::Parser;
use futures_util::stream;
use serde_json::json;

use treeroute::config::{self, ServerConfig};
use treeroute::lifecycle::{self, Shutdown};
use treeroute::observability::{logging, metrics};
use treeroute::protocol::{CookieOptions, MaxAge};
use treeroute::{
    HandlerError, MiddlewareOutcome, RequestContext, ResponseMessage, RouteManifest, RouteModule,
};

#[derive(Parser)]
#[command(name = "treeroute")]
#[command(about = "File-system-convention HTTP server", long_about = None)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => default_config()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!("treeroute v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        pool_min = config.pool.min_size,
        pool_max = config.pool.max_size,
        middleware_timeout_ms = config.timeouts.middleware_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = lifecycle::start(config, &demo_manifest()).await?;
    let shutdown = Shutdown::new();
    let server = tokio::spawn(app.server.run(app.listener, shutdown.subscribe()));

    let signal = lifecycle::wait_for_signal().await;
    tracing::info!(signal = %signal, "Shutdown signal received");
    shutdown.trigger();

    server.await??;
    app.pool.shutdown();

    tracing::info!("Shutdown complete");
    Ok(())
}

fn default_config() -> Result<ServerConfig, config::ConfigError> {
    let mut config = ServerConfig::default();
    config::loader::apply_env_overrides(&mut config, std::env::var("PORT").ok().as_deref());
    config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

fn demo_manifest() -> RouteManifest {
    RouteManifest::new()
        .route(
            "route.ts",
            RouteModule::new().get(|_ctx| async {
                Ok(Some(ResponseMessage::json(json!({ "name": "treeroute" }))))
            }),
        )
        .route(
            "users/[id]/route.ts",
            RouteModule::new()
                .get(|ctx: RequestContext| async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    Ok(Some(ResponseMessage::json(json!({ "id": id, "custom": ctx.custom }))))
                })
                .delete(|_ctx| async { Ok(None) }),
        )
        .route(
            "users/me/route.ts",
            RouteModule::new().get(|ctx: RequestContext| async move {
                let user = ctx.cookie("user").unwrap_or("guest").to_string();
                Ok(Some(ResponseMessage::text(user)))
            }),
        )
        .route(
            "session/route.ts",
            RouteModule::new()
                .post(|ctx: RequestContext| async move {
                    let Some(user) = ctx.body["user"].as_str().map(str::to_string) else {
                        return Err(HandlerError::respond(
                            ResponseMessage::json(json!({ "message": "missing user" }))
                                .with_status(StatusCode::BAD_REQUEST),
                        ));
                    };
                    let options = CookieOptions {
                        max_age: Some(MaxAge::Duration("7d".into())),
                        path: Some("/".into()),
                        http_only: true,
                        ..Default::default()
                    };
                    Ok(Some(ResponseMessage::no_content().with_cookie("user", user, options)))
                })
                .delete(|_ctx| async {
                    Ok(Some(
                        ResponseMessage::no_content().with_cleared_cookie("user", CookieOptions::default()),
                    ))
                }),
        )
        .route(
            "(static)/files/[...path]/route.ts",
            RouteModule::new().get(|ctx: RequestContext| async move {
                let path = ctx.param("path").unwrap_or_default().to_string();
                let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = (0..4)
                    .map(|i| Ok(bytes::Bytes::from(format!("{}:{}\n", path, i))))
                    .collect();
                Ok(Some(ResponseMessage::stream(stream::iter(chunks))))
            }),
        )
        .middleware("users", |ctx: RequestContext| async move {
            let agent = ctx.header("user-agent").unwrap_or("unknown").to_string();
            Ok(MiddlewareOutcome::next_with(json!({ "agent": agent })))
        })
}
