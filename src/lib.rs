//! File-system-convention HTTP server core.
//!
//! Route modules are registered under the path they were discovered at
//! (`users/[id]/route.ts`); the server turns that tree into a ranked route
//! table, runs per-directory middlewares and streams each handler's
//! declarative response back through a pool of execution units.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http (axum edge: CORS, limits, body parsing)
//!                        │ RequestEnvelope
//!                        ▼
//!                     dispatch (pool: select unit, tag request id)
//!                        │
//!            ┌───────────┴────────────── unit thread ─────────────┐
//!            │ routing (resolve) → middleware (chain) → handler   │
//!            │                  → protocol (emit TransferEvents)  │
//!            └───────────┬────────────────────────────────────────┘
//!                        │ TransferEnvelope { request_id, event }
//!                        ▼
//!     Client Response ◀── http (apply events)
//!
//!     Cross-cutting: config, observability, lifecycle, error
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod protocol;
pub mod routing;

pub use config::ServerConfig;
pub use dispatch::DispatchPool;
pub use error::Error;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use middleware::{RequestContext, RequestEnvelope};
pub use protocol::{ResponseBody, ResponseMessage, TransferEvent};
pub use routing::{
    HandlerError, HandlerResult, MiddlewareOutcome, MiddlewareResult, RouteManifest, RouteModule,
    RouteTable,
};
