//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http/server.rs   → request counter, latency histogram, request log
//! dispatch/pool.rs → pool size gauge, eviction counter, unit logs
//! middleware/      → middleware timeout counter
//!     ↓
//! logging.rs (tracing subscriber: pretty or JSON on stdout)
//! metrics.rs (Prometheus exporter on its own listener)
//! ```
//!
//! # Design Decisions
//! - Unit threads log through the same global subscriber as the edge
//! - Request ids appear as a `request_id` field, never in messages
//! - Metric names share the `treeroute_` prefix

pub mod logging;
pub mod metrics;
