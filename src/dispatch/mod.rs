//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestEnvelope (from the HTTP edge)
//!     → pool.rs (fresh RequestId, pending entry, weight + 1)
//!     → balancer.rs (idle unit, else grow, else least loaded)
//!     → worker.rs (unit thread: resolve → chain → handler → emit)
//!     → TransferEnvelope { request_id, event } back over the unit channel
//!     → pool.rs demux (forward to the request's ResponseStream)
//!     → End: pending entry removed, weight - 1
//! ```
//!
//! # Design Decisions
//! - Units are OS threads with a current-thread runtime each
//! - Many requests may be in flight on one unit; only the request id
//!   separates their events
//! - Exited units are removed, never restarted; growth replaces them lazily

pub mod balancer;
pub mod pool;
pub mod worker;

pub use pool::{DispatchPool, PoolWorker, ResponseStream};
pub use worker::{WorkerCommand, WorkerId, PANIC_EXIT_CODE};
