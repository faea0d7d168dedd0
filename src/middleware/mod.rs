//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! RequestEnvelope
//!     → RouteTable::resolve (handler + params)
//!     → context.rs (RequestContext, custom = {})
//!     → chain.rs (ancestor middlewares, root first)
//!         Next(partial)  → deep-merge into custom, continue
//!         Respond(msg)   → stop, msg is the response
//!     → route handler
//!     → ResponseMessage (None becomes 204)
//! ```
//!
//! # Design Decisions
//! - Tagged outcome instead of a `next` callback
//! - Only middlewares are timed; handlers may run as long as they need
//! - Panics and handler errors are contained to the one request

pub mod chain;
pub mod context;

pub use chain::ChainExecutor;
pub use context::{deep_merge, Origin, RequestContext, RequestEnvelope};
