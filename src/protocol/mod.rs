//! Transfer protocol subsystem.
//!
//! # Data Flow
//! ```text
//! ResponseMessage (handler / middleware / error)
//!     → emit.rs (headers, cookies, body, status, end)
//!         → range.rs (single byte range, 206 slicing)
//!         → cookie.rs (max-age normalization)
//!     → TransferEvent stream tagged with the request id (event.rs)
//!     → dispatch boundary → HTTP edge
//! ```
//!
//! # Design Decisions
//! - Events are the only thing that crosses the unit boundary
//! - No backpressure: events are pushed into unbounded channels
//! - The whole body is never required in memory for stream payloads

pub mod cookie;
pub mod emit;
pub mod event;
pub mod message;
pub mod range;

pub use emit::emit_response;
pub use event::{RequestId, TransferEnvelope, TransferEvent};
pub use message::{
    BodyStream, CookieOptions, CookieValue, MaxAge, ResponseBody, ResponseMessage, SameSite,
};
