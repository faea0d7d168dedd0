//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, OPTIONS, CORS, default headers)
//!     → request.rs (content type, size limit, query, cookies, body)
//!     → DispatchPool::dispatch (RequestEnvelope)
//!     → response.rs (apply TransferEvents, map pool failures)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::ResponseAssembler;
pub use server::{AppState, HttpServer};
