//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup or reload):
//!     RouteManifest (source path → RouteModule, dir → middleware)
//!     → path.rs (strip route file name, drop (group) segments)
//!     → matcher.rs (classify segments, compile pattern)
//!     → Sort by specificity
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (method, path)
//!     → router.rs (all matching descriptors, most specific first)
//!     → filter by exported method
//!     → Return: ResolvedRoute, NotFound, MethodNotAllowed or MultipleRoutesMatched
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime; reload swaps whole tables
//! - No regex in hot path (segment-wise matching only)
//! - Deterministic: same manifest always ranks routes the same way

pub mod matcher;
pub mod module;
pub mod path;
pub mod router;

pub use matcher::{RoutePattern, Segment, SegmentRank};
pub use module::{
    BoxFuture, Handler, HandlerError, HandlerResult, Middleware, MiddlewareOutcome,
    MiddlewareResult, RouteManifest, RouteModule,
};
pub use router::{MiddlewareDescriptor, ResolvedRoute, RouteDescriptor, RouteTable};
