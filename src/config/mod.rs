//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → pool sizing, middleware timeout and messages handed to the dispatch pool
//!     → limits and listener handed to the HTTP edge
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::LimitsConfig;
pub use schema::ListenerConfig;
pub use schema::MessagesConfig;
pub use schema::ObservabilityConfig;
pub use schema::PoolConfig;
pub use schema::ServerConfig;
pub use schema::TimeoutConfig;
