//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and timeouts > 0, min <= max)
//! - Validate addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("pool.max_size must be at least 1")]
    EmptyPool,

    #[error("pool.min_size ({min}) exceeds pool.max_size ({max})")]
    PoolBounds { min: usize, max: usize },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unknown log level: {0}")]
    LogLevel(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.pool.max_size == 0 {
        errors.push(ValidationError::EmptyPool);
    } else if config.pool.min_size > config.pool.max_size {
        errors.push(ValidationError::PoolBounds {
            min: config.pool.min_size,
            max: config.pool.max_size,
        });
    }

    if config.timeouts.middleware_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.middleware_ms"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.limits.body_max_size == 0 {
        errors.push(ValidationError::Zero("limits.body_max_size"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
