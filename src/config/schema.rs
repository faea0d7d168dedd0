//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Dispatch pool sizing.
    pub pool: PoolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits and CORS.
    pub limits: LimitsConfig,

    /// User-visible error messages.
    pub messages: MessagesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
        }
    }
}

/// Dispatch pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Units started eagerly at boot.
    pub min_size: usize,

    /// Upper bound on units created on demand.
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 20,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time a middleware has to respond or continue, in milliseconds.
    pub middleware_ms: u64,

    /// Request timeout enforced by the HTTP edge, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            middleware_ms: 5_000,
            request_secs: 30,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub body_max_size: usize,

    /// Allowed CORS origins (host suffixes). Empty echoes the request origin.
    pub allow_origins: Vec<String>,

    /// Extra headers advertised in `Access-Control-Allow-Headers`.
    pub allow_headers: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            body_max_size: 10 * 1024 * 1024, // 10MB
            allow_origins: Vec::new(),
            allow_headers: Vec::new(),
        }
    }
}

/// User-visible error messages, one per error kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub not_found: String,
    pub method_not_allowed: String,
    pub multiple_routes: String,
    pub middleware_timeout: String,
    pub worker_failure: String,
    pub internal_server_error: String,
    pub unsupported_media_type: String,
    pub request_too_long: String,
    pub invalid_body: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            not_found: "Not found".to_string(),
            method_not_allowed: "Method not allowed".to_string(),
            multiple_routes: "Multiple routes found".to_string(),
            middleware_timeout: "Middleware timed out".to_string(),
            worker_failure: "Worker stopped unexpectedly".to_string(),
            internal_server_error: "Internal server error".to_string(),
            unsupported_media_type: "Unsupported media type".to_string(),
            request_too_long: "Request entity too large".to_string(),
            invalid_body: "Invalid body".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ServerConfig = toml::from_str("[pool]\nmax_size = 2\n").unwrap();
        assert_eq!(config.pool.max_size, 2);
        assert_eq!(config.pool.min_size, 5);
        assert_eq!(config.timeouts.middleware_ms, 5_000);
        assert_eq!(config.messages.not_found, "Not found");
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_messages_override() {
        let config: ServerConfig =
            toml::from_str("[messages]\nnot_found = \"Nothing here\"\n").unwrap();
        assert_eq!(config.messages.not_found, "Nothing here");
        assert_eq!(config.messages.method_not_allowed, "Method not allowed");
    }
}
