//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
///
/// A `PORT` environment variable overrides the listener port.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let mut config: ServerConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, std::env::var("PORT").ok().as_deref());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides to a loaded configuration.
pub fn apply_env_overrides(config: &mut ServerConfig, port: Option<&str>) {
    let Some(port) = port.and_then(|p| p.trim().parse::<u16>().ok()) else {
        return;
    };
    let host = config
        .listener
        .bind_address
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string());
    config.listener.bind_address = format!("{}:{}", host, port);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_override() {
        let mut config = ServerConfig::default();
        apply_env_overrides(&mut config, Some("8123"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8123");

        apply_env_overrides(&mut config, Some("not-a-port"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8123");
    }

    #[test]
    fn test_validation_error_surfaces() {
        let err = parse_config("[pool]\nmin_size = 3\nmax_size = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = parse_config("[pool\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
