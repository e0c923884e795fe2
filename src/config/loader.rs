//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::HubConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<HubConfig, ConfigError> {
    let config: HubConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/ws-hub.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse_config("[transport\npath = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config(
            r#"
            [transport.socket]
            backlog = 0

            [forward]
            target = "nowhere"
            "#,
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation failed: transport.socket.backlog must be greater than zero, \
             forward.target \"nowhere\" is not of the form host:port"
        );
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("ws-hub-{}.toml", std::process::id()));
        fs::write(&path, "[transport]\npath = \"/ws\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.transport.normalized_path(), "/ws");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn bundled_config_is_valid() {
        let config = parse_config(include_str!("../../ws-hub.toml")).unwrap();
        assert_eq!(config.listener.port, 8080);
        assert!(config.transport.tls.is_none());
        assert!(config.forward.target.is_none());
    }
}
