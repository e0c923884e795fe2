//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the upgrade path is a plain URI path
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HubConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::uri::PathAndQuery;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::config::schema::HubConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transport.path {0:?} is not a valid request path")]
    InvalidPath(String),

    #[error("transport.socket.backlog must be greater than zero")]
    ZeroBacklog,

    #[error("transport.tls.{0} must not be empty")]
    EmptyTlsPath(&'static str),

    #[error("forward.target {0:?} is not of the form host:port")]
    InvalidForwardTarget(String),

    #[error("observability.log_level {0:?} is not a valid filter directive")]
    InvalidLogLevel(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// A bare level (`debug`) or a full filter directive string
/// (`ws_hub=debug,hyper=info`).
fn log_level_valid(level: &str) -> bool {
    if level.contains(['=', ',']) {
        tracing_subscriber::EnvFilter::try_new(level).is_ok()
    } else {
        level.parse::<LevelFilter>().is_ok()
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let path = config.transport.normalized_path();
    let path_ok = path
        .parse::<PathAndQuery>()
        .map(|p| p.query().is_none() && p.path() == path)
        .unwrap_or(false);
    if !path_ok {
        errors.push(ValidationError::InvalidPath(config.transport.path.clone()));
    }

    if config.transport.socket.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }

    if let Some(tls) = &config.transport.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    if let Some(target) = &config.forward.target {
        let well_formed = match target.rsplit_once(':') {
            Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
            None => false,
        };
        if !well_formed {
            errors.push(ValidationError::InvalidForwardTarget(target.clone()));
        }
    }

    if !log_level_valid(&config.observability.log_level) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
