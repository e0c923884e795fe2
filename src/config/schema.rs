//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the hub.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the WebSocket hub binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// Where to bind.
    pub listener: ListenerConfig,

    /// Upgrade path, PROXY protocol and TLS settings.
    pub transport: TransportConfig,

    /// Where upgraded connections are relayed.
    pub forward: ForwardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Bind address of the underlying stream listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// IP address to bind (e.g., "0.0.0.0").
    pub address: IpAddr,

    /// TCP port to bind. Zero picks an ephemeral port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
        }
    }
}

/// Settings of the WebSocket transport itself.
///
/// Resolved once when the pipeline is built and never mutated afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Request path that is allowed to upgrade.
    pub path: String,

    /// Require a PROXY protocol preamble on every accepted connection.
    pub accept_proxy_protocol: bool,

    /// Socket options for the underlying listener.
    pub socket: SocketConfig,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            accept_proxy_protocol: false,
            socket: SocketConfig::default(),
            tls: None,
        }
    }
}

impl TransportConfig {
    /// The configured path with a guaranteed leading slash.
    ///
    /// An empty path normalizes to `/`.
    pub fn normalized_path(&self) -> String {
        if self.path.is_empty() {
            "/".to_string()
        } else if !self.path.starts_with('/') {
            format!("/{}", self.path)
        } else {
            self.path.clone()
        }
    }
}

/// Socket options applied to the bound listener and accepted streams.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Set `SO_REUSEADDR` before binding.
    pub reuse_address: bool,

    /// Listen backlog.
    pub backlog: u32,

    /// Disable Nagle's algorithm on accepted streams.
    pub tcp_nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reuse_address: true,
            backlog: 1024,
            tcp_nodelay: true,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream that the binary relays upgraded connections to.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ForwardConfig {
    /// Upstream TCP address (e.g., "127.0.0.1:1080"). Echo mode when unset.
    pub target: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_path(path: &str) -> TransportConfig {
        TransportConfig {
            path: path.to_string(),
            ..TransportConfig::default()
        }
    }

    #[test]
    fn empty_path_normalizes_to_root() {
        assert_eq!(with_path("").normalized_path(), "/");
    }

    #[test]
    fn missing_slash_is_prepended() {
        assert_eq!(with_path("ws").normalized_path(), "/ws");
        assert_eq!(with_path("/ws").normalized_path(), "/ws");
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
            [transport]
            path = "tunnel"
            accept_proxy_protocol = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.transport.normalized_path(), "/tunnel");
        assert!(config.transport.accept_proxy_protocol);
        assert!(config.transport.tls.is_none());
        assert!(config.transport.socket.tcp_nodelay);
        assert!(config.forward.target.is_none());
    }

    #[test]
    fn tls_section_parses() {
        let config: HubConfig = toml::from_str(
            r#"
            [listener]
            address = "::1"
            port = 443

            [transport.tls]
            cert_path = "/etc/hub/cert.pem"
            key_path = "/etc/hub/key.pem"
            "#,
        )
        .unwrap();

        assert!(config.listener.address.is_ipv6());
        let tls = config.transport.tls.unwrap();
        assert_eq!(tls.cert_path, "/etc/hub/cert.pem");
    }
}
