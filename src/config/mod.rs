//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HubConfig (validated, immutable)
//!     → TransportConfig handed to pipeline::listen
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a pipeline never observes changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ForwardConfig, HubConfig, ListenerConfig, ObservabilityConfig, SocketConfig, TlsConfig,
    TransportConfig,
};
