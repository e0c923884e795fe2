//! WebSocket listener pipeline.
//!
//! Accepts raw TCP connections, optionally consumes a PROXY protocol preamble
//! and a TLS handshake, then terminates an HTTP/1.1 WebSocket upgrade and
//! hands each upgraded connection to a consumer as a byte stream. Anything
//! that is not a valid upgrade on the configured path gets a stock nginx
//! error page.
//!
//! ```no_run
//! # async fn run() -> Result<(), ws_hub::ListenError> {
//! use ws_hub::TransportConfig;
//!
//! let config = TransportConfig { path: "/ws".into(), ..Default::default() };
//! let pipeline = ws_hub::listen([0, 0, 0, 0].into(), 8080, &config, |conn| {
//!     tokio::spawn(ws_hub::forward::relay(conn, None));
//! })
//! .await?;
//!
//! pipeline.stopped().await;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod pipeline;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub mod forward;

pub use config::{HubConfig, TransportConfig};
pub use http::{ConnHandler, FramedConnection};
pub use lifecycle::Shutdown;
pub use pipeline::{listen, ListenError, Pipeline};
