//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept, socket options)
//!     → layer.rs (per-connection wrapping, in order)
//!         → proxy_protocol.rs (optional PROXY preamble)
//!         → tls.rs (optional TLS handshake)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The PROXY preamble is read before TLS because it is sent in cleartext
//! - Layers run in the connection's task, never in the accept loop
//! - Every layer is bounded by the handshake timeout

pub mod connection;
pub mod layer;
pub mod listener;
pub mod proxy_protocol;
pub mod tls;

pub use layer::{Handshake, LayerError, LayeredListener, StreamLayer};
pub use listener::{AsyncStream, BoxStream, StreamListener, TcpStreamListener};
pub use proxy_protocol::ProxyProtocolLayer;
pub use tls::TlsLayer;
