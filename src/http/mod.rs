//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Established stream (after PROXY/TLS layers)
//!     → server.rs (hyper http1 driver, ConnectInfo, upgrades enabled)
//!     → dispatcher.rs (size, path and handshake checks)
//!         → camouflage.rs (nginx-lookalike 400/403/404)
//!         → upgrade.rs (handshake validation, 101 response)
//!         → forwarded.rs (X-Forwarded-For origin resolution)
//!     → websocket.rs (FramedConnection handed to the consumer)
//! ```

pub mod camouflage;
pub mod dispatcher;
pub mod forwarded;
pub mod server;
pub mod upgrade;
pub mod websocket;

pub use dispatcher::{ConnHandler, UpgradeDispatcher};
pub use websocket::FramedConnection;
