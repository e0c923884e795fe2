//! Structured logging.
//!
//! `RUST_LOG` wins when set. Otherwise a bare configured level applies to
//! this crate and `warn` to everything else, and a configured directive
//! string (`ws_hub=debug,hyper=info`) is used as written.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(level: &str) -> String {
    if level.contains(['=', ',']) {
        level.to_string()
    } else {
        format!("warn,ws_hub={level},tower_http={level}")
    }
}
