//! Upgrade dispatcher: the only HTTP service behind the listener.
//!
//! # Responsibilities
//! - Reject oversize header blocks the way nginx does
//! - Answer every path but the configured one with a camouflage 404
//! - Answer failed upgrades on the configured path with a camouflage 403
//! - Complete the upgrade and hand the connection to the consumer
//!
//! # Data Flow
//! ```text
//! Request + physical peer
//!     → header size check   (400 camouflage)
//!     → path check          (404 camouflage)
//!     → handshake check     (403 camouflage)
//!     → 101 Switching Protocols
//!         ⇢ upgrade task: hyper upgrade → WebSocketStream
//!             → origin resolve → FramedConnection → consumer
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    response::Response,
    Router,
};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use tokio_tungstenite::{tungstenite::protocol::Role, WebSocketStream};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::http::{camouflage, forwarded, upgrade, websocket::FramedConnection};
use crate::observability::metrics::{self, RequestOutcome};

/// Largest accepted request line plus header block, in bytes.
pub const MAX_HEADER_BYTES: usize = 2048;

/// Receives every successfully upgraded connection.
pub type ConnHandler = Arc<dyn Fn(FramedConnection) + Send + Sync>;

pub struct UpgradeDispatcher {
    path: String,
    local_addr: SocketAddr,
    handler: ConnHandler,
}

impl UpgradeDispatcher {
    /// `path` must already be normalized.
    pub fn new(path: String, local_addr: SocketAddr, handler: ConnHandler) -> Self {
        Self {
            path,
            local_addr,
            handler,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Compare the percent-decoded request path with the upgrade path.
    /// A path that does not decode to UTF-8 never matches.
    fn path_matches(&self, raw: &str) -> bool {
        percent_decode_str(raw)
            .decode_utf8()
            .map(|decoded| decoded == self.path.as_str())
            .unwrap_or(false)
    }

    /// Decide the fate of one request from `physical_peer`.
    ///
    /// On success the response is the 101; the connection reaches the
    /// consumer later, from a spawned task, once hyper hands over the IO.
    pub fn handle(&self, mut request: Request, physical_peer: SocketAddr) -> Response {
        let header_bytes = header_block_len(&request);
        if header_bytes > MAX_HEADER_BYTES {
            tracing::debug!(
                peer_addr = %physical_peer,
                header_bytes,
                "Request header block too large"
            );
            metrics::record_request(RequestOutcome::HeaderTooLarge);
            return camouflage::header_too_large();
        }

        if !self.path_matches(request.uri().path()) {
            tracing::debug!(peer_addr = %physical_peer, path = %request.uri().path(), "Unknown path");
            metrics::record_request(RequestOutcome::NotFound);
            return camouflage::not_found();
        }

        let accept_key = match upgrade::validate(&request) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(
                    peer_addr = %physical_peer,
                    error = %e,
                    "failed to convert to WebSocket connection"
                );
                metrics::record_request(RequestOutcome::Forbidden);
                return camouflage::forbidden();
            }
        };

        let forwarded = forwarded::parse_x_forwarded_for(request.headers());
        let on_upgrade = hyper::upgrade::on(&mut request);
        let local_addr = self.local_addr;
        let handler = Arc::clone(&self.handler);

        tokio::spawn(
            async move {
                let upgraded = match tokio::time::timeout(upgrade::HANDSHAKE_TIMEOUT, on_upgrade).await {
                    Ok(Ok(upgraded)) => upgraded,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket upgrade failed");
                        metrics::record_request(RequestOutcome::UpgradeFailed);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("WebSocket upgrade timed out");
                        metrics::record_request(RequestOutcome::UpgradeFailed);
                        return;
                    }
                };

                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    Some(upgrade::websocket_config()),
                )
                .await;

                let remote_addr = forwarded::resolve(physical_peer, &forwarded);
                tracing::debug!(
                    peer_addr = %physical_peer,
                    remote_addr = %remote_addr,
                    "WebSocket connection established"
                );
                metrics::record_request(RequestOutcome::Upgraded);
                handler(FramedConnection::new(ws, local_addr, remote_addr));
            }
            .in_current_span(),
        );

        upgrade::switching_protocols(&accept_key)
    }
}

/// Size of the request as it appeared on the wire, body excluded.
fn header_block_len(request: &Request) -> usize {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().len())
        .unwrap_or(1);
    // "METHOD SP target SP HTTP/1.1 CRLF"
    let request_line = request.method().as_str().len() + 1 + target + 1 + 8 + 2;

    let headers: usize = request
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.len() + 2)
        .sum();

    request_line + headers + 2
}

async fn dispatch(
    State(dispatcher): State<Arc<UpgradeDispatcher>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    dispatcher.handle(request, peer)
}

/// Wrap the dispatcher as the sole service of an axum router.
pub fn router(dispatcher: Arc<UpgradeDispatcher>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}
