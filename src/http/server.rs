//! HTTP/1.1 connection driver.
//!
//! # Responsibilities
//! - Serve one established stream with hyper's http1 server
//! - Make the physical peer visible to the router as `ConnectInfo`
//! - Keep upgrades enabled so the dispatcher can take over the IO
//! - Shut the connection down gracefully when the pipeline closes
//!
//! # Design Decisions
//! - Header read timeout bounds slow-loris peers
//! - hyper's read buffer cannot go below 8 KiB; the tighter header cap
//!   lives in the dispatcher
//! - A header block larger than that buffer never reaches the dispatcher:
//!   hyper answers it with its own bare `431`, without `Server: nginx` or a
//!   camouflage body. That response is distinguishable from nginx.
//! - Connection errors are logged at debug, never escalated

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::ConnectInfo, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::sync::watch;
use tower::ServiceExt;

use crate::lifecycle::shutdown;
use crate::net::BoxStream;

pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(4);

/// Smallest read buffer hyper accepts.
const MAX_BUF_SIZE: usize = 8 * 1024;

/// Drive HTTP on `stream` until the peer goes away, the connection is
/// upgraded, or `shutdown` flips to `true`.
pub async fn serve_connection(
    stream: BoxStream,
    peer: SocketAddr,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        let router = router.clone();
        async move {
            let response = match router.oneshot(request.map(axum::body::Body::new)).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            Ok::<_, Infallible>(response)
        }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .max_buf_size(MAX_BUF_SIZE)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(peer_addr = %peer, error = %e, "HTTP connection error");
            }
        }
        _ = shutdown::closed(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                tracing::debug!(peer_addr = %peer, error = %e, "HTTP connection error during shutdown");
            }
        }
    }
}
