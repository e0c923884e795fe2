//! The listener pipeline: listener → layers → HTTP → dispatcher → consumer.
//!
//! # Responsibilities
//! - Bind the listener and compose the optional PROXY and TLS layers
//! - Run the accept loop in the background
//! - Drive HTTP on every established connection
//! - Close once, from whichever side asks first
//!
//! # Data Flow
//! ```text
//! listen()
//!     → TcpStreamListener::bind
//!     → LayeredListener [+ ProxyProtocolLayer] [+ TlsLayer]
//!     → accept loop (spawned)
//!         → per connection (spawned): layers → serve_connection → dispatcher
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;

use crate::config::TransportConfig;
use crate::http::dispatcher::{self, ConnHandler, UpgradeDispatcher};
use crate::http::server::serve_connection;
use crate::http::websocket::FramedConnection;
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{is_transient, AcceptBackoff};
use crate::net::{LayeredListener, ProxyProtocolLayer, StreamListener, TcpStreamListener, TlsLayer};

/// Time each layer (PROXY preamble, TLS handshake) gets to complete.
pub const LAYER_TIMEOUT: Duration = Duration::from_secs(4);

/// Errors returned while constructing a pipeline.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to load TLS configuration: {0}")]
    Tls(#[source] io::Error),

    #[error("failed to read the listener's local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Bind `address:port` and start handing upgraded connections to
/// `on_connection`.
pub async fn listen<F>(
    address: IpAddr,
    port: u16,
    config: &TransportConfig,
    on_connection: F,
) -> Result<Pipeline, ListenError>
where
    F: Fn(FramedConnection) + Send + Sync + 'static,
{
    let addr = SocketAddr::new(address, port);
    let listener = TcpStreamListener::bind(addr, &config.socket)
        .map_err(|source| ListenError::Bind { addr, source })?;

    Pipeline::serve(listener, config, Arc::new(on_connection))
}

/// Handle to a running pipeline. Dropping it closes the pipeline.
pub struct Pipeline {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    stopped: watch::Receiver<bool>,
    tracker: ConnectionTracker,
}

impl Pipeline {
    /// Run a pipeline on an already bound listener.
    pub fn serve<L: StreamListener>(
        listener: L,
        config: &TransportConfig,
        handler: ConnHandler,
    ) -> Result<Self, ListenError> {
        let local_addr = listener.local_addr().map_err(ListenError::LocalAddr)?;

        let mut layered = LayeredListener::new(listener, LAYER_TIMEOUT);
        if config.accept_proxy_protocol {
            tracing::warn!(address = %local_addr, "Accepting PROXY protocol; only expose behind a trusted proxy");
            layered = layered.with_layer(ProxyProtocolLayer);
        }
        if let Some(tls) = &config.tls {
            layered = layered.with_layer(TlsLayer::from_config(tls).map_err(ListenError::Tls)?);
        }

        let path = config.normalized_path();
        tracing::info!(
            address = %local_addr,
            path = %path,
            layers = ?layered.layer_names(),
            "Listening for WebSocket connections"
        );

        let router = dispatcher::router(Arc::new(UpgradeDispatcher::new(path, local_addr, handler)));
        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let (stopped_tx, stopped) = watch::channel(false);

        tokio::spawn(accept_loop(
            layered,
            router,
            shutdown.clone(),
            tracker.clone(),
            stopped_tx,
        ));

        Ok(Self {
            local_addr,
            shutdown,
            stopped,
            tracker,
        })
    }

    /// The physical address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and gracefully end in-flight HTTP exchanges.
    ///
    /// Returns `true` for the call that actually closed the pipeline.
    pub fn close(&self) -> bool {
        let closed = self.shutdown.trigger();
        if closed {
            tracing::info!(address = %self.local_addr, "Listener closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Resolve once the accept loop has exited and the socket is released.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        shutdown::closed(&mut stopped).await;
    }

    /// Accepted connections whose HTTP exchange is still running.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn accept_loop<L: StreamListener>(
    listener: LayeredListener<L>,
    router: axum::Router,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    stopped: watch::Sender<bool>,
) {
    let mut closed = shutdown.subscribe();
    let mut backoff = AcceptBackoff::default();

    loop {
        let accepted = tokio::select! {
            _ = shutdown::closed(&mut closed) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(handshake) => {
                backoff.reset();
                let guard = tracker.track();
                let span = tracing::info_span!(
                    "connection",
                    id = %guard.id(),
                    peer_addr = %handshake.peer_addr()
                );
                let router = router.clone();
                let closed = shutdown.subscribe();

                tokio::spawn(
                    async move {
                        let _guard = guard;
                        tracing::debug!("Accepted connection");
                        match handshake.establish().await {
                            Ok((stream, peer)) => serve_connection(stream, peer, router, closed).await,
                            Err(e) => tracing::debug!(error = %e, "Dropping connection"),
                        }
                    }
                    .instrument(span),
                );
            }
            Err(e) if is_transient(&e) => {
                let delay = backoff.next_delay();
                tracing::debug!(error = %e, delay = ?delay, "Transient accept error, retrying");
                tokio::select! {
                    _ = shutdown::closed(&mut closed) => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed, listener stopped");
                shutdown.trigger();
                break;
            }
        }
    }

    drop(listener);
    let _ = stopped.send(true);
}
