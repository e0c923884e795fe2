//! Per-connection stream layers and the composed listener.
//!
//! A layer consumes something from the front of a freshly accepted stream
//! (a PROXY preamble, a TLS handshake) and yields the stream the next layer,
//! and finally the HTTP server, reads from. Layers run in the order they were
//! pushed and inside the connection's own task, so a slow peer never holds up
//! the accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::net::listener::{BoxStream, StreamListener};
use crate::observability::metrics;

/// Error produced while establishing a layer on one connection.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("connection did not start with a PROXY protocol preamble")]
    MissingPreamble,

    #[error("malformed PROXY protocol preamble: {0}")]
    MalformedPreamble(String),

    #[error("TLS handshake failed: {0}")]
    Tls(io::Error),

    #[error("{0} layer timed out")]
    Timeout(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One wrapping step applied to every accepted stream.
#[async_trait]
pub trait StreamLayer: Send + Sync + 'static {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Consume this layer's framing from `stream`.
    ///
    /// Returns the inner stream and the peer address it should be reported
    /// under, which a layer may rewrite.
    async fn establish(
        &self,
        stream: BoxStream,
        peer: SocketAddr,
    ) -> Result<(BoxStream, SocketAddr), LayerError>;
}

/// A stream listener with an ordered stack of layers on top.
pub struct LayeredListener<L> {
    inner: L,
    layers: Arc<Vec<Arc<dyn StreamLayer>>>,
    timeout: Duration,
}

impl<L: StreamListener> LayeredListener<L> {
    /// Wrap `inner`. Each layer gets `timeout` to finish.
    pub fn new(inner: L, timeout: Duration) -> Self {
        Self {
            inner,
            layers: Arc::new(Vec::new()),
            timeout,
        }
    }

    /// Add a layer on top of the ones already present.
    pub fn with_layer(mut self, layer: impl StreamLayer) -> Self {
        Arc::make_mut(&mut self.layers).push(Arc::new(layer));
        self
    }

    /// Names of the layers, outermost first.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Accept a raw connection. Its layers are established separately via
    /// [`Handshake::establish`].
    pub async fn accept(&self) -> io::Result<Handshake> {
        let (stream, peer) = self.inner.accept().await?;
        Ok(Handshake {
            stream,
            peer,
            layers: Arc::clone(&self.layers),
            timeout: self.timeout,
        })
    }

    /// The physical address of the innermost listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// An accepted connection whose layers have not been established yet.
pub struct Handshake {
    stream: BoxStream,
    peer: SocketAddr,
    layers: Arc<Vec<Arc<dyn StreamLayer>>>,
    timeout: Duration,
}

impl Handshake {
    /// Physical peer address as reported by the socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Run every layer in order.
    pub async fn establish(self) -> Result<(BoxStream, SocketAddr), LayerError> {
        let Handshake {
            mut stream,
            mut peer,
            layers,
            timeout,
        } = self;

        for layer in layers.iter() {
            let result = tokio::time::timeout(timeout, layer.establish(stream, peer))
                .await
                .unwrap_or(Err(LayerError::Timeout(layer.name())));

            match result {
                Ok((next, addr)) => {
                    stream = next;
                    peer = addr;
                }
                Err(e) => {
                    metrics::layer_failed(layer.name());
                    return Err(e);
                }
            }
        }

        Ok((stream, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    /// Records the order layers ran in and rewrites the peer port.
    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl StreamLayer for Tagging {
        fn name(&self) -> &'static str {
            self.tag
        }

        async fn establish(
            &self,
            stream: BoxStream,
            peer: SocketAddr,
        ) -> Result<(BoxStream, SocketAddr), LayerError> {
            self.log.lock().unwrap().push(self.tag);
            Ok((stream, SocketAddr::new(peer.ip(), peer.port() + 1)))
        }
    }

    struct Stalling;

    #[async_trait]
    impl StreamLayer for Stalling {
        fn name(&self) -> &'static str {
            "stall"
        }

        async fn establish(
            &self,
            stream: BoxStream,
            peer: SocketAddr,
        ) -> Result<(BoxStream, SocketAddr), LayerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok((stream, peer))
        }
    }

    /// Hands out one in-memory stream, then fails.
    struct OneShot(Mutex<Option<BoxStream>>);

    #[async_trait]
    impl StreamListener for OneShot {
        async fn accept(&self) -> io::Result<(BoxStream, SocketAddr)> {
            let stream = self.0.lock().unwrap().take();
            stream
                .map(|s| (s, "10.0.0.2:5555".parse().unwrap()))
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:80".parse().unwrap())
        }
    }

    #[tokio::test]
    async fn layers_run_in_push_order() {
        let (server, mut client) = duplex(64);
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = LayeredListener::new(
            OneShot(Mutex::new(Some(Box::new(server)))),
            Duration::from_secs(1),
        )
        .with_layer(Tagging { tag: "first", log: log.clone() })
        .with_layer(Tagging { tag: "second", log: log.clone() });

        assert_eq!(listener.layer_names(), vec!["first", "second"]);
        assert_eq!(listener.local_addr().unwrap().port(), 80);

        let handshake = listener.accept().await.unwrap();
        assert_eq!(handshake.peer_addr().port(), 5555);

        let (mut stream, peer) = handshake.establish().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(peer.port(), 5557);

        client.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        assert!(listener.accept().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_layer_times_out() {
        let (server, _client) = duplex(64);
        let listener = LayeredListener::new(
            OneShot(Mutex::new(Some(Box::new(server)))),
            Duration::from_secs(4),
        )
        .with_layer(Stalling);

        let handshake = listener.accept().await.unwrap();
        let err = handshake.establish().await.err().unwrap();
        assert!(matches!(err, LayerError::Timeout("stall")));
    }
}
