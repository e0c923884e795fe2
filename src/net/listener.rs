//! Stream listener abstraction and the TCP implementation.
//!
//! # Responsibilities
//! - Bind to the configured address with socket options
//! - Accept incoming TCP connections
//! - Classify accept errors as transient or fatal
//! - Back off between retries of transient accept errors

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};

use crate::config::SocketConfig;

/// Any bidirectional byte stream that can move between tasks.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A type-erased stream, as produced by listeners and layers.
pub type BoxStream = Box<dyn AsyncStream>;

/// Something that hands out raw stream connections.
#[async_trait]
pub trait StreamListener: Send + Sync + 'static {
    /// Wait for the next connection and its physical peer address.
    async fn accept(&self) -> io::Result<(BoxStream, SocketAddr)>;

    /// The locally bound address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// A TCP listener bound with explicit socket options.
pub struct TcpStreamListener {
    inner: TcpListener,
    nodelay: bool,
}

impl TcpStreamListener {
    /// Bind to `addr`. Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr, options: &SocketConfig) -> io::Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(options.reuse_address)?;
        socket.bind(addr)?;
        let inner = socket.listen(options.backlog)?;

        Ok(Self {
            inner,
            nodelay: options.tcp_nodelay,
        })
    }
}

#[async_trait]
impl StreamListener for TcpStreamListener {
    async fn accept(&self) -> io::Result<(BoxStream, SocketAddr)> {
        let (stream, addr) = self.inner.accept().await?;
        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }
        Ok((Box::new(stream), addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Whether an accept error only affects a single pending connection or a
/// momentary resource shortage, so the accept loop should keep running.
pub fn is_transient(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        // ENFILE, EMFILE
        _ => matches!(e.raw_os_error(), Some(23) | Some(24)),
    }
}

/// Exponential backoff between retries of transient accept errors.
///
/// Starts at 5ms, doubles per consecutive failure and is capped at 1s.
#[derive(Debug, Default)]
pub struct AcceptBackoff {
    attempt: u32,
}

impl AcceptBackoff {
    const BASE_MS: u64 = 5;
    const MAX_MS: u64 = 1000;

    /// Delay before the next retry; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        calculate_backoff(self.attempt, Self::BASE_MS, Self::MAX_MS)
    }

    /// Forget previous failures after a successful accept.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Calculate exponential backoff delay with jitter.
fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
