//! Byte-stream view of an upgraded WebSocket.
//!
//! # Responsibilities
//! - Present a WebSocket as `AsyncRead + AsyncWrite`
//! - Carry the resolved remote address and the local address
//!
//! # Data Flow
//! ```text
//! peer ──── binary messages ────→ FramedConnection::poll_read  → consumer bytes
//! peer ←─── binary messages ───── FramedConnection::poll_write ← consumer bytes
//! ```
//!
//! # Design Decisions
//! - Every write becomes one binary message
//! - Text and binary payloads are both read as bytes
//! - Ping/pong is answered by the codec and never surfaces as data
//! - A close frame reads as end-of-stream

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// A successfully upgraded connection, owned by the consumer once emitted.
pub struct FramedConnection<S = TokioIo<Upgraded>> {
    inner: WebSocketStream<S>,
    pending: Bytes,
    read_closed: bool,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl<S> FramedConnection<S> {
    pub fn new(inner: WebSocketStream<S>, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            read_closed: false,
            local_addr,
            remote_addr,
        }
    }

    /// The peer address, rewritten from `X-Forwarded-For` when present.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The address the pipeline is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Give up the byte-stream view and use the message stream directly.
    pub fn into_inner(self) -> WebSocketStream<S> {
        self.inner
    }
}

impl<S> std::fmt::Debug for FramedConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedConnection")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("read_closed", &self.read_closed)
            .finish()
    }
}

fn to_io(e: WsError) -> io::Error {
    match e {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => io::ErrorKind::BrokenPipe.into(),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

impl<S> AsyncRead for FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.read_closed {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                None | Some(Ok(Message::Close(_))) => this.read_closed = true,
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(message)) => this.pending = message.into_data(),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    this.read_closed = true
                }
                Some(Err(e)) => return Poll::Ready(Err(to_io(e))),
            }
        }
    }
}

impl<S> AsyncWrite for FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut inner = Pin::new(&mut this.inner);

        ready!(inner.as_mut().poll_ready(cx)).map_err(to_io)?;
        inner
            .start_send(Message::binary(buf.to_vec()))
            .map_err(to_io)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx).map_err(to_io)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(Pin::new(&mut self.get_mut().inner).poll_close(cx)) {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(to_io(e))),
        }
    }
}
