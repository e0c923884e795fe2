//! Relaying upgraded connections for the binary.
//!
//! With a target, bytes are copied both ways between the framed connection
//! and a fresh TCP connection to it. Without one, the connection is echoed
//! back to the peer, which is handy for smoke-testing a deployment.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Bytes moved in each direction: (peer → upstream, upstream → peer).
pub type Transferred = (u64, u64);

/// Relay `conn` to `target`, or echo it when `target` is `None`.
pub async fn relay<S>(mut conn: S, target: Option<&str>) -> io::Result<Transferred>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match target {
        Some(target) => {
            let mut upstream = TcpStream::connect(target).await?;
            if let Err(e) = upstream.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY on upstream");
            }
            tokio::io::copy_bidirectional(&mut conn, &mut upstream).await
        }
        None => echo(conn).await,
    }
}

async fn echo<S>(conn: S) -> io::Result<Transferred>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(conn);
    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await?;
    Ok((copied, copied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn echo_returns_input() {
        let (conn, mut peer) = duplex(1024);
        let task = tokio::spawn(relay(conn, None));

        peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.shutdown().await.unwrap();
        assert_eq!(task.await.unwrap().unwrap(), (4, 4));
    }

    #[tokio::test]
    async fn relays_to_target() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = upstream.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"world").await.unwrap();
            buf
        });

        let (conn, mut peer) = duplex(1024);
        let task = tokio::spawn(async move { relay(conn, Some(&target)).await });

        peer.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");
        assert_eq!(&server.await.unwrap(), b"hello");

        drop(peer);
        let (sent, received) = task.await.unwrap().unwrap();
        assert_eq!((sent, received), (5, 5));
    }

    #[tokio::test]
    async fn unreachable_target_is_an_error() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = unused.local_addr().unwrap().to_string();
        drop(unused);

        let (conn, _peer) = duplex(64);
        assert!(relay(conn, Some(&target)).await.is_err());
    }
}
