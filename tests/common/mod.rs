//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use ws_hub::{FramedConnection, Pipeline, TransportConfig};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Transport settings for `path` with everything else at defaults.
pub fn transport(path: &str) -> TransportConfig {
    TransportConfig {
        path: path.to_string(),
        ..TransportConfig::default()
    }
}

/// Start a pipeline on an ephemeral loopback port whose consumer forwards
/// every connection into the returned channel.
pub async fn start(config: TransportConfig) -> (Pipeline, mpsc::UnboundedReceiver<FramedConnection>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pipeline = ws_hub::listen(IpAddr::from([127, 0, 0, 1]), 0, &config, move |conn| {
        let _ = tx.send(conn);
    })
    .await
    .expect("pipeline should start");
    (pipeline, rx)
}

/// Write `request` verbatim and read until the server closes.
pub async fn raw_request(addr: SocketAddr, request: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;

    let mut response = Vec::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
    Ok(response)
}

/// A one-shot GET for `path` that asks the server to close afterwards.
pub fn get(path: &str) -> Vec<u8> {
    format!("GET {path} HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").into_bytes()
}

/// Split a raw HTTP/1.1 response into its head and body.
pub fn split_response(response: &[u8]) -> (String, Vec<u8>) {
    let end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response should have a header terminator");
    let head = String::from_utf8_lossy(&response[..end]).into_owned();
    (head, response[end + 4..].to_vec())
}
