//! TLS termination behind a PROXY preamble, over real loopback sockets.

mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::Message;

use common::{start, transport, TIMEOUT};
use ws_hub::config::TlsConfig;

/// A self-signed `localhost` certificate written to PEM files, plus a
/// client connector that trusts it and offers ALPN `http/1.1`.
fn tls_fixture(name: &str) -> (TlsConfig, TlsConnector) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let dir = std::env::temp_dir();
    let cert_path: PathBuf = dir.join(format!("ws-hub-{name}-{}-cert.pem", std::process::id()));
    let key_path: PathBuf = dir.join(format!("ws-hub-{name}-{}-key.pem", std::process::id()));
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert.der().clone()).unwrap();
    let mut client = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    client.alpn_protocols = vec![b"http/1.1".to_vec()];

    let config = TlsConfig {
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
    };
    (config, TlsConnector::from(Arc::new(client)))
}

#[tokio::test]
async fn upgrade_over_tls_negotiates_http1() {
    let (tls, connector) = tls_fixture("plain");
    let mut config = transport("/ws");
    config.tls = Some(tls);
    let (pipeline, mut rx) = start(config).await;
    let addr = pipeline.local_addr();

    let stream = TcpStream::connect(addr).await.unwrap();
    let client_addr = stream.local_addr().unwrap();
    let stream = connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await
        .unwrap();
    assert_eq!(stream.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));

    let (mut ws, response) = tokio_tungstenite::client_async("ws://localhost/ws", stream)
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    let conn = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(conn.remote_addr(), client_addr);

    tokio::spawn(ws_hub::forward::relay(conn, None));
    ws.send(Message::binary(b"over tls".to_vec())).await.unwrap();
    let echoed = tokio::time::timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(echoed, Message::binary(b"over tls".to_vec()));
}

#[tokio::test]
async fn proxy_preamble_precedes_tls_handshake() {
    let (tls, connector) = tls_fixture("proxied");
    let mut config = transport("/ws");
    config.accept_proxy_protocol = true;
    config.tls = Some(tls);
    let (pipeline, mut rx) = start(config).await;

    let mut stream = TcpStream::connect(pipeline.local_addr()).await.unwrap();
    stream
        .write_all(b"PROXY TCP4 198.51.100.9 192.0.2.1 40000 443\r\n")
        .await
        .unwrap();
    let stream = connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await
        .unwrap();

    let (_ws, _) = tokio_tungstenite::client_async("ws://localhost/ws", stream)
        .await
        .unwrap();

    let conn = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(conn.remote_addr(), "198.51.100.9:40000".parse::<SocketAddr>().unwrap());
}

#[tokio::test]
async fn plaintext_http_on_tls_listener_gets_no_response() {
    let (tls, _connector) = tls_fixture("cleartext");
    let mut config = transport("/ws");
    config.tls = Some(tls);
    let (pipeline, mut rx) = start(config).await;

    match common::raw_request(pipeline.local_addr(), &common::get("/ws")).await {
        Ok(response) => assert!(!response.starts_with(b"HTTP/1.1"), "{}", String::from_utf8_lossy(&response)),
        Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::TimedOut),
    }
    assert!(rx.try_recv().is_err());
}
