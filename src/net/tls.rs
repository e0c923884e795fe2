//! TLS configuration, certificate loading and the handshake layer.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::net::layer::{LayerError, StreamLayer};
use crate::net::listener::BoxStream;

/// Only HTTP/1.1 is served, so only HTTP/1.1 is advertised.
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Load TLS configuration from certificate and key files.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, io::Error> {
    // Basic validation
    if !cert_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No certificates found in {:?}", cert_path),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No private key found in {:?}", key_path),
            )
        })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    Ok(Arc::new(config))
}

/// Performs a server-side TLS handshake on every accepted stream.
#[derive(Clone)]
pub struct TlsLayer {
    acceptor: TlsAcceptor,
}

impl TlsLayer {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
        }
    }

    /// Build the layer straight from the transport's TLS section.
    pub fn from_config(config: &TlsConfig) -> Result<Self, io::Error> {
        let server_config =
            load_tls_config(Path::new(&config.cert_path), Path::new(&config.key_path))?;
        Ok(Self::new(server_config))
    }
}

#[async_trait]
impl StreamLayer for TlsLayer {
    fn name(&self) -> &'static str {
        "tls"
    }

    async fn establish(
        &self,
        stream: BoxStream,
        peer: SocketAddr,
    ) -> Result<(BoxStream, SocketAddr), LayerError> {
        let stream = self.acceptor.accept(stream).await.map_err(LayerError::Tls)?;

        let (_, connection) = stream.get_ref();
        tracing::trace!(
            peer_addr = %peer,
            sni = connection.server_name().unwrap_or("-"),
            "TLS handshake complete"
        );

        Ok((Box::new(stream), peer))
    }
}
