//! PROXY protocol preamble layer.
//!
//! Consumes a v1 (text) or v2 (binary) PROXY protocol header from the front
//! of every accepted stream and reports the source address it declares as
//! the connection's peer. The preamble is required: a connection that starts
//! with anything else is dropped before a single HTTP byte is parsed.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use ppp::{v1, v2, HeaderResult};
use tokio::io::AsyncReadExt;

use crate::net::layer::{LayerError, StreamLayer};
use crate::net::listener::BoxStream;

const V1_PREFIX_LEN: usize = 5;
const V1_MAX_LENGTH: usize = 107;
const V1_TERMINATOR: &[u8] = b"\r\n";

const V2_PREFIX_LEN: usize = 12;
const V2_MINIMUM_LEN: usize = 16;
const V2_LENGTH_INDEX: usize = 14;

/// Requires and strips a PROXY protocol preamble.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyProtocolLayer;

#[async_trait]
impl StreamLayer for ProxyProtocolLayer {
    fn name(&self) -> &'static str {
        "proxy_protocol"
    }

    async fn establish(
        &self,
        mut stream: BoxStream,
        peer: SocketAddr,
    ) -> Result<(BoxStream, SocketAddr), LayerError> {
        let header = read_header_bytes(&mut stream).await?;
        let source = source_address(HeaderResult::parse(&header))?;

        let reported = source.unwrap_or(peer);
        tracing::trace!(physical_peer = %peer, peer_addr = %reported, "PROXY preamble consumed");
        Ok((stream, reported))
    }
}

/// Read exactly the preamble bytes, leaving the rest of the stream untouched.
async fn read_header_bytes(stream: &mut BoxStream) -> Result<Vec<u8>, LayerError> {
    let mut buffer = vec![0u8; V2_MINIMUM_LEN];
    stream.read_exact(&mut buffer[..V1_PREFIX_LEN]).await?;

    if &buffer[..V1_PREFIX_LEN] == v1::PROTOCOL_PREFIX.as_bytes() {
        buffer.truncate(V1_PREFIX_LEN);
        while buffer.len() < V1_MAX_LENGTH {
            buffer.push(stream.read_u8().await?);
            if buffer.ends_with(V1_TERMINATOR) {
                return Ok(buffer);
            }
        }
        return Err(LayerError::MalformedPreamble(
            "v1 header terminator not found".to_string(),
        ));
    }

    stream
        .read_exact(&mut buffer[V1_PREFIX_LEN..V2_MINIMUM_LEN])
        .await?;
    if &buffer[..V2_PREFIX_LEN] != v2::PROTOCOL_PREFIX {
        return Err(LayerError::MissingPreamble);
    }

    let length = u16::from_be_bytes([buffer[V2_LENGTH_INDEX], buffer[V2_LENGTH_INDEX + 1]]);
    buffer.resize(V2_MINIMUM_LEN + length as usize, 0);
    stream.read_exact(&mut buffer[V2_MINIMUM_LEN..]).await?;
    Ok(buffer)
}

/// The declared source address, or `None` when the header carries no usable
/// address (v1 `UNKNOWN`, v2 `LOCAL`, unspecified or unix families).
fn source_address(header: HeaderResult<'_>) -> Result<Option<SocketAddr>, LayerError> {
    match header {
        HeaderResult::V1(Ok(header)) => Ok(match header.addresses {
            v1::Addresses::Tcp4(ip) => Some(SocketAddr::new(IpAddr::V4(ip.source_address), ip.source_port)),
            v1::Addresses::Tcp6(ip) => Some(SocketAddr::new(IpAddr::V6(ip.source_address), ip.source_port)),
            v1::Addresses::Unknown => None,
        }),
        HeaderResult::V2(Ok(header)) => {
            if matches!(header.command, v2::Command::Local) {
                return Ok(None);
            }
            Ok(match header.addresses {
                v2::Addresses::IPv4(ip) => Some(SocketAddr::new(IpAddr::V4(ip.source_address), ip.source_port)),
                v2::Addresses::IPv6(ip) => Some(SocketAddr::new(IpAddr::V6(ip.source_address), ip.source_port)),
                v2::Addresses::Unix(_) | v2::Addresses::Unspecified => None,
            })
        }
        HeaderResult::V1(Err(e)) => Err(LayerError::MalformedPreamble(format!("v1: {e}"))),
        HeaderResult::V2(Err(e)) => Err(LayerError::MalformedPreamble(format!("v2: {e}"))),
    }
}
