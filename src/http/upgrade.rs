//! WebSocket upgrade handshake.
//!
//! # Responsibilities
//! - Validate an upgrade request (RFC 6455 section 4.2.1)
//! - Build the `101 Switching Protocols` response
//! - Fix the framing parameters of every upgraded connection
//!
//! # Design Decisions
//! - Checks run in a fixed order and stop at the first failure
//! - Every origin is accepted; peers are tunnel clients, not browsers
//! - The failure reason is for logs only; the peer always sees a 403

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::Response,
};
use data_encoding::BASE64;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{handshake::derive_accept_key, protocol::WebSocketConfig};

pub const READ_BUFFER_SIZE: usize = 4 * 1024;
pub const WRITE_BUFFER_SIZE: usize = 4 * 1024;

/// Upper bound on the time between sending the 101 and holding the upgraded IO.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(4);

/// Why a request on the upgrade path was not upgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("'upgrade' token not found in 'Connection' header")]
    MissingConnectionUpgrade,

    #[error("'websocket' token not found in 'Upgrade' header")]
    MissingUpgradeWebsocket,

    #[error("request method is not GET")]
    MethodNotGet,

    #[error("unsupported version: 13 not found in 'Sec-Websocket-Version' header")]
    UnsupportedVersion,

    #[error("request origin not allowed")]
    OriginNotAllowed,

    #[error("'Sec-WebSocket-Key' header is missing or not valid")]
    InvalidKey,
}

/// Validate `request` as a WebSocket upgrade and return the
/// `Sec-WebSocket-Accept` value for it.
pub fn validate<B>(request: &Request<B>) -> Result<String, HandshakeError> {
    let headers = request.headers();

    if !header_contains_token(headers, header::CONNECTION, "upgrade") {
        return Err(HandshakeError::MissingConnectionUpgrade);
    }
    if !header_contains_token(headers, header::UPGRADE, "websocket") {
        return Err(HandshakeError::MissingUpgradeWebsocket);
    }
    if request.method() != Method::GET {
        return Err(HandshakeError::MethodNotGet);
    }
    if !header_contains_token(headers, header::SEC_WEBSOCKET_VERSION, "13") {
        return Err(HandshakeError::UnsupportedVersion);
    }
    if !origin_allowed(headers.get(header::ORIGIN)) {
        return Err(HandshakeError::OriginNotAllowed);
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(HeaderValue::as_bytes)
        .filter(|key| is_valid_challenge_key(key))
        .ok_or(HandshakeError::InvalidKey)?;

    Ok(derive_accept_key(key))
}

/// Cross-origin requests are fine: nothing here relies on browser cookies.
fn origin_allowed(_origin: Option<&HeaderValue>) -> bool {
    true
}

/// A challenge key is the base64 encoding of exactly 16 bytes.
fn is_valid_challenge_key(key: &[u8]) -> bool {
    !key.is_empty() && BASE64.decode(key).map(|k| k.len() == 16).unwrap_or(false)
}

/// Whether any value of header `name` lists `token` (case-insensitive).
fn header_contains_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// The response that completes the server side of the handshake.
pub fn switching_protocols(accept_key: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(value) = HeaderValue::from_str(accept_key) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}

/// Framing parameters of every upgraded connection.
pub fn websocket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.read_buffer_size = READ_BUFFER_SIZE;
    config.write_buffer_size = WRITE_BUFFER_SIZE;
    config
}
