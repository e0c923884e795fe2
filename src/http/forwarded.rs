//! Origin resolution from `X-Forwarded-For`.
//!
//! The header is attacker-controlled. It is honoured only when its leftmost
//! entry is an IP literal; anything else leaves the physical address as is.
//! The port always comes from the physical connection, since forwarding
//! proxies do not relay it.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// One entry of a forwarding header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedAddr {
    Ip(IpAddr),
    /// A hostname or any other token that is not an IP literal.
    Host(String),
}

impl ForwardedAddr {
    fn parse(entry: &str) -> Self {
        let literal = entry
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(entry);
        match literal.parse::<IpAddr>() {
            Ok(ip) => ForwardedAddr::Ip(ip),
            Err(_) => ForwardedAddr::Host(entry.to_string()),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            ForwardedAddr::Ip(ip) => Some(*ip),
            ForwardedAddr::Host(_) => None,
        }
    }
}

/// Parse the first `X-Forwarded-For` header, leftmost (original client) first.
///
/// Empty entries are kept as empty hosts so they still occupy their
/// position; a missing or non-UTF-8 header yields nothing.
pub fn parse_x_forwarded_for(headers: &HeaderMap) -> Vec<ForwardedAddr> {
    let Some(value) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) else {
        return Vec::new();
    };

    value
        .split(',')
        .map(str::trim)
        .map(ForwardedAddr::parse)
        .collect()
}

/// The address to report for a connection from `physical`.
pub fn resolve(physical: SocketAddr, forwarded: &[ForwardedAddr]) -> SocketAddr {
    match forwarded.first().and_then(ForwardedAddr::ip) {
        Some(ip) => SocketAddr::new(ip, physical.port()),
        None => physical,
    }
}
