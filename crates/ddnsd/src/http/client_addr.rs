//! Source address derivation
//!
//! The address the update pipeline treats as authoritative for
//! anti-spoofing. When forwarded headers are trusted, the first hop of
//! `X-Forwarded-For` wins; otherwise (or when the header is absent) the
//! peer address of the TCP connection is used. IPv4-mapped IPv6 addresses
//! are reduced to plain IPv4.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use super::AppState;

/// Placeholder when no address can be determined
const UNKNOWN: &str = "unknown";

/// The derived client source address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(ClientAddr(derive(
            &parts.headers,
            peer,
            state.trust_forwarded_for,
        )))
    }
}

fn derive(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for
        && let Some(first_hop) = forwarded_first_hop(headers)
    {
        return canonical(first_hop);
    }

    match peer {
        Some(ip) => ip.to_canonical().to_string(),
        None => UNKNOWN.to_string(),
    }
}

fn forwarded_first_hop(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
}

/// Canonical text of an address; unparseable values pass through unchanged
fn canonical(raw: &str) -> String {
    match raw.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) => raw.to_string(),
    }
}
