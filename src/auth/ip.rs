//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, extract::Request};

/// Extract the client IP address for a request.
///
/// With `trust_forwarded_for`, the first address in `X-Forwarded-For` wins
/// (only safe behind a proxy that sets it). Otherwise, or when the header is
/// absent, the peer address from `ConnectInfo` is used.
pub fn extract_client_ip(request: &Request, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
