//! Client IP resolution.
//!
//! The first entry of the forwarding header wins; otherwise the connection
//! address is used with its port removed.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Default forwarding header consulted before the connection address.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the presumed originating client IP.
///
/// Never fails; returns an empty string when there is no signal at all.
pub fn resolve_client_ip(headers: &HeaderMap, forwarded_header: &str, remote_addr: Option<&str>) -> String {
    let forwarded = headers
        .get(forwarded_header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    remote_addr.map(strip_port).unwrap_or_default()
}

/// Remove a `:port` suffix from a connection address.
///
/// Structured forms are tried first (`ip:port`, `[v6]:port`, bare IPs). Only
/// strings none of them accept fall back to splitting at the last colon.
pub fn strip_port(addr: &str) -> String {
    let addr = addr.trim();

    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return ip.to_string();
    }
    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return inner.to_string();
    }

    match addr.rfind(':') {
        Some(idx) => addr[..idx].to_string(),
        None => addr.to_string(),
    }
}
