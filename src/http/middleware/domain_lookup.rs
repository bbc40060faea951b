//! Domain lookup middleware.
//! Resolves the request host, enforces its allow-list and injects the identity.

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::lookup::{DomainGate, DomainLookup, Verdict};

/// Gate shared between requests and swapped on config reload.
pub type SharedGate<L> = Arc<ArcSwap<DomainGate<L>>>;

/// Host the request is addressed to: `Host` header, else URI authority.
///
/// A `Host` header with non-ASCII bytes is still a host and is decoded lossily.
pub fn request_host(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .filter(|h| !h.trim().is_empty())
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
}

pub async fn domain_lookup_middleware<L: DomainLookup>(
    State(shared): State<SharedGate<L>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let gate = shared.load_full();

    let Some(host) = request_host(&req) else {
        return next.run(req).await;
    };
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let (mut parts, body) = req.into_parts();
    let verdict = gate.evaluate(&host, &parts.headers, remote_addr.as_deref()).await;
    tracing::debug!(host = %host, verdict = verdict.label(), "Domain lookup verdict");
    let label = verdict.label();

    let mut response = match verdict {
        Verdict::NoHost | Verdict::LookupUnavailable => next.run(Request::from_parts(parts, body)).await,
        Verdict::Resolved { identity } => {
            match HeaderValue::from_str(&identity) {
                Ok(value) => {
                    parts.headers.insert(gate.identity_header().clone(), value);
                }
                Err(_) => {
                    tracing::warn!(host = %host, "Identity is not a valid header value, forwarding without it");
                }
            }
            next.run(Request::from_parts(parts, body)).await
        }
        Verdict::Redirect { location } => match HeaderValue::from_str(&location) {
            Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
            Err(_) => {
                tracing::error!(host = %host, "Redirect target is not a valid Location header");
                (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error occurred").into_response()
            }
        },
        Verdict::NotFound => (StatusCode::NOT_FOUND, "Unauthorized (404)").into_response(),
        Verdict::Rejected => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
        Verdict::UnexpectedStatus(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error occurred").into_response()
        }
    };

    response.extensions_mut().insert(VerdictLabel(label));
    response
}

/// Verdict attached to the response for request metrics.
#[derive(Debug, Clone, Copy)]
pub struct VerdictLabel(pub &'static str);
