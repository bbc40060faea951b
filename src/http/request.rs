//! Request identification.
//!
//! Every request gets an `x-request-id` (UUID v4) unless the client sent one;
//! the same value is echoed on the response and forwarded upstream.

use axum::http::{HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns missing request IDs.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuidV4> {
    SetRequestIdLayer::x_request_id(MakeRequestUuidV4)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Read the request ID from headers, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
