//! Domain-aware access gateway.
//!
//! Resolves each request's host to a tenant identity through a remote lookup
//! service, enforces the identity's client IP allow-list, injects the identity
//! into a request header and forwards to the upstream. Lookup results are
//! cached per host with TTL expiry.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod lookup;
pub mod observability;
pub mod security;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use lookup::{DomainGate, Verdict};
