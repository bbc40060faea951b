//! Domain lookup subsystem.
//!
//! # Data Flow
//! ```text
//! request host
//!     → gate.rs (normalize host, consult cache)
//!     → cache.rs (fresh entry? serve it)
//!     → client.rs (miss/stale: GET lookup service, 1s bound)
//!     → codec.rs (decode `identity|ip,ip`)
//!     → security::access_control (allow-list check)
//!     → Verdict
//! ```
//!
//! # Design Decisions
//! - Fail open: an unreachable lookup service never blocks traffic
//! - Not-found answers are cached for the default TTL
//! - The cache is owned by the gate and outlives config reloads

pub mod cache;
pub mod client;
pub mod codec;
pub mod gate;

use thiserror::Error;

pub use cache::{CacheEntry, CacheSummary, TtlCache};
pub use client::{DomainLookup, HttpLookupClient, LookupError, LookupResponse};
pub use codec::DomainRecord;
pub use gate::{DomainGate, Verdict};

/// Errors raised while constructing a gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// No lookup service URL configured.
    #[error("lookup service URL is required")]
    MissingServiceUrl,

    /// The lookup service URL does not parse.
    #[error("invalid lookup service URL: {0}")]
    InvalidServiceUrl(String),

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    /// The HTTP client could not be built.
    #[error("failed to build lookup client: {0}")]
    Client(#[source] reqwest::Error),
}
