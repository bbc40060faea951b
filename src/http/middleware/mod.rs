//! Request middleware.

pub mod domain_lookup;

pub use domain_lookup::{domain_lookup_middleware, request_host, SharedGate, VerdictLabel};
