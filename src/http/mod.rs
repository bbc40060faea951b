//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → middleware/domain_lookup.rs (host → identity, allow-list)
//!     → server.rs proxy handler (forward to upstream)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
