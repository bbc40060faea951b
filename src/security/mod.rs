//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (forwarding header, else connection address)
//!     → access_control.rs (exact-match allow-list)
//!     → Verdict (Resolved / Rejected)
//! ```
//!
//! # Design Decisions
//! - Empty allow-list means unrestricted
//! - Exact string match only, no CIDR
//! - Resolution never fails; a missing signal yields an empty IP

pub mod access_control;
pub mod client_ip;

pub use access_control::is_allowed;
pub use client_ip::{resolve_client_ip, X_FORWARDED_FOR};
