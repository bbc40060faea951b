//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build gate → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → servers drain and exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{recv_shutdown, Shutdown};
