//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `tower_http`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(log_level: &str) -> String {
    format!("domain_gate={level},tower_http={level}", level = log_level)
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("debug"), "domain_gate=debug,tower_http=debug");
    }

    #[test]
    fn test_init_twice() {
        init_logging("info");
        init_logging("debug");
    }
}
