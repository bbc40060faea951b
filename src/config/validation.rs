//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Lookup service URL present and absolute
//! - Header names and addresses parse
//! - Timeouts non-zero
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{uri::Authority, HeaderName};
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.upstream.address.parse::<Authority>().is_err() {
        errors.push(ValidationError::new(
            "upstream.address",
            format!("'{}' is not a host:port", config.upstream.address),
        ));
    }

    let lookup = &config.lookup;
    if lookup.service_url.trim().is_empty() {
        errors.push(ValidationError::new("lookup.service_url", "is required"));
    } else {
        match Url::parse(&format!("{}{}", lookup.service_url, lookup.url_path)) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                "lookup.service_url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("lookup.service_url", e.to_string())),
        }
    }

    if !lookup.url_path.is_empty() && !lookup.url_path.starts_with('/') {
        errors.push(ValidationError::new("lookup.url_path", "must start with '/'"));
    }

    for (field, name) in [
        ("lookup.domain_id_header", &lookup.domain_id_header),
        ("lookup.forwarded_header", &lookup.forwarded_header),
    ] {
        if HeaderName::from_bytes(name.trim().as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("'{}' is not a valid header name", name)));
        }
    }

    if lookup.timeout_ms == 0 {
        errors.push(ValidationError::new("lookup.timeout_ms", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "is required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
