//! Configuration schema definitions.
//!
//! Every table has defaults so a minimal file only needs
//! `[lookup] service_url`. The `lookup` table also accepts the camelCase keys
//! used by earlier deployments (`lookupServiceUrl`, `defaultTtl`, ...).

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream that receives admitted requests.
    pub upstream: UpstreamConfig,

    /// Domain lookup settings.
    pub lookup: LookupConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Domain lookup configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LookupConfig {
    /// Base URL of the lookup service. Required.
    #[serde(alias = "lookupServiceUrl")]
    pub service_url: String,

    /// Path appended to `service_url` for the lookup GET.
    #[serde(alias = "urlPath")]
    pub url_path: String,

    /// TTL in seconds when no usable `max-age` is returned, and for
    /// not-found answers. Zero means 60.
    #[serde(alias = "defaultTtl")]
    pub default_ttl_secs: u64,

    /// Header that receives the resolved identity.
    #[serde(alias = "domainIdHeader")]
    pub domain_id_header: String,

    /// Header listing forwarded client IPs.
    pub forwarded_header: String,

    /// Lookup request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            url_path: String::new(),
            default_ttl_secs: 60,
            domain_id_header: "x-domain-id".to_string(),
            forwarded_header: "x-forwarded-for".to_string(),
            timeout_ms: 1000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
