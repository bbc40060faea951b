//! HTTP client for the domain lookup service.
//!
//! # Responsibilities
//! - Build `<service_url><url_path>?domain=<host>` requests
//! - Bound every call with a short timeout
//! - Return body, status and `Cache-Control` untouched
//!
//! # Design Decisions
//! - No retries: the gate fails open when the service is unavailable
//! - Status codes are not interpreted here; the gate decides what they mean

use std::future::Future;
use std::time::Duration;
use reqwest::header::CACHE_CONTROL;
use thiserror::Error;
use url::Url;

use crate::lookup::GateError;

/// Raw answer from the lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResponse {
    /// Response body as text.
    pub body: String,
    /// HTTP status code.
    pub status: u16,
    /// `Cache-Control` header value, empty if absent.
    pub cache_control: String,
}

impl LookupResponse {
    /// Convenience constructor.
    pub fn new(status: u16, body: impl Into<String>, cache_control: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status,
            cache_control: cache_control.into(),
        }
    }
}

/// Errors that make the lookup service unavailable for one request.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Connection, timeout or protocol failure.
    #[error("lookup request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response arrived but its body could not be read.
    #[error("failed to read lookup response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The request URL could not be built for this host.
    #[error("invalid lookup URL: {0}")]
    Url(String),
}

/// Something that can resolve a hostname through the lookup protocol.
pub trait DomainLookup: Send + Sync + 'static {
    /// Query the lookup service for `hostname`.
    fn lookup(&self, hostname: &str) -> impl Future<Output = Result<LookupResponse, LookupError>> + Send;
}

/// Lookup client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpLookupClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpLookupClient {
    /// Create a client for `service_url` + `url_path` with the given timeout.
    pub fn new(service_url: &str, url_path: &str, timeout: Duration) -> Result<Self, GateError> {
        if service_url.trim().is_empty() {
            return Err(GateError::MissingServiceUrl);
        }

        let endpoint = Url::parse(&format!("{}{}", service_url, url_path))
            .map_err(|e| GateError::InvalidServiceUrl(format!("{}{}: {}", service_url, url_path, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(GateError::InvalidServiceUrl(endpoint.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(GateError::Client)?;

        Ok(Self { client, endpoint })
    }

    /// Full lookup URL for `hostname`.
    pub fn lookup_url(&self, hostname: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("domain", hostname);
        url
    }

    /// Base endpoint (without the `domain` query).
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl DomainLookup for HttpLookupClient {
    async fn lookup(&self, hostname: &str) -> Result<LookupResponse, LookupError> {
        let url = self.lookup_url(hostname);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(LookupError::Transport)?;

        let status = response.status().as_u16();
        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(LookupError::Body)?;

        Ok(LookupResponse {
            body,
            status,
            cache_control,
        })
    }
}

/// Extract `max-age` seconds from a `Cache-Control` value.
///
/// The first `max-age=<n>` directive whose value parses wins. Anything else
/// yields `default`.
pub fn parse_max_age(cache_control: &str, default: i64) -> i64 {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("max-age=300", 60), 300);
        assert_eq!(parse_max_age("public, max-age=600, must-revalidate", 60), 600);
        assert_eq!(parse_max_age("public, must-revalidate", 60), 60);
        assert_eq!(parse_max_age("", 60), 60);
        assert_eq!(parse_max_age("max-age=invalid", 60), 60);
    }

    #[test]
    fn test_parse_max_age_first_valid_wins() {
        assert_eq!(parse_max_age("max-age=oops, max-age=30", 60), 30);
        assert_eq!(parse_max_age("max-age=0", 60), 0);
        assert_eq!(parse_max_age("max-age=-5", 60), -5);
    }

    #[test]
    fn test_lookup_url() {
        let client = HttpLookupClient::new(
            "http://lookup.internal",
            "/api/domain",
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            client.lookup_url("example.com").as_str(),
            "http://lookup.internal/api/domain?domain=example.com"
        );
    }

    #[test]
    fn test_missing_service_url() {
        let result = HttpLookupClient::new("", "/x", Duration::from_secs(1));
        assert!(matches!(result, Err(GateError::MissingServiceUrl)));

        let result = HttpLookupClient::new("not a url", "", Duration::from_secs(1));
        assert!(matches!(result, Err(GateError::InvalidServiceUrl(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Port 9 (discard) is closed on test hosts.
        let client = HttpLookupClient::new("http://127.0.0.1:9", "", Duration::from_secs(1)).unwrap();
        let result = client.lookup("example.com").await;
        assert!(matches!(result, Err(LookupError::Transport(_))));
    }
}
