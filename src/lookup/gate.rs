//! Per-request decision engine.
//!
//! # State Machine
//! ```text
//! no host            → NoHost (pass through)
//! fresh cache hit    → NotFound | Redirect | Rejected | Resolved
//! stale cache hit    → evict, then lookup
//! lookup error       → LookupUnavailable (fail open, nothing cached)
//! lookup 200         → Rejected (not cached) | Resolved (cache record for max-age)
//! lookup 201         → cache redirect for max-age, Redirect
//! lookup 404         → cache sentinel for default TTL, NotFound
//! lookup other       → UnexpectedStatus (not cached)
//! ```
//!
//! The cache lock is never held across the lookup call. Concurrent misses for
//! the same host are not coalesced and may each reach the lookup service.
//! Stale entries are evicted with `remove_if_stale`, so an entry refreshed by
//! a concurrent lookup in the meantime survives.

use axum::http::{uri::Authority, HeaderMap, HeaderName};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LookupConfig;
use crate::lookup::cache::{TtlCache, NOT_FOUND_SENTINEL};
use crate::lookup::client::{parse_max_age, DomainLookup, HttpLookupClient};
use crate::lookup::codec::DomainRecord;
use crate::lookup::GateError;
use crate::observability::metrics;
use crate::security::access_control::is_allowed;
use crate::security::client_ip::resolve_client_ip;

/// TTL used when the configured default is zero.
pub const FALLBACK_TTL_SECS: u64 = 60;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request carried no host; pass it through untouched.
    NoHost,
    /// Identity resolved and the client IP is allowed.
    Resolved { identity: String },
    /// The host redirects elsewhere.
    Redirect { location: String },
    /// The lookup service does not know the host.
    NotFound,
    /// The client IP is not in the host's allow-list.
    Rejected,
    /// The lookup service answered with a status outside the protocol.
    UnexpectedStatus(u16),
    /// The lookup service could not be reached; forward unchanged.
    LookupUnavailable,
}

impl Verdict {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::NoHost => "no_host",
            Verdict::Resolved { .. } => "resolved",
            Verdict::Redirect { .. } => "redirect",
            Verdict::NotFound => "not_found",
            Verdict::Rejected => "rejected",
            Verdict::UnexpectedStatus(_) => "unexpected_status",
            Verdict::LookupUnavailable => "lookup_unavailable",
        }
    }
}

/// Resolves hosts to identities and enforces their allow-lists.
pub struct DomainGate<L> {
    lookup: L,
    cache: Arc<TtlCache>,
    default_ttl_secs: i64,
    identity_header: HeaderName,
    forwarded_header: HeaderName,
}

impl DomainGate<HttpLookupClient> {
    /// Build a gate that talks to the configured lookup service.
    pub fn from_config(config: &LookupConfig, cache: Arc<TtlCache>) -> Result<Self, GateError> {
        let client = HttpLookupClient::new(
            &config.service_url,
            &config.url_path,
            Duration::from_millis(config.timeout_ms),
        )?;
        Self::with_cache(config, client, cache)
    }
}

impl<L: DomainLookup> DomainGate<L> {
    /// Create a gate with its own empty cache.
    pub fn new(config: &LookupConfig, lookup: L) -> Result<Self, GateError> {
        Self::with_cache(config, lookup, Arc::new(TtlCache::new()))
    }

    /// Create a gate sharing an existing cache (used across config reloads).
    pub fn with_cache(config: &LookupConfig, lookup: L, cache: Arc<TtlCache>) -> Result<Self, GateError> {
        let identity_header = parse_header_name(&config.domain_id_header)?;
        let forwarded_header = parse_header_name(&config.forwarded_header)?;
        let default_ttl_secs = match config.default_ttl_secs {
            0 => FALLBACK_TTL_SECS,
            n => n,
        };

        Ok(Self {
            lookup,
            cache,
            default_ttl_secs: i64::try_from(default_ttl_secs).unwrap_or(i64::MAX),
            identity_header,
            forwarded_header,
        })
    }

    /// The cache backing this gate.
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Header that receives the resolved identity.
    pub fn identity_header(&self) -> &HeaderName {
        &self.identity_header
    }

    /// Default TTL in seconds.
    pub fn default_ttl_secs(&self) -> i64 {
        self.default_ttl_secs
    }

    /// Decide what to do with a request for `raw_host`.
    pub async fn evaluate(&self, raw_host: &str, headers: &HeaderMap, remote_addr: Option<&str>) -> Verdict {
        let Some(host) = normalize_host(raw_host) else {
            return Verdict::NoHost;
        };
        let client_ip = || resolve_client_ip(headers, self.forwarded_header.as_str(), remote_addr);

        let now = Instant::now();
        if let Some(entry) = self.cache.get(&host) {
            if entry.is_fresh(now) {
                metrics::record_cache_event("hit");
                if entry.is_not_found() {
                    return Verdict::NotFound;
                }
                if entry.is_redirect {
                    return Verdict::Redirect { location: entry.value };
                }
                return self.authorize(&host, DomainRecord::decode(&entry.value), &client_ip());
            }

            metrics::record_cache_event("stale");
            tracing::debug!(host = %host, "Cache entry expired");
            self.cache.remove_if_stale(&host, now);
        } else {
            metrics::record_cache_event("miss");
        }

        let response = match self.lookup.lookup(&host).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Domain lookup failed, failing open");
                metrics::record_lookup("error");
                return Verdict::LookupUnavailable;
            }
        };
        metrics::record_lookup(&response.status.to_string());

        match response.status {
            200 => {
                let verdict = self.authorize(&host, DomainRecord::decode(&response.body), &client_ip());
                if matches!(verdict, Verdict::Resolved { .. }) {
                    self.store(&host, response.body, parse_max_age(&response.cache_control, self.default_ttl_secs), false);
                }
                verdict
            }
            201 => {
                let location = response.body;
                self.store(&host, location.clone(), parse_max_age(&response.cache_control, self.default_ttl_secs), true);
                Verdict::Redirect { location }
            }
            404 => {
                self.store(&host, NOT_FOUND_SENTINEL.to_string(), self.default_ttl_secs, false);
                Verdict::NotFound
            }
            status => {
                tracing::error!(host = %host, status, "Unexpected lookup status");
                Verdict::UnexpectedStatus(status)
            }
        }
    }

    fn authorize(&self, host: &str, record: DomainRecord, client_ip: &str) -> Verdict {
        if is_allowed(client_ip, &record.allowed_ips) {
            Verdict::Resolved { identity: record.identity }
        } else {
            tracing::info!(host = %host, client_ip = %client_ip, "Client IP not in allow-list");
            Verdict::Rejected
        }
    }

    fn store(&self, host: &str, value: String, ttl_secs: i64, is_redirect: bool) {
        if ttl_secs <= 0 {
            return;
        }
        let ttl = Duration::from_secs(ttl_secs.unsigned_abs());
        if let Some(expires_at) = Instant::now().checked_add(ttl) {
            self.cache.set(host, value, expires_at, is_redirect);
        }
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, GateError> {
    HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| GateError::InvalidHeaderName(name.to_string()))
}

/// Lower-case the host and drop any port so all spellings share a cache key.
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // A host that does not parse, or has an empty host part (":80"), is still
    // looked up verbatim.
    let host = match raw.parse::<Authority>() {
        Ok(authority) if !authority.host().is_empty() => authority.host().to_ascii_lowercase(),
        _ => raw.to_ascii_lowercase(),
    };
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::client::{LookupError, LookupResponse};
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted lookup service that counts calls.
    #[derive(Default)]
    struct FakeLookup {
        response: Mutex<Option<LookupResponse>>,
        calls: AtomicUsize,
    }

    impl FakeLookup {
        fn answering(response: LookupResponse) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                calls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self::default()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DomainLookup for Arc<FakeLookup> {
        async fn lookup(&self, _hostname: &str) -> Result<LookupResponse, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LookupError::Url("unreachable".into()))
        }
    }

    fn gate(lookup: &Arc<FakeLookup>) -> DomainGate<Arc<FakeLookup>> {
        DomainGate::new(&LookupConfig::default(), lookup.clone()).unwrap()
    }

    fn forwarded(ip: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_no_host() {
        let lookup = Arc::new(FakeLookup::unavailable());
        let gate = gate(&lookup);
        assert_eq!(gate.evaluate("", &HeaderMap::new(), None).await, Verdict::NoHost);
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolved_then_cached() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(200, "uuid123|1.1.1.1", "max-age=120")));
        let gate = gate(&lookup);

        let verdict = gate.evaluate("example.com", &forwarded("1.1.1.1"), None).await;
        assert_eq!(verdict, Verdict::Resolved { identity: "uuid123".into() });

        let entry = gate.cache().get("example.com").unwrap();
        assert_eq!(entry.value, "uuid123|1.1.1.1");
        assert!(!entry.is_redirect);
        let remaining = entry.expires_at - Instant::now();
        assert!(remaining > Duration::from_secs(115) && remaining <= Duration::from_secs(120));

        // Served from cache, IP now mismatched.
        let verdict = gate.evaluate("example.com", &forwarded("2.2.2.2"), None).await;
        assert_eq!(verdict, Verdict::Rejected);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_live_lookup_is_not_cached() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(200, "uuid|1.1.1.1", "max-age=120")));
        let gate = gate(&lookup);

        let verdict = gate.evaluate("example.com", &HeaderMap::new(), Some("9.9.9.9:1234")).await;
        assert_eq!(verdict, Verdict::Rejected);
        assert!(gate.cache().is_empty());

        // The next allowed client looks up again and populates the cache.
        let verdict = gate.evaluate("example.com", &HeaderMap::new(), Some("1.1.1.1:1234")).await;
        assert_eq!(verdict, Verdict::Resolved { identity: "uuid".into() });
        assert_eq!(lookup.calls(), 2);
        assert!(gate.cache().get("example.com").is_some());
    }

    #[tokio::test]
    async fn test_zero_max_age_is_not_cached() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(200, "uuid|", "max-age=0")));
        let gate = gate(&lookup);

        let verdict = gate.evaluate("example.com", &HeaderMap::new(), None).await;
        assert_eq!(verdict, Verdict::Resolved { identity: "uuid".into() });
        assert!(gate.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_lookup() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(200, "fresh|", "")));
        let gate = gate(&lookup);
        gate.cache().set("example.com", "old|", Instant::now(), false);

        let verdict = gate.evaluate("example.com", &HeaderMap::new(), None).await;
        assert_eq!(verdict, Verdict::Resolved { identity: "fresh".into() });
        assert_eq!(lookup.calls(), 1);
        assert_eq!(gate.cache().get("example.com").unwrap().value, "fresh|");
    }

    #[tokio::test]
    async fn test_redirect_cached() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(201, "https://new.example/", "max-age=30")));
        let gate = gate(&lookup);

        for _ in 0..2 {
            let verdict = gate.evaluate("old.example", &HeaderMap::new(), None).await;
            assert_eq!(verdict, Verdict::Redirect { location: "https://new.example/".into() });
        }
        assert_eq!(lookup.calls(), 1);
        assert!(gate.cache().get("old.example").unwrap().is_redirect);
    }

    #[tokio::test]
    async fn test_not_found_uses_default_ttl() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(404, "", "max-age=5")));
        let gate = gate(&lookup);

        assert_eq!(gate.evaluate("unknown.test", &HeaderMap::new(), None).await, Verdict::NotFound);
        assert_eq!(gate.evaluate("unknown.test", &HeaderMap::new(), None).await, Verdict::NotFound);
        assert_eq!(lookup.calls(), 1);

        let entry = gate.cache().get("unknown.test").unwrap();
        assert!(entry.is_not_found());
        assert!(entry.expires_at - Instant::now() > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn test_unexpected_status_not_cached() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(503, "down", "max-age=60")));
        let gate = gate(&lookup);

        assert_eq!(
            gate.evaluate("example.com", &HeaderMap::new(), None).await,
            Verdict::UnexpectedStatus(503)
        );
        assert!(gate.cache().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_unavailable_fails_open() {
        let lookup = Arc::new(FakeLookup::unavailable());
        let gate = gate(&lookup);

        assert_eq!(
            gate.evaluate("example.com", &HeaderMap::new(), None).await,
            Verdict::LookupUnavailable
        );
        assert!(gate.cache().is_empty());
    }

    #[tokio::test]
    async fn test_host_variants_share_entry() {
        let lookup = Arc::new(FakeLookup::answering(LookupResponse::new(200, "uuid|", "")));
        let gate = gate(&lookup);

        gate.evaluate("Example.COM:8443", &HeaderMap::new(), None).await;
        gate.evaluate("example.com", &HeaderMap::new(), None).await;
        assert_eq!(lookup.calls(), 1);
        assert!(gate.cache().get("example.com").is_some());
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let config = LookupConfig {
            domain_id_header: "bad header".into(),
            ..LookupConfig::default()
        };
        let result = DomainGate::new(&config, Arc::new(FakeLookup::unavailable()));
        assert!(matches!(result, Err(GateError::InvalidHeaderName(_))));
    }

    #[test]
    fn test_zero_default_ttl_falls_back() {
        let config = LookupConfig {
            default_ttl_secs: 0,
            ..LookupConfig::default()
        };
        let gate = DomainGate::new(&config, Arc::new(FakeLookup::unavailable())).unwrap();
        assert_eq!(gate.default_ttl_secs(), 60);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.com:8080").as_deref(), Some("example.com"));
        assert_eq!(normalize_host("example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_host("  "), None);
        assert_eq!(normalize_host(":80").as_deref(), Some(":80"));
        assert_eq!(normalize_host("Bad Host").as_deref(), Some("bad host"));
    }
}
