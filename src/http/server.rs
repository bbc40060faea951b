//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing, timeout, metrics, domain lookup)
//! - Forward admitted requests to the upstream
//! - Apply config reloads to the live gate
//! - Start the admin API when enabled

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::{LookupConfig, ProxyConfig};
use crate::http::middleware::{domain_lookup_middleware, SharedGate, VerdictLabel};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::recv_shutdown;
use crate::lookup::{DomainGate, GateError, HttpLookupClient, TtlCache};
use crate::observability::metrics;

/// Errors raised while building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("invalid upstream address '{0}'")]
    InvalidUpstream(String),
}

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    gate: SharedGate<HttpLookupClient>,
    cache: Arc<TtlCache>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let cache = Arc::new(TtlCache::new());
        let gate = DomainGate::from_config(&config.lookup, cache.clone())?;
        let gate: SharedGate<HttpLookupClient> = Arc::new(ArcSwap::from_pointee(gate));

        let upstream: Authority = config
            .upstream
            .address
            .parse()
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { client, upstream };

        let router = Self::build_router(&config, state, gate.clone());
        Ok(Self {
            router,
            config,
            gate,
            cache,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, gate: SharedGate<HttpLookupClient>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(from_fn_with_state(gate, domain_lookup_middleware::<HttpLookupClient>))
            .layer(from_fn(track_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configuration updates received on `config_updates` are applied to the
    /// lookup gate without dropping connections.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.config.admin.enabled {
            self.spawn_admin(shutdown.resubscribe()).await;
        }

        let gate = self.gate.clone();
        let cache = self.cache.clone();
        let mut current = self.config.lookup.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(new_config) = update else { break };
                        match apply_lookup_config(&gate, &cache, &current, &new_config.lookup) {
                            Ok(()) => current = new_config.lookup,
                            Err(e) => tracing::error!(error = %e, "Failed to apply lookup config, keeping current"),
                        }
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(recv_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    async fn spawn_admin(&self, shutdown: broadcast::Receiver<()>) {
        let admin = &self.config.admin;
        let listener = match TcpListener::bind(&admin.bind_address).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(address = %admin.bind_address, error = %e, "Failed to bind admin listener");
                return;
            }
        };

        let router = setup_admin_router(AdminState::new(self.cache.clone(), &admin.api_key));
        tracing::info!(address = %admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(recv_shutdown(shutdown))
                .await
            {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The lookup cache shared by all requests.
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }
}

/// Swap in a gate built from `new`, keeping the cache.
///
/// Cached answers are dropped when the lookup endpoint itself changes. The
/// cache is cleared before the swap so no request on the new gate can see an
/// old-endpoint answer from before the reload. Requests already in flight on
/// the old gate may still store their answer afterwards; that entry lives at
/// most its own TTL.
pub fn apply_lookup_config(
    gate: &SharedGate<HttpLookupClient>,
    cache: &Arc<TtlCache>,
    current: &LookupConfig,
    new: &LookupConfig,
) -> Result<(), GateError> {
    if current == new {
        return Ok(());
    }

    let next = DomainGate::from_config(new, cache.clone())?;

    if current.service_url != new.service_url || current.url_path != new.url_path {
        let dropped = cache.clear();
        tracing::info!(dropped, "Lookup endpoint changed, cache cleared");
    }
    gate.store(Arc::new(next));
    tracing::info!(
        default_ttl_secs = new.default_ttl_secs,
        domain_id_header = %new.domain_id_header,
        "Lookup configuration reloaded"
    );
    Ok(())
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    let verdict = response
        .extensions()
        .get::<VerdictLabel>()
        .map(|v| v.0)
        .unwrap_or("none");
    metrics::record_request(&method, response.status().as_u16(), verdict, start);
    response
}

/// Forward an admitted request to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(request.headers()).to_string();
    let (mut parts, body) = request.into_parts();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Forwarding request"
    );

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };
    parts.version = Version::HTTP_11;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
