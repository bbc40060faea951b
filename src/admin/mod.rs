//! Admin API for inspecting and purging the lookup cache.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::lookup::TtlCache;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<TtlCache>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(cache: Arc<TtlCache>, api_key: &str) -> Self {
        Self {
            cache,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache).delete(purge_cache))
        .route("/admin/cache/{host}", delete(evict_host))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
