use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::time::Instant;

use crate::admin::AdminState;
use crate::lookup::gate::normalize_host;
use crate::lookup::CacheSummary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct PurgeResult {
    pub removed: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheSummary> {
    Json(state.cache.summary(Instant::now()))
}

pub async fn purge_cache(State(state): State<AdminState>) -> Json<PurgeResult> {
    let removed = state.cache.clear();
    tracing::info!(removed, "Cache purged via admin API");
    Json(PurgeResult { removed })
}

pub async fn evict_host(
    State(state): State<AdminState>,
    Path(host): Path<String>,
) -> Result<Json<PurgeResult>, StatusCode> {
    let key = normalize_host(&host).ok_or(StatusCode::BAD_REQUEST)?;
    if state.cache.remove(&key) {
        tracing::info!(host = %key, "Cache entry evicted via admin API");
        Ok(Json(PurgeResult { removed: 1 }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
