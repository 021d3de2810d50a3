//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::dispatch::DispatchStatsSnapshot;
use crate::ingest::IngestStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub subscriptions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub subscriptions: usize,
    pub dispatch: DispatchStatsSnapshot,
    pub ingest: IngestStatsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        subscriptions: state.registry.count().await,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        subscriptions: state.registry.count().await,
        dispatch: state.engine.stats(),
        ingest: state.ingester.stats(),
    })
}
