//! Health, metrics and sync handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;

use crate::api::auth::Identity;
use crate::api::response::{ok, ApiResult};
use crate::api::server::AppState;
use crate::error::Error;
use crate::metrics;
use crate::models::Role;
use crate::sync::{SyncOutcome, TriggerStatus};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sync_enabled: bool,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    ok(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sync_enabled: state.sync.is_some(),
    })
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("failed to encode metrics: {e}"),
        ),
    }
}

fn sync_disabled() -> Error {
    Error::validation("CRM sync is not enabled")
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<SyncOutcome> {
    identity.require(&[Role::Admin])?;
    let trigger = state.sync.as_ref().ok_or_else(sync_disabled)?;
    ok(trigger.trigger_now().await?)
}

pub async fn sync_status(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<TriggerStatus> {
    identity.require(&[Role::Admin])?;
    let trigger = state.sync.as_ref().ok_or_else(sync_disabled)?;
    ok(trigger.status().await)
}
