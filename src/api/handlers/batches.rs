//! Batch handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::auth::Identity;
use crate::api::response::{ok, parse_id, ApiJson, ApiQuery, ApiResponse, ApiResult};
use crate::api::server::AppState;
use crate::error::Result;
use crate::models::{Batch, BatchFilter, BatchId, Role};
use crate::services::{BatchUpdate, NewBatch};

use super::Deleted;

pub async fn list_batches(
    State(state): State<AppState>,
    _identity: Identity,
    ApiQuery(filter): ApiQuery<BatchFilter>,
) -> ApiResult<Vec<Batch>> {
    ok(state.services.batches.list(&filter)?)
}

pub async fn create_batch(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(new): ApiJson<NewBatch>,
) -> Result<(StatusCode, Json<ApiResponse<Batch>>)> {
    identity.require(&[Role::Admin])?;
    let batch = state.services.batches.create(new)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(batch))))
}

pub async fn get_batch(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Batch> {
    ok(state.services.batches.get(parse_id(&id)?)?)
}

pub async fn update_batch(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<BatchUpdate>,
) -> ApiResult<Batch> {
    identity.require(&[Role::Admin])?;
    ok(state.services.batches.update(parse_id(&id)?, update)?)
}

pub async fn delete_batch(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    identity.require(&[Role::Admin])?;
    let id: BatchId = parse_id(&id)?;
    state.services.batches.delete(id).await?;
    ok(Deleted::new(id))
}
