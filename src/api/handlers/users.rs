//! User handlers (admin only, except reading one's own record)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::auth::Identity;
use crate::api::response::{ok, parse_id, ApiJson, ApiQuery, ApiResponse, ApiResult};
use crate::api::server::AppState;
use crate::error::Result;
use crate::models::{Role, User, UserFilter, UserId};
use crate::services::{NewUser, UserUpdate};

use super::Deleted;

pub async fn list_users(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> ApiResult<Vec<User>> {
    identity.require(&[Role::Admin])?;
    ok(state.services.users.list(&filter)?)
}

pub async fn create_user(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(new): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<ApiResponse<User>>)> {
    identity.require(&[Role::Admin])?;
    let user = state.services.users.create(new)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn get_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let id: UserId = parse_id(&id)?;
    if !identity.is(id) {
        identity.require(&[Role::Admin])?;
    }
    ok(state.services.users.get(id)?)
}

pub async fn update_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> ApiResult<User> {
    identity.require(&[Role::Admin])?;
    ok(state.services.users.update(parse_id(&id)?, update)?)
}

pub async fn delete_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    identity.require(&[Role::Admin])?;
    let id: UserId = parse_id(&id)?;
    state.services.users.delete(id).await?;
    ok(Deleted::new(id))
}
