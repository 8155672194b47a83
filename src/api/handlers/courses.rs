//! Course, enrollment and reconciliation handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::auth::Identity;
use crate::api::response::{ok, parse_id, ApiJson, ApiQuery, ApiResponse, ApiResult};
use crate::api::server::AppState;
use crate::enrollment::PaymentUpdate;
use crate::error::{Error, Result};
use crate::models::{BatchId, Course, CourseFilter, CourseId, Enrollment, Role, UserId};
use crate::progress::{CourseReport, ReconcileReport};
use crate::services::{CourseUpdate, NewCourse};

use super::Deleted;

/// Body of `POST /api/courses/{id}/enroll`
#[derive(Debug, Default, Deserialize)]
pub struct EnrollRequest {
    /// Defaults to the caller for students
    #[serde(default)]
    pub student_id: Option<UserId>,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
}

pub async fn list_courses(
    State(state): State<AppState>,
    _identity: Identity,
    ApiQuery(filter): ApiQuery<CourseFilter>,
) -> ApiResult<Vec<Course>> {
    ok(state.services.courses.list(&filter)?)
}

pub async fn create_course(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(new): ApiJson<NewCourse>,
) -> Result<(StatusCode, Json<ApiResponse<Course>>)> {
    identity.require(&[Role::Admin, Role::Instructor])?;
    let course = state.services.courses.create(new)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(course))))
}

pub async fn get_course(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Course> {
    ok(state.services.courses.get(parse_id(&id)?)?)
}

pub async fn update_course(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<CourseUpdate>,
) -> ApiResult<Course> {
    identity.require(&[Role::Admin, Role::Instructor])?;
    let id: CourseId = parse_id(&id)?;
    identity.require_teaches(&state.services.courses.get(id)?)?;
    ok(state.services.courses.update(id, update).await?)
}

pub async fn delete_course(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    identity.require(&[Role::Admin])?;
    let id: CourseId = parse_id(&id)?;
    state.services.courses.delete(id).await?;
    ok(Deleted::new(id))
}

// ============================================================================
// Enrollment
// ============================================================================

pub async fn enroll(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<EnrollRequest>,
) -> ApiResult<Enrollment> {
    let course_id: CourseId = parse_id(&id)?;

    let student = match identity.role {
        Role::Student => {
            let own = identity.own_id()?;
            if request.student_id.is_some_and(|s| s != own) {
                return Err(Error::forbidden("students may only enroll themselves"));
            }
            own
        }
        Role::Instructor | Role::Admin => {
            identity.require_teaches(&state.services.courses.get(course_id)?)?;
            request
                .student_id
                .ok_or_else(|| Error::validation("student_id is required"))?
        }
    };

    ok(state
        .services
        .enrollment
        .enroll(student, course_id, request.batch_id)
        .await?)
}

pub async fn unenroll(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, student)): Path<(String, String)>,
) -> ApiResult<Enrollment> {
    identity.require(&[Role::Admin])?;
    ok(state
        .services
        .enrollment
        .unenroll(parse_id(&student)?, parse_id(&id)?)
        .await?)
}

pub async fn record_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, student)): Path<(String, String)>,
    ApiJson(update): ApiJson<PaymentUpdate>,
) -> ApiResult<Enrollment> {
    identity.require(&[Role::Admin])?;
    ok(state
        .services
        .enrollment
        .record_payment(parse_id(&student)?, parse_id(&id)?, update)
        .await?)
}

// ============================================================================
// Completion
// ============================================================================

pub async fn reconcile(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<ReconcileReport> {
    identity.require(&[Role::Admin, Role::Instructor])?;
    let id: CourseId = parse_id(&id)?;
    identity.require_teaches(&state.services.courses.get(id)?)?;
    ok(state.services.reconciler.reconcile(id).await?)
}

pub async fn course_report(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<CourseReport> {
    identity.require(&[Role::Admin, Role::Instructor])?;
    let id: CourseId = parse_id(&id)?;
    identity.require_teaches(&state.services.courses.get(id)?)?;
    ok(state.services.progress.course_report(id)?)
}
