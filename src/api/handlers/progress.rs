//! Section completion handlers

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::api::auth::Identity;
use crate::api::response::{ok, parse_id, ApiJson, ApiQuery, ApiResult};
use crate::api::server::AppState;
use crate::error::{Error, Result};
use crate::models::{CourseId, Progress, Role, SectionId, UserId};

/// Body of `PUT /api/progress/{course_id}`.
///
/// The section is addressed either by `section_id` or by the
/// `module_index`/`section_index` pair.
#[derive(Debug, Deserialize)]
pub struct SectionCompletionRequest {
    /// Required for admins, defaults to the caller for students
    #[serde(default)]
    pub student_id: Option<UserId>,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(default)]
    pub module_index: Option<usize>,
    #[serde(default)]
    pub section_index: Option<usize>,
    pub is_completed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProgressQuery {
    pub student: Option<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProgressView {
    One(Progress),
    All(Vec<Progress>),
}

/// Resolve whose progress a caller may write
fn target_student(identity: &Identity, requested: Option<UserId>) -> Result<UserId> {
    match identity.role {
        Role::Student => {
            let own = identity.own_id()?;
            match requested {
                Some(other) if other != own => {
                    Err(Error::forbidden("students may only access their own progress"))
                }
                _ => Ok(own),
            }
        }
        _ => requested.ok_or_else(|| Error::validation("student_id is required")),
    }
}

pub async fn set_section_completion(
    State(state): State<AppState>,
    identity: Identity,
    Path(course_id): Path<String>,
    ApiJson(request): ApiJson<SectionCompletionRequest>,
) -> ApiResult<Progress> {
    identity.require(&[Role::Student, Role::Admin])?;
    let course_id: CourseId = parse_id(&course_id)?;
    let student = target_student(&identity, request.student_id)?;
    let tracker = &state.services.progress;

    let progress = match (request.section_id, request.module_index, request.section_index) {
        (Some(section), None, None) => {
            tracker
                .set_section_completion_by_id(student, course_id, section, request.is_completed)
                .await?
        }
        (None, Some(module_index), Some(section_index)) => {
            tracker
                .set_section_completion(
                    student,
                    course_id,
                    module_index,
                    section_index,
                    request.is_completed,
                )
                .await?
        }
        _ => {
            return Err(Error::validation(
                "provide either section_id or both module_index and section_index",
            ))
        }
    };

    ok(progress)
}

pub async fn get_progress(
    State(state): State<AppState>,
    identity: Identity,
    Path(course_id): Path<String>,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> ApiResult<ProgressView> {
    let course_id: CourseId = parse_id(&course_id)?;
    let tracker = &state.services.progress;

    if identity.role == Role::Student {
        let student = target_student(&identity, query.student)?;
        return ok(ProgressView::One(tracker.get_progress(student, course_id)?));
    }

    identity.require_teaches(&state.services.courses.get(course_id)?)?;
    match query.student {
        Some(student) => ok(ProgressView::One(tracker.get_progress(student, course_id)?)),
        None => ok(ProgressView::All(tracker.list_course_progress(course_id)?)),
    }
}
