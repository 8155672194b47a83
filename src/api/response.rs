//! Response envelope and request extractors
//!
//! Every response body is `{success, data?, error?}`. Errors are mapped to a
//! status code by their [`ErrorCategory`].

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{EdutrackErrorTrait, Error, ErrorCategory};

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler result: a JSON envelope on both paths
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, Error>;

/// Wrap a value in a success envelope
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// HTTP status for an error category
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCategory::Forbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(self.category());
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(ApiResponse::error(self.user_message()))).into_response()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// `Json` whose rejections use the error envelope
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| Error::validation(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections use the error envelope
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| Error::validation(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Parse an identifier taken from the request path
pub fn parse_id<T>(raw: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| Error::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseId;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorCategory::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCategory::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCategory::Network), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_envelope() {
        let response = Error::not_found("course", "x").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = serde_json::to_value(ApiResponse::error("nope")).unwrap();
        assert_eq!(body, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn test_parse_id() {
        let id = CourseId::new();
        assert_eq!(parse_id::<CourseId>(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_id::<CourseId>("x"), Err(Error::Validation(_))));
    }
}
