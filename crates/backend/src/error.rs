use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use persistence::PersistError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Handler error; rendered as `{"error": message}` with a matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::StaleWrite { stored, attempted, .. } => {
                ApiError::Conflict(format!("stale save: version {attempted} is not newer than {stored}"))
            }
            PersistError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            PersistError::Invalid(v) => ApiError::BadRequest(v.to_string()),
            e @ (PersistError::VersionOutOfRange(_) | PersistError::InvalidSlot(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            other => {
                error!(error = %other, "storage failure");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
