use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{access::AccessDenied, caf::CafError};

/// AppError
///
/// The single error type returned by handlers. Each variant maps to one HTTP status;
/// the body is always `{ "error": "<message>" }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("identity provider error: {0}")]
    Identity(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Identity(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Constraint violations are the client's fault and keep their meaning; everything
    /// else is an internal error.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound;
        }
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some("23505") => return AppError::Conflict("record already exists".into()),
                Some("23503") => return AppError::BadRequest("referenced record does not exist".into()),
                Some("23514") => return AppError::BadRequest("value violates a check constraint".into()),
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl From<AccessDenied> for AppError {
    fn from(denied: AccessDenied) -> Self {
        tracing::warn!(%denied, "access denied");
        AppError::Forbidden
    }
}

impl From<CafError> for AppError {
    fn from(err: CafError) -> Self {
        match err {
            CafError::NotAssignee | CafError::SelfReview => AppError::Forbidden,
            CafError::EmptySignature => AppError::BadRequest(err.to_string()),
            CafError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details are logged, never sent.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                "internal error".to_string()
            }
            AppError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                "internal error".to_string()
            }
            AppError::Identity(e) => {
                tracing::error!("identity provider error: {}", e);
                "identity provider unavailable".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
