use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::LifecycleError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    // Текст ошибки драйвера клиенту не отдаем
    #[error("Database error")]
    Store(#[from] StoreError),
    #[error("Internal server error")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    success: bool,
    message: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Lifecycle(LifecycleError::InvalidInitialStatus(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Lifecycle(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(e) => tracing::error!("store error: {:?}", e),
            AppError::Internal(detail) => tracing::error!("internal error: {}", detail),
            other => tracing::debug!("request rejected: {}", other),
        }
        let body = ApiError { success: false, message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_do_not_leak_driver_text() {
        let err = AppError::from(StoreError::Unavailable("connection refused on 10.0.0.3".into()));
        assert_eq!(err.to_string(), "Database error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lifecycle_rejections_map_to_conflict() {
        let err = AppError::from(LifecycleError::NotInTrash);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Event must be in trash before permanent deletion");
    }

    #[test]
    fn restored_initial_status_is_a_bad_request() {
        let err = AppError::from(LifecycleError::InvalidInitialStatus(crate::models::EventStatus::Restored));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
