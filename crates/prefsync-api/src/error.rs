use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prefsync_core::SyncError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Sync session not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Sync session was modified concurrently")]
    Conflict,
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Message sent to the client. Server-side failures never leak their cause.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Failed to update sync session".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::SessionNotFound => Self::NotFound,
            SyncError::Conflict { .. } => Self::Conflict,
            SyncError::Store(error) => Self::internal(error.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use prefsync_core::Error as CoreError;

    use super::*;

    #[test]
    fn store_failures_do_not_leak_details() {
        let error = AppError::from(SyncError::Store(CoreError::Store(
            "connection refused to 10.0.0.7:6379".to_string(),
        )));
        assert_eq!(error.public_message(), "Failed to update sync session");
        assert!(error.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn sync_errors_map_to_status_codes() {
        let not_found = AppError::from(SyncError::SessionNotFound).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = AppError::from(SyncError::Conflict { attempts: 3 }).into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let internal =
            AppError::from(SyncError::Store(CoreError::Api("boom".to_string()))).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
