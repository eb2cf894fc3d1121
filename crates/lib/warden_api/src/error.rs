//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use warden_core::auth::AuthRejection;
use warden_core::error::{ErrorKind, ServiceError, ServiceErrors};
use warden_core::store::StoreError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Handler error: one or more classified service errors.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AppError(pub ServiceErrors);

impl AppError {
    /// Repository failure raised in a handler. Expected outcomes stay
    /// single; anything else gets the generic internal marker appended.
    pub fn from_store(source: &'static str, operation: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::Conflict(_) => {
                AppError(ServiceError::from_store(source, err).into())
            }
            other => AppError(ServiceErrors::wrapped(source, other, operation)),
        }
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        AppError(ServiceError::bad_request(source, message).into())
    }
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    code: u16,
    source: &'a str,
    title: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    errors: Vec<ErrorRecord<'a>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.0.kind() == ErrorKind::Internal {
            error!(errors = %self.0, "request failed");
        }
        let body = ErrorEnvelope {
            success: false,
            errors: self
                .0
                .iter()
                .map(|e| ErrorRecord {
                    code: e.status_code(),
                    source: e.source,
                    title: &e.title,
                    message: &e.message,
                })
                .collect(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceErrors> for AppError {
    fn from(e: ServiceErrors) -> Self {
        AppError(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError(e.into())
    }
}

impl From<AuthRejection> for AppError {
    fn from(e: AuthRejection) -> Self {
        AppError(e.to_service_error().into())
    }
}
