//! Service-level error taxonomy.
//!
//! Every failure that crosses the core boundary is a [`ServiceError`] tagged
//! with one [`ErrorKind`]. Operations that can fail for several reasons at
//! once return [`ServiceErrors`]; the first entry decides the outward status.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::store::StoreError;

/// Closed set of error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Default human title for this kind.
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Internal => "Internal Server Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A single classified failure: `{code, source, title, message}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub kind: ErrorKind,
    /// Component that raised the error, e.g. `auth::login`.
    pub source: &'static str,
    pub title: Cow<'static, str>,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, source: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            title: Cow::Borrowed(kind.title()),
            message: message.into(),
        }
    }

    /// Override the default title.
    pub fn titled(mut self, title: impl Into<Cow<'static, str>>) -> Self {
        self.title = title.into();
        self
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, source, message)
    }

    pub fn unauthorized(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, source, message)
    }

    pub fn forbidden(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, source, message)
    }

    pub fn conflict(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, source, message)
    }

    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, source, message)
    }

    pub fn internal(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, source, message)
    }

    /// Generic failure produced by the transaction orchestrator.
    pub fn transaction_failed(source: &'static str, message: impl Into<String>) -> Self {
        Self::internal(source, message).titled("Transaction Failed")
    }

    /// Classify a repository error raised inside `source`.
    pub fn from_store(source: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => Self::not_found(source, m),
            StoreError::Conflict(m) => Self::conflict(source, m),
            StoreError::Storage(m) => Self::internal(source, m).titled("Database Error"),
            StoreError::Db(e) => Self::internal(source, e.to_string()).titled("Database Error"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn is_transaction_failure(&self) -> bool {
        self.kind == ErrorKind::Internal && self.title == "Transaction Failed"
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// Non-empty, ordered list of errors returned together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceErrors(Vec<ServiceError>);

impl ServiceErrors {
    pub fn new(first: ServiceError) -> Self {
        Self(vec![first])
    }

    /// Wrap a repository failure and append the generic internal marker
    /// naming the repository call that failed.
    pub fn wrapped(source: &'static str, err: StoreError, operation: &str) -> Self {
        Self(vec![
            ServiceError::from_store(source, err),
            ServiceError::internal(
                source,
                format!("Something went wrong with {operation} repository"),
            ),
        ])
    }

    pub fn push(&mut self, err: ServiceError) {
        self.0.push(err);
    }

    pub fn with(mut self, err: ServiceError) -> Self {
        self.0.push(err);
        self
    }

    /// The error that decides the outward status.
    pub fn primary(&self) -> &ServiceError {
        &self.0[0]
    }

    pub fn kind(&self) -> ErrorKind {
        self.primary().kind
    }

    pub fn status_code(&self) -> u16 {
        self.primary().status_code()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_vec(self) -> Vec<ServiceError> {
        self.0
    }
}

impl From<ServiceError> for ServiceErrors {
    fn from(err: ServiceError) -> Self {
        Self::new(err)
    }
}

impl IntoIterator for ServiceErrors {
    type Item = ServiceError;
    type IntoIter = std::vec::IntoIter<ServiceError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ServiceErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceErrors {}

/// Result alias for operations that may report several errors.
pub type ServiceResult<T> = Result<T, ServiceErrors>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_statuses() {
        assert_eq!(ErrorKind::BadRequest.status_code(), 400);
        assert_eq!(ErrorKind::Unauthorized.status_code(), 401);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
    }

    #[test]
    fn wrapped_store_error_keeps_precise_cause_first() {
        let errs = ServiceErrors::wrapped(
            "user::create",
            StoreError::Conflict("email taken".into()),
            "createUser",
        );
        assert_eq!(errs.len(), 2);
        assert_eq!(errs.kind(), ErrorKind::Conflict);
        assert_eq!(errs.status_code(), 409);
        let all = errs.into_vec();
        assert_eq!(all[1].kind, ErrorKind::Internal);
        assert!(all[1].message.contains("createUser"));
    }

    #[test]
    fn transaction_failed_is_internal_with_distinct_title() {
        let err = ServiceError::transaction_failed("tx", "boom");
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.is_transaction_failure());
        assert!(!ServiceError::internal("tx", "boom").is_transaction_failure());
    }

    #[test]
    fn display_joins_all_errors() {
        let errs = ServiceErrors::new(ServiceError::not_found("a", "x"))
            .with(ServiceError::internal("a", "y"));
        assert_eq!(errs.to_string(), "Not Found: x; Internal Server Error: y");
    }
}
