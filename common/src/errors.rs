//! Application error types.
//!
//! Every failure is scoped to a single request. Parameter errors map to
//! `400`, connection and execution errors to `500`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// PostgreSQL SQLSTATE: relation does not exist.
const UNDEFINED_TABLE: &str = "42P01";
/// PostgreSQL SQLSTATE: relation already exists.
const DUPLICATE_TABLE: &str = "42P07";
/// PostgreSQL SQLSTATE: unique constraint violated.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// A mandatory request parameter is absent or empty.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// A table or column name is not a plain SQL identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A column list or column type mapping is unusable.
    #[error("Invalid column specification: {0}")]
    InvalidColumnSpec(String),

    /// A filter condition is outside the supported predicate subset.
    #[error("Invalid condition: {0}")]
    InvalidPredicate(String),

    /// Request payload failed field validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The target database could not be reached or refused the login.
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Operation on a table that does not exist (or already exists).
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Any other statement failure.
    #[error("Database error: {0}")]
    ExecutionError(String),

    /// The package registry is unavailable or does not know the package.
    #[error("Package lookup failed: {0}")]
    ExternalLookupError(String),

    /// The operation exceeded its time budget.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingParameter(_) => "MISSING_PARAMETER",
            AppError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            AppError::InvalidColumnSpec(_) => "INVALID_COLUMN_SPEC",
            AppError::InvalidPredicate(_) => "INVALID_CONDITION",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ConnectionError(_) => "CONNECTION_ERROR",
            AppError::SchemaError(_) => "SCHEMA_ERROR",
            AppError::ExecutionError(_) => "EXECUTION_ERROR",
            AppError::ExternalLookupError(_) => "EXTERNAL_LOOKUP_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingParameter(_)
            | AppError::InvalidIdentifier(_)
            | AppError::InvalidColumnSpec(_)
            | AppError::InvalidPredicate(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            // unknown packages are a caller problem, the legacy API answered 400
            AppError::ExternalLookupError(_) => StatusCode::BAD_REQUEST,
            AppError::ConnectionError(_)
            | AppError::SchemaError(_)
            | AppError::ExecutionError(_)
            | AppError::Timeout(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classifies a statement failure.
    pub fn from_statement(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some(UNDEFINED_TABLE) | Some(DUPLICATE_TABLE) => {
                    return AppError::SchemaError(db_err.message().to_string());
                }
                _ => return AppError::ExecutionError(db_err.message().to_string()),
            }
        }
        AppError::ExecutionError(err.to_string())
    }
}

/// Returns true when `err` is a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::from_statement(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "请求失败");
        } else {
            tracing::debug!(code = self.code(), error = %self, "请求参数无效");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_errors_are_bad_request() {
        assert_eq!(
            AppError::MissingParameter("host".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidIdentifier("a b".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidColumnSpec("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_database_errors_are_server_errors() {
        assert_eq!(
            AppError::ConnectionError("refused".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::SchemaError("missing".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Timeout(5).code(), "TIMEOUT");
    }

    #[test]
    fn test_non_database_sqlx_error_is_execution_error() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::ExecutionError(_)));
    }

    #[test]
    fn test_message_keeps_driver_text() {
        let err = AppError::ConnectionError("password authentication failed".into());
        assert_eq!(
            err.to_string(),
            "Database connection failed: password authentication failed"
        );
    }
}
