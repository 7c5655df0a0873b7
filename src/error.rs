// =============================================================================
// ERROR MODULE
// =============================================================================
// Custom error types and their HTTP responses.
//
// - Every handler returns AppResult<T>; errors become JSON responses through
//   the IntoResponse impl below
// - A few storage errors are recognised and turned into friendly messages:
//   unique-constraint and foreign-key violations, expired sessions
// - Everything else falls back to a generic message; internal details are
//   logged, never returned
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{ErrorResponse, FieldError};

/// Postgres SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Postgres SQLSTATE for foreign_key_violation
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // INFRASTRUCTURE ERRORS
    // -------------------------------------------------------------------------
    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis operation failed
    #[error("Cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Outbound HTTP call (email, OAuth, QR images) failed
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    /// Session token rejected (bad signature, expired, malformed)
    #[error("Invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    // -------------------------------------------------------------------------
    // BUSINESS LOGIC ERRORS
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Input failed field validation
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A third-party service answered but refused the request
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Feature disabled by configuration
    #[error("Unavailable: {0}")]
    Unavailable(String),

    // -------------------------------------------------------------------------
    // INTERNAL ERRORS
    // -------------------------------------------------------------------------
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a single-field validation failure
    pub fn invalid(field: &str, message: &str) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    /// Status, machine-readable code and user-facing message for this error
    pub fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "The requested record does not exist".to_string(),
            ),
            AppError::Database(err) => match pg_error_code(err).as_deref() {
                Some(code) => classify_pg_code(code),
                None => database_failure(),
            },

            AppError::Redis(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                "A cache error occurred".to_string(),
            ),

            AppError::Http(_) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "An external service could not be reached".to_string(),
            ),

            AppError::Hashing(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An unexpected error occurred".to_string(),
            ),

            AppError::Token(_) => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session expired. Please sign in again".to_string(),
            ),

            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),

            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }

            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),

            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),

            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
            }

            // IMPORTANT: Don't expose internal details
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An unexpected error occurred".to_string(),
            ),
        }
    }
}

/// SQLSTATE of a database error, if the driver reported one
fn pg_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn classify_pg_code(code: &str) -> (StatusCode, &'static str, String) {
    match code {
        PG_UNIQUE_VIOLATION => (
            StatusCode::CONFLICT,
            "DUPLICATE",
            "A record with that data already exists".to_string(),
        ),
        PG_FOREIGN_KEY_VIOLATION => (
            StatusCode::CONFLICT,
            "IN_USE",
            "Cannot delete because it is in use".to_string(),
        ),
        _ => database_failure(),
    }
}

fn database_failure() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "DATABASE_ERROR",
        "A database error occurred".to_string(),
    )
}

/// True when `err` is a unique violation of the named constraint.
/// Code generators use this to tell a code collision from other duplicates.
pub fn is_unique_violation_of(err: &AppError, constraint: &str) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db_err)) => {
            db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
                && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.classify();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = match self {
            AppError::Validation(details) => {
                ErrorResponse::with_details(error_code, message, details)
            }
            _ => ErrorResponse::new(error_code, message),
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// RESULT TYPE ALIAS
// =============================================================================
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    #[test]
    fn unique_violation_becomes_conflict() {
        let (status, code, message) = classify_pg_code("23505");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "DUPLICATE");
        assert_eq!(message, "A record with that data already exists");
    }

    #[test]
    fn foreign_key_violation_becomes_in_use() {
        let (status, code, message) = classify_pg_code("23503");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "IN_USE");
        assert_eq!(message, "Cannot delete because it is in use");
    }

    #[test]
    fn other_database_codes_are_generic() {
        let (status, code, _) = classify_pg_code("42P01");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "DATABASE_ERROR");

        let (status, _, _) = AppError::Database(sqlx::Error::PoolTimedOut).classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn expired_token_asks_to_sign_in_again() {
        let err = AppError::from(jsonwebtoken::errors::Error::from(
            ErrorKind::ExpiredSignature,
        ));
        let (status, code, message) = err.classify();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "SESSION_EXPIRED");
        assert!(message.contains("sign in again"));
    }

    #[test]
    fn validation_joins_field_messages() {
        let err = AppError::Validation(vec![
            FieldError::new("name", "Name is required"),
            FieldError::new("quantity", "Quantity cannot be negative"),
        ]);
        let (status, code, message) = err.classify();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
        assert_eq!(message, "Name is required, Quantity cannot be negative");
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AppError::Internal("connection string postgres://secret".to_string());
        let (_, _, message) = err.classify();
        assert!(!message.contains("secret"));
    }
}
