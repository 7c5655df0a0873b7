// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures shared by the database layer and the HTTP handlers.
//
// - Row structs derive FromRow so SQLx can map query results onto them
// - Request structs are separate from rows so the API shape can differ from
//   the table shape (and so server-owned fields can't be sent by clients)
// =============================================================================

mod auth;
mod catalog;
mod product;
mod user;
mod verification;

pub use auth::*;
pub use catalog::*;
pub use product::*;
pub use user::*;
pub use verification::*;

use serde::{Deserialize, Serialize};

// =============================================================================
// PAGINATION
// =============================================================================

/// A page of results with the metadata a list view needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Total matching rows across all pages
    pub total: i64,

    pub page: i32,
    pub per_page: i32,
}

pub fn default_page() -> i32 {
    1
}

pub fn default_per_page() -> i32 {
    20
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
    pub redis: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// A validation failure tied to one input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Field-level validation errors, when the request failed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: Vec<FieldError>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
