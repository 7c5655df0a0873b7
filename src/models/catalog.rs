use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// CATEGORIES & LOCATIONS
// =============================================================================
// Lookup records referenced by products. Names and codes are unique.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Physical storage slot: code plus aisle / level / section
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub id: Uuid,

    /// Short code printed on the shelf, e.g. "A-03"
    pub code: String,

    pub aisle: String,
    pub level: String,
    pub section: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub code: String,
    pub aisle: String,
    pub level: String,
    pub section: Option<String>,
}
