use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// INVENTORY VERIFICATION
// =============================================================================
/// One physical count submitted by an employee. Insert-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Verification {
    pub id: Uuid,
    pub product_id: Uuid,

    /// Product quantity recorded by the system when the count was submitted
    pub system_quantity: i32,

    /// Quantity the employee found on the shelf
    pub physical_quantity: i32,

    /// `system_quantity == physical_quantity`
    pub matches: bool,

    pub observations: Option<String>,
    pub employee_code: String,

    /// Optional client-supplied batch id grouping several counts
    pub report_id: Option<String>,

    pub checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A verification joined with the product it counted
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub verification: Verification,

    pub product_name: Option<String>,
    pub product_sku: Option<String>,
}

/// Request body an employee submits after counting a product
///
/// # Example JSON
/// ```json
/// {
///   "employee_code": "48213",
///   "physical_quantity": 9,
///   "observations": "Two boxes damaged"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitVerificationRequest {
    pub employee_code: String,
    pub physical_quantity: i32,
    pub observations: Option<String>,
    pub report_id: Option<String>,
}

/// Row to insert. The system quantity and `matches` are taken from the
/// product row inside the insert, never from the client.
#[derive(Debug, Clone)]
pub struct NewVerification {
    pub product_id: Uuid,
    pub physical_quantity: i32,
    pub observations: Option<String>,
    pub employee_code: String,
    pub report_id: Option<String>,
}

// =============================================================================
// REPORTS
// =============================================================================
// Reports are not stored: they are groups of verifications computed on read
// (see `reports::group_verifications`).

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    /// Sequential id, "1" being the oldest report
    pub id: String,
    pub employee_code: String,

    /// Timestamp of the most recent count in the group
    pub date: DateTime<Utc>,

    pub total_products: usize,
    pub total_discrepancies: usize,
    pub verifications: Vec<VerificationDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilters {
    /// Substring of the employee code or the RFC 3339 date
    pub search: Option<String>,
}

// =============================================================================
// DASHBOARD
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_products: i64,

    /// Products with quantity > 0
    pub available_products: i64,

    pub total_verifications: i64,
    pub total_discrepancies: i64,
}
