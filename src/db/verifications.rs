// =============================================================================
// INVENTORY VERIFICATIONS
// =============================================================================
// Insert-only. The system quantity is snapshotted from the product row by the
// insert itself so a count always compares against the stock at that moment.
// =============================================================================

use std::time::Instant;

use uuid::Uuid;

use super::{observe, trimmed, Database};
use crate::error::AppResult;
use crate::models::{DashboardStats, NewVerification, Verification, VerificationDetail};

const VERIFICATION_COLUMNS: &str = r#"
    id, product_id, system_quantity, physical_quantity, matches,
    observations, employee_code, report_id, checked_at, created_at
"#;

const DETAIL_SELECT: &str = r#"
    SELECT v.id, v.product_id, v.system_quantity, v.physical_quantity, v.matches,
           v.observations, v.employee_code, v.report_id, v.checked_at, v.created_at,
           p.name AS product_name,
           p.sku AS product_sku
    FROM inventory_verifications v
    LEFT JOIN products p ON p.id = v.product_id
"#;

impl Database {
    /// Record a physical count
    ///
    /// # Returns
    /// `None` when the product doesn't exist
    pub async fn insert_verification(
        &self,
        new: &NewVerification,
    ) -> AppResult<Option<Verification>> {
        let started = Instant::now();
        let verification = sqlx::query_as::<_, Verification>(&format!(
            r#"
            INSERT INTO inventory_verifications
                (product_id, system_quantity, physical_quantity, matches,
                 observations, employee_code, report_id)
            SELECT p.id, p.quantity, $2, p.quantity = $2, $3, $4, $5
            FROM products p
            WHERE p.id = $1
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(new.product_id)
        .bind(new.physical_quantity)
        .bind(trimmed(new.observations.as_deref()))
        .bind(&new.employee_code)
        .bind(trimmed(new.report_id.as_deref()))
        .fetch_optional(&self.pool)
        .await?;

        observe("insert", started);
        Ok(verification)
    }

    /// Counts of one product, newest first
    pub async fn product_verifications(&self, product_id: Uuid) -> AppResult<Vec<VerificationDetail>> {
        let rows = sqlx::query_as::<_, VerificationDetail>(&format!(
            "{DETAIL_SELECT} WHERE v.product_id = $1 ORDER BY v.checked_at DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every count, newest first. Reports are built from this list.
    pub async fn all_verifications(&self) -> AppResult<Vec<VerificationDetail>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, VerificationDetail>(&format!(
            "{DETAIL_SELECT} ORDER BY v.checked_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        observe("select", started);
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // DASHBOARD
    // -------------------------------------------------------------------------
    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products) AS total_products,
                (SELECT COUNT(*) FROM products WHERE quantity > 0) AS available_products,
                (SELECT COUNT(*) FROM inventory_verifications) AS total_verifications,
                (SELECT COUNT(*) FROM inventory_verifications WHERE NOT matches) AS total_discrepancies
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}
