// =============================================================================
// EMPLOYEE HANDLERS (public)
// =============================================================================
// The views employees open from a product QR code. No session: a count is
// attributed through the employee code typed into the form.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{load_product, resolve_scanned_product};
use crate::db::Database;
use crate::email::DiscrepancyNotice;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::validation;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
}

/// GET /api/v1/employee/products?search=glove
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<Vec<ProductDetail>>> {
    Ok(Json(state.db.product_catalog(query.search.as_deref()).await?))
}

/// GET /api/v1/employee/products/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductDetail>> {
    Ok(Json(load_product(&state, id).await?))
}

/// POST /api/v1/employee/scan
pub async fn scan_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> AppResult<Json<ProductDetail>> {
    Ok(Json(resolve_scanned_product(&state, &req.payload).await?))
}

// -----------------------------------------------------------------------------
// SUBMIT A COUNT
// -----------------------------------------------------------------------------
/// POST /api/v1/employee/products/:id/verifications
///
/// # Request Body
/// ```json
/// { "employee_code": "48213", "physical_quantity": 9, "observations": "..." }
/// ```
///
/// # Response
/// - 201 Created: the stored verification, with `matches` computed
/// - 400 Bad Request: "Invalid employee code"
/// - 403 Forbidden: the employee account is deactivated
/// - 404 Not Found: no such product
pub async fn submit_verification(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<SubmitVerificationRequest>,
) -> AppResult<(StatusCode, Json<Verification>)> {
    let verification = record_count(&state.db, product_id, req).await?;

    metrics::record_verification(verification.matches);
    tracing::info!(
        verification_id = %verification.id,
        product_id = %product_id,
        employee_code = %verification.employee_code,
        system_quantity = verification.system_quantity,
        physical_quantity = verification.physical_quantity,
        matches = verification.matches,
        "Count submitted"
    );

    if !verification.matches {
        let state = state.clone();
        let verification = verification.clone();
        tokio::spawn(async move {
            if let Err(err) = notify_discrepancy(&state, &verification).await {
                tracing::warn!(
                    verification_id = %verification.id,
                    error = %err,
                    "Discrepancy notice not sent"
                );
            }
        });
    }

    Ok((StatusCode::CREATED, Json(verification)))
}

/// Validate a submitted count and store it
async fn record_count(
    db: &Database,
    product_id: Uuid,
    req: SubmitVerificationRequest,
) -> AppResult<Verification> {
    let employee_code = req.employee_code.trim().to_string();
    validation::validate_count(&employee_code, req.physical_quantity)?;

    let employee = db
        .find_employee_by_code(&employee_code)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid employee code".to_string()))?;

    if !employee.active {
        return Err(AppError::Forbidden(
            "Your employee account is deactivated".to_string(),
        ));
    }

    db.insert_verification(&NewVerification {
        product_id,
        physical_quantity: req.physical_quantity,
        observations: req.observations,
        employee_code,
        report_id: req.report_id,
    })
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

/// Email every active administrator about a mismatched count
async fn notify_discrepancy(state: &AppState, verification: &Verification) -> AppResult<()> {
    let product = state
        .db
        .get_product(verification.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let admin_emails: Vec<String> = state
        .db
        .active_admins()
        .await?
        .into_iter()
        .map(|admin| admin.email)
        .collect();

    let notice = DiscrepancyNotice {
        product_name: product.product.name,
        product_sku: product.product.sku,
        system_quantity: verification.system_quantity,
        physical_quantity: verification.physical_quantity,
        employee_code: verification.employee_code.clone(),
        observations: verification.observations.clone(),
        checked_at: verification.checked_at,
    };

    state.email.send_discrepancy(&notice, &admin_emails).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn setup(pool: PgPool) -> anyhow::Result<Database> {
        let db = Database::from_pool(pool);
        db.run_migrations().await?;
        Ok(db)
    }

    async fn employee(db: &Database, email: &str, code: &str) -> anyhow::Result<User> {
        let req = CreateUserRequest {
            role: UserRole::Employee,
            name: "Luis".to_string(),
            surname: None,
            email: email.to_string(),
            confirm_email: email.to_string(),
        };
        Ok(db.create_user(&req, "hash", Some(code)).await?)
    }

    async fn product(db: &Database, quantity: i32) -> anyhow::Result<Product> {
        let req = CreateProductRequest {
            sku: None,
            name: "Safety gloves".to_string(),
            brand: Some("Truper".to_string()),
            product_type: None,
            quantity,
            fragility: Fragility::NonFragile,
            category_id: None,
            location_id: None,
        };
        let (product, _) = db.create_or_merge_product(&req, "PROD-GLOVES").await?;
        Ok(product)
    }

    fn count(code: &str, physical_quantity: i32) -> SubmitVerificationRequest {
        SubmitVerificationRequest {
            employee_code: code.to_string(),
            physical_quantity,
            observations: None,
            report_id: None,
        }
    }

    #[sqlx::test(migrations = false)]
    async fn count_is_stored_against_current_stock(pool: PgPool) -> anyhow::Result<()> {
        let db = setup(pool).await?;
        employee(&db, "luis@citapp.com", "48213").await?;
        let product = product(&db, 10).await?;

        let matched = record_count(&db, product.id, count(" 48213 ", 10)).await?;
        assert!(matched.matches);
        assert_eq!(matched.employee_code, "48213");

        let short = record_count(&db, product.id, count("48213", 7)).await?;
        assert!(!short.matches);
        assert_eq!(short.system_quantity, 10);
        assert_eq!(short.physical_quantity, 7);
        Ok(())
    }

    #[sqlx::test(migrations = false)]
    async fn unknown_employee_code_is_rejected(pool: PgPool) -> anyhow::Result<()> {
        let db = setup(pool).await?;
        let product = product(&db, 3).await?;

        let result = record_count(&db, product.id, count("99999", 3)).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        Ok(())
    }

    #[sqlx::test(migrations = false)]
    async fn deactivated_employee_is_forbidden(pool: PgPool) -> anyhow::Result<()> {
        let db = setup(pool).await?;
        let luis = employee(&db, "luis@citapp.com", "48213").await?;
        db.set_user_active(luis.id, false).await?;
        let product = product(&db, 3).await?;

        let result = record_count(&db, product.id, count("48213", 3)).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        Ok(())
    }

    #[sqlx::test(migrations = false)]
    async fn count_of_missing_product_is_not_found(pool: PgPool) -> anyhow::Result<()> {
        let db = setup(pool).await?;
        employee(&db, "luis@citapp.com", "48213").await?;

        let result = record_count(&db, Uuid::new_v4(), count("48213", 3)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        Ok(())
    }

    #[sqlx::test(migrations = false)]
    async fn malformed_count_fails_validation(pool: PgPool) -> anyhow::Result<()> {
        let db = setup(pool).await?;
        let product = product(&db, 3).await?;

        let result = record_count(&db, product.id, count("4821", -1)).await;
        match result {
            Err(AppError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected a validation error, got {other:?}"),
        }
        Ok(())
    }
}
