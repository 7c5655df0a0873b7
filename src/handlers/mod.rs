// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer), one submodule per area:
//
// - auth.rs       sign-in, Google OAuth, session, sign-out, password recovery
// - products.rs   admin product management, QR codes, labels
// - catalog.rs    categories and locations
// - users.rs      admin account management and the caller's own profile
// - reports.rs    dashboard numbers and discrepancy reports
// - employee.rs   public product lookup and count submission
//
// Handlers validate input, call the database layer and return JSON; every
// failure is an AppError, which renders itself as the JSON error body.
// =============================================================================

pub mod auth;
pub mod catalog;
pub mod employee;
pub mod products;
pub mod reports;
pub mod users;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::qr::{self, ScanTarget};
use crate::AppState;

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness check
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "citapp-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check: database and Redis must both answer
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let db_healthy = state.db.health_check().await;
    let redis_healthy = state.cache.ping().await;

    let all_healthy = db_healthy && redis_healthy;
    let response = ReadinessResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            database: db_healthy,
            redis: redis_healthy,
        },
    };

    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

// =============================================================================
// METRICS ENDPOINT
// =============================================================================
/// Prometheus exposition text
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Page number >= 1 and page size within 1..=100
fn clamp_page(page: i32, per_page: i32) -> (i32, i32) {
    (page.max(1), per_page.clamp(1, 100))
}

/// Product with relations, served from the cache when possible
async fn load_product(state: &AppState, id: Uuid) -> AppResult<ProductDetail> {
    if let Some(product) = state.cache.get_product(id).await {
        return Ok(product);
    }

    let product = state
        .db
        .get_product(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    state.cache.put_product(&product).await;
    Ok(product)
}

/// Product referenced by decoded QR text
async fn resolve_scanned_product(state: &AppState, payload: &str) -> AppResult<ProductDetail> {
    let not_found = || AppError::NotFound("Product not found".to_string());

    match qr::resolve_scan(payload).ok_or_else(not_found)? {
        ScanTarget::Id(id) => load_product(state, id).await,
        ScanTarget::Sku(sku) => state.db.find_product_by_sku(&sku).await?.ok_or_else(not_found),
    }
}

/// `application/pdf` download response
fn pdf_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(clamp_page(0, 0), (1, 1));
        assert_eq!(clamp_page(-3, 500), (1, 100));
        assert_eq!(clamp_page(4, 20), (4, 20));
    }

    #[test]
    fn pdf_responses_are_attachments() {
        let response = pdf_response(b"%PDF-1.3".to_vec(), "Report_1_2026-03-09.pdf");
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Report_1_2026-03-09.pdf\""
        );
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.service, "citapp-service");
    }
}
