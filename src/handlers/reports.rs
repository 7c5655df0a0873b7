// =============================================================================
// DASHBOARD & REPORT HANDLERS (admin)
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use std::sync::Arc;

use super::pdf_response;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::pdf;
use crate::reports;
use crate::AppState;

/// GET /api/v1/dashboard
pub async fn dashboard(State(state): State<Arc<AppState>>) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.db.dashboard_stats().await?))
}

async fn all_reports(state: &AppState) -> AppResult<Vec<ReportSummary>> {
    let verifications = state.db.all_verifications().await?;
    Ok(reports::group_verifications(verifications))
}

async fn find_report(state: &AppState, id: &str) -> AppResult<ReportSummary> {
    all_reports(state)
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))
}

/// GET /api/v1/reports?search=48213
///
/// Newest first. `search` matches the employee code or the ISO date.
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ReportFilters>,
) -> AppResult<Json<Vec<ReportSummary>>> {
    let reports = all_reports(&state).await?;
    Ok(Json(reports::filter_reports(reports, filters.search.as_deref())))
}

/// GET /api/v1/reports/:id
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ReportSummary>> {
    Ok(Json(find_report(&state, &id).await?))
}

/// GET /api/v1/reports/:id/pdf
pub async fn report_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let report = find_report(&state, &id).await?;
    let filename = pdf::report_filename(&report, chrono::Utc::now().date_naive());
    let bytes = pdf::report_pdf(report).await?;
    Ok(pdf_response(bytes, &filename))
}
