// =============================================================================
// CATALOG HANDLERS (admin)
// =============================================================================
// Categories and locations. Duplicates and deletes of rows still referenced
// by products come back from Postgres as 409 Conflict.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::validation;
use crate::AppState;

/// GET /api/v1/categories
pub async fn list_categories(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.db.list_categories().await?))
}

/// POST /api/v1/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    validation::validate_category(&req)?;
    let category = state.db.create_category(&req).await?;

    tracing::info!(category_id = %category.id, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// DELETE /api/v1/categories/:id
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.db.delete_category(id).await? {
        return Err(AppError::NotFound("Category not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/locations
pub async fn list_locations(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Location>>> {
    Ok(Json(state.db.list_locations().await?))
}

/// POST /api/v1/locations
pub async fn create_location(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLocationRequest>,
) -> AppResult<(StatusCode, Json<Location>)> {
    validation::validate_location(&req)?;
    let location = state.db.create_location(&req).await?;

    tracing::info!(location_id = %location.id, code = %location.code, "Location created");
    Ok((StatusCode::CREATED, Json(location)))
}

/// DELETE /api/v1/locations/:id
pub async fn delete_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.db.delete_location(id).await? {
        return Err(AppError::NotFound("Location not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
