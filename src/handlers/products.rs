// =============================================================================
// PRODUCT HANDLERS (admin)
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{clamp_page, load_product, pdf_response, resolve_scanned_product};
use crate::codes;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::pdf;
use crate::qr;
use crate::validation;
use crate::AppState;

fn product_not_found() -> AppError {
    AppError::NotFound("Product not found".to_string())
}

/// Build and store the QR image URL for a product
async fn store_qr_url(state: &AppState, id: Uuid) -> AppResult<Option<Product>> {
    let target = qr::product_target_url(&state.config.public_base_url, id);
    let qr_url = qr::qr_image_url(&state.config.qr_service_url, &target)?;
    let product = state.db.set_product_qr_url(id, &qr_url).await?;
    state.cache.invalidate_product(id).await;
    Ok(product)
}

// -----------------------------------------------------------------------------
// LIST PRODUCTS
// -----------------------------------------------------------------------------
/// GET /api/v1/products
/// GET /api/v1/products?search=glove&fragility=fragile&page=2&per_page=50
///
/// # Query Parameters
/// - `search`: substring of name, key or brand (case-insensitive)
/// - `category_id`, `location_id`, `fragility`: exact filters
/// - `page` (default 1), `per_page` (default 20, max 100)
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ProductFilters>,
) -> AppResult<Json<Page<ProductDetail>>> {
    let (page, per_page) = clamp_page(filters.page, filters.per_page);
    let (items, total) = state.db.list_products(&filters, page, per_page).await?;

    for item in &items {
        metrics::set_stock_level(&item.product.sku, item.product.quantity);
    }

    Ok(Json(Page {
        items,
        total,
        page,
        per_page,
    }))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductDetail>> {
    Ok(Json(load_product(&state, id).await?))
}

// -----------------------------------------------------------------------------
// CREATE OR MERGE
// -----------------------------------------------------------------------------
/// POST /api/v1/products
///
/// # Response
/// - 201 Created: a new product, `merged: false`
/// - 200 OK: an equivalent product existed and absorbed the quantity,
///   `merged: true`
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ProductSaveResponse>)> {
    validation::validate_new_product(&req)?;

    let sku = req
        .sku
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(codes::product_sku);

    let (mut product, merged) = state.db.create_or_merge_product(&req, &sku).await?;

    // A product saved without its QR URL is still saved
    match store_qr_url(&state, product.id).await {
        Ok(Some(with_qr)) => product = with_qr,
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(product_id = %product.id, error = %err, "Could not store QR URL");
            if merged {
                state.cache.invalidate_product(product.id).await;
            }
        }
    }

    metrics::set_stock_level(&product.sku, product.quantity);
    tracing::info!(
        product_id = %product.id,
        sku = %product.sku,
        quantity = product.quantity,
        merged,
        "Product saved"
    );

    Ok((save_status(merged), Json(ProductSaveResponse { product, merged })))
}

/// 201 for a new row, 200 when the quantity went into an existing one
fn save_status(merged: bool) -> StatusCode {
    if merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    }
}

// -----------------------------------------------------------------------------
// UPDATE / DELETE
// -----------------------------------------------------------------------------

/// PUT /api/v1/products/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> AppResult<Json<Product>> {
    validation::validate_product_update(&req)?;

    let product = state
        .db
        .update_product(id, &req)
        .await?
        .ok_or_else(product_not_found)?;

    state.cache.invalidate_product(id).await;
    metrics::set_stock_level(&product.sku, product.quantity);
    Ok(Json(product))
}

/// DELETE /api/v1/products/:id
///
/// # Response
/// - 204 No Content
/// - 404 Not Found
/// - 409 Conflict: the product has been counted and must be kept
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.db.delete_product(id).await? {
        return Err(product_not_found());
    }

    state.cache.invalidate_product(id).await;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// QR CODE & LABEL
// -----------------------------------------------------------------------------

/// POST /api/v1/products/:id/qr
pub async fn generate_qr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QrResponse>> {
    let product = store_qr_url(&state, id).await?.ok_or_else(product_not_found)?;

    Ok(Json(QrResponse {
        product_id: product.id,
        payload: qr::product_payload(&product),
        qr_url: product.qr_url.unwrap_or_default(),
    }))
}

/// GET /api/v1/products/:id/label.pdf
///
/// When the QR image service is unreachable the label is still produced,
/// with the target URL printed instead of the code.
pub async fn label_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let product = load_product(&state, id).await?;
    let target = qr::product_target_url(&state.config.public_base_url, id);
    let image_url = qr::qr_image_url(&state.config.qr_service_url, &target)?;

    let png = match qr::fetch_qr_png(&state.http, &image_url).await {
        Ok(png) => Some(png),
        Err(err) => {
            tracing::warn!(product_id = %id, error = %err, "QR image unavailable for label");
            None
        }
    };

    let filename = pdf::label_filename(&product);
    let bytes = pdf::label_pdf(product, target, png).await?;
    Ok(pdf_response(bytes, &filename))
}

// -----------------------------------------------------------------------------
// VERIFICATIONS & SCAN
// -----------------------------------------------------------------------------

/// GET /api/v1/products/:id/verifications
pub async fn product_verifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<VerificationDetail>>> {
    load_product(&state, id).await?;
    Ok(Json(state.db.product_verifications(id).await?))
}

/// POST /api/v1/products/scan
pub async fn scan_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> AppResult<Json<ProductDetail>> {
    Ok(Json(resolve_scanned_product(&state, &req.payload).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_saves_are_not_created() {
        assert_eq!(save_status(false), StatusCode::CREATED);
        assert_eq!(save_status(true), StatusCode::OK);
    }
}
