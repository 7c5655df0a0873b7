use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{default_page, default_per_page};

// =============================================================================
// FRAGILITY
// =============================================================================
// Stored as the Postgres enum `fragility` (created by the migrations).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fragility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Fragility {
    Fragile,
    #[default]
    NonFragile,
}

impl Fragility {
    pub fn label(&self) -> &'static str {
        match self {
            Fragility::Fragile => "Fragile",
            Fragility::NonFragile => "Non-fragile",
        }
    }
}

// =============================================================================
// PRODUCT
// =============================================================================
/// A product row as stored in the `products` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,

    /// Product key shown on labels, e.g. "PROD-7K2Q9A"
    pub sku: String,

    pub name: String,
    pub brand: Option<String>,

    #[serde(rename = "type")]
    pub product_type: Option<String>,

    /// Units on hand; the table enforces `quantity >= 0`
    pub quantity: i32,

    pub fragility: Fragility,
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,

    /// QR image URL pointing at the employee view of this product
    pub qr_url: Option<String>,

    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A product joined with its category and location for display
///
/// Serialized flat: the product fields plus `category_name` and the
/// `location_*` fields (all null when the reference is unset).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,

    pub category_name: Option<String>,
    pub location_code: Option<String>,
    pub location_aisle: Option<String>,
    pub location_level: Option<String>,
    pub location_section: Option<String>,
}

impl ProductDetail {
    /// "A-03 / aisle 3 / level 2 / section B", or None when unassigned
    pub fn location_label(&self) -> Option<String> {
        let code = self.location_code.as_deref()?;
        let mut label = code.to_string();
        if let Some(aisle) = self.location_aisle.as_deref() {
            label.push_str(&format!(" / aisle {aisle}"));
        }
        if let Some(level) = self.location_level.as_deref() {
            label.push_str(&format!(" / level {level}"));
        }
        if let Some(section) = self.location_section.as_deref().filter(|s| !s.is_empty()) {
            label.push_str(&format!(" / section {section}"));
        }
        Some(label)
    }
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================

/// Request body for creating a product
///
/// `sku` is generated when omitted. A product whose name, brand and type
/// match an existing one (ignoring case and surrounding whitespace) is merged
/// into it instead: the quantities are summed.
///
/// # Example JSON
/// ```json
/// {
///   "name": "Safety gloves",
///   "brand": "Truper",
///   "type": "PPE",
///   "quantity": 12,
///   "fragility": "non_fragile"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub sku: Option<String>,
    pub name: String,
    pub brand: Option<String>,

    #[serde(rename = "type")]
    pub product_type: Option<String>,

    #[serde(default)]
    pub quantity: i32,

    #[serde(default)]
    pub fragility: Fragility,

    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

/// Partial update; omitted fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,

    #[serde(rename = "type")]
    pub product_type: Option<String>,

    pub quantity: Option<i32>,
    pub fragility: Option<Fragility>,
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

/// Result of a create: either a new row or an existing row that absorbed
/// the submitted quantity
#[derive(Debug, Clone, Serialize)]
pub struct ProductSaveResponse {
    pub product: Product,
    pub merged: bool,
}

/// Query parameters for the product list
///
/// # Example
/// GET /api/v1/products?search=glove&fragility=fragile&page=2
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    /// Case-insensitive substring of name, key or brand
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub fragility: Option<Fragility>,

    #[serde(default = "default_page")]
    pub page: i32,

    #[serde(default = "default_per_page")]
    pub per_page: i32,
}

/// Text decoded from a QR code (or typed by hand)
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QrResponse {
    pub product_id: Uuid,
    pub qr_url: String,

    /// Self-describing JSON a scanner can resolve without the URL
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragility_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&Fragility::NonFragile).unwrap(),
            "\"non_fragile\""
        );
        let parsed: Fragility = serde_json::from_str("\"fragile\"").unwrap();
        assert_eq!(parsed, Fragility::Fragile);
    }

    #[test]
    fn create_request_defaults_quantity_and_fragility() {
        let req: CreateProductRequest =
            serde_json::from_str(r#"{"name":"Cable","type":"USB"}"#).unwrap();
        assert_eq!(req.quantity, 0);
        assert_eq!(req.fragility, Fragility::NonFragile);
        assert_eq!(req.product_type.as_deref(), Some("USB"));
        assert!(req.sku.is_none());
    }
}
