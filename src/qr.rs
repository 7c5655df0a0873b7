// =============================================================================
// QR MODULE
// =============================================================================
// Product QR codes point at the employee view of the product. The image is
// rendered by an external QR service; the service only builds its URL, and
// fetches the PNG when a printable label is requested.
//
// Scanning is the reverse: the client decodes the image and sends the text,
// which `resolve_scan` turns into a product lookup.
// =============================================================================

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Product;

/// Marker in JSON payloads produced for CITAPP products
pub const PAYLOAD_TYPE: &str = "CITAPP_PRODUCT";

const IMAGE_SIZE: &str = "300x300";

/// `{service}?size=300x300&data={data}&format=png`
pub fn qr_image_url(service_url: &str, data: &str) -> AppResult<String> {
    let url = Url::parse_with_params(
        service_url,
        &[("size", IMAGE_SIZE), ("data", data), ("format", "png")],
    )
    .map_err(|e| AppError::Internal(format!("Invalid QR service URL: {e}")))?;
    Ok(url.to_string())
}

/// Employee view the QR code opens
pub fn product_target_url(public_base_url: &str, id: Uuid) -> String {
    format!("{}/empleado/{id}", public_base_url.trim_end_matches('/'))
}

#[derive(Debug, Serialize)]
struct ProductPayload<'a> {
    id: Uuid,
    sku: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// JSON payload for self-describing QR codes
pub fn product_payload(product: &Product) -> String {
    serde_json::json!(ProductPayload {
        id: product.id,
        sku: &product.sku,
        name: &product.name,
        kind: PAYLOAD_TYPE,
    })
    .to_string()
}

/// Download the rendered PNG for a QR image URL
pub async fn fetch_qr_png(http: &reqwest::Client, image_url: &str) -> AppResult<Vec<u8>> {
    let bytes = http
        .get(image_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

// -----------------------------------------------------------------------------
// SCAN RESOLUTION
// -----------------------------------------------------------------------------

/// What a decoded QR text refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    Id(Uuid),
    Sku(String),
}

/// Interpret decoded QR text, trying in order:
///
/// 1. a JSON object with `"type": "CITAPP_PRODUCT"` and an `id`
/// 2. a URL whose path ends in `/empleado/{uuid}`
/// 3. a bare UUID
/// 4. anything else as a product key
///
/// Returns `None` for blank input and for JSON objects that aren't CITAPP
/// payloads.
pub fn resolve_scan(text: &str) -> Option<ScanTarget> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(text) {
        if payload.get("type").and_then(Value::as_str) != Some(PAYLOAD_TYPE) {
            return None;
        }
        return payload
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(ScanTarget::Id);
    }

    if let Some(id) = employee_view_id(text) {
        return Some(ScanTarget::Id(id));
    }

    if let Ok(id) = Uuid::parse_str(text) {
        return Some(ScanTarget::Id(id));
    }

    Some(ScanTarget::Sku(text.to_string()))
}

fn employee_view_id(text: &str) -> Option<Uuid> {
    let url = Url::parse(text).ok()?;
    let mut segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let id = segments.pop()?;
    if segments.pop()? != "empleado" {
        return None;
    }
    Uuid::parse_str(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ID: &str = "8f14e45f-ceea-467f-a8f5-1a2b3c4d5e6f";

    #[test]
    fn image_url_encodes_the_data() {
        let url = qr_image_url(
            "https://api.qrserver.com/v1/create-qr-code/",
            "http://localhost:5173/empleado/1 2",
        )
        .unwrap();
        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=300x300&data="));
        assert!(url.contains("http%3A%2F%2Flocalhost%3A5173%2Fempleado%2F1+2"));
        assert!(url.ends_with("&format=png"));
    }

    #[test]
    fn target_url_ignores_trailing_slash() {
        let id = Uuid::parse_str(ID).unwrap();
        assert_eq!(
            product_target_url("https://citapp.mx/", id),
            format!("https://citapp.mx/empleado/{ID}")
        );
    }

    #[test]
    fn payload_round_trips_through_scan() {
        let product = Product {
            id: Uuid::parse_str(ID).unwrap(),
            sku: "PROD-ABC123".to_string(),
            name: "Gloves".to_string(),
            brand: None,
            product_type: None,
            quantity: 1,
            fragility: Default::default(),
            category_id: None,
            location_id: None,
            qr_url: None,
            updated_at: Utc::now(),
            created_at: Utc::now(),
        };
        let payload = product_payload(&product);
        assert!(payload.contains("\"type\":\"CITAPP_PRODUCT\""));
        assert_eq!(resolve_scan(&payload), Some(ScanTarget::Id(product.id)));
    }

    #[test]
    fn scan_resolution_order() {
        let id = Uuid::parse_str(ID).unwrap();
        assert_eq!(
            resolve_scan(&format!("https://citapp.mx/empleado/{ID}")),
            Some(ScanTarget::Id(id))
        );
        assert_eq!(
            resolve_scan(&format!("http://localhost:5173/empleado/{ID}/")),
            Some(ScanTarget::Id(id))
        );
        assert_eq!(resolve_scan(&format!("  {ID} ")), Some(ScanTarget::Id(id)));
        assert_eq!(
            resolve_scan("PROD-7K2Q9A"),
            Some(ScanTarget::Sku("PROD-7K2Q9A".to_string()))
        );
    }

    #[test]
    fn foreign_payloads_resolve_to_nothing() {
        assert_eq!(resolve_scan(""), None);
        assert_eq!(resolve_scan(r#"{"type":"OTHER","id":"x"}"#), None);
        assert_eq!(resolve_scan(r#"{"type":"CITAPP_PRODUCT","id":"not-a-uuid"}"#), None);
    }

    #[test]
    fn other_urls_are_treated_as_keys() {
        let url = format!("https://citapp.mx/productos/{ID}");
        assert_eq!(resolve_scan(&url), Some(ScanTarget::Sku(url.clone())));
    }
}
