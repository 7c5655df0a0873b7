// =============================================================================
// PRODUCTS
// =============================================================================
// Product rows, with their category and location joined for display.
//
// Creating a product whose name, brand and type already exist (ignoring case
// and surrounding whitespace) merges into the existing row instead: the
// submitted quantity is added to its stock. The match and the write happen in
// one transaction under an advisory lock on the normalized key, so two
// concurrent creates of the same product can't both insert.
//
// The normalized key is computed here, in Rust, and stored in `merge_key`;
// SQL only ever compares it for equality.
// =============================================================================

use std::time::Instant;

use uuid::Uuid;

use super::{contains_pattern, observe, page_offset, trimmed, Database};
use crate::error::AppResult;
use crate::models::{
    CreateProductRequest, Product, ProductDetail, ProductFilters, UpdateProductRequest,
};

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, brand, product_type, quantity, fragility,
    category_id, location_id, qr_url, updated_at, created_at
"#;

const DETAIL_SELECT: &str = r#"
    SELECT p.id, p.sku, p.name, p.brand, p.product_type, p.quantity, p.fragility,
           p.category_id, p.location_id, p.qr_url, p.updated_at, p.created_at,
           c.name AS category_name,
           l.code AS location_code,
           l.aisle AS location_aisle,
           l.level AS location_level,
           l.section AS location_section
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

const LIST_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1 OR p.brand ILIKE $1)
      AND ($2::uuid IS NULL OR p.category_id = $2)
      AND ($3::uuid IS NULL OR p.location_id = $3)
      AND ($4::fragility IS NULL OR p.fragility = $4)
"#;

// -----------------------------------------------------------------------------
// MERGE KEY
// -----------------------------------------------------------------------------
/// Normalized (name, brand, type) triple that identifies "the same product"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeKey {
    pub name: String,
    pub brand: String,
    pub product_type: String,
}

impl MergeKey {
    pub fn new(name: &str, brand: Option<&str>, product_type: Option<&str>) -> Self {
        Self {
            name: normalize(Some(name)),
            brand: normalize(brand),
            product_type: normalize(product_type),
        }
    }

    /// Value stored in `products.merge_key`
    pub fn text(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.name, self.brand, self.product_type)
    }

    /// Text hashed into the advisory lock id
    fn lock_text(&self) -> String {
        format!("product:{}", self.text())
    }
}

/// Trim + lowercase; missing counts as empty
fn normalize(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_lowercase()
}

/// Name, brand and type of a product after a partial update
#[derive(Debug, PartialEq, Eq)]
struct UpdatedNames {
    name: String,
    brand: Option<String>,
    product_type: Option<String>,
}

impl UpdatedNames {
    fn resolve(current: &Product, req: &UpdateProductRequest) -> Self {
        Self {
            name: req
                .name
                .as_deref()
                .map(|name| name.trim().to_string())
                .unwrap_or_else(|| current.name.clone()),
            brand: match req.brand.as_deref() {
                Some(brand) => trimmed(Some(brand)),
                None => current.brand.clone(),
            },
            product_type: match req.product_type.as_deref() {
                Some(product_type) => trimmed(Some(product_type)),
                None => current.product_type.clone(),
            },
        }
    }
}

impl Database {
    // -------------------------------------------------------------------------
    // READ OPERATIONS
    // -------------------------------------------------------------------------

    /// One page of products, newest first
    ///
    /// # Returns
    /// Tuple of (items, total matching rows)
    pub async fn list_products(
        &self,
        filters: &ProductFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<(Vec<ProductDetail>, i64)> {
        let started = Instant::now();
        let limit = i64::from(per_page);
        let offset = page_offset(page, per_page);
        let search = contains_pattern(filters.search.as_deref());

        let items = sqlx::query_as::<_, ProductDetail>(&format!(
            "{DETAIL_SELECT} {LIST_FILTER} ORDER BY p.created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(&search)
        .bind(filters.category_id)
        .bind(filters.location_id)
        .bind(filters.fragility)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM products p {LIST_FILTER}"
        ))
        .bind(&search)
        .bind(filters.category_id)
        .bind(filters.location_id)
        .bind(filters.fragility)
        .fetch_one(&self.pool)
        .await?;

        observe("select", started);
        Ok((items, total.0))
    }

    /// Every product ordered by name, optionally narrowed by a search term.
    /// This is the list employees browse before counting.
    pub async fn product_catalog(&self, search: Option<&str>) -> AppResult<Vec<ProductDetail>> {
        let items = sqlx::query_as::<_, ProductDetail>(&format!(
            r#"
            {DETAIL_SELECT}
            WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1 OR p.brand ILIKE $1)
            ORDER BY p.name ASC
            "#
        ))
        .bind(contains_pattern(search))
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn get_product(&self, id: Uuid) -> AppResult<Option<ProductDetail>> {
        let started = Instant::now();
        let product = sqlx::query_as::<_, ProductDetail>(&format!("{DETAIL_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        observe("select", started);
        Ok(product)
    }

    /// Oldest product carrying this key. Keys aren't unique, so a scan of a
    /// duplicated key resolves to the first one registered.
    pub async fn find_product_by_sku(&self, sku: &str) -> AppResult<Option<ProductDetail>> {
        let product = sqlx::query_as::<_, ProductDetail>(&format!(
            "{DETAIL_SELECT} WHERE upper(p.sku) = upper($1) ORDER BY p.created_at ASC LIMIT 1"
        ))
        .bind(sku.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    // -------------------------------------------------------------------------
    // WRITE OPERATIONS
    // -------------------------------------------------------------------------

    /// Insert a product, or add its quantity to an existing equivalent one
    ///
    /// # Returns
    /// The stored row and whether it was merged into an existing product
    pub async fn create_or_merge_product(
        &self,
        req: &CreateProductRequest,
        sku: &str,
    ) -> AppResult<(Product, bool)> {
        let started = Instant::now();
        let key = MergeKey::new(&req.name, req.brand.as_deref(), req.product_type.as_deref());

        let mut tx = self.pool.begin().await?;

        // Serializes creates of the same product until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.lock_text())
            .execute(&mut *tx)
            .await?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM products
            WHERE merge_key = $1
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(key.text())
        .fetch_optional(&mut *tx)
        .await?;

        let (product, merged) = match existing {
            Some((id,)) => {
                let product = sqlx::query_as::<_, Product>(&format!(
                    r#"
                    UPDATE products
                    SET quantity = quantity + $2, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {PRODUCT_COLUMNS}
                    "#
                ))
                .bind(id)
                .bind(req.quantity)
                .fetch_one(&mut *tx)
                .await?;
                (product, true)
            }
            None => {
                let product = sqlx::query_as::<_, Product>(&format!(
                    r#"
                    INSERT INTO products
                        (sku, name, brand, product_type, quantity, fragility,
                         category_id, location_id, merge_key)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING {PRODUCT_COLUMNS}
                    "#
                ))
                .bind(sku.trim())
                .bind(req.name.trim())
                .bind(trimmed(req.brand.as_deref()))
                .bind(trimmed(req.product_type.as_deref()))
                .bind(req.quantity)
                .bind(req.fragility)
                .bind(req.category_id)
                .bind(req.location_id)
                .bind(key.text())
                .fetch_one(&mut *tx)
                .await?;
                (product, false)
            }
        };

        tx.commit().await?;

        observe(if merged { "update" } else { "insert" }, started);
        Ok((product, merged))
    }

    /// Partial update. Sending an empty brand or type clears it.
    ///
    /// The row is locked and the new name, brand and type are worked out
    /// here so `merge_key` stays in step with them.
    pub async fn update_product(
        &self,
        id: Uuid,
        req: &UpdateProductRequest,
    ) -> AppResult<Option<Product>> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(None);
        };

        let names = UpdatedNames::resolve(&current, req);
        let key = MergeKey::new(&names.name, names.brand.as_deref(), names.product_type.as_deref());

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET sku = COALESCE($2, sku),
                name = $3,
                brand = $4,
                product_type = $5,
                merge_key = $6,
                quantity = COALESCE($7, quantity),
                fragility = COALESCE($8, fragility),
                category_id = COALESCE($9, category_id),
                location_id = COALESCE($10, location_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(req.sku.as_deref().map(str::trim))
        .bind(&names.name)
        .bind(&names.brand)
        .bind(&names.product_type)
        .bind(key.text())
        .bind(req.quantity)
        .bind(req.fragility)
        .bind(req.category_id)
        .bind(req.location_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        observe("update", started);
        Ok(Some(product))
    }

    /// Fill `merge_key` for rows written before the column existed
    pub(super) async fn backfill_merge_keys(&self) -> AppResult<u64> {
        let rows: Vec<(Uuid, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT id, name, brand, product_type FROM products WHERE merge_key IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut filled = 0;
        for (id, name, brand, product_type) in rows {
            let key = MergeKey::new(&name, brand.as_deref(), product_type.as_deref());
            filled += sqlx::query("UPDATE products SET merge_key = $2 WHERE id = $1")
                .bind(id)
                .bind(key.text())
                .execute(&self.pool)
                .await?
                .rows_affected();
        }

        Ok(filled)
    }

    pub async fn set_product_qr_url(&self, id: Uuid, qr_url: &str) -> AppResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET qr_url = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(qr_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Returns false when no product has this id. A product that has been
    /// counted fails with a foreign-key violation.
    pub async fn delete_product(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fragility;
    use chrono::Utc;

    #[test]
    fn merge_key_ignores_case_and_whitespace() {
        let a = MergeKey::new("  Safety Gloves ", Some("TRUPER"), Some("PPE "));
        let b = MergeKey::new("safety gloves", Some(" truper"), Some("ppe"));
        assert_eq!(a, b);
        assert_eq!(a.lock_text(), b.lock_text());
    }

    #[test]
    fn merge_key_treats_missing_as_empty() {
        assert_eq!(
            MergeKey::new("Cable", None, None),
            MergeKey::new("cable", Some("   "), Some(""))
        );
        assert_ne!(
            MergeKey::new("Cable", Some("Acme"), None),
            MergeKey::new("Cable", None, Some("Acme"))
        );
    }

    #[test]
    fn merge_key_lowercases_accented_letters() {
        assert_eq!(
            MergeKey::new("CAFÉ", Some("ÑANDÚ"), None).text(),
            MergeKey::new("café", Some("ñandú"), None).text()
        );
    }

    fn drill() -> Product {
        Product {
            id: Uuid::new_v4(),
            sku: "PROD-DRL001".to_string(),
            name: "Drill".to_string(),
            brand: Some("Bosch".to_string()),
            product_type: None,
            quantity: 1,
            fragility: Fragility::NonFragile,
            category_id: None,
            location_id: None,
            qr_url: None,
            updated_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn updated_names_trim_tabs_and_blank_out() {
        let req = UpdateProductRequest {
            name: Some(" Hammer drill\n".to_string()),
            brand: Some("Acme\t".to_string()),
            product_type: Some("   ".to_string()),
            ..Default::default()
        };
        let names = UpdatedNames::resolve(&drill(), &req);
        assert_eq!(names.name, "Hammer drill");
        assert_eq!(names.brand.as_deref(), Some("Acme"));
        assert_eq!(names.product_type, None);
    }

    #[test]
    fn updated_names_keep_untouched_fields() {
        let names = UpdatedNames::resolve(&drill(), &UpdateProductRequest::default());
        assert_eq!(
            names,
            UpdatedNames {
                name: "Drill".to_string(),
                brand: Some("Bosch".to_string()),
                product_type: None,
            }
        );
    }
}
