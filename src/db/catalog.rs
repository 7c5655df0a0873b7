use uuid::Uuid;

use super::{trimmed, Database};
use crate::error::AppResult;
use crate::models::{Category, CreateCategoryRequest, CreateLocationRequest, Location};

// =============================================================================
// CATEGORIES & LOCATIONS
// =============================================================================
// Duplicate names/codes and deletes of referenced rows surface as Postgres
// constraint violations; AppError turns them into 409 responses.

impl Database {
    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    pub async fn create_category(&self, req: &CreateCategoryRequest) -> AppResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(req.name.trim())
        .bind(trimmed(req.description.as_deref()))
        .fetch_one(&self.pool)
        .await?;

        Ok(category)
    }

    pub async fn delete_category(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_locations(&self) -> AppResult<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, code, aisle, level, section, created_at
            FROM locations
            ORDER BY code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(locations)
    }

    pub async fn create_location(&self, req: &CreateLocationRequest) -> AppResult<Location> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (code, aisle, level, section)
            VALUES ($1, $2, $3, $4)
            RETURNING id, code, aisle, level, section, created_at
            "#,
        )
        .bind(req.code.trim())
        .bind(req.aisle.trim())
        .bind(req.level.trim())
        .bind(trimmed(req.section.as_deref()))
        .fetch_one(&self.pool)
        .await?;

        Ok(location)
    }

    pub async fn delete_location(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
