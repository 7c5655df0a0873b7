// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL access for the whole service.
//
// `Database` wraps the SQLx pool; each entity adds its own `impl Database`
// block in a submodule so handlers only ever see typed domain methods:
//
// - products.rs       products, create-or-merge, QR url
// - catalog.rs        categories and locations
// - users.rs          accounts and employee codes
// - recovery.rs       password recovery codes
// - verifications.rs  physical counts and dashboard numbers
// =============================================================================

mod catalog;
mod products;
mod recovery;
mod users;
mod verifications;

#[cfg(test)]
mod test;

pub use recovery::RECOVERY_CODE_CONSTRAINT;
pub use users::{EMAIL_CONSTRAINT, EMPLOYEE_CODE_CONSTRAINT};

use std::time::Instant;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth;
use crate::metrics;
use crate::models::UserRole;

// -----------------------------------------------------------------------------
// SCHEMA
// -----------------------------------------------------------------------------
// Every statement is idempotent so migrations can run on every start.
// Enum types have no IF NOT EXISTS form, hence the DO blocks.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "fragility type",
        r#"
        DO $$ BEGIN
            CREATE TYPE fragility AS ENUM ('fragile', 'non_fragile');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        "#,
    ),
    (
        "user_role type",
        r#"
        DO $$ BEGIN
            CREATE TYPE user_role AS ENUM ('admin', 'employee');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        "#,
    ),
    (
        "categories table",
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(120) NOT NULL,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT categories_name_key UNIQUE (name)
        )
        "#,
    ),
    (
        "locations table",
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            code VARCHAR(50) NOT NULL,
            aisle VARCHAR(50) NOT NULL,
            level VARCHAR(50) NOT NULL,
            section VARCHAR(50),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT locations_code_key UNIQUE (code)
        )
        "#,
    ),
    (
        "products table",
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

            -- Not unique: duplicates are detected by name + brand + type
            sku VARCHAR(50) NOT NULL,

            name VARCHAR(255) NOT NULL,
            brand VARCHAR(255),
            product_type VARCHAR(255),
            quantity INTEGER NOT NULL DEFAULT 0,
            fragility fragility NOT NULL DEFAULT 'non_fragile',
            category_id UUID REFERENCES categories(id),
            location_id UUID REFERENCES locations(id),
            qr_url TEXT,

            -- Normalized name + brand + type, written by the service
            merge_key TEXT,

            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            CONSTRAINT positive_quantity CHECK (quantity >= 0)
        )
        "#,
    ),
    (
        "products sku index",
        "CREATE INDEX IF NOT EXISTS idx_products_sku ON products(sku)",
    ),
    (
        "products merge-key column",
        "ALTER TABLE products ADD COLUMN IF NOT EXISTS merge_key TEXT",
    ),
    (
        "products merge-key index",
        "CREATE INDEX IF NOT EXISTS idx_products_merge_key_text ON products(merge_key)",
    ),
    (
        "users table",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            role user_role NOT NULL,
            name VARCHAR(120) NOT NULL,
            surname VARCHAR(120),
            email VARCHAR(255) NOT NULL,
            password_hash TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            employee_code VARCHAR(5),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            CONSTRAINT users_email_key UNIQUE (email),
            CONSTRAINT users_employee_code_key UNIQUE (employee_code),
            CONSTRAINT employee_code_format CHECK (
                employee_code IS NULL OR employee_code ~ '^[0-9]{5}$'
            )
        )
        "#,
    ),
    (
        "password recovery codes table",
        r#"
        CREATE TABLE IF NOT EXISTS password_recovery_codes (
            email VARCHAR(255) PRIMARY KEY
                REFERENCES users(email) ON DELETE CASCADE ON UPDATE CASCADE,
            code VARCHAR(6) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            used_at TIMESTAMPTZ,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT password_recovery_codes_code_key UNIQUE (code)
        )
        "#,
    ),
    (
        "recovery attempts column",
        r#"
        ALTER TABLE password_recovery_codes
            ADD COLUMN IF NOT EXISTS failed_attempts INTEGER NOT NULL DEFAULT 0
        "#,
    ),
    (
        "inventory verifications table",
        r#"
        CREATE TABLE IF NOT EXISTS inventory_verifications (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

            -- No cascade: counted products can't be deleted
            product_id UUID NOT NULL REFERENCES products(id),

            system_quantity INTEGER NOT NULL,
            physical_quantity INTEGER NOT NULL,
            matches BOOLEAN NOT NULL,
            observations TEXT,
            employee_code VARCHAR(5) NOT NULL,
            report_id VARCHAR(100),
            checked_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            CONSTRAINT positive_physical_quantity CHECK (physical_quantity >= 0)
        )
        "#,
    ),
    (
        "verifications product index",
        "CREATE INDEX IF NOT EXISTS idx_verifications_product ON inventory_verifications(product_id)",
    ),
    (
        "verifications date index",
        "CREATE INDEX IF NOT EXISTS idx_verifications_checked_at ON inventory_verifications(checked_at DESC)",
    ),
];

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create types, tables and indexes that don't exist yet
    pub async fn run_migrations(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to apply migration: {name}"))?;
        }

        let filled = self
            .backfill_merge_keys()
            .await
            .context("Failed to backfill product merge keys")?;
        if filled > 0 {
            tracing::info!(products = filled, "Product merge keys backfilled");
        }
        Ok(())
    }

    /// Create the first administrator when there is none
    ///
    /// The initial password is the email itself, the same convention used
    /// for every account created from the console.
    pub async fn ensure_bootstrap_admin(&self, email: &str, name: &str) -> Result<bool> {
        let admins: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(UserRole::Admin)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count administrators")?;

        if admins.0 > 0 {
            return Ok(false);
        }

        let email = email.trim().to_lowercase();
        let password_hash = auth::hash_password(email.clone()).await?;

        // An employee already using the email keeps it; nothing is created
        let result = sqlx::query(
            r#"
            INSERT INTO users (role, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(UserRole::Admin)
        .bind(name)
        .bind(&email)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .context("Failed to create bootstrap administrator")?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// Records how long a query took, labelled by operation
fn observe(operation: &str, started: Instant) {
    metrics::record_db_query(operation, started.elapsed().as_secs_f64());
}

/// Row offset of a 1-based page, in i64 so no page number can overflow it
fn page_offset(page: i32, per_page: i32) -> i64 {
    (i64::from(page.max(1)) - 1) * i64::from(per_page)
}

/// ILIKE pattern matching `term` anywhere, or None for a blank term.
/// `%`, `_` and `\` in the term are matched literally.
fn contains_pattern(term: Option<&str>) -> Option<String> {
    let term = term.map(str::trim).filter(|t| !t.is_empty())?;
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Some(escaped)
}

/// `Some("  x ")` -> `Some("x")`, blank or missing -> None
fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_wraps_and_escapes() {
        assert_eq!(contains_pattern(Some("glove")).as_deref(), Some("%glove%"));
        assert_eq!(contains_pattern(Some(" 50% ")).as_deref(), Some("%50\\%%"));
        assert_eq!(contains_pattern(Some("a_b")).as_deref(), Some("%a\\_b%"));
        assert_eq!(contains_pattern(Some("   ")), None);
        assert_eq!(contains_pattern(None), None);
    }

    #[test]
    fn page_offset_never_overflows() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
        assert_eq!(
            page_offset(i32::MAX, 100),
            (i64::from(i32::MAX) - 1) * 100
        );
    }

    #[test]
    fn trimmed_drops_blank_values() {
        assert_eq!(trimmed(Some("  Truper ")).as_deref(), Some("Truper"));
        assert_eq!(trimmed(Some("   ")), None);
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn migrations_are_idempotent_statements() {
        for (name, sql) in MIGRATIONS {
            let sql = sql.to_uppercase();
            assert!(
                sql.contains("IF NOT EXISTS") || sql.contains("DUPLICATE_OBJECT"),
                "migration `{name}` must be safe to re-run"
            );
        }
    }
}
