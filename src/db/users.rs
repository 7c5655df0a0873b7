// =============================================================================
// USER ACCOUNTS
// =============================================================================

use std::time::Instant;

use uuid::Uuid;

use super::{contains_pattern, observe, trimmed, Database};
use crate::error::AppResult;
use crate::models::{CreateUserRequest, UpdateUserRequest, User, UserFilters, UserRole};

/// Unique constraint on `users.email`
pub const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Unique constraint on `users.employee_code`
pub const EMPLOYEE_CODE_CONSTRAINT: &str = "users_employee_code_key";

const USER_COLUMNS: &str = r#"
    id, role, name, surname, email, password_hash, active,
    employee_code, created_at, updated_at
"#;

impl Database {
    // -------------------------------------------------------------------------
    // READ OPERATIONS
    // -------------------------------------------------------------------------

    /// Accounts matching the filters, newest first
    pub async fn list_users(&self, filters: &UserFilters) -> AppResult<Vec<User>> {
        let started = Instant::now();
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::user_role IS NULL OR role = $1)
              AND ($2::boolean IS NULL OR active = $2)
              AND ($3::text IS NULL
                   OR name ILIKE $3
                   OR surname ILIKE $3
                   OR email ILIKE $3
                   OR employee_code ILIKE $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(filters.role)
        .bind(filters.active)
        .bind(contains_pattern(filters.search.as_deref()))
        .fetch_all(&self.pool)
        .await?;

        observe("select", started);
        Ok(users)
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Lookup by email; the argument is normalized the way emails are stored
    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// The employee account owning this five-digit code, if any
    pub async fn find_employee_by_code(&self, code: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE employee_code = $1 AND role = $2"
        ))
        .bind(code)
        .bind(UserRole::Employee)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Administrators who can sign in; discrepancy notices go to them
    pub async fn active_admins(&self) -> AppResult<Vec<User>> {
        let admins = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE role = $1 AND active = TRUE
            ORDER BY name ASC
            "#
        ))
        .bind(UserRole::Admin)
        .fetch_all(&self.pool)
        .await?;

        Ok(admins)
    }

    // -------------------------------------------------------------------------
    // WRITE OPERATIONS
    // -------------------------------------------------------------------------

    /// Insert a new account. `employee_code` is only stored for employees.
    pub async fn create_user(
        &self,
        req: &CreateUserRequest,
        password_hash: &str,
        employee_code: Option<&str>,
    ) -> AppResult<User> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (role, name, surname, email, password_hash, employee_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(req.role)
        .bind(req.name.trim())
        .bind(trimmed(req.surname.as_deref()))
        .bind(req.email.trim().to_lowercase())
        .bind(password_hash)
        .bind(employee_code.filter(|_| req.role == UserRole::Employee))
        .fetch_one(&self.pool)
        .await?;

        observe("insert", started);
        Ok(user)
    }

    /// Name changes only. An empty surname clears it.
    pub async fn update_user(&self, id: Uuid, req: &UpdateUserRequest) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                surname = CASE WHEN $3::boolean THEN NULLIF(btrim($4::text), '') ELSE surname END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.surname.is_some())
        .bind(req.surname.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn set_user_active(&self, id: Uuid, active: bool) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
