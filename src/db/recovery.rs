use chrono::{DateTime, Utc};

use super::Database;
use crate::error::AppResult;

// =============================================================================
// PASSWORD RECOVERY CODES
// =============================================================================
// One live code per email. Requesting a new code replaces the previous one;
// using a code marks it spent in the same transaction that sets the password.
// A code stops working after MAX_RECOVERY_ATTEMPTS wrong guesses.

/// Unique constraint on `password_recovery_codes.code`
pub const RECOVERY_CODE_CONSTRAINT: &str = "password_recovery_codes_code_key";

/// Wrong guesses allowed against one code
pub const MAX_RECOVERY_ATTEMPTS: i32 = 5;

impl Database {
    /// Store `code` for the account with this email
    ///
    /// # Returns
    /// `false` when no account uses the email (nothing is stored)
    pub async fn request_password_recovery(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO password_recovery_codes (email, code, expires_at)
            SELECT email, $2, $3 FROM users WHERE email = $1
            ON CONFLICT (email) DO UPDATE
            SET code = EXCLUDED.code,
                expires_at = EXCLUDED.expires_at,
                used_at = NULL,
                failed_attempts = 0,
                created_at = NOW()
            "#,
        )
        .bind(email.trim().to_lowercase())
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Check a guess against the live code for this email, counting it
    /// against the code when wrong
    ///
    /// # Returns
    /// `false` when there is no live code, the guess is wrong, or the code
    /// has used up its attempts
    pub async fn check_recovery_code(&self, email: &str, code: &str) -> AppResult<bool> {
        let checked: Option<(bool,)> = sqlx::query_as(
            r#"
            UPDATE password_recovery_codes
            SET failed_attempts = failed_attempts + CASE WHEN code = $2 THEN 0 ELSE 1 END
            WHERE email = $1
              AND used_at IS NULL
              AND expires_at > NOW()
              AND failed_attempts < $3
            RETURNING code = $2
            "#,
        )
        .bind(email.trim().to_lowercase())
        .bind(code)
        .bind(MAX_RECOVERY_ATTEMPTS)
        .fetch_optional(&self.pool)
        .await?;

        Ok(matches!(checked, Some((true,))))
    }

    /// Spend a live code and set the new password hash
    ///
    /// # Returns
    /// `false` when the code is wrong, expired or already used
    pub async fn reset_password_with_code(
        &self,
        email: &str,
        code: &str,
        password_hash: &str,
    ) -> AppResult<bool> {
        let email = email.trim().to_lowercase();
        let mut tx = self.pool.begin().await?;

        let spent: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE password_recovery_codes
            SET used_at = NOW()
            WHERE email = $1
              AND code = $2
              AND used_at IS NULL
              AND expires_at > NOW()
              AND failed_attempts < $3
            RETURNING email
            "#,
        )
        .bind(&email)
        .bind(code)
        .bind(MAX_RECOVERY_ATTEMPTS)
        .fetch_optional(&mut *tx)
        .await?;

        if spent.is_none() {
            return Ok(false);
        }

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE email = $1")
            .bind(&email)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
