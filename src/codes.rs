// =============================================================================
// CODE GENERATION
// =============================================================================
// Random identifiers people read and type: product keys, employee codes,
// password recovery codes. None of them are secrets on their own; uniqueness
// is enforced by the database and collisions are retried a fixed number of
// times.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{AppError, AppResult};

const SKU_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SKU_SUFFIX_LEN: usize = 6;

/// Attempts made before giving up on a unique code
pub const COLLISION_ATTEMPTS: usize = 3;

/// Pause between attempts
pub const COLLISION_DELAY: Duration = Duration::from_millis(200);

/// "PROD-" followed by 6 characters from A-Z0-9
pub fn product_sku() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SKU_SUFFIX_LEN)
        .map(|_| SKU_CHARSET[rng.gen_range(0..SKU_CHARSET.len())] as char)
        .collect();
    format!("PROD-{suffix}")
}

/// Five digits, never starting with 0
pub fn employee_code() -> String {
    rand::thread_rng().gen_range(10_000..=99_999).to_string()
}

/// Six digits, never starting with 0
pub fn recovery_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Opaque value round-tripped through the OAuth provider
pub fn oauth_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Runs `attempt` with freshly generated codes until it succeeds, fails with
/// an error that is not a collision, or runs out of attempts.
pub async fn retry_on_collision<T, F, Fut>(
    generate: fn() -> String,
    is_collision: impl Fn(&AppError) -> bool,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for n in 1..=COLLISION_ATTEMPTS {
        match attempt(generate()).await {
            Err(err) if is_collision(&err) => {
                tracing::warn!(attempt = n, "Generated code already in use, retrying");
                if n < COLLISION_ATTEMPTS {
                    tokio::time::sleep(COLLISION_DELAY).await;
                }
            }
            other => return other,
        }
    }

    Err(AppError::Conflict(
        "Could not generate a unique code, please try again".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sku_format() {
        for _ in 0..50 {
            let sku = product_sku();
            assert_eq!(sku.len(), 11);
            assert!(sku.starts_with("PROD-"));
            assert!(sku[5..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn numeric_codes_have_fixed_width() {
        for _ in 0..50 {
            let employee = employee_code();
            assert_eq!(employee.len(), 5);
            assert!(!employee.starts_with('0'));

            let recovery = recovery_code();
            assert_eq!(recovery.len(), 6);
            assert!(recovery.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn oauth_state_is_alphanumeric() {
        let state = oauth_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    fn is_conflict(err: &AppError) -> bool {
        matches!(err, AppError::Conflict(_))
    }

    #[tokio::test]
    async fn retries_until_a_code_is_free() {
        let calls = AtomicUsize::new(0);
        let result = retry_on_collision(employee_code, is_conflict, |code| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Conflict("taken".to_string()))
                } else {
                    Ok(code)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_fixed_attempts() {
        let calls = AtomicUsize::new(0);
        let result: AppResult<String> = retry_on_collision(employee_code, is_conflict, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Conflict("taken".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), COLLISION_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: AppResult<String> = retry_on_collision(employee_code, is_conflict, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::BadRequest("nope".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
