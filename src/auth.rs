// =============================================================================
// AUTH MODULE
// =============================================================================
// Session tokens, password hashing and the route guards.
//
// - Sessions are HS256 JWTs carrying the user id, role and a token id (`jti`)
// - Signing out puts the `jti` on a Redis denylist until the token expires
// - Guards re-read the profile on every request, so deactivating an account
//   or changing its data takes effect immediately
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{User, UserRole};
use crate::AppState;

/// Retries when waiting for a profile row created alongside an OAuth sign-in
pub const PROFILE_RETRIES: usize = 3;
pub const PROFILE_RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub role: UserRole,

    /// Token id, the handle used to revoke this token
    pub jti: Uuid,

    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Seconds until expiry, zero once expired
    pub fn remaining_secs(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, user: &User) -> AppResult<(String, Claims)> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Checks signature and expiry. Revocation is checked by the guards.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

// =============================================================================
// PASSWORDS
// =============================================================================
// bcrypt is CPU-bound, so both directions run on the blocking pool.

pub async fn hash_password(password: String) -> AppResult<String> {
    let hash =
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await??;
    Ok(hash)
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(valid)
}

// =============================================================================
// GUARDS
// =============================================================================

/// Authenticated caller, inserted into request extensions by the guards
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub claims: Claims,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token into a live session
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<AuthSession> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Sign in to continue".to_string()))?;

    let claims = state.tokens.verify(token)?;

    if state.cache.is_revoked(claims.jti).await? {
        return Err(AppError::Unauthorized(
            "Session expired. Please sign in again".to_string(),
        ));
    }

    let user = state
        .db
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Profile not found".to_string()))?;

    Ok(AuthSession { user, claims })
}

/// Private routes: any signed-in user with a profile
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let session = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Protected routes: active administrators only
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let session = authenticate(&state, req.headers()).await?;
    ensure_admin(&session.user)?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

fn ensure_admin(user: &User) -> AppResult<()> {
    if !user.active {
        return Err(AppError::Forbidden("Your account is deactivated".to_string()));
    }
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can access this section".to_string(),
        ));
    }
    Ok(())
}

/// Poll `lookup` until it finds a profile, retrying `retries` times
pub async fn wait_for_profile<F, Fut>(
    retries: usize,
    delay: Duration,
    mut lookup: F,
) -> AppResult<Option<User>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Option<User>>>,
{
    for attempt in 0..=retries {
        if let Some(user) = lookup().await? {
            return Ok(Some(user));
        }
        if attempt < retries {
            tracing::debug!(attempt = attempt + 1, "Profile not found yet, retrying");
            tokio::time::sleep(delay).await;
        }
    }
    Ok(None)
}
