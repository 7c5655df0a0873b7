// =============================================================================
// AUTH HANDLERS
// =============================================================================
// Email/password and Google sign-in, the current session, sign-out and the
// two-step password recovery (request a code, then reset with it).
// =============================================================================

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::auth::{self, AuthSession, PROFILE_RETRIES, PROFILE_RETRY_DELAY};
use crate::codes;
use crate::db::RECOVERY_CODE_CONSTRAINT;
use crate::error::{is_unique_violation_of, AppError, AppResult};
use crate::models::*;
use crate::validation;
use crate::AppState;

fn issue_session(state: &AppState, user: User) -> AppResult<Json<SessionResponse>> {
    let (token, claims) = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "Session started");

    Ok(Json(SessionResponse {
        token,
        expires_at: claims.expires_at(),
        user,
    }))
}

// -----------------------------------------------------------------------------
// SIGN IN
// -----------------------------------------------------------------------------
/// POST /api/v1/auth/sign-in
///
/// # Response
/// - 200 OK: `{token, expires_at, user}`
/// - 401 Unauthorized: unknown email or wrong password
/// - 403 Forbidden: the account is deactivated
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> AppResult<Json<SessionResponse>> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .db
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(invalid)?;

    if !auth::verify_password(req.password, user.password_hash.clone()).await? {
        tracing::warn!(user_id = %user.id, "Sign-in with a wrong password");
        return Err(invalid());
    }

    if !user.active {
        return Err(AppError::Forbidden(
            "Your account is deactivated. Contact an administrator".to_string(),
        ));
    }

    issue_session(&state, user)
}

// -----------------------------------------------------------------------------
// GOOGLE OAUTH
// -----------------------------------------------------------------------------

/// GET /api/v1/auth/google
///
/// Returns the Google consent URL to redirect the browser to. The `state`
/// value must come back unchanged on the callback.
pub async fn google_authorize(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<AuthorizeResponse>> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Google sign-in is not configured".to_string()))?;

    let oauth_state = codes::oauth_state();
    state.cache.store_oauth_state(&oauth_state).await?;

    Ok(Json(AuthorizeResponse {
        url: google.authorize_url(&oauth_state)?,
        state: oauth_state,
    }))
}

/// GET /api/v1/auth/callback?code=...&state=...
///
/// Only active administrators may sign in with Google.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OAuthCallbackParams>,
) -> AppResult<Json<SessionResponse>> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Google sign-in is not configured".to_string()))?;

    let expected = match params.state.as_deref() {
        Some(value) => state.cache.take_oauth_state(value).await?,
        None => false,
    };
    if !expected {
        return Err(AppError::Unauthorized(
            "The sign-in attempt expired. Please try again".to_string(),
        ));
    }

    let google_user = google.fetch_user(&params.code).await?;
    let email = google_user.email.trim().to_lowercase();

    let user = auth::wait_for_profile(PROFILE_RETRIES, PROFILE_RETRY_DELAY, || {
        state.db.find_user_by_email(&email)
    })
    .await?
    .ok_or_else(|| {
        tracing::warn!(email = %email, "Google sign-in without a CITAPP account");
        AppError::Forbidden("There is no account for this Google email".to_string())
    })?;

    if !user.is_admin() || !user.active {
        tracing::warn!(user_id = %user.id, "Google sign-in refused for a non-admin or inactive account");
        return Err(AppError::Forbidden(
            "Only active administrators can sign in with Google".to_string(),
        ));
    }

    issue_session(&state, user)
}

// -----------------------------------------------------------------------------
// SESSION
// -----------------------------------------------------------------------------

/// GET /api/v1/auth/session
pub async fn current_session(
    Extension(session): Extension<AuthSession>,
) -> Json<CurrentSessionResponse> {
    Json(CurrentSessionResponse {
        expires_at: session.claims.expires_at(),
        user: session.user,
    })
}

/// POST /api/v1/auth/sign-out
///
/// The token stays denied until it would have expired anyway.
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> AppResult<Json<MessageResponse>> {
    state
        .cache
        .revoke_token(session.claims.jti, session.claims.remaining_secs())
        .await?;

    tracing::info!(user_id = %session.user.id, "Session ended");
    Ok(Json(MessageResponse::new("Signed out")))
}

// -----------------------------------------------------------------------------
// PASSWORD RECOVERY
// -----------------------------------------------------------------------------

/// POST /api/v1/auth/recovery
///
/// # Response
/// - 200 OK: a code was emailed
/// - 404 Not Found: no account uses the email
/// - 502 Bad Gateway: the email could not be sent
pub async fn request_recovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecoveryRequest>,
) -> AppResult<Json<MessageResponse>> {
    if let Some(error) = validation::validate_email(&req.email) {
        return Err(AppError::Validation(vec![error]));
    }
    let email = req.email.trim().to_lowercase();
    let expires_at =
        chrono::Utc::now() + chrono::Duration::minutes(state.config.recovery_code_ttl_minutes);

    let (registered, code) = codes::retry_on_collision(
        codes::recovery_code,
        |err| is_unique_violation_of(err, RECOVERY_CODE_CONSTRAINT),
        |code| {
            let db = &state.db;
            let email = &email;
            async move {
                let registered = db.request_password_recovery(email, &code, expires_at).await?;
                Ok((registered, code))
            }
        },
    )
    .await?;

    if !registered {
        return Err(AppError::NotFound("The email is not registered".to_string()));
    }

    state
        .email
        .send_recovery_code(&email, &code)
        .await
        .map_err(|err| match err {
            AppError::Unavailable(_) => err,
            other => {
                tracing::warn!(error = %other, "Recovery email failed");
                AppError::Upstream("Could not send the email. Try again".to_string())
            }
        })?;

    Ok(Json(MessageResponse::new(
        "A recovery code was sent to your email",
    )))
}

/// POST /api/v1/auth/recovery/reset
///
/// # Response
/// - 200 OK: password changed, the code is spent
/// - 400 Bad Request: wrong, expired or already used code, or a code that
///   has had too many wrong guesses
/// - 422 Unprocessable Entity: malformed code or unacceptable password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let code = req.code.trim();
    validation::validate_recovery_code(code)?;
    validation::validate_new_password(&req.new_password, &req.confirm_password)?;

    let invalid = || AppError::BadRequest("Invalid or expired code".to_string());

    // Wrong guesses are rejected before any hashing work
    if !state.db.check_recovery_code(&req.email, code).await? {
        tracing::warn!("Password reset with a wrong or expired code");
        return Err(invalid());
    }

    let password_hash = auth::hash_password(req.new_password).await?;
    if !state
        .db
        .reset_password_with_code(&req.email, code, &password_hash)
        .await?
    {
        return Err(invalid());
    }

    tracing::info!("Password reset with a recovery code");
    Ok(Json(MessageResponse::new("Your password was updated")))
}
