// =============================================================================
// USER HANDLERS
// =============================================================================
// Account management for administrators, and the signed-in user's own
// profile and password.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, AuthSession};
use crate::codes;
use crate::db::{EMAIL_CONSTRAINT, EMPLOYEE_CODE_CONSTRAINT};
use crate::error::{is_unique_violation_of, AppError, AppResult};
use crate::models::*;
use crate::validation;
use crate::AppState;

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

/// GET /api/v1/users?role=employee&active=true&search=ana
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<UserFilters>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.db.list_users(&filters).await?))
}

/// GET /api/v1/users/admins/active
pub async fn active_admins(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.db.active_admins().await?))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = state.db.get_user(id).await?.ok_or_else(user_not_found)?;
    Ok(Json(user))
}

// -----------------------------------------------------------------------------
// CREATE
// -----------------------------------------------------------------------------
/// POST /api/v1/users
///
/// The new account's password is its email address. Employees also get a
/// unique five-digit code.
///
/// # Response
/// - 201 Created
/// - 409 Conflict: "This email is already registered"
/// - 422 Unprocessable Entity: form validation failed
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    validation::validate_new_user(&req)?;

    let password_hash = auth::hash_password(req.email.trim().to_lowercase()).await?;

    let created = match req.role {
        UserRole::Employee => {
            codes::retry_on_collision(
                codes::employee_code,
                |err| is_unique_violation_of(err, EMPLOYEE_CODE_CONSTRAINT),
                |code| {
                    let db = &state.db;
                    let req = &req;
                    let password_hash = &password_hash;
                    async move { db.create_user(req, password_hash, Some(&code)).await }
                },
            )
            .await
        }
        UserRole::Admin => state.db.create_user(&req, &password_hash, None).await,
    };

    let user = created.map_err(|err| {
        if is_unique_violation_of(&err, EMAIL_CONSTRAINT) {
            AppError::Conflict("This email is already registered".to_string())
        } else {
            err
        }
    })?;

    tracing::info!(
        user_id = %user.id,
        name = %user.full_name(),
        role = user.role.as_str(),
        employee_code = user.employee_code.as_deref().unwrap_or("-"),
        "User created"
    );
    Ok((StatusCode::CREATED, Json(user)))
}

// -----------------------------------------------------------------------------
// UPDATE / ACTIVATION
// -----------------------------------------------------------------------------

/// PUT /api/v1/users/:id
///
/// Only `name` and `surname` can change; any other field is rejected.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    validation::validate_user_update(&req)?;
    let user = state
        .db
        .update_user(id, &req)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

/// POST /api/v1/users/:id/activate
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = state
        .db
        .set_user_active(id, true)
        .await?
        .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %id, "User activated");
    Ok(Json(user))
}

/// POST /api/v1/users/:id/deactivate
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    ensure_not_self(session.user.id, id)?;

    let user = state
        .db
        .set_user_active(id, false)
        .await?
        .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %id, by = %session.user.id, "User deactivated");
    Ok(Json(user))
}

fn ensure_not_self(acting: Uuid, target: Uuid) -> AppResult<()> {
    if acting == target {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// OWN PROFILE
// -----------------------------------------------------------------------------

/// GET /api/v1/profile
pub async fn profile(Extension(session): Extension<AuthSession>) -> Json<User> {
    Json(session.user)
}

/// POST /api/v1/profile/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    validation::validate_new_password(&req.new_password, &req.confirm_password)?;

    let password_hash = auth::hash_password(req.new_password).await?;
    if !state
        .db
        .set_password_hash(session.user.id, &password_hash)
        .await?
    {
        return Err(user_not_found());
    }

    tracing::info!(user_id = %session.user.id, "Password changed");
    Ok(Json(MessageResponse::new("Your password was updated")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_cannot_deactivate_themselves() {
        let me = Uuid::new_v4();
        assert!(matches!(ensure_not_self(me, me), Err(AppError::BadRequest(_))));
        assert!(ensure_not_self(me, Uuid::new_v4()).is_ok());
    }
}
