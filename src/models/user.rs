use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// USER ROLE
// =============================================================================
// Stored as the Postgres enum `user_role`. Fixed at account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Employee => "employee",
        }
    }
}

// =============================================================================
// USER ACCOUNT
// =============================================================================
/// An account row. The password hash never leaves the service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub surname: Option<String>,

    /// Always stored lowercase
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub active: bool,

    /// Five-digit code employees type when submitting counts
    pub employee_code: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn full_name(&self) -> String {
        match self.surname.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(surname) => format!("{} {}", self.name, surname),
            None => self.name.clone(),
        }
    }
}

// =============================================================================
// API REQUEST STRUCTURES
// =============================================================================

/// Request body for creating an account
///
/// The initial password is the (lowercased) email address; the owner changes
/// it from their profile or through password recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub role: UserRole,
    pub name: String,

    #[serde(default)]
    pub surname: Option<String>,

    pub email: String,
    pub confirm_email: String,
}

/// Only names are editable. Unknown fields (such as `role`) are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
}

/// Query parameters for the account list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilters {
    pub role: Option<UserRole>,
    pub active: Option<bool>,

    /// Substring of name, surname, email or employee code
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            role: UserRole::Employee,
            name: "Ana".to_string(),
            surname: Some("López".to_string()),
            email: "ana@example.com".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            active: true,
            employee_code: Some("48213".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "employee");
        assert_eq!(json["employee_code"], "48213");
    }

    #[test]
    fn full_name_skips_blank_surname() {
        let mut user = sample_user();
        assert_eq!(user.full_name(), "Ana López");
        user.surname = Some("  ".to_string());
        assert_eq!(user.full_name(), "Ana");
    }

    #[test]
    fn update_request_rejects_role_changes() {
        let result: Result<UpdateUserRequest, _> =
            serde_json::from_str(r#"{"name":"Ana","role":"admin"}"#);
        assert!(result.is_err());
    }
}
