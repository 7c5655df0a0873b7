use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

// =============================================================================
// AUTHENTICATION REQUESTS/RESPONSES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Returned by email/password sign-in and by the OAuth callback
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentSessionResponse {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub new_password: String,
    pub confirm_password: String,
}

/// Step 1 of recovery: send a code to this address
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryRequest {
    pub email: String,
}

/// Step 2 of recovery: code from the email plus the new password
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

/// Query string Google sends back to the redirect URI
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
