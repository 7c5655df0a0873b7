// =============================================================================
// GOOGLE OAUTH
// =============================================================================
// Authorization-code flow against Google. The console redirects the browser to
// `authorize_url`, Google sends it back to `{PUBLIC_BASE_URL}/auth/callback`,
// and the console forwards `code` and `state` to the callback endpoint, which
// exchanges the code and reads the verified email of the Google account.
// =============================================================================

use reqwest::Url;
use serde::Deserialize;

use crate::config::GoogleOAuthConfig;
use crate::error::{AppError, AppResult};

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPE: &str = "openid email profile";

#[derive(Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The parts of the OpenID userinfo document we use
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
}

impl GoogleOAuth {
    pub fn new(http: reqwest::Client, config: &GoogleOAuthConfig, public_base_url: &str) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!("{}/auth/callback", public_base_url.trim_end_matches('/')),
        }
    }

    /// Google consent URL; always shows the account chooser
    pub fn authorize_url(&self, state: &str) -> AppResult<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Invalid authorize URL: {e}")))?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for the Google account behind it
    pub async fn fetch_user(&self, code: &str) -> AppResult<GoogleUser> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                tracing::warn!(error = %e, "Google rejected the authorization code");
                AppError::Unauthorized("Google sign-in failed. Please try again".to_string())
            })?
            .json()
            .await?;

        let user: GoogleUser = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !user.email_verified {
            return Err(AppError::Forbidden(
                "The Google account email is not verified".to_string(),
            ));
        }

        Ok(user)
    }
}
