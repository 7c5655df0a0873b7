// =============================================================================
// EMAIL MODULE
// =============================================================================
// Transactional email through the EmailJS REST API. Two templates:
//
// - recovery     the 6-digit password recovery code
// - discrepancy  a count that didn't match the system quantity, sent to
//                every active administrator
//
// Without EmailJS configuration the client is disabled: recovery fails with
// 503 and discrepancy notices are skipped.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use crate::metrics;

#[derive(Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    config: Option<EmailConfig>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: Value,
}

/// What an administrator needs to know about a mismatched count
#[derive(Debug, Clone)]
pub struct DiscrepancyNotice {
    pub product_name: String,
    pub product_sku: String,
    pub system_quantity: i32,
    pub physical_quantity: i32,
    pub employee_code: String,
    pub observations: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl EmailClient {
    pub fn new(http: reqwest::Client, config: Option<EmailConfig>) -> Self {
        Self { http, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub async fn send_recovery_code(&self, to_email: &str, code: &str) -> AppResult<()> {
        let Some(config) = &self.config else {
            metrics::record_email("recovery", "skipped");
            return Err(AppError::Unavailable(
                "Email delivery is not configured".to_string(),
            ));
        };

        let params = recovery_params(to_email, code, &config.reply_to);
        let result = self.send(config, &config.recovery_template_id, params).await;
        metrics::record_email("recovery", outcome(&result));
        result
    }

    /// Notify administrators. Returns Ok without sending when email is
    /// disabled or there is nobody to notify.
    pub async fn send_discrepancy(
        &self,
        notice: &DiscrepancyNotice,
        admin_emails: &[String],
    ) -> AppResult<()> {
        let Some(config) = &self.config else {
            tracing::warn!("Email is not configured, discrepancy notice skipped");
            metrics::record_email("discrepancy", "skipped");
            return Ok(());
        };
        if admin_emails.is_empty() {
            tracing::warn!("No active administrators to notify about a discrepancy");
            metrics::record_email("discrepancy", "skipped");
            return Ok(());
        }

        let params = discrepancy_params(notice, admin_emails);
        let result = self
            .send(config, &config.discrepancy_template_id, params)
            .await;
        metrics::record_email("discrepancy", outcome(&result));
        result
    }

    async fn send(&self, config: &EmailConfig, template_id: &str, params: Value) -> AppResult<()> {
        let url = format!("{}/email/send", config.api_url.trim_end_matches('/'));
        let body = SendRequest {
            service_id: &config.service_id,
            template_id,
            user_id: &config.public_key,
            template_params: params,
        };

        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, template_id, "EmailJS rejected the message");
            return Err(AppError::Upstream(format!("Email service answered {status}")));
        }

        tracing::info!(template_id, "Email sent");
        Ok(())
    }
}

fn outcome(result: &AppResult<()>) -> &'static str {
    if result.is_ok() {
        "sent"
    } else {
        "failed"
    }
}

pub fn recovery_params(to_email: &str, code: &str, reply_to: &str) -> Value {
    json!({
        "to_email": to_email,
        "code": code,
        "reply_to": reply_to,
    })
}

pub fn discrepancy_params(notice: &DiscrepancyNotice, admin_emails: &[String]) -> Value {
    let observations = notice
        .observations
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or("None");

    json!({
        "to_name": "Administrators",
        "email": admin_emails.join(", "),
        "product_name": notice.product_name,
        "product_code": notice.product_sku,
        "system_qty": notice.system_quantity,
        "physical_qty": notice.physical_quantity,
        "employee_code": notice.employee_code,
        "observations": observations,
        "date": notice.checked_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notice(observations: Option<&str>) -> DiscrepancyNotice {
        DiscrepancyNotice {
            product_name: "Safety gloves".to_string(),
            product_sku: "PROD-ABC123".to_string(),
            system_quantity: 10,
            physical_quantity: 8,
            employee_code: "48213".to_string(),
            observations: observations.map(str::to_string),
            checked_at: Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap(),
        }
    }

    #[test]
    fn recovery_params_carry_code_and_reply_to() {
        let params = recovery_params("ana@citapp.com", "123456", "soporte@citapp.com");
        assert_eq!(params["to_email"], "ana@citapp.com");
        assert_eq!(params["code"], "123456");
        assert_eq!(params["reply_to"], "soporte@citapp.com");
    }

    #[test]
    fn discrepancy_params_join_recipients() {
        let admins = vec!["a@citapp.com".to_string(), "b@citapp.com".to_string()];
        let params = discrepancy_params(&notice(Some("Two boxes damaged")), &admins);
        assert_eq!(params["to_name"], "Administrators");
        assert_eq!(params["email"], "a@citapp.com, b@citapp.com");
        assert_eq!(params["product_code"], "PROD-ABC123");
        assert_eq!(params["system_qty"], 10);
        assert_eq!(params["physical_qty"], 8);
        assert_eq!(params["observations"], "Two boxes damaged");
        assert_eq!(params["date"], "2026-03-09 14:05 UTC");
    }

    #[test]
    fn blank_observations_read_none() {
        let params = discrepancy_params(&notice(Some("  ")), &[]);
        assert_eq!(params["observations"], "None");
        let params = discrepancy_params(&notice(None), &[]);
        assert_eq!(params["observations"], "None");
    }

    #[tokio::test]
    async fn disabled_client_refuses_recovery_and_skips_notices() {
        let client = EmailClient::new(reqwest::Client::new(), None);
        assert!(!client.is_enabled());
        assert!(matches!(
            client.send_recovery_code("ana@citapp.com", "123456").await,
            Err(AppError::Unavailable(_))
        ));
        assert!(client
            .send_discrepancy(&notice(None), &["a@citapp.com".to_string()])
            .await
            .is_ok());
    }
}
