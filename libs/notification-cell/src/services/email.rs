// libs/notification-cell/src/services/email.rs
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::NotificationError;

const EMAIL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Transactional email client for a Resend-compatible API.
pub struct EmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_email_configured() {
            return Err(NotificationError::NotConfigured("Email"));
        }

        let client = Client::builder().timeout(EMAIL_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError> {
        let to = to.trim();
        if !to.contains('@') {
            return Err(NotificationError::InvalidRecipient(to.to_string()));
        }

        debug!("Sending email '{}' to {}", subject, to);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmailRequest {
                from: &self.from,
                to: [to],
                subject,
                html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Email API rejected message to {}: {} - {}", to, status, body);
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        info!("Email '{}' delivered to {}", subject, to);
        Ok(())
    }
}
