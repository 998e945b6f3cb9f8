// libs/notification-cell/src/services/sms.rs
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::NotificationError;

const SMS_TIMEOUT: Duration = Duration::from_secs(10);
const COUNTRY_CODE: &str = "232";

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    from: &'a str,
    message: &'a str,
}

/// HTTP SMS gateway client. Posts `{to, from, message}` with a bearer key.
pub struct SmsClient {
    client: Client,
    api_url: String,
    api_key: String,
    sender_id: String,
}

impl SmsClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_sms_configured() {
            return Err(NotificationError::NotConfigured("SMS"));
        }

        let client = Client::builder().timeout(SMS_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: config.sms_api_url.clone(),
            api_key: config.sms_api_key.clone(),
            sender_id: config.sms_sender_id.clone(),
        })
    }

    pub async fn send(&self, to: &str, message: &str) -> Result<(), NotificationError> {
        let to = normalize_phone(to)?;
        debug!("Sending SMS to {}", to);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&SmsRequest {
                to: &to,
                from: &self.sender_id,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SMS gateway rejected message to {}: {} - {}", to, status, body);
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        info!("SMS delivered to {}", to);
        Ok(())
    }
}

/// Normalize a Sierra Leone number to `+232XXXXXXXX`.
///
/// Accepts local (`076 123 456`), bare international (`23276123456`) and
/// already-prefixed forms. Separators are stripped.
pub fn normalize_phone(raw: &str) -> Result<String, NotificationError> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if let Some(rest) = digits.strip_prefix('+') {
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(NotificationError::InvalidRecipient(raw.to_string()));
        }
        return Ok(digits);
    }

    let national = match digits.len() {
        11 => digits.strip_prefix(COUNTRY_CODE),
        9 => digits.strip_prefix('0'),
        _ => Some(digits.as_str()),
    }
    .unwrap_or(digits.as_str());

    if national.len() != 8 || !national.chars().all(|c| c.is_ascii_digit()) {
        return Err(NotificationError::InvalidRecipient(raw.to_string()));
    }

    Ok(format!("+{}{}", COUNTRY_CODE, national))
}
