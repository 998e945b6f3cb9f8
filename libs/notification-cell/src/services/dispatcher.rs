// libs/notification-cell/src/services/dispatcher.rs
use async_trait::async_trait;
use tracing::{info, warn};

use shared_config::AppConfig;

use crate::models::{DeliveryResult, NotificationError};
use crate::services::email::EmailClient;
use crate::services::sms::SmsClient;

/// Fan-out to SMS and email. Implementations must not panic or return errors;
/// every outcome is reported through `DeliveryResult`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult;

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> DeliveryResult;
}

/// Production notifier backed by the HTTP SMS gateway and email API.
/// A channel whose configuration is missing reports every send as failed.
pub struct NotificationDispatcher {
    sms: Option<SmsClient>,
    email: Option<EmailClient>,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        let sms = SmsClient::new(config)
            .map_err(|e| warn!("SMS notifications disabled: {}", e))
            .ok();
        let email = EmailClient::new(config)
            .map_err(|e| warn!("Email notifications disabled: {}", e))
            .ok();

        info!(
            "Notification dispatcher ready (sms: {}, email: {})",
            sms.is_some(),
            email.is_some()
        );

        Self { sms, email }
    }

    pub fn sms_enabled(&self) -> bool {
        self.sms.is_some()
    }

    pub fn email_enabled(&self) -> bool {
        self.email.is_some()
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult {
        let Some(client) = &self.sms else {
            return NotificationError::NotConfigured("SMS").into();
        };

        match client.send(to, message).await {
            Ok(()) => DeliveryResult::delivered(),
            Err(e) => {
                warn!("SMS to {} failed: {}", to, e);
                e.into()
            }
        }
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> DeliveryResult {
        let Some(client) = &self.email else {
            return NotificationError::NotConfigured("Email").into();
        };

        match client.send(to, subject, html).await {
            Ok(()) => DeliveryResult::delivered(),
            Err(e) => {
                warn!("Email to {} failed: {}", to, e);
                e.into()
            }
        }
    }
}
