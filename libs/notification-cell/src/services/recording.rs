// libs/notification-cell/src/services/recording.rs
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::DeliveryResult;
use crate::services::dispatcher::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    Sms { to: String, message: String },
    Email { to: String, subject: String, html: String },
}

impl SentNotification {
    pub fn recipient(&self) -> &str {
        match self {
            SentNotification::Sms { to, .. } | SentNotification::Email { to, .. } => to,
        }
    }
}

/// In-process notifier that records every attempt. Used for local runs and tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails after being recorded.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }

    fn outcome(&self) -> DeliveryResult {
        if self.failing {
            DeliveryResult::failed("simulated delivery failure")
        } else {
            DeliveryResult::delivered()
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_sms(&self, to: &str, message: &str) -> DeliveryResult {
        self.sent.lock().await.push(SentNotification::Sms {
            to: to.to_string(),
            message: message.to_string(),
        });
        self.outcome()
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> DeliveryResult {
        self.sent.lock().await.push(SentNotification::Email {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        self.outcome()
    }
}
