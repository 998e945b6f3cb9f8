// libs/notification-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{0} delivery not configured")]
    NotConfigured(&'static str),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected message: HTTP {status}: {body}")]
    Provider { status: u16, body: String },
}

impl From<NotificationError> for DeliveryResult {
    fn from(e: NotificationError) -> Self {
        DeliveryResult::failed(e.to_string())
    }
}
