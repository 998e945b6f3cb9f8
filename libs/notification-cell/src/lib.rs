// libs/notification-cell/src/lib.rs
//! Best-effort SMS and email delivery.
//!
//! Callers hold an `Arc<dyn Notifier>`. Delivery never returns `Err`; a failed or
//! unconfigured channel comes back as a `DeliveryResult` with `success == false`.

pub mod models;
pub mod services;
pub mod templates;

pub use models::{DeliveryResult, EmailMessage, NotificationError};
pub use services::{EmailClient, NotificationDispatcher, Notifier, RecordingNotifier, SentNotification, SmsClient};
