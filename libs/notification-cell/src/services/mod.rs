pub mod dispatcher;
pub mod email;
pub mod recording;
pub mod sms;

pub use dispatcher::{NotificationDispatcher, Notifier};
pub use email::EmailClient;
pub use recording::{RecordingNotifier, SentNotification};
pub use sms::SmsClient;
