pub mod reminders;

pub use reminders::{is_due_for_reminder, ReminderService, DEFAULT_REMINDER_WINDOW_MINUTES};
