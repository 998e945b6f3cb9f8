// libs/jobs-cell/src/lib.rs
//! Periodic jobs triggered by an external scheduler: payment reconciliation and
//! upcoming-consultation reminders. Both are safe to run concurrently with
//! themselves and with live traffic.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AudienceCounts, JobError, ReminderResult};
pub use router::jobs_routes;
pub use services::{is_due_for_reminder, ReminderService};
