// libs/jobs-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consultation_cell::ConsultationError;
use payment_cell::PaymentError;
use shared_models::error::AppError;

/// Delivery tally for one side of the reminder run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceCounts {
    pub sent: usize,
    pub failed: usize,
    /// No contact on file for this side; not a delivery failure.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReminderResult {
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub consultations: usize,
    pub patients: AudienceCounts,
    pub providers: AudienceCounts,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Patient,
    Provider,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Patient => "patient",
            Audience::Provider => "provider",
        }
    }
}

/// Outcome of a single reminder attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderDelivery {
    Sent,
    Skipped,
    Failed(String),
}

impl ReminderResult {
    pub fn record(&mut self, audience: Audience, delivery: ReminderDelivery) {
        let counts = match audience {
            Audience::Patient => &mut self.patients,
            Audience::Provider => &mut self.providers,
        };
        match delivery {
            ReminderDelivery::Sent => counts.sent += 1,
            ReminderDelivery::Skipped => counts.skipped += 1,
            ReminderDelivery::Failed(error) => {
                counts.failed += 1;
                self.errors.push(error);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileQuery {
    pub days: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Reminder job failed: {0}")]
    Reminders(#[from] ConsultationError),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(#[from] PaymentError),
}

impl From<JobError> for AppError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Reminders(inner) => inner.into(),
            JobError::Reconciliation(inner) => inner.into(),
        }
    }
}
