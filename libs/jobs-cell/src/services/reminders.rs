// libs/jobs-cell/src/services/reminders.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use consultation_cell::{Consultation, ConsultationService, ConsultationStatus, Contact};
use notification_cell::{templates, Notifier};

use crate::models::{Audience, JobError, ReminderDelivery, ReminderResult};

pub const DEFAULT_REMINDER_WINDOW_MINUTES: i64 = 60;

/// True when a consultation should be reminded about in a run at `now`.
pub fn is_due_for_reminder(consultation: &Consultation, now: DateTime<Utc>, window: Duration) -> bool {
    consultation.status == ConsultationStatus::Scheduled
        && consultation
            .scheduled_at
            .is_some_and(|at| at >= now && at <= now + window)
}

pub struct ReminderService {
    consultations: Arc<ConsultationService>,
    notifier: Arc<dyn Notifier>,
    window: Duration,
}

impl ReminderService {
    pub fn new(consultations: Arc<ConsultationService>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            consultations,
            notifier,
            window: Duration::minutes(DEFAULT_REMINDER_WINDOW_MINUTES),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Remind both sides of every consultation starting within the window.
    ///
    /// Each reminder is attempted on its own; a failure on one side is counted
    /// and never stops the other.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderResult, JobError> {
        let window_end = now + self.window;
        let due: Vec<Consultation> = self.consultations
            .list_scheduled_between(now, window_end)
            .await?
            .into_iter()
            .filter(|c| is_due_for_reminder(c, now, self.window))
            .collect();

        info!("Sending reminders for {} upcoming consultations", due.len());

        let outcomes = join_all(due.iter().map(|c| self.remind(c))).await;

        let mut result = ReminderResult {
            window_start: Some(now),
            window_end: Some(window_end),
            consultations: due.len(),
            ..Default::default()
        };
        for (patient, provider) in outcomes {
            result.record(Audience::Patient, patient);
            result.record(Audience::Provider, provider);
        }

        info!(
            "Reminders done: patients {}/{}/{} providers {}/{}/{} (sent/failed/skipped)",
            result.patients.sent,
            result.patients.failed,
            result.patients.skipped,
            result.providers.sent,
            result.providers.failed,
            result.providers.skipped
        );
        Ok(result)
    }

    async fn remind(&self, consultation: &Consultation) -> (ReminderDelivery, ReminderDelivery) {
        let contacts = match self.consultations.contacts_for(consultation).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!("Could not load contacts for consultation {}: {}", consultation.id, e);
                let error = format!("consultation {}: contact lookup failed: {}", consultation.id, e);
                return (ReminderDelivery::Failed(error.clone()), ReminderDelivery::Failed(error));
            }
        };

        let patient_name = contacts.patient.as_ref().and_then(|p| p.full_name.clone());

        let patient = self.deliver(Audience::Patient, consultation, contacts.patient.as_ref(), None);
        let provider = self.deliver(
            Audience::Provider,
            consultation,
            contacts.provider.as_ref(),
            patient_name.as_deref(),
        );

        tokio::join!(patient, provider)
    }

    async fn deliver(
        &self,
        audience: Audience,
        consultation: &Consultation,
        contact: Option<&Contact>,
        patient_name: Option<&str>,
    ) -> ReminderDelivery {
        let Some(contact) = contact else {
            debug!("No {} linked to consultation {}", audience.as_str(), consultation.id);
            return ReminderDelivery::Skipped;
        };
        let Some(at) = consultation.scheduled_at else {
            return ReminderDelivery::Skipped;
        };
        let kind = consultation.consultation_type.to_string();

        let result = if let Some(phone) = contact.phone.as_deref().filter(|p| !p.is_empty()) {
            let message = match audience {
                Audience::Patient => templates::patient_reminder_sms(&kind, at),
                Audience::Provider => templates::provider_reminder_sms(patient_name, &kind, at),
            };
            self.notifier.send_sms(phone, &message).await
        } else if let Some(email) = contact.email.as_deref().filter(|e| !e.is_empty()) {
            let message = templates::reminder_email(contact.full_name.as_deref(), &kind, at);
            self.notifier.send_email(email, &message.subject, &message.html).await
        } else {
            debug!("{} {} has no phone or email", audience.as_str(), contact.user_id);
            return ReminderDelivery::Skipped;
        };

        if result.success {
            ReminderDelivery::Sent
        } else {
            let error = format!(
                "{} reminder for consultation {}: {}",
                audience.as_str(),
                consultation.id,
                result.error.as_deref().unwrap_or("delivery failed")
            );
            warn!("{}", error);
            ReminderDelivery::Failed(error)
        }
    }
}
