// libs/consultation-cell/src/services/consultation.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::models::{
    Action, Actor, Consultation, ConsultationContacts, ConsultationError, ConsultationPatch,
    ConsultationPricing, ConsultationStatus, CreateConsultationRequest, NewConsultation,
    TransitionRequest,
};
use crate::services::repository::{ConsultationRepository, SupabaseConsultationRepository};
use crate::services::transitions::{check_action, validate_transition};

const MAX_DURATION_MINUTES: i32 = 480;
const MAX_NOTE_LENGTH: usize = 10_000;

/// What the payment-confirmation cascade did to the linked consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCascade {
    Scheduled(Consultation),
    AlreadyScheduled,
    Skipped(String),
}

pub struct ConsultationService {
    repository: Arc<dyn ConsultationRepository>,
    pricing: ConsultationPricing,
}

impl ConsultationService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_repository(Arc::new(SupabaseConsultationRepository::new(config)))
    }

    pub fn with_repository(repository: Arc<dyn ConsultationRepository>) -> Self {
        Self {
            repository,
            pricing: ConsultationPricing::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: ConsultationPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn pricing(&self) -> &ConsultationPricing {
        &self.pricing
    }

    pub fn repository(&self) -> Arc<dyn ConsultationRepository> {
        Arc::clone(&self.repository)
    }

    /// Book a consultation. Drafts are never persisted; the record lands in
    /// `pending_admin_review` after the draft edge is validated for the caller.
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateConsultationRequest,
    ) -> Result<Consultation, ConsultationError> {
        info!("Creating {} consultation for user {}", request.consultation_type, actor.user_id);

        validate_transition(ConsultationStatus::Draft, ConsultationStatus::PendingAdminReview, actor.role)?;

        let user_id = match (actor.role, request.patient_id) {
            (Role::Admin, Some(patient_id)) => patient_id,
            (Role::Admin, None) => {
                return Err(ConsultationError::ValidationError(
                    "patient_id is required when an admin books a consultation".to_string(),
                ))
            }
            (_, Some(patient_id)) if patient_id != actor.user_id => {
                return Err(ConsultationError::Unauthorized(
                    "Patients can only book consultations for themselves".to_string(),
                ))
            }
            _ => actor.user_id,
        };

        if let Some(range) = &request.preferred_time_range {
            validate_time_range(range)?;
        }

        let reason = request.reason_for_consultation
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let new = NewConsultation {
            user_id,
            consultation_type: request.consultation_type,
            status: ConsultationStatus::PendingAdminReview,
            preferred_date: request.preferred_date,
            preferred_time_range: request.preferred_time_range,
            duration_minutes: self.pricing.duration_for(request.consultation_type),
            cost_leone: self.pricing.cost_for(request.consultation_type),
            reason_for_consultation: reason,
        };

        let consultation = self.repository.insert(new).await?;
        info!("Consultation {} created in {}", consultation.id, consultation.status);
        Ok(consultation)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Consultation, ConsultationError> {
        let consultation = self.load(id).await?;
        self.authorize_access(actor, &consultation).await?;
        Ok(consultation)
    }

    /// Fetch without an ownership check, for server-side callers (payments, jobs).
    pub async fn load(&self, id: Uuid) -> Result<Consultation, ConsultationError> {
        self.repository.get(id).await?.ok_or(ConsultationError::NotFound)
    }

    pub async fn contacts_for(&self, consultation: &Consultation) -> Result<ConsultationContacts, ConsultationError> {
        self.repository.contacts_for(consultation).await
    }

    /// Scheduled consultations starting within `[from, to]`.
    pub async fn list_scheduled_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        self.repository
            .list_by_status_scheduled_between(ConsultationStatus::Scheduled, from, to)
            .await
    }

    pub async fn list_mine(&self, actor: &Actor) -> Result<Vec<Consultation>, ConsultationError> {
        self.repository.list_for_patient(actor.user_id).await
    }

    /// A doctor's queue: everything assigned to their provider record.
    pub async fn list_queue(&self, actor: &Actor) -> Result<Vec<Consultation>, ConsultationError> {
        if actor.role != Role::Doctor {
            return Err(ConsultationError::Unauthorized("Only doctors have a consultation queue".to_string()));
        }
        let provider_id = self.repository.provider_id_for_user(actor.user_id).await?
            .ok_or_else(|| ConsultationError::Unauthorized("No provider profile linked to this user".to_string()))?;
        self.repository.list_for_provider(provider_id).await
    }

    /// Generic status change. Every status write in the system funnels through here
    /// or through `schedule_after_payment`, both of which consult the transition table.
    pub async fn transition(
        &self,
        actor: &Actor,
        id: Uuid,
        request: TransitionRequest,
    ) -> Result<Consultation, ConsultationError> {
        let target: ConsultationStatus = request.status.parse()?;
        let consultation = self.get(actor, id).await?;

        debug!("Transition request {} -> {} on {}", consultation.status, target, id);

        if consultation.status == target {
            return Ok(consultation);
        }

        validate_transition(consultation.status, target, actor.role)?;

        let mut patch = ConsultationPatch {
            status: Some(target),
            ..Default::default()
        };

        match target {
            ConsultationStatus::Assigned => {
                let provider_id = request.provider_id.ok_or_else(|| {
                    ConsultationError::ValidationError("provider_id is required to assign a consultation".to_string())
                })?;
                patch.provider_id = Some(provider_id);
            }
            ConsultationStatus::Scheduled => {
                let scheduled_at = request.scheduled_at.or(consultation.scheduled_at).ok_or_else(|| {
                    ConsultationError::ValidationError("scheduled_at is required to schedule a consultation".to_string())
                })?;
                patch.scheduled_at = Some(scheduled_at);
            }
            ConsultationStatus::Cancelled => {
                if let Some(reason) = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    patch.notes = Some(append_note(
                        consultation.notes.as_deref(),
                        &format!("Cancelled by {}: {}", actor.role, reason),
                        Utc::now(),
                    ));
                }
            }
            _ => {}
        }

        let updated = self.repository.update(id, consultation.status, patch).await?;
        info!("Consultation {} moved {} -> {} by {}", id, consultation.status, updated.status, actor.role);
        Ok(updated)
    }

    pub async fn confirm(&self, actor: &Actor, id: Uuid) -> Result<Consultation, ConsultationError> {
        self.transition(actor, id, status_request(ConsultationStatus::Confirmed)).await
    }

    pub async fn schedule(
        &self,
        actor: &Actor,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Consultation, ConsultationError> {
        let mut request = status_request(ConsultationStatus::Scheduled);
        request.scheduled_at = Some(scheduled_at);
        self.transition(actor, id, request).await
    }

    pub async fn start(&self, actor: &Actor, id: Uuid) -> Result<Consultation, ConsultationError> {
        self.transition(actor, id, status_request(ConsultationStatus::InProgress)).await
    }

    pub async fn complete(&self, actor: &Actor, id: Uuid) -> Result<Consultation, ConsultationError> {
        self.transition(actor, id, status_request(ConsultationStatus::Completed)).await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Consultation, ConsultationError> {
        let mut request = status_request(ConsultationStatus::Cancelled);
        request.reason = reason;
        self.transition(actor, id, request).await
    }

    /// Assign a provider. From `pending_admin_review` this is the `assigned`
    /// transition; afterwards it only swaps the provider, gated by the action table.
    pub async fn assign_provider(
        &self,
        actor: &Actor,
        id: Uuid,
        provider_id: Uuid,
    ) -> Result<Consultation, ConsultationError> {
        let consultation = self.get(actor, id).await?;

        if consultation.status == ConsultationStatus::PendingAdminReview {
            let mut request = status_request(ConsultationStatus::Assigned);
            request.provider_id = Some(provider_id);
            return self.transition(actor, id, request).await;
        }

        check_action(consultation.status, actor.role, Action::AssignProvider)?;

        if consultation.provider_id == Some(provider_id) {
            return Ok(consultation);
        }

        let updated = self.repository.update(id, consultation.status, ConsultationPatch {
            provider_id: Some(provider_id),
            ..Default::default()
        }).await?;
        info!("Consultation {} reassigned to provider {}", id, provider_id);
        Ok(updated)
    }

    pub async fn reschedule(
        &self,
        actor: &Actor,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Consultation, ConsultationError> {
        let consultation = self.get(actor, id).await?;
        check_action(consultation.status, actor.role, Action::Reschedule)?;

        let updated = self.repository.update(id, consultation.status, ConsultationPatch {
            scheduled_at: Some(scheduled_at),
            ..Default::default()
        }).await?;
        info!("Consultation {} rescheduled to {}", id, scheduled_at);
        Ok(updated)
    }

    /// Notes are append-only: each entry is stamped and added after the existing text.
    pub async fn append_notes(
        &self,
        actor: &Actor,
        id: Uuid,
        text: &str,
    ) -> Result<Consultation, ConsultationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConsultationError::ValidationError("notes cannot be empty".to_string()));
        }
        if text.len() > MAX_NOTE_LENGTH {
            return Err(ConsultationError::ValidationError(format!(
                "notes cannot exceed {} characters", MAX_NOTE_LENGTH
            )));
        }

        let consultation = self.get(actor, id).await?;
        check_action(consultation.status, actor.role, Action::UpdateNotes)?;

        self.repository.update(id, consultation.status, ConsultationPatch {
            notes: Some(append_note(consultation.notes.as_deref(), text, Utc::now())),
            ..Default::default()
        }).await
    }

    pub async fn update_duration(
        &self,
        actor: &Actor,
        id: Uuid,
        duration_minutes: i32,
    ) -> Result<Consultation, ConsultationError> {
        if !(1..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
            return Err(ConsultationError::ValidationError(format!(
                "duration_minutes must be between 1 and {}", MAX_DURATION_MINUTES
            )));
        }

        let consultation = self.get(actor, id).await?;
        check_action(consultation.status, actor.role, Action::UpdateDuration)?;

        self.repository.update(id, consultation.status, ConsultationPatch {
            duration_minutes: Some(duration_minutes),
            ..Default::default()
        }).await
    }

    /// Fast-forward a consultation to `scheduled` once its payment is confirmed.
    ///
    /// Runs with admin authority through the same transition table as user requests,
    /// so it only fires from `confirmed`. Anything else is reported, never forced.
    pub async fn schedule_after_payment(&self, id: Uuid) -> Result<PaymentCascade, ConsultationError> {
        let consultation = self.load(id).await?;

        if consultation.status == ConsultationStatus::Scheduled {
            debug!("Consultation {} already scheduled, cascade is a no-op", id);
            return Ok(PaymentCascade::AlreadyScheduled);
        }

        if let Err(e) = validate_transition(consultation.status, ConsultationStatus::Scheduled, Role::Admin) {
            warn!("Payment cascade skipped for consultation {}: {}", id, e);
            return Ok(PaymentCascade::Skipped(e.to_string()));
        }

        let Some(scheduled_at) = consultation.scheduled_at else {
            let reason = format!("consultation {} has no scheduled_at yet", id);
            warn!("Payment cascade skipped: {}", reason);
            return Ok(PaymentCascade::Skipped(reason));
        };

        let result = self.repository.update(id, consultation.status, ConsultationPatch {
            status: Some(ConsultationStatus::Scheduled),
            scheduled_at: Some(scheduled_at),
            ..Default::default()
        }).await;

        match result {
            Ok(updated) => {
                info!("Consultation {} scheduled after payment confirmation", id);
                Ok(PaymentCascade::Scheduled(updated))
            }
            Err(e @ ConsultationError::StatusChanged { .. }) => {
                warn!("Payment cascade skipped for consultation {}: {}", id, e);
                Ok(PaymentCascade::Skipped(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn authorize_access(&self, actor: &Actor, consultation: &Consultation) -> Result<(), ConsultationError> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Patient => consultation.user_id == actor.user_id,
            Role::Doctor => match consultation.provider_id {
                Some(provider_id) => {
                    self.repository.provider_id_for_user(actor.user_id).await? == Some(provider_id)
                }
                None => false,
            },
        };

        if allowed {
            Ok(())
        } else {
            warn!("User {} ({}) denied access to consultation {}", actor.user_id, actor.role, consultation.id);
            Err(ConsultationError::Unauthorized("Not authorized to access this consultation".to_string()))
        }
    }
}

fn status_request(status: ConsultationStatus) -> TransitionRequest {
    TransitionRequest {
        status: status.as_str().to_string(),
        provider_id: None,
        scheduled_at: None,
        reason: None,
    }
}

fn append_note(existing: Option<&str>, text: &str, at: DateTime<Utc>) -> String {
    let entry = format!("[{}] {}", at.format("%Y-%m-%d %H:%M UTC"), text);
    match existing.map(str::trim_end).filter(|e| !e.is_empty()) {
        Some(existing) => format!("{}\n\n{}", existing, entry),
        None => entry,
    }
}

/// Accepts `HH:MM-HH:MM` with the start before the end.
fn validate_time_range(range: &str) -> Result<(), ConsultationError> {
    let invalid = || ConsultationError::ValidationError(format!(
        "preferred_time_range must look like 09:00-12:00, got '{}'", range
    ));

    let (start, end) = range.split_once('-').ok_or_else(invalid)?;
    let start = chrono::NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
    let end = chrono::NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;

    if start >= end {
        return Err(invalid());
    }
    Ok(())
}
