use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use consultation_cell::models::{
    Actor, Consultation, ConsultationContacts, ConsultationError, ConsultationPatch,
    ConsultationStatus, ConsultationType, CreateConsultationRequest, NewConsultation,
    TransitionRequest,
};
use consultation_cell::ConsultationRepository;
use consultation_cell::services::consultation::PaymentCascade;
use consultation_cell::services::transitions::{PermissionError, TransitionError};
use consultation_cell::{ConsultationService, InMemoryConsultationRepository};
use shared_models::auth::Role;

/// Serves a snapshot taken before a concurrent writer changed the row.
struct StaleReadRepository {
    inner: Arc<InMemoryConsultationRepository>,
    snapshot: Consultation,
}

#[async_trait]
impl ConsultationRepository for StaleReadRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Consultation>, ConsultationError> {
        if id == self.snapshot.id {
            return Ok(Some(self.snapshot.clone()));
        }
        self.inner.get(id).await
    }

    async fn insert(&self, consultation: NewConsultation) -> Result<Consultation, ConsultationError> {
        self.inner.insert(consultation).await
    }

    async fn update(
        &self,
        id: Uuid,
        expected: ConsultationStatus,
        patch: ConsultationPatch,
    ) -> Result<Consultation, ConsultationError> {
        self.inner.update(id, expected, patch).await
    }

    async fn list_for_patient(&self, user_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        self.inner.list_for_patient(user_id).await
    }

    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        self.inner.list_for_provider(provider_id).await
    }

    async fn list_by_status_scheduled_between(
        &self,
        status: ConsultationStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        self.inner.list_by_status_scheduled_between(status, from, to).await
    }

    async fn provider_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ConsultationError> {
        self.inner.provider_id_for_user(user_id).await
    }

    async fn contacts_for(&self, consultation: &Consultation) -> Result<ConsultationContacts, ConsultationError> {
        self.inner.contacts_for(consultation).await
    }
}

struct Fixture {
    repo: Arc<InMemoryConsultationRepository>,
    service: ConsultationService,
    patient: Actor,
    doctor: Actor,
    admin: Actor,
    provider_id: Uuid,
}

async fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryConsultationRepository::new());
    let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
    let provider_id = Uuid::new_v4();
    repo.add_provider(provider_id, doctor.user_id).await;

    Fixture {
        service: ConsultationService::with_repository(repo.clone()),
        repo,
        patient: Actor::new(Uuid::new_v4(), Role::Patient),
        doctor,
        admin: Actor::new(Uuid::new_v4(), Role::Admin),
        provider_id,
    }
}

fn video_request() -> CreateConsultationRequest {
    CreateConsultationRequest {
        patient_id: None,
        consultation_type: ConsultationType::Video,
        preferred_date: None,
        preferred_time_range: Some("09:00-12:00".to_string()),
        reason_for_consultation: Some("  Recurring headaches  ".to_string()),
    }
}

fn seeded(user_id: Uuid, status: ConsultationStatus, provider_id: Option<Uuid>) -> Consultation {
    let now = Utc::now();
    Consultation {
        id: Uuid::new_v4(),
        user_id,
        provider_id,
        consultation_type: ConsultationType::Voice,
        status,
        scheduled_at: None,
        preferred_date: None,
        preferred_time_range: None,
        duration_minutes: 30,
        cost_leone: 10_000,
        reason_for_consultation: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn to(status: &str) -> TransitionRequest {
    TransitionRequest {
        status: status.to_string(),
        provider_id: None,
        scheduled_at: None,
        reason: None,
    }
}

#[tokio::test]
async fn full_lifecycle_from_booking_to_completion() {
    let f = fixture().await;

    let created = f.service.create(&f.patient, video_request()).await.unwrap();
    assert_eq!(created.status, ConsultationStatus::PendingAdminReview);
    assert_eq!(created.cost_leone, 15_000);
    assert_eq!(created.provider_id, None);
    assert_eq!(created.reason_for_consultation.as_deref(), Some("Recurring headaches"));

    let assigned = f.service.assign_provider(&f.admin, created.id, f.provider_id).await.unwrap();
    assert_eq!(assigned.status, ConsultationStatus::Assigned);
    assert_eq!(assigned.provider_id, Some(f.provider_id));

    let confirmed = f.service.confirm(&f.patient, created.id).await.unwrap();
    assert_eq!(confirmed.status, ConsultationStatus::Confirmed);

    let when = Utc::now() + Duration::days(1);
    let scheduled = f.service.schedule(&f.doctor, created.id, when).await.unwrap();
    assert_eq!(scheduled.status, ConsultationStatus::Scheduled);
    assert_eq!(scheduled.scheduled_at, Some(when));

    f.service.start(&f.doctor, created.id).await.unwrap();
    f.service.append_notes(&f.doctor, created.id, "Prescribed rest").await.unwrap();
    let completed = f.service.complete(&f.doctor, created.id).await.unwrap();
    assert_eq!(completed.status, ConsultationStatus::Completed);

    // post-completion edits are still allowed for the doctor
    let with_notes = f.service.append_notes(&f.doctor, created.id, "Follow up in 2 weeks").await.unwrap();
    let notes = with_notes.notes.unwrap();
    assert!(notes.contains("Prescribed rest"));
    assert!(notes.contains("Follow up in 2 weeks"));
    let longer = f.service.update_duration(&f.doctor, created.id, 45).await.unwrap();
    assert_eq!(longer.duration_minutes, 45);

    // but status is frozen
    let err = f.service.cancel(&f.admin, created.id, None).await.unwrap_err();
    assert_matches!(err, ConsultationError::Transition(TransitionError::NotAllowed { .. }));
}

#[tokio::test]
async fn patient_cannot_jump_from_review_to_scheduled() {
    let f = fixture().await;
    let created = f.service.create(&f.patient, video_request()).await.unwrap();

    let mut request = to("scheduled");
    request.scheduled_at = Some(Utc::now() + Duration::hours(3));
    let err = f.service.transition(&f.patient, created.id, request).await.unwrap_err();

    let message = err.to_string();
    assert_matches!(err, ConsultationError::Transition(TransitionError::NotAllowed {
        from: ConsultationStatus::PendingAdminReview,
        to: ConsultationStatus::Scheduled,
    }));
    assert!(message.contains("pending_admin_review"));
    assert!(message.contains("scheduled"));

    let unchanged = f.repo.all().await;
    assert_eq!(unchanged[0].status, ConsultationStatus::PendingAdminReview);
}

#[tokio::test]
async fn unknown_status_is_reported_as_malformed() {
    let f = fixture().await;
    let created = f.service.create(&f.patient, video_request()).await.unwrap();

    let err = f.service.transition(&f.patient, created.id, to("archived")).await.unwrap_err();
    assert_matches!(err, ConsultationError::Transition(TransitionError::UnknownStatus(s)) if s == "archived");
}

#[tokio::test]
async fn same_status_transition_is_a_noop() {
    let f = fixture().await;
    let created = f.service.create(&f.patient, video_request()).await.unwrap();

    let again = f.service
        .transition(&f.patient, created.id, to("pending_admin_review"))
        .await
        .unwrap();
    assert_eq!(again, created);
}

#[tokio::test]
async fn assignment_requires_provider_and_admin() {
    let f = fixture().await;
    let created = f.service.create(&f.patient, video_request()).await.unwrap();

    let err = f.service.transition(&f.admin, created.id, to("assigned")).await.unwrap_err();
    assert_matches!(err, ConsultationError::ValidationError(_));

    let err = f.service.assign_provider(&f.patient, created.id, f.provider_id).await.unwrap_err();
    assert_matches!(err, ConsultationError::Transition(TransitionError::RoleNotPermitted { .. }));
}

#[tokio::test]
async fn admin_can_reassign_before_scheduling_only() {
    let f = fixture().await;
    let consultation = seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id));
    f.repo.seed(consultation.clone()).await;

    let other_provider = Uuid::new_v4();
    let reassigned = f.service.assign_provider(&f.admin, consultation.id, other_provider).await.unwrap();
    assert_eq!(reassigned.provider_id, Some(other_provider));
    assert_eq!(reassigned.status, ConsultationStatus::Confirmed);

    let scheduled = seeded(f.patient.user_id, ConsultationStatus::Scheduled, Some(f.provider_id));
    f.repo.seed(scheduled.clone()).await;
    let err = f.service.assign_provider(&f.admin, scheduled.id, other_provider).await.unwrap_err();
    assert_matches!(err, ConsultationError::Permission(PermissionError::NotPermitted { .. }));
}

#[tokio::test]
async fn ownership_is_enforced() {
    let f = fixture().await;
    let consultation = seeded(f.patient.user_id, ConsultationStatus::Assigned, Some(Uuid::new_v4()));
    f.repo.seed(consultation.clone()).await;

    let stranger = Actor::new(Uuid::new_v4(), Role::Patient);
    let err = f.service.confirm(&stranger, consultation.id).await.unwrap_err();
    assert_matches!(err, ConsultationError::Unauthorized(_));

    // doctor not linked to the assigned provider
    let err = f.service.get(&f.doctor, consultation.id).await.unwrap_err();
    assert_matches!(err, ConsultationError::Unauthorized(_));
}

#[tokio::test]
async fn patient_cannot_book_for_someone_else() {
    let f = fixture().await;
    let mut request = video_request();
    request.patient_id = Some(Uuid::new_v4());

    let err = f.service.create(&f.patient, request).await.unwrap_err();
    assert_matches!(err, ConsultationError::Unauthorized(_));

    let err = f.service.create(&f.doctor, video_request()).await.unwrap_err();
    assert_matches!(err, ConsultationError::Transition(TransitionError::RoleNotPermitted { .. }));
}

#[tokio::test]
async fn scheduling_requires_a_time() {
    let f = fixture().await;
    let consultation = seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id));
    f.repo.seed(consultation.clone()).await;

    let err = f.service.transition(&f.doctor, consultation.id, to("scheduled")).await.unwrap_err();
    assert_matches!(err, ConsultationError::ValidationError(_));
}

#[tokio::test]
async fn cancellation_reason_is_recorded_in_notes() {
    let f = fixture().await;
    let consultation = seeded(f.patient.user_id, ConsultationStatus::Assigned, Some(f.provider_id));
    f.repo.seed(consultation.clone()).await;

    let cancelled = f.service
        .cancel(&f.patient, consultation.id, Some("Feeling better".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ConsultationStatus::Cancelled);
    assert!(cancelled.notes.unwrap().contains("Cancelled by patient: Feeling better"));
}

#[tokio::test]
async fn reschedule_keeps_status_and_is_role_gated() {
    let f = fixture().await;
    let mut consultation = seeded(f.patient.user_id, ConsultationStatus::Scheduled, Some(f.provider_id));
    consultation.scheduled_at = Some(Utc::now() + Duration::hours(2));
    f.repo.seed(consultation.clone()).await;

    let later = Utc::now() + Duration::days(2);
    let moved = f.service.reschedule(&f.doctor, consultation.id, later).await.unwrap();
    assert_eq!(moved.status, ConsultationStatus::Scheduled);
    assert_eq!(moved.scheduled_at, Some(later));

    let err = f.service
        .reschedule(&f.patient, consultation.id, later + Duration::hours(1))
        .await
        .unwrap_err();
    assert_matches!(err, ConsultationError::Permission(PermissionError::NotPermitted { .. }));
}

#[tokio::test]
async fn doctor_queue_lists_assigned_consultations() {
    let f = fixture().await;
    f.repo.seed(seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id))).await;
    f.repo.seed(seeded(f.patient.user_id, ConsultationStatus::Assigned, Some(Uuid::new_v4()))).await;

    let queue = f.service.list_queue(&f.doctor).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].provider_id, Some(f.provider_id));

    assert_matches!(f.service.list_queue(&f.patient).await, Err(ConsultationError::Unauthorized(_)));
}

#[tokio::test]
async fn payment_cascade_only_advances_confirmed_consultations() {
    let f = fixture().await;

    let mut confirmed = seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id));
    confirmed.scheduled_at = Some(Utc::now() + Duration::days(2));
    f.repo.seed(confirmed.clone()).await;

    let outcome = f.service.schedule_after_payment(confirmed.id).await.unwrap();
    assert_matches!(outcome, PaymentCascade::Scheduled(c) if c.status == ConsultationStatus::Scheduled);

    // reapplying is harmless
    let outcome = f.service.schedule_after_payment(confirmed.id).await.unwrap();
    assert_eq!(outcome, PaymentCascade::AlreadyScheduled);

    let pending = seeded(f.patient.user_id, ConsultationStatus::PendingAdminReview, None);
    f.repo.seed(pending.clone()).await;
    assert_matches!(f.service.schedule_after_payment(pending.id).await.unwrap(), PaymentCascade::Skipped(_));

    let unscheduled = seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id));
    f.repo.seed(unscheduled.clone()).await;
    assert_matches!(f.service.schedule_after_payment(unscheduled.id).await.unwrap(), PaymentCascade::Skipped(_));
}

#[tokio::test]
async fn cancel_landing_mid_write_is_never_overwritten() {
    let f = fixture().await;
    let mut confirmed = seeded(f.patient.user_id, ConsultationStatus::Confirmed, Some(f.provider_id));
    confirmed.scheduled_at = Some(Utc::now() + Duration::days(1));
    f.repo.seed(confirmed.clone()).await;

    let stale = ConsultationService::with_repository(Arc::new(StaleReadRepository {
        inner: f.repo.clone(),
        snapshot: confirmed.clone(),
    }));

    // The patient cancels after the stale read but before either write.
    f.service.cancel(&f.patient, confirmed.id, None).await.unwrap();

    let outcome = stale.schedule_after_payment(confirmed.id).await.unwrap();
    assert_matches!(outcome, PaymentCascade::Skipped(reason) if reason.contains("cancelled"));

    let err = stale
        .schedule(&f.doctor, confirmed.id, Utc::now() + Duration::days(2))
        .await
        .unwrap_err();
    assert_matches!(err, ConsultationError::StatusChanged {
        expected: ConsultationStatus::Confirmed,
        actual: ConsultationStatus::Cancelled,
    });

    let stored = f.repo.all().await.into_iter().find(|c| c.id == confirmed.id).unwrap();
    assert_eq!(stored.status, ConsultationStatus::Cancelled);
}
