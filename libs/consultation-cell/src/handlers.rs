// libs/consultation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Actor, AppendNotesRequest, AssignProviderRequest, CreateConsultationRequest,
    RescheduleRequest, TransitionRequest, UpdateDurationRequest, ValidateTransitionQuery,
};
use crate::services::consultation::ConsultationService;
use crate::services::transitions::{self, next_statuses};

#[derive(Clone)]
pub struct ConsultationState {
    pub service: Arc<ConsultationService>,
}

fn actor(user: &User) -> Result<Actor, AppError> {
    Ok(Actor::from_user(user)?)
}

pub async fn create_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor(&user)?;
    let consultation = state.service.create(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "consultation": consultation,
        "message": "Consultation request submitted for review"
    }))))
}

pub async fn get_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service.get(&actor, consultation_id).await?;
    let next = next_statuses(consultation.status, actor.role);

    Ok(Json(json!({
        "consultation": consultation,
        "allowed_transitions": next,
    })))
}

pub async fn list_my_consultations(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultations = state.service.list_mine(&actor).await?;

    Ok(Json(json!({
        "consultations": consultations,
        "total": consultations.len(),
    })))
}

pub async fn get_doctor_queue(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultations = state.service.list_queue(&actor).await?;

    Ok(Json(json!({
        "consultations": consultations,
        "total": consultations.len(),
    })))
}

pub async fn transition_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service.transition(&actor, consultation_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

pub async fn assign_provider(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<AssignProviderRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service
        .assign_provider(&actor, consultation_id, request.provider_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

pub async fn append_notes(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<AppendNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service
        .append_notes(&actor, consultation_id, &request.notes)
        .await?;

    Ok(Json(json!({ "success": true, "consultation": consultation })))
}

pub async fn update_duration(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<UpdateDurationRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service
        .update_duration(&actor, consultation_id, request.duration_minutes)
        .await?;

    Ok(Json(json!({ "success": true, "consultation": consultation })))
}

pub async fn reschedule_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let consultation = state.service
        .reschedule(&actor, consultation_id, request.scheduled_at)
        .await?;

    Ok(Json(json!({ "success": true, "consultation": consultation })))
}

/// Exposes the raw `validate(from, to, role)` contract.
pub async fn validate_transition(
    Query(query): Query<ValidateTransitionQuery>,
) -> Json<transitions::ValidationResult> {
    Json(transitions::validate(&query.from, &query.to, &query.role))
}
