// libs/payment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use consultation_cell::Actor;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BookConsultationRequest, InitiatePaymentRequest, RefundRequest};
use crate::services::booking::BookingService;
use crate::services::payment::PaymentService;
use crate::services::webhook::{WebhookService, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct PaymentState {
    pub payments: Arc<PaymentService>,
    pub booking: Arc<BookingService>,
}

#[derive(Clone)]
pub struct WebhookState {
    pub webhooks: Arc<WebhookService>,
}

fn actor(user: &User) -> Result<Actor, AppError> {
    Ok(Actor::from_user(user)?)
}

pub async fn initiate_payment(
    State(state): State<PaymentState>,
    Extension(user): Extension<User>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor(&user)?;
    let initiation = state.payments.initiate_for_consultation(&actor, request).await?;

    let status = if initiation.gateway.success {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_GATEWAY
    };

    Ok((status, Json(json!({
        "success": initiation.gateway.success,
        "payment": initiation.payment,
        "gateway": initiation.gateway,
    }))))
}

pub async fn book_consultation(
    State(state): State<PaymentState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor(&user)?;
    let result = state.booking.book(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "consultation": result.consultation,
        "payment": result.payment,
        "gateway": result.gateway,
        "payment_error": result.payment_error,
        "message": result.message,
    }))))
}

pub async fn verify_payment(
    State(state): State<PaymentState>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let payment = state.payments.verify(&actor, payment_id).await?;

    Ok(Json(json!({
        "payment": payment,
        "status": payment.payment_status,
    })))
}

pub async fn refund_payment(
    State(state): State<PaymentState>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let payment = state.payments.refund(&actor, payment_id, request.reason).await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "message": "Payment refunded"
    })))
}

/// Provider callback. Takes the raw body so the signature is checked over the
/// exact bytes that were sent.
pub async fn payment_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.webhooks.process(&body, signature).await {
        Ok(outcome) => Ok(Json(json!({
            "message": outcome.message(),
            "status": outcome.status_label(),
        }))),
        Err(e) if e.is_verification_failure() => {
            warn!("Rejected payment webhook: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!("Payment webhook failed: {}", e);
            Err(e.into())
        }
    }
}
