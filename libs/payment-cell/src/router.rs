// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use consultation_cell::ConsultationService;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, PaymentState, WebhookState};
use crate::services::booking::BookingService;
use crate::services::payment::PaymentService;
use crate::services::webhook::WebhookService;

pub fn payment_routes(config: Arc<AppConfig>, consultations: Arc<ConsultationService>) -> Router {
    let payments = Arc::new(PaymentService::new(&config, Arc::clone(&consultations)));
    payment_routes_with_service(config, consultations, payments)
}

pub fn payment_routes_with_service(
    config: Arc<AppConfig>,
    consultations: Arc<ConsultationService>,
    payments: Arc<PaymentService>,
) -> Router {
    let booking = Arc::new(BookingService::new(consultations, Arc::clone(&payments)));
    let state = PaymentState { payments, booking };

    Router::new()
        .route("/", post(handlers::initiate_payment))
        .route("/book", post(handlers::book_consultation))
        .route("/{payment_id}/verify", get(handlers::verify_payment))
        .route("/{payment_id}/refund", post(handlers::refund_payment))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

/// Unauthenticated; requests are gated by the webhook signature instead.
pub fn webhook_routes(webhooks: Arc<WebhookService>) -> Router {
    Router::new()
        .route("/payment", post(handlers::payment_webhook))
        .with_state(WebhookState { webhooks })
}
