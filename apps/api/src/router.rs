use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use consultation_cell::router::consultation_routes_with_service;
use consultation_cell::ConsultationService;
use jobs_cell::{jobs_routes, ReminderService};
use notification_cell::{NotificationDispatcher, Notifier};
use payment_cell::router::{payment_routes_with_service, webhook_routes};
use payment_cell::{PaymentService, ReconciliationService, WebhookService};
use shared_config::AppConfig;

/// Wire the cells together. Consultations, payments and notifications are each
/// built once and shared, so every status write goes through the same services.
pub fn create_router(state: Arc<AppConfig>) -> Router {
    let consultations = Arc::new(ConsultationService::new(&state));
    let payments = Arc::new(PaymentService::new(&state, Arc::clone(&consultations)));
    let notifier: Arc<dyn Notifier> = Arc::new(NotificationDispatcher::new(&state));

    let webhooks = Arc::new(WebhookService::new(
        &state,
        payments.repository(),
        Arc::clone(&consultations),
        Arc::clone(&notifier),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        payments.gateway(),
        payments.repository(),
        payments.provider_name(),
    ));
    let reminders = Arc::new(ReminderService::new(Arc::clone(&consultations), notifier));

    Router::new()
        .route("/", get(|| async { "Telehealth API is running!" }))
        .nest("/consultations", consultation_routes_with_service(state.clone(), Arc::clone(&consultations)))
        .nest("/payments", payment_routes_with_service(state.clone(), consultations, payments))
        .nest("/webhooks", webhook_routes(webhooks))
        .nest("/cron", jobs_routes(state, reminders, reconciliation))
}
