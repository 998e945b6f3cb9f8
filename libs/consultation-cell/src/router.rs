// libs/consultation-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, ConsultationState};
use crate::services::consultation::ConsultationService;

pub fn consultation_routes(config: Arc<AppConfig>) -> Router {
    let service = Arc::new(ConsultationService::new(&config));
    consultation_routes_with_service(config, service)
}

pub fn consultation_routes_with_service(
    config: Arc<AppConfig>,
    service: Arc<ConsultationService>,
) -> Router {
    let state = ConsultationState { service };

    Router::new()
        .route("/", post(handlers::create_consultation))
        .route("/mine", get(handlers::list_my_consultations))
        .route("/queue", get(handlers::get_doctor_queue))
        .route("/transitions/validate", get(handlers::validate_transition))
        .route("/{consultation_id}", get(handlers::get_consultation))
        .route("/{consultation_id}/transition", post(handlers::transition_consultation))
        .route("/{consultation_id}/assign", post(handlers::assign_provider))
        .route("/{consultation_id}/notes", patch(handlers::append_notes))
        .route("/{consultation_id}/duration", patch(handlers::update_duration))
        .route("/{consultation_id}/reschedule", patch(handlers::reschedule_consultation))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
