// libs/jobs-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use payment_cell::ReconciliationService;
use shared_config::AppConfig;

use crate::handlers::{self, JobsState};
use crate::services::reminders::ReminderService;

/// Scheduled-job triggers. Gated by `CRON_SECRET` when one is configured.
pub fn jobs_routes(
    config: Arc<AppConfig>,
    reminders: Arc<ReminderService>,
    reconciliation: Arc<ReconciliationService>,
) -> Router {
    let state = JobsState { config, reminders, reconciliation };

    Router::new()
        .route("/reconcile", get(handlers::run_reconciliation))
        .route("/reminders", get(handlers::run_reminders))
        .with_state(state)
}
