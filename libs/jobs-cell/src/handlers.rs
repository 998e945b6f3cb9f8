// libs/jobs-cell/src/handlers.rs
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};

use payment_cell::{ReconcileOptions, ReconciliationService};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::cron::{header_flag, verify_cron_secret};

use crate::models::{JobError, ReconcileQuery};
use crate::services::reminders::ReminderService;

pub const AUTO_FIX_HEADER: &str = "x-auto-fix";

#[derive(Clone)]
pub struct JobsState {
    pub config: Arc<AppConfig>,
    pub reminders: Arc<ReminderService>,
    pub reconciliation: Arc<ReconciliationService>,
}

pub async fn run_reconciliation(
    State(state): State<JobsState>,
    headers: HeaderMap,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<Value>, AppError> {
    verify_cron_secret(&headers, &state.config)?;

    let defaults = ReconcileOptions::default();
    let options = ReconcileOptions {
        days: query.days.filter(|d| *d > 0).unwrap_or(defaults.days),
        auto_fix: header_flag(&headers, AUTO_FIX_HEADER),
    };

    let started_at = Utc::now();
    let timer = Instant::now();
    info!("Reconciliation started (days={}, auto_fix={})", options.days, options.auto_fix);

    let report = state.reconciliation.run(options, started_at).await.map_err(|e| {
        let e = JobError::from(e);
        error!("{}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "started_at": started_at,
        "duration_ms": timer.elapsed().as_millis() as u64,
        "report": report,
    })))
}

pub async fn run_reminders(
    State(state): State<JobsState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    verify_cron_secret(&headers, &state.config)?;

    let started_at = Utc::now();
    let timer = Instant::now();

    let result = state.reminders.run(started_at).await.map_err(|e| {
        error!("{}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "started_at": started_at,
        "duration_ms": timer.elapsed().as_millis() as u64,
        "result": result,
    })))
}
