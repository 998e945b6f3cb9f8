// libs/consultation-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::services::transitions::{PermissionError, TransitionError};

// ==============================================================================
// CORE CONSULTATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consultation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub consultation_type: ConsultationType,
    pub status: ConsultationStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_range: Option<String>,
    pub duration_minutes: i32,
    pub cost_leone: i64,
    pub reason_for_consultation: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Draft,
    PendingAdminReview,
    Assigned,
    Confirmed,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub const ALL: [ConsultationStatus; 8] = [
        ConsultationStatus::Draft,
        ConsultationStatus::PendingAdminReview,
        ConsultationStatus::Assigned,
        ConsultationStatus::Confirmed,
        ConsultationStatus::Scheduled,
        ConsultationStatus::InProgress,
        ConsultationStatus::Completed,
        ConsultationStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Draft => "draft",
            ConsultationStatus::PendingAdminReview => "pending_admin_review",
            ConsultationStatus::Assigned => "assigned",
            ConsultationStatus::Confirmed => "confirmed",
            ConsultationStatus::Scheduled => "scheduled",
            ConsultationStatus::InProgress => "in_progress",
            ConsultationStatus::Completed => "completed",
            ConsultationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsultationStatus::Completed | ConsultationStatus::Cancelled)
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConsultationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    Video,
    Voice,
    Sms,
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationType::Video => write!(f, "video"),
            ConsultationType::Voice => write!(f, "voice"),
            ConsultationType::Sms => write!(f, "sms"),
        }
    }
}

/// Side-attribute mutations governed by the (role, status) action table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UpdateNotes,
    UpdateDuration,
    AssignProvider,
    Reschedule,
    Confirm,
    Cancel,
    Start,
    Complete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::UpdateNotes => "update_notes",
            Action::UpdateDuration => "update_duration",
            Action::AssignProvider => "assign_provider",
            Action::Reschedule => "reschedule",
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::Start => "start",
            Action::Complete => "complete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "update_notes" => Ok(Action::UpdateNotes),
            "update_duration" => Ok(Action::UpdateDuration),
            "assign_provider" => Ok(Action::AssignProvider),
            "reschedule" => Ok(Action::Reschedule),
            "confirm" => Ok(Action::Confirm),
            "cancel" => Ok(Action::Cancel),
            "start" => Ok(Action::Start),
            "complete" => Ok(Action::Complete),
            other => Err(PermissionError::UnknownAction(other.to_string())),
        }
    }
}

/// Default price and length per consultation type, in leones and minutes.
#[derive(Debug, Clone)]
pub struct ConsultationPricing {
    pub video_cost_leone: i64,
    pub voice_cost_leone: i64,
    pub sms_cost_leone: i64,
    pub video_duration_minutes: i32,
    pub voice_duration_minutes: i32,
    pub sms_duration_minutes: i32,
}

impl Default for ConsultationPricing {
    fn default() -> Self {
        Self {
            video_cost_leone: 15_000,
            voice_cost_leone: 10_000,
            sms_cost_leone: 5_000,
            video_duration_minutes: 30,
            voice_duration_minutes: 30,
            sms_duration_minutes: 15,
        }
    }
}

impl ConsultationPricing {
    pub fn cost_for(&self, consultation_type: ConsultationType) -> i64 {
        match consultation_type {
            ConsultationType::Video => self.video_cost_leone,
            ConsultationType::Voice => self.voice_cost_leone,
            ConsultationType::Sms => self.sms_cost_leone,
        }
    }

    pub fn duration_for(&self, consultation_type: ConsultationType) -> i32 {
        match consultation_type {
            ConsultationType::Video => self.video_duration_minutes,
            ConsultationType::Voice => self.voice_duration_minutes,
            ConsultationType::Sms => self.sms_duration_minutes,
        }
    }
}

/// Authenticated caller as seen by the consultation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn from_user(user: &User) -> Result<Self, ConsultationError> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| ConsultationError::ValidationError(format!("Invalid user id: {}", user.id)))?;
        let role = user.app_role()
            .ok_or_else(|| ConsultationError::Unauthorized("User has no application role".to_string()))?;
        Ok(Self { user_id, role })
    }
}

/// Reachability details for one side of a consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsultationContacts {
    pub patient: Option<Contact>,
    pub provider: Option<Contact>,
}

// ==============================================================================
// STORE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsultation {
    pub user_id: Uuid,
    pub consultation_type: ConsultationType,
    pub status: ConsultationStatus,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_range: Option<String>,
    pub duration_minutes: i32,
    pub cost_leone: i64,
    pub reason_for_consultation: Option<String>,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsultationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsultationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
}

impl ConsultationPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConsultationPatch::default()
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConsultationRequest {
    /// Only honoured for admins booking on behalf of a patient.
    pub patient_id: Option<Uuid>,
    pub consultation_type: ConsultationType,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_range: Option<String>,
    pub reason_for_consultation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub provider_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignProviderRequest {
    pub provider_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendNotesRequest {
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDurationRequest {
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTransitionQuery {
    pub from: String,
    pub to: String,
    pub role: String,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConsultationError {
    #[error("Consultation not found")]
    NotFound,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Unauthorized access to consultation: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Consultation status changed to '{actual}' while expecting '{expected}'; reload and retry")]
    StatusChanged {
        expected: ConsultationStatus,
        actual: ConsultationStatus,
    },
}

impl From<anyhow::Error> for ConsultationError {
    fn from(e: anyhow::Error) -> Self {
        ConsultationError::DatabaseError(e.to_string())
    }
}

impl From<ConsultationError> for AppError {
    fn from(e: ConsultationError) -> Self {
        match e {
            ConsultationError::NotFound => AppError::NotFound("Consultation not found".to_string()),
            ConsultationError::Transition(t) => match t {
                TransitionError::UnknownStatus(_) | TransitionError::UnknownRole(_) => {
                    AppError::BadRequest(t.to_string())
                }
                TransitionError::NotAllowed { .. } => AppError::Conflict(t.to_string()),
                TransitionError::RoleNotPermitted { .. } => AppError::Forbidden(t.to_string()),
            },
            ConsultationError::Permission(p) => match p {
                PermissionError::UnknownAction(_) => AppError::BadRequest(p.to_string()),
                PermissionError::NotPermitted { .. } => AppError::Forbidden(p.to_string()),
            },
            ConsultationError::Unauthorized(msg) => AppError::Forbidden(msg),
            ConsultationError::ValidationError(msg) => AppError::ValidationError(msg),
            ConsultationError::DatabaseError(msg) => AppError::Database(msg),
            e @ ConsultationError::StatusChanged { .. } => AppError::Conflict(e.to_string()),
        }
    }
}
