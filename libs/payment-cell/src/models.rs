// libs/payment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use consultation_cell::models::{ConsultationError, CreateConsultationRequest};
use consultation_cell::Consultation;
use shared_models::error::AppError;

// ==============================================================================
// PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub user_id: Uuid,
    pub amount_leone: i64,
    pub payment_method: PaymentMethod,
    pub payment_provider: String,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Allowed payment moves. `refunded` is reachable only from `completed`
    /// and has no exits.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Failed, Completed)
                | (Failed, Pending)
                | (Completed, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for a status reported by the gateway (webhook, verify, reconciliation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalUpdate {
    /// Already in the reported status; nothing to write.
    NoOp,
    Apply,
    /// The move is not permitted from the current status.
    Refuse(String),
}

/// Decide whether a provider-reported status may overwrite the local one.
/// Provider input never moves a payment to `refunded`, nor out of it.
pub fn external_update(current: PaymentStatus, reported: PaymentStatus) -> ExternalUpdate {
    match reconciliation_overwrite(current, reported) {
        ExternalUpdate::Apply if !current.can_transition_to(reported) => ExternalUpdate::Refuse(
            format!("payment cannot move from '{}' to '{}'", current, reported),
        ),
        decision => decision,
    }
}

/// Reconciliation auto-fix: the gateway's mapped status overwrites the local one,
/// including reversals of completed payments. Refunds stay admin-only.
pub fn reconciliation_overwrite(current: PaymentStatus, reported: PaymentStatus) -> ExternalUpdate {
    if current == reported {
        return ExternalUpdate::NoOp;
    }
    if current == PaymentStatus::Refunded || reported == PaymentStatus::Refunded {
        return ExternalUpdate::Refuse(format!(
            "refunds are admin-only; provider reported '{}' for a '{}' payment",
            reported, current
        ));
    }
    ExternalUpdate::Apply
}

/// Map the provider's status vocabulary onto the internal three-way status.
pub fn map_provider_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "completed" | "complete" | "success" | "successful" | "succeeded" | "paid"
        | "processing_completed" | "settled" => PaymentStatus::Completed,
        "failed" | "failure" | "error" | "declined" | "rejected" | "cancelled" | "canceled"
        | "expired" | "processing_failed" | "reversed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    OrangeMoney,
    AfricellMoney,
    Qmoney,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::OrangeMoney => "orange_money",
            PaymentMethod::AfricellMoney => "africell_money",
            PaymentMethod::Qmoney => "qmoney",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::OrangeMoney => "Orange Money",
            PaymentMethod::AfricellMoney => "Africell Money",
            PaymentMethod::Qmoney => "QMoney",
            PaymentMethod::BankTransfer => "bank transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        self.ussd_code().is_some()
    }

    pub fn ussd_code(&self) -> Option<&'static str> {
        match self {
            PaymentMethod::OrangeMoney => Some("*144#"),
            PaymentMethod::AfricellMoney => Some("*161#"),
            PaymentMethod::Qmoney => Some("*202#"),
            PaymentMethod::BankTransfer | PaymentMethod::Cash => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "orange_money" => Ok(PaymentMethod::OrangeMoney),
            "africell_money" => Ok(PaymentMethod::AfricellMoney),
            "qmoney" => Ok(PaymentMethod::Qmoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(PaymentError::ValidationError(format!("Unknown payment method: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub user_id: Uuid,
    pub amount_leone: i64,
    pub payment_method: PaymentMethod,
    pub payment_provider: String,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
}

// ==============================================================================
// GATEWAY MODELS
// ==============================================================================

/// Charge request handed to a `PaymentGateway`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiationRequest {
    pub amount_leone: i64,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub consultation_id: Uuid,
    pub patient_id: Uuid,
    pub idempotency_key: String,
}

/// Normalized gateway answer. Failures are data, never errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiationResponse {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instructions: Option<String>,
}

impl PaymentInitiationResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            status: PaymentStatus::Failed,
            message: message.into(),
            payment_link: None,
            payment_instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub status: PaymentStatus,
    pub verified: bool,
    pub provider_status: Option<String>,
}

/// A transaction as listed by the provider, reduced to what reconciliation compares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayTransaction {
    pub reference: String,
    pub provider_status: String,
    pub amount_leone: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl GatewayTransaction {
    pub fn status(&self) -> PaymentStatus {
        map_provider_status(&self.provider_status)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderAmount {
    pub currency: Option<String>,
    pub value: i64,
}

/// Provider-side object as it appears in webhook payloads and list responses.
/// Payment-code and checkout-session ids take precedence over the object's own
/// id, since those are what a local payment stores as its `transaction_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<ProviderAmount>,
    #[serde(default, alias = "payment_code_id")]
    pub payment_code_id: Option<String>,
    #[serde(default, alias = "checkout_session_id")]
    pub checkout_session_id: Option<String>,
    #[serde(default, alias = "created_at", alias = "createTime")]
    pub created_time: Option<DateTime<Utc>>,
}

impl ProviderObject {
    pub fn reference(&self) -> Option<&str> {
        self.payment_code_id
            .as_deref()
            .or(self.checkout_session_id.as_deref())
            .or(self.id.as_deref())
            .filter(|r| !r.is_empty())
    }

    pub fn into_transaction(self) -> Option<GatewayTransaction> {
        let reference = self.reference()?.to_string();
        Some(GatewayTransaction {
            reference,
            provider_status: self.status.unwrap_or_default(),
            amount_leone: self.amount.map(|a| a.value).unwrap_or_default(),
            created_at: self.created_time,
        })
    }
}

// ==============================================================================
// WEBHOOK MODELS
// ==============================================================================

/// Event name, either a bare string or the provider's `{id, name}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WebhookEventName {
    Plain(String),
    Detailed {
        #[serde(default)]
        id: Option<String>,
        name: String,
    },
}

impl WebhookEventName {
    pub fn name(&self) -> &str {
        match self {
            WebhookEventName::Plain(name) => name,
            WebhookEventName::Detailed { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub event: WebhookEventName,
    #[serde(default)]
    pub data: ProviderObject,
}

const TERMINAL_EVENT_OBJECTS: &[&str] = &["payment", "payment_code", "checkout_session"];
const TERMINAL_EVENT_OUTCOMES: &[&str] = &[
    "completed",
    "processing_completed",
    "succeeded",
    "failed",
    "processing_failed",
    "cancelled",
    "expired",
];

impl WebhookPayload {
    /// Only final charge outcomes are acted on; everything else is acknowledged and dropped.
    pub fn is_terminal_charge_event(&self) -> bool {
        match self.event.name().split_once('.') {
            Some((object, outcome)) => {
                TERMINAL_EVENT_OBJECTS.contains(&object) && TERMINAL_EVENT_OUTCOMES.contains(&outcome)
            }
            None => false,
        }
    }

    /// Status carried by the object, falling back to the event's outcome suffix.
    pub fn reported_status(&self) -> PaymentStatus {
        match &self.data.status {
            Some(status) if !status.trim().is_empty() => map_provider_status(status),
            _ => self
                .event
                .name()
                .split_once('.')
                .map(|(_, outcome)| map_provider_status(outcome))
                .unwrap_or(PaymentStatus::Pending),
        }
    }
}

/// Result of a verified webhook. All three serialize to HTTP 200.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Processed {
        payment_id: Uuid,
        reference: String,
        status: PaymentStatus,
        changed: bool,
    },
    Ignored(String),
    NotFound(String),
}

impl WebhookOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "success",
            WebhookOutcome::Ignored(_) => "ignored",
            WebhookOutcome::NotFound(_) => "not_found",
        }
    }

    pub fn message(&self) -> String {
        match self {
            WebhookOutcome::Processed { reference, status, changed, .. } => {
                if *changed {
                    format!("Payment {} marked {}", reference, status)
                } else {
                    format!("Payment {} already {}", reference, status)
                }
            }
            WebhookOutcome::Ignored(reason) => format!("Event ignored: {}", reason),
            WebhookOutcome::NotFound(reference) => format!("No payment found for reference {}", reference),
        }
    }
}

// ==============================================================================
// RECONCILIATION MODELS
// ==============================================================================

/// Longest trailing window a single reconciliation run may cover.
pub const MAX_RECONCILE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub days: i64,
    pub auto_fix: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { days: 30, auto_fix: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingInDatabase {
    pub reference: String,
    pub provider_status: String,
    pub amount_leone: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingInGateway {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount_leone: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusMismatch {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub local_status: PaymentStatus,
    pub gateway_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmountMismatch {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub local_amount: i64,
    pub gateway_amount: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Discrepancies {
    pub missing_in_database: Vec<MissingInDatabase>,
    pub missing_in_gateway: Vec<MissingInGateway>,
    pub status_mismatches: Vec<StatusMismatch>,
    pub amount_mismatches: Vec<AmountMismatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub auto_fix: bool,
    pub total_gateway: usize,
    pub total_local: usize,
    pub matched: usize,
    pub missing_in_database: usize,
    pub missing_in_gateway: usize,
    pub status_mismatch: usize,
    pub amount_mismatch: usize,
    /// Local rows that never received a gateway reference; not comparable.
    pub unreferenced: usize,
    pub fixed: usize,
    pub fix_errors: Vec<String>,
    pub discrepancies: Discrepancies,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub consultation_id: Uuid,
    pub payment_method: PaymentMethod,
    pub amount_leone: i64,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub gateway: PaymentInitiationResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookConsultationRequest {
    #[serde(flatten)]
    pub consultation: CreateConsultationRequest,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingResult {
    pub consultation: Consultation,
    pub payment: Option<Payment>,
    pub gateway: Option<PaymentInitiationResponse>,
    pub payment_error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Payment amount {actual} does not match consultation cost {expected}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Consultation already has a {0} payment")]
    AlreadyPaid(PaymentStatus),

    #[error("Invalid payment status change: {0}")]
    InvalidTransition(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment gateway not configured")]
    NotConfigured,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Consultation(#[from] ConsultationError),
}

impl From<anyhow::Error> for PaymentError {
    fn from(e: anyhow::Error) -> Self {
        PaymentError::DatabaseError(e.to_string())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PaymentError::Gateway("request timed out".to_string())
        } else {
            PaymentError::Gateway(e.to_string())
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::NotFound => AppError::NotFound("Payment not found".to_string()),
            PaymentError::AmountMismatch { .. } => AppError::ValidationError(e.to_string()),
            PaymentError::AlreadyPaid(_) => AppError::Conflict(e.to_string()),
            PaymentError::InvalidTransition(msg) => AppError::Conflict(msg),
            PaymentError::Unauthorized(msg) => AppError::Forbidden(msg),
            PaymentError::NotConfigured => AppError::Internal(e.to_string()),
            PaymentError::Gateway(msg) => AppError::ExternalService(msg),
            PaymentError::ValidationError(msg) => AppError::ValidationError(msg),
            PaymentError::DatabaseError(msg) => AppError::Database(msg),
            PaymentError::Consultation(c) => c.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook secret not configured")]
    SecretNotConfigured,

    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    pub fn is_verification_failure(&self) -> bool {
        !matches!(self, WebhookError::Database(_))
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Database(msg) => AppError::Database(msg),
            other => AppError::Auth(other.to_string()),
        }
    }
}
