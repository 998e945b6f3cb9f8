// libs/payment-cell/src/lib.rs
//! # Payment Cell
//!
//! Charges for consultations and keeps local payment rows in step with the
//! provider:
//!
//! - `services::gateway` - provider adapter (mobile money, bank transfer, cash)
//! - `services::payment` - initiation, verification and refunds
//! - `services::booking` - booking a consultation together with its payment
//! - `services::webhook` - signed provider callbacks
//! - `services::reconciliation` - periodic comparison against the provider's ledger

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Payment, PaymentError, PaymentMethod, PaymentStatus, ReconcileOptions, ReconciliationReport,
    WebhookError, WebhookOutcome,
};
pub use router::{payment_routes, payment_routes_with_service, webhook_routes};
pub use services::{
    gateway_from_config, BookingService, InMemoryPaymentRepository, PaymentGateway,
    PaymentRepository, PaymentService, ReconciliationService, SupabasePaymentRepository,
    WebhookService,
};
