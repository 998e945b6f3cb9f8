pub mod booking;
pub mod gateway;
pub mod payment;
pub mod reconciliation;
pub mod repository;
pub mod webhook;

pub use booking::BookingService;
pub use gateway::{gateway_from_config, MonimeGateway, PaymentGateway, UnconfiguredGateway};
pub use payment::{PaymentService, CASH_PROVIDER};
pub use reconciliation::{ReconciliationService, AMOUNT_TOLERANCE_LEONE};
pub use repository::{InMemoryPaymentRepository, PaymentRepository, SupabasePaymentRepository};
pub use webhook::{WebhookService, SIGNATURE_HEADER};
