// libs/payment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{info, warn};

use consultation_cell::models::Actor;
use consultation_cell::ConsultationService;

use crate::models::{BookConsultationRequest, BookingResult, InitiatePaymentRequest, PaymentError};
use crate::services::payment::PaymentService;

/// Books a consultation and starts its payment as two separate steps.
///
/// Only the booking step can fail the call. Whatever happens to the payment is
/// reported in the result, and the consultation stays booked.
pub struct BookingService {
    consultations: Arc<ConsultationService>,
    payments: Arc<PaymentService>,
}

impl BookingService {
    pub fn new(consultations: Arc<ConsultationService>, payments: Arc<PaymentService>) -> Self {
        Self { consultations, payments }
    }

    pub async fn book(
        &self,
        actor: &Actor,
        request: BookConsultationRequest,
    ) -> Result<BookingResult, PaymentError> {
        let consultation = self.consultations.create(actor, request.consultation).await?;

        let payment_request = InitiatePaymentRequest {
            consultation_id: consultation.id,
            payment_method: request.payment_method,
            amount_leone: consultation.cost_leone,
            phone_number: request.phone_number,
            email: request.email,
        };

        let result = match self.payments.initiate_for_consultation(actor, payment_request).await {
            Ok(initiation) if initiation.gateway.success => BookingResult {
                message: "Consultation booked. Complete your payment to confirm.".to_string(),
                consultation,
                payment: Some(initiation.payment),
                payment_error: None,
                gateway: Some(initiation.gateway),
            },
            Ok(initiation) => BookingResult {
                message: "Consultation booked, but the payment could not be started. You can retry payment later."
                    .to_string(),
                consultation,
                payment_error: Some(initiation.gateway.message.clone()),
                payment: Some(initiation.payment),
                gateway: Some(initiation.gateway),
            },
            Err(e) => {
                warn!("Payment step failed for consultation {}: {}", consultation.id, e);
                BookingResult {
                    message: "Consultation booked, but the payment could not be started. You can retry payment later."
                        .to_string(),
                    consultation,
                    payment: None,
                    gateway: None,
                    payment_error: Some(e.to_string()),
                }
            }
        };

        info!(
            "Booked consultation {} (payment {})",
            result.consultation.id,
            if result.payment_error.is_none() { "started" } else { "deferred" }
        );
        Ok(result)
    }
}
