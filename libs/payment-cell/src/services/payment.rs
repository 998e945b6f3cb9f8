// libs/payment-cell/src/services/payment.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use consultation_cell::models::Actor;
use consultation_cell::{ConsultationService, ConsultationStatus};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::models::{
    external_update, ExternalUpdate, InitiatePaymentRequest, NewPayment, Payment, PaymentError,
    PaymentInitiation, PaymentInitiationRequest, PaymentMethod, PaymentStatus,
};
use crate::services::gateway::{gateway_from_config, PaymentGateway};
use crate::services::repository::{PaymentRepository, SupabasePaymentRepository};

pub const CASH_PROVIDER: &str = "cash";

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    consultations: Arc<ConsultationService>,
    provider_name: String,
}

impl PaymentService {
    pub fn new(config: &AppConfig, consultations: Arc<ConsultationService>) -> Self {
        Self::with_parts(
            Arc::new(SupabasePaymentRepository::new(config)),
            gateway_from_config(config),
            consultations,
            config.payment_provider_name.clone(),
        )
    }

    pub fn with_parts(
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        consultations: Arc<ConsultationService>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            payments,
            gateway,
            consultations,
            provider_name: provider_name.into(),
        }
    }

    pub fn repository(&self) -> Arc<dyn PaymentRepository> {
        Arc::clone(&self.payments)
    }

    pub fn gateway(&self) -> Arc<dyn PaymentGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Start a charge for an existing consultation and persist the payment row.
    ///
    /// The amount must equal the consultation's cost; this is the only place it is
    /// checked. A gateway failure still persists a `failed` row and is returned as
    /// data in `PaymentInitiation::gateway`.
    pub async fn initiate_for_consultation(
        &self,
        actor: &Actor,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, PaymentError> {
        let consultation = self.consultations.get(actor, request.consultation_id).await?;

        debug!(
            "Initiating {} payment of {} for consultation {}",
            request.payment_method, request.amount_leone, consultation.id
        );

        if consultation.status == ConsultationStatus::Cancelled {
            return Err(PaymentError::ValidationError(
                "Cannot pay for a cancelled consultation".to_string(),
            ));
        }

        if request.amount_leone != consultation.cost_leone {
            warn!(
                "Amount mismatch for consultation {}: expected {}, got {}",
                consultation.id, consultation.cost_leone, request.amount_leone
            );
            return Err(PaymentError::AmountMismatch {
                expected: consultation.cost_leone,
                actual: request.amount_leone,
            });
        }

        let phone = request.phone_number.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if request.payment_method.is_mobile_money() && phone.is_none() {
            return Err(PaymentError::ValidationError(format!(
                "phone_number is required for {}",
                request.payment_method.display_name()
            )));
        }

        let existing = self.payments.list_for_consultation(consultation.id).await?;
        if let Some(settled) = existing.iter().find(|p| {
            matches!(p.payment_status, PaymentStatus::Completed | PaymentStatus::Refunded)
        }) {
            return Err(PaymentError::AlreadyPaid(settled.payment_status));
        }

        let payment_id = Uuid::new_v4();
        let gateway_request = PaymentInitiationRequest {
            amount_leone: request.amount_leone,
            payment_method: request.payment_method,
            phone_number: phone.map(str::to_string),
            email: request.email.clone(),
            consultation_id: consultation.id,
            patient_id: consultation.user_id,
            idempotency_key: payment_id.to_string(),
        };

        let response = self.gateway.initiate(&gateway_request).await;
        if !response.success {
            warn!("Gateway declined payment for consultation {}: {}", consultation.id, response.message);
        }

        let provider = match request.payment_method {
            PaymentMethod::Cash => CASH_PROVIDER.to_string(),
            _ => self.provider_name.clone(),
        };

        let payment = self.payments.insert(NewPayment {
            id: payment_id,
            consultation_id: consultation.id,
            user_id: consultation.user_id,
            amount_leone: request.amount_leone,
            payment_method: request.payment_method,
            payment_provider: provider,
            payment_status: if response.success { response.status } else { PaymentStatus::Failed },
            transaction_id: response.transaction_id.clone(),
        }).await?;

        info!(
            "Payment {} created for consultation {} with status {}",
            payment.id, consultation.id, payment.payment_status
        );

        Ok(PaymentInitiation { payment, gateway: response })
    }

    pub async fn get(&self, actor: &Actor, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self.payments.get(payment_id).await?.ok_or(PaymentError::NotFound)?;
        self.authorize(actor, &payment)?;
        Ok(payment)
    }

    /// Poll the gateway and apply its status if it is a permitted move.
    pub async fn verify(&self, actor: &Actor, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self.get(actor, payment_id).await?;

        let Some(transaction_id) = payment.transaction_id.clone() else {
            return Ok(payment);
        };

        let result = self.gateway.verify(&transaction_id, payment.payment_method).await?;
        if !result.verified {
            debug!("Gateway could not verify payment {}", payment.id);
            return Ok(payment);
        }

        match external_update(payment.payment_status, result.status) {
            ExternalUpdate::Apply => {
                let updated = self.payments.update_status(payment.id, result.status).await?;
                info!("Payment {} verified as {}", updated.id, updated.payment_status);
                Ok(updated)
            }
            ExternalUpdate::NoOp => Ok(payment),
            ExternalUpdate::Refuse(reason) => {
                warn!("Ignoring verified status for payment {}: {}", payment.id, reason);
                Ok(payment)
            }
        }
    }

    /// Admin-only: mark a completed payment as refunded. Payments are never deleted.
    pub async fn refund(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Payment, PaymentError> {
        if actor.role != Role::Admin {
            return Err(PaymentError::Unauthorized("Only admins can refund payments".to_string()));
        }

        let payment = self.payments.get(payment_id).await?.ok_or(PaymentError::NotFound)?;

        if !payment.payment_status.can_transition_to(PaymentStatus::Refunded) {
            return Err(PaymentError::InvalidTransition(format!(
                "payment cannot move from '{}' to 'refunded'",
                payment.payment_status
            )));
        }

        let updated = self.payments.update_status(payment.id, PaymentStatus::Refunded).await?;
        info!(
            "Payment {} refunded by {} ({})",
            updated.id,
            actor.user_id,
            reason.as_deref().unwrap_or("no reason given")
        );
        Ok(updated)
    }

    fn authorize(&self, actor: &Actor, payment: &Payment) -> Result<(), PaymentError> {
        if actor.role == Role::Admin || payment.user_id == actor.user_id {
            Ok(())
        } else {
            Err(PaymentError::Unauthorized("Not authorized to access this payment".to_string()))
        }
    }
}
