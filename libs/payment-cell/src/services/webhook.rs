// libs/payment-cell/src/services/webhook.rs
//! Payment webhook ingestion.
//!
//! Once the signature checks out, every outcome (processed, ignored, unknown
//! reference) is acknowledged so the provider stops retrying. Only a bad
//! signature or an unreachable record store fails the request.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use consultation_cell::services::consultation::PaymentCascade;
use consultation_cell::{Consultation, ConsultationError, ConsultationService};
use notification_cell::{templates, Notifier};
use shared_config::AppConfig;

use crate::models::{
    external_update, ExternalUpdate, Payment, PaymentStatus, WebhookError, WebhookOutcome,
    WebhookPayload,
};
use crate::services::repository::PaymentRepository;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "monime-signature";

pub struct WebhookService {
    payments: Arc<dyn PaymentRepository>,
    consultations: Arc<ConsultationService>,
    notifier: Arc<dyn Notifier>,
    secret: Option<String>,
    production: bool,
}

impl WebhookService {
    pub fn new(
        config: &AppConfig,
        payments: Arc<dyn PaymentRepository>,
        consultations: Arc<ConsultationService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payments,
            consultations,
            notifier,
            secret: config.webhook_secret().map(str::to_string),
            production: config.is_production(),
        }
    }

    /// Verify `signature` as a hex HMAC-SHA256 of the raw body.
    ///
    /// Without a configured secret, requests pass outside production and are
    /// rejected in production.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.production {
                error!("PAYMENT_WEBHOOK_SECRET is not set in production; rejecting webhook");
                return Err(WebhookError::SecretNotConfigured);
            }
            warn!("!!! PAYMENT_WEBHOOK_SECRET not set - accepting UNVERIFIED webhook (non-production only) !!!");
            return Ok(());
        };

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

        let expected = hex::decode(signature).map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| {
            warn!("Webhook signature mismatch");
            WebhookError::InvalidSignature
        })
    }

    pub async fn process(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, WebhookError> {
        self.verify_signature(body, signature)?;

        let payload: WebhookPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Unparseable webhook payload: {}", e);
                return Ok(WebhookOutcome::Ignored(format!("malformed payload: {}", e)));
            }
        };

        let event = payload.event.name().to_string();
        if !payload.is_terminal_charge_event() {
            debug!("Ignoring non-terminal webhook event {}", event);
            return Ok(WebhookOutcome::Ignored(format!("event {} is not a charge outcome", event)));
        }

        let Some(reference) = payload.data.reference().map(str::to_string) else {
            warn!("Webhook event {} carried no transaction reference", event);
            return Ok(WebhookOutcome::Ignored("no transaction reference".to_string()));
        };

        let reported = payload.reported_status();
        info!("Webhook {} for reference {} reports {}", event, reference, reported);

        let payment = self.payments
            .find_by_transaction_id(&reference)
            .await
            .map_err(|e| WebhookError::Database(e.to_string()))?;

        let Some(payment) = payment else {
            warn!("No payment found for webhook reference {}; needs manual review", reference);
            return Ok(WebhookOutcome::NotFound(reference));
        };

        let (payment, changed) = match external_update(payment.payment_status, reported) {
            ExternalUpdate::NoOp => {
                debug!("Payment {} already {}", payment.id, reported);
                (payment, false)
            }
            ExternalUpdate::Apply => {
                let updated = self.payments
                    .update_status(payment.id, reported)
                    .await
                    .map_err(|e| WebhookError::Database(e.to_string()))?;
                info!("Payment {} moved to {} via webhook", updated.id, updated.payment_status);
                (updated, true)
            }
            ExternalUpdate::Refuse(reason) => {
                warn!("Webhook for payment {} not applied: {}", payment.id, reason);
                return Ok(WebhookOutcome::Ignored(reason));
            }
        };

        if payment.payment_status == PaymentStatus::Completed {
            // Re-run on redelivery too, so a cascade interrupted by an outage still lands.
            let consultation = self.cascade(&payment).await?;
            if changed {
                self.notify_payment_confirmed(&payment, consultation.as_ref()).await;
            }
        }

        Ok(WebhookOutcome::Processed {
            payment_id: payment.id,
            reference,
            status: payment.payment_status,
            changed,
        })
    }

    async fn cascade(&self, payment: &Payment) -> Result<Option<Consultation>, WebhookError> {
        match self.consultations.schedule_after_payment(payment.consultation_id).await {
            Ok(PaymentCascade::Scheduled(consultation)) => Ok(Some(consultation)),
            Ok(PaymentCascade::AlreadyScheduled) | Ok(PaymentCascade::Skipped(_)) => {
                Ok(self.consultations.load(payment.consultation_id).await.ok())
            }
            Err(ConsultationError::NotFound) => {
                warn!("Payment {} references missing consultation {}", payment.id, payment.consultation_id);
                Ok(None)
            }
            Err(e) => {
                error!("Consultation cascade failed for payment {}: {}", payment.id, e);
                Err(WebhookError::Database(e.to_string()))
            }
        }
    }

    /// Best effort. Failures are logged and never reach the webhook response.
    async fn notify_payment_confirmed(&self, payment: &Payment, consultation: Option<&Consultation>) {
        let Some(consultation) = consultation else {
            return;
        };

        let patient = match self.consultations.contacts_for(consultation).await {
            Ok(contacts) => contacts.patient,
            Err(e) => {
                warn!("Could not load contacts for consultation {}: {}", consultation.id, e);
                return;
            }
        };
        let Some(patient) = patient else {
            debug!("No patient contact for consultation {}", consultation.id);
            return;
        };

        let kind = consultation.consultation_type.to_string();
        let result = if let Some(phone) = patient.phone.as_deref().filter(|p| !p.is_empty()) {
            let message = templates::payment_confirmed_sms(payment.amount_leone, &kind, consultation.scheduled_at);
            self.notifier.send_sms(phone, &message).await
        } else if let Some(email) = patient.email.as_deref().filter(|e| !e.is_empty()) {
            let message = templates::payment_confirmed_email(
                patient.full_name.as_deref(),
                payment.amount_leone,
                &kind,
                consultation.scheduled_at,
            );
            self.notifier.send_email(email, &message.subject, &message.html).await
        } else {
            debug!("Patient {} has no phone or email on file", patient.user_id);
            return;
        };

        if !result.success {
            warn!(
                "Payment confirmation for payment {} not delivered: {}",
                payment.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
