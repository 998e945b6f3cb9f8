// libs/payment-cell/src/services/gateway.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::templates::format_leone;
use shared_config::AppConfig;

use crate::models::{
    map_provider_status, GatewayTransaction, PaymentError, PaymentInitiationRequest,
    PaymentInitiationResponse, PaymentMethod, PaymentStatus, ProviderObject, VerificationResult,
};

const CURRENCY: &str = "SLE";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 200;
const PAYMENT_CODE_TTL: &str = "30m";

/// Port to the payment provider.
///
/// `initiate` never fails: provider errors and timeouts come back as a
/// `failed` response so the caller can keep the booking and retry later.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PaymentInitiationRequest) -> PaymentInitiationResponse;

    /// Poll the provider for the current status of a charge.
    async fn verify(&self, transaction_id: &str, method: PaymentMethod) -> Result<VerificationResult, PaymentError>;

    /// Every provider transaction created within `[from, to]`, across all pages.
    async fn list_transactions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GatewayTransaction>, PaymentError>;
}

/// Provider response envelope: `{ success, messages, result, pagination }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    result: Option<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentCode {
    id: String,
    ussd_code: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutSession {
    id: String,
    redirect_url: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusOnly {
    status: Option<String>,
}

/// Monime REST client. Mobile money goes through USSD payment codes, bank
/// transfers through hosted checkout sessions; cash never touches the provider.
#[derive(Debug)]
pub struct MonimeGateway {
    client: Client,
    base_url: String,
    api_key: String,
    space_id: String,
}

impl MonimeGateway {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payment_gateway_configured() {
            return Err(PaymentError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.payment_gateway_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.payment_gateway_base_url.trim_end_matches('/').to_string(),
            api_key: config.payment_gateway_api_key.clone(),
            space_id: config.payment_gateway_space_id.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Monime-Space-Id", &self.space_id)
            .header("Content-Type", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Envelope<T>, PaymentError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!("Gateway response: {} - {}", status, body);

        if !status.is_success() {
            error!("Gateway request failed: {} - {}", status, body);
            return Err(PaymentError::Gateway(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| PaymentError::Gateway(format!("Failed to parse gateway response: {}", e)))?;

        if !envelope.success {
            return Err(PaymentError::Gateway(format!(
                "Gateway reported failure: {}",
                serde_json::Value::from(envelope.messages.clone())
            )));
        }

        Ok(envelope)
    }

    async fn create_payment_code(
        &self,
        request: &PaymentInitiationRequest,
        ussd: &str,
    ) -> Result<PaymentInitiationResponse, PaymentError> {
        let mut body = json!({
            "name": format!("Consultation {}", request.consultation_id),
            "mode": "one_time",
            "enable": true,
            "amount": { "currency": CURRENCY, "value": request.amount_leone },
            "duration": PAYMENT_CODE_TTL,
            "reference": request.consultation_id.to_string(),
            "metadata": {
                "consultation_id": request.consultation_id.to_string(),
                "patient_id": request.patient_id.to_string(),
                "payment_method": request.payment_method.as_str(),
            },
        });
        if let Some(phone) = request.phone_number.as_deref().filter(|p| !p.trim().is_empty()) {
            body["authorizedPhoneNumber"] = json!(phone.trim());
        }

        let builder = self.client
            .post(format!("{}/payment-codes", self.base_url))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body);

        let code = self.send::<PaymentCode>(builder).await?
            .result
            .ok_or_else(|| PaymentError::Gateway("Payment code missing from response".to_string()))?;

        let dial = code.ussd_code.as_deref().unwrap_or(ussd);
        info!("Created payment code {} for consultation {}", code.id, request.consultation_id);

        Ok(PaymentInitiationResponse {
            success: true,
            transaction_id: Some(code.id),
            status: code.status.as_deref().map(map_provider_status).unwrap_or(PaymentStatus::Pending),
            message: "Payment initiated. Complete it on your phone.".to_string(),
            payment_link: None,
            payment_instructions: Some(format!(
                "Dial {} on your {} line to pay {} and approve the prompt with your PIN.",
                dial,
                request.payment_method.display_name(),
                format_leone(request.amount_leone)
            )),
        })
    }

    async fn create_checkout_session(
        &self,
        request: &PaymentInitiationRequest,
    ) -> Result<PaymentInitiationResponse, PaymentError> {
        let body = json!({
            "name": format!("Consultation {}", request.consultation_id),
            "reference": request.consultation_id.to_string(),
            "lineItems": [{
                "type": "custom",
                "name": "Telehealth consultation",
                "price": { "currency": CURRENCY, "value": request.amount_leone },
                "quantity": 1,
            }],
            "metadata": {
                "consultation_id": request.consultation_id.to_string(),
                "patient_id": request.patient_id.to_string(),
            },
        });

        let builder = self.client
            .post(format!("{}/checkout-sessions", self.base_url))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body);

        let session = self.send::<CheckoutSession>(builder).await?
            .result
            .ok_or_else(|| PaymentError::Gateway("Checkout session missing from response".to_string()))?;

        info!("Created checkout session {} for consultation {}", session.id, request.consultation_id);

        Ok(PaymentInitiationResponse {
            success: true,
            transaction_id: Some(session.id),
            status: session.status.as_deref().map(map_provider_status).unwrap_or(PaymentStatus::Pending),
            message: "Bank transfer initiated.".to_string(),
            payment_link: session.redirect_url,
            payment_instructions: Some(
                "Open the payment link to complete the bank transfer. Your booking is confirmed once the transfer clears."
                    .to_string(),
            ),
        })
    }
}

/// Cash is settled at the clinic; the reference only ties the receipt to the payment row.
pub fn cash_initiation(request: &PaymentInitiationRequest) -> PaymentInitiationResponse {
    let reference = format!("CASH-{}", Uuid::new_v4().simple().to_string().to_uppercase());
    PaymentInitiationResponse {
        success: true,
        transaction_id: Some(reference.clone()),
        status: PaymentStatus::Pending,
        message: "Cash payment recorded. Pay at the clinic before your consultation.".to_string(),
        payment_link: None,
        payment_instructions: Some(format!(
            "Pay {} in cash at the clinic reception and quote reference {}.",
            format_leone(request.amount_leone),
            reference
        )),
    }
}

#[async_trait]
impl PaymentGateway for MonimeGateway {
    #[instrument(skip(self, request), fields(consultation_id = %request.consultation_id, method = %request.payment_method))]
    async fn initiate(&self, request: &PaymentInitiationRequest) -> PaymentInitiationResponse {
        let result = match request.payment_method {
            PaymentMethod::Cash => return cash_initiation(request),
            PaymentMethod::BankTransfer => self.create_checkout_session(request).await,
            method => match method.ussd_code() {
                Some(ussd) => self.create_payment_code(request, ussd).await,
                None => Err(PaymentError::ValidationError(format!("Unsupported method {}", method))),
            },
        };

        result.unwrap_or_else(|e| {
            warn!("Payment initiation failed: {}", e);
            PaymentInitiationResponse::failed(format!("Payment could not be initiated: {}", e))
        })
    }

    async fn verify(&self, transaction_id: &str, method: PaymentMethod) -> Result<VerificationResult, PaymentError> {
        let path = match method {
            PaymentMethod::Cash => {
                return Ok(VerificationResult {
                    status: PaymentStatus::Pending,
                    verified: false,
                    provider_status: None,
                })
            }
            PaymentMethod::BankTransfer => "checkout-sessions",
            _ => "payment-codes",
        };

        let url = format!("{}/{}/{}", self.base_url, path, urlencoding::encode(transaction_id));
        let envelope = self.send::<StatusOnly>(self.client.get(url)).await?;
        let provider_status = envelope.result.and_then(|r| r.status);

        Ok(VerificationResult {
            status: provider_status.as_deref().map(map_provider_status).unwrap_or(PaymentStatus::Pending),
            verified: provider_status.is_some(),
            provider_status,
        })
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GatewayTransaction>, PaymentError> {
        let mut transactions = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_PAGES {
            let mut url = format!(
                "{}/payments?limit={}&createdAfter={}&createdBefore={}",
                self.base_url,
                PAGE_SIZE,
                urlencoding::encode(&from.to_rfc3339()),
                urlencoding::encode(&to.to_rfc3339()),
            );
            if let Some(after) = &cursor {
                url.push_str(&format!("&after={}", urlencoding::encode(after)));
            }

            let envelope = self.send::<Vec<ProviderObject>>(self.client.get(url)).await?;
            let items = envelope.result.unwrap_or_default();
            debug!("Fetched page {} with {} transactions", page, items.len());

            transactions.extend(
                items
                    .into_iter()
                    .filter_map(ProviderObject::into_transaction)
                    .filter(|tx| tx.created_at.map_or(true, |at| at >= from && at <= to)),
            );

            let next = envelope.pagination.and_then(|p| p.next).filter(|n| !n.is_empty());
            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }

            if page == MAX_PAGES {
                warn!("Stopped paging gateway transactions after {} pages", MAX_PAGES);
            }
        }

        info!("Fetched {} gateway transactions", transactions.len());
        Ok(transactions)
    }
}

/// Stand-in when the provider is not configured. Cash still works; every other
/// charge fails up front so bookings go through and payment can be retried later.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn initiate(&self, request: &PaymentInitiationRequest) -> PaymentInitiationResponse {
        match request.payment_method {
            PaymentMethod::Cash => cash_initiation(request),
            _ => PaymentInitiationResponse::failed("Payment gateway not configured"),
        }
    }

    async fn verify(&self, _transaction_id: &str, _method: PaymentMethod) -> Result<VerificationResult, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn list_transactions(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<GatewayTransaction>, PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}

pub fn gateway_from_config(config: &AppConfig) -> Arc<dyn PaymentGateway> {
    match MonimeGateway::new(config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            warn!("Payment gateway unavailable: {}", e);
            Arc::new(UnconfiguredGateway)
        }
    }
}
