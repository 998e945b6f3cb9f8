// libs/payment-cell/src/services/repository.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{NewPayment, Payment, PaymentError, PaymentStatus};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>, PaymentError>;

    async fn insert(&self, payment: NewPayment) -> Result<Payment, PaymentError>;

    /// Exact match on the provider reference stored at creation time.
    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>, PaymentError>;

    async fn list_for_consultation(&self, consultation_id: Uuid) -> Result<Vec<Payment>, PaymentError>;

    /// Payments for `provider` created within `[from, to]`.
    async fn list_in_window(
        &self,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentError>;

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, PaymentError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabasePaymentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePaymentRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PaymentRepository for SupabasePaymentRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>, PaymentError> {
        let rows: Vec<Payment> = self.supabase
            .select("payments", &format!("id=eq.{}", id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, payment: NewPayment) -> Result<Payment, PaymentError> {
        let now = Utc::now().to_rfc3339();
        let mut row = serde_json::to_value(&payment)
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;
        row["created_at"] = json!(now);
        row["updated_at"] = json!(now);

        Ok(self.supabase.insert("payments", row).await?)
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>, PaymentError> {
        debug!("Looking up payment by transaction_id {}", transaction_id);
        let rows: Vec<Payment> = self.supabase
            .select(
                "payments",
                &format!("transaction_id=eq.{}&limit=1", urlencoding::encode(transaction_id)),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_consultation(&self, consultation_id: Uuid) -> Result<Vec<Payment>, PaymentError> {
        Ok(self.supabase
            .select(
                "payments",
                &format!("consultation_id=eq.{}&order=created_at.desc", consultation_id),
            )
            .await?)
    }

    async fn list_in_window(
        &self,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentError> {
        let query = format!(
            "payment_provider=eq.{}&created_at=gte.{}&created_at=lte.{}&order=created_at.asc",
            urlencoding::encode(provider),
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );
        Ok(self.supabase.select("payments", &query).await?)
    }

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, PaymentError> {
        let body = json!({
            "payment_status": status,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.supabase
            .update("payments", &format!("id=eq.{}", id), body)
            .await?
            .ok_or(PaymentError::NotFound)
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<Uuid, Payment>>,
    unavailable: RwLock<bool>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, payment: Payment) {
        self.payments.write().await.insert(payment.id, payment);
    }

    pub async fn all(&self) -> Vec<Payment> {
        self.payments.read().await.values().cloned().collect()
    }

    /// Make every subsequent read and write fail, as if the store were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self) -> Result<(), PaymentError> {
        if *self.unavailable.read().await {
            Err(PaymentError::DatabaseError("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Payment>, PaymentError> {
        self.check_available().await?;
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn insert(&self, new: NewPayment) -> Result<Payment, PaymentError> {
        self.check_available().await?;
        let now = Utc::now();
        let payment = Payment {
            id: new.id,
            consultation_id: new.consultation_id,
            user_id: new.user_id,
            amount_leone: new.amount_leone,
            payment_method: new.payment_method,
            payment_provider: new.payment_provider,
            payment_status: new.payment_status,
            transaction_id: new.transaction_id,
            created_at: now,
            updated_at: now,
        };
        self.payments.write().await.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>, PaymentError> {
        self.check_available().await?;
        Ok(self.payments.read().await
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn list_for_consultation(&self, consultation_id: Uuid) -> Result<Vec<Payment>, PaymentError> {
        self.check_available().await?;
        let mut rows: Vec<Payment> = self.payments.read().await
            .values()
            .filter(|p| p.consultation_id == consultation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_in_window(
        &self,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>, PaymentError> {
        self.check_available().await?;
        let mut rows: Vec<Payment> = self.payments.read().await
            .values()
            .filter(|p| p.payment_provider == provider)
            .filter(|p| p.created_at >= from && p.created_at <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, PaymentError> {
        self.check_available().await?;
        let mut store = self.payments.write().await;
        let payment = store.get_mut(&id).ok_or(PaymentError::NotFound)?;
        payment.payment_status = status;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }
}
