// libs/consultation-cell/src/services/repository.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Consultation, ConsultationContacts, ConsultationError, ConsultationPatch, ConsultationStatus,
    Contact, NewConsultation,
};

/// Record-store operations the consultation core depends on.
///
/// Updates are single-row with no multi-statement transaction. Each update carries the
/// status the caller validated against and only applies while the row still has it.
#[async_trait]
pub trait ConsultationRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Consultation>, ConsultationError>;

    async fn insert(&self, consultation: NewConsultation) -> Result<Consultation, ConsultationError>;

    /// Apply `patch` if the row is still in `expected`, otherwise `StatusChanged`.
    async fn update(
        &self,
        id: Uuid,
        expected: ConsultationStatus,
        patch: ConsultationPatch,
    ) -> Result<Consultation, ConsultationError>;

    async fn list_for_patient(&self, user_id: Uuid) -> Result<Vec<Consultation>, ConsultationError>;

    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Consultation>, ConsultationError>;

    /// Consultations in `status` whose `scheduled_at` falls within `[from, to]`.
    async fn list_by_status_scheduled_between(
        &self,
        status: ConsultationStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>, ConsultationError>;

    /// Provider record owned by a doctor's user account.
    async fn provider_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ConsultationError>;

    async fn contacts_for(&self, consultation: &Consultation) -> Result<ConsultationContacts, ConsultationError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseConsultationRepository {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct ProviderRow {
    id: Uuid,
    user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Uuid,
    full_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

impl From<UserRow> for Contact {
    fn from(row: UserRow) -> Self {
        Contact {
            user_id: row.id,
            full_name: row.full_name,
            phone: row.phone,
            email: row.email,
        }
    }
}

impl SupabaseConsultationRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn user_contact(&self, user_id: Uuid) -> Result<Option<Contact>, ConsultationError> {
        let rows: Vec<UserRow> = self.supabase
            .select("users", &format!("id=eq.{}&select=id,full_name,phone,email", user_id))
            .await?;
        Ok(rows.into_iter().next().map(Contact::from))
    }
}

#[async_trait]
impl ConsultationRepository for SupabaseConsultationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Consultation>, ConsultationError> {
        debug!("Fetching consultation {}", id);
        let rows: Vec<Consultation> = self.supabase
            .select("consultations", &format!("id=eq.{}", id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, consultation: NewConsultation) -> Result<Consultation, ConsultationError> {
        let now = Utc::now().to_rfc3339();
        let mut row = serde_json::to_value(&consultation)
            .map_err(|e| ConsultationError::DatabaseError(e.to_string()))?;
        row["created_at"] = json!(now);
        row["updated_at"] = json!(now);

        Ok(self.supabase.insert("consultations", row).await?)
    }

    async fn update(
        &self,
        id: Uuid,
        expected: ConsultationStatus,
        patch: ConsultationPatch,
    ) -> Result<Consultation, ConsultationError> {
        let mut body = serde_json::to_value(&patch)
            .map_err(|e| ConsultationError::DatabaseError(e.to_string()))?;
        body["updated_at"] = json!(Utc::now().to_rfc3339());

        let updated: Option<Consultation> = self.supabase
            .update("consultations", &format!("id=eq.{}&status=eq.{}", id, expected), body)
            .await?;
        if let Some(consultation) = updated {
            return Ok(consultation);
        }

        // Nothing matched: either the row is gone or its status moved on.
        match self.get(id).await? {
            Some(current) => {
                warn!("Consultation {} is '{}', not '{}'; update not applied", id, current.status, expected);
                Err(ConsultationError::StatusChanged { expected, actual: current.status })
            }
            None => Err(ConsultationError::NotFound),
        }
    }

    async fn list_for_patient(&self, user_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        Ok(self.supabase
            .select("consultations", &format!("user_id=eq.{}&order=created_at.desc", user_id))
            .await?)
    }

    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        Ok(self.supabase
            .select(
                "consultations",
                &format!("provider_id=eq.{}&order=scheduled_at.asc.nullslast", provider_id),
            )
            .await?)
    }

    async fn list_by_status_scheduled_between(
        &self,
        status: ConsultationStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        let query = format!(
            "status=eq.{}&scheduled_at=gte.{}&scheduled_at=lte.{}&order=scheduled_at.asc",
            status,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );
        Ok(self.supabase.select("consultations", &query).await?)
    }

    async fn provider_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ConsultationError> {
        let rows: Vec<ProviderRow> = self.supabase
            .select("providers", &format!("user_id=eq.{}&select=id,user_id", user_id))
            .await?;
        Ok(rows.into_iter().next().map(|p| p.id))
    }

    async fn contacts_for(&self, consultation: &Consultation) -> Result<ConsultationContacts, ConsultationError> {
        let patient = self.user_contact(consultation.user_id).await?;

        let provider = match consultation.provider_id {
            Some(provider_id) => {
                let rows: Vec<ProviderRow> = self.supabase
                    .select("providers", &format!("id=eq.{}&select=id,user_id", provider_id))
                    .await?;
                match rows.into_iter().next().and_then(|p| p.user_id) {
                    Some(user_id) => self.user_contact(user_id).await?,
                    None => None,
                }
            }
            None => None,
        };

        Ok(ConsultationContacts { patient, provider })
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Process-local store with the same semantics as the Supabase tables.
#[derive(Default)]
pub struct InMemoryConsultationRepository {
    consultations: RwLock<HashMap<Uuid, Consultation>>,
    providers: RwLock<HashMap<Uuid, Uuid>>,
    contacts: RwLock<HashMap<Uuid, Contact>>,
}

impl InMemoryConsultationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, consultation: Consultation) {
        self.consultations.write().await.insert(consultation.id, consultation);
    }

    /// Register a provider record owned by `user_id`.
    pub async fn add_provider(&self, provider_id: Uuid, user_id: Uuid) {
        self.providers.write().await.insert(provider_id, user_id);
    }

    pub async fn add_contact(&self, contact: Contact) {
        self.contacts.write().await.insert(contact.user_id, contact);
    }

    pub async fn all(&self) -> Vec<Consultation> {
        self.consultations.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ConsultationRepository for InMemoryConsultationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Consultation>, ConsultationError> {
        Ok(self.consultations.read().await.get(&id).cloned())
    }

    async fn insert(&self, new: NewConsultation) -> Result<Consultation, ConsultationError> {
        let now = Utc::now();
        let consultation = Consultation {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            provider_id: None,
            consultation_type: new.consultation_type,
            status: new.status,
            scheduled_at: None,
            preferred_date: new.preferred_date,
            preferred_time_range: new.preferred_time_range,
            duration_minutes: new.duration_minutes,
            cost_leone: new.cost_leone,
            reason_for_consultation: new.reason_for_consultation,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        self.consultations.write().await.insert(consultation.id, consultation.clone());
        Ok(consultation)
    }

    async fn update(
        &self,
        id: Uuid,
        expected: ConsultationStatus,
        patch: ConsultationPatch,
    ) -> Result<Consultation, ConsultationError> {
        let mut store = self.consultations.write().await;
        let consultation = store.get_mut(&id).ok_or(ConsultationError::NotFound)?;

        if consultation.status != expected {
            return Err(ConsultationError::StatusChanged { expected, actual: consultation.status });
        }

        if let Some(status) = patch.status {
            consultation.status = status;
        }
        if let Some(provider_id) = patch.provider_id {
            consultation.provider_id = Some(provider_id);
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            consultation.scheduled_at = Some(scheduled_at);
        }
        if let Some(notes) = patch.notes {
            consultation.notes = Some(notes);
        }
        if let Some(duration) = patch.duration_minutes {
            consultation.duration_minutes = duration;
        }
        consultation.updated_at = Utc::now();

        Ok(consultation.clone())
    }

    async fn list_for_patient(&self, user_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        let mut rows: Vec<Consultation> = self.consultations.read().await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<Consultation>, ConsultationError> {
        let mut rows: Vec<Consultation> = self.consultations.read().await
            .values()
            .filter(|c| c.provider_id == Some(provider_id))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.scheduled_at);
        Ok(rows)
    }

    async fn list_by_status_scheduled_between(
        &self,
        status: ConsultationStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        let mut rows: Vec<Consultation> = self.consultations.read().await
            .values()
            .filter(|c| c.status == status)
            .filter(|c| c.scheduled_at.is_some_and(|at| at >= from && at <= to))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.scheduled_at);
        Ok(rows)
    }

    async fn provider_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ConsultationError> {
        Ok(self.providers.read().await
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(provider_id, _)| *provider_id))
    }

    async fn contacts_for(&self, consultation: &Consultation) -> Result<ConsultationContacts, ConsultationError> {
        let contacts = self.contacts.read().await;
        let providers = self.providers.read().await;

        let patient = contacts.get(&consultation.user_id).cloned();
        let provider = consultation.provider_id
            .and_then(|pid| providers.get(&pid))
            .and_then(|user_id| contacts.get(user_id))
            .cloned();

        Ok(ConsultationContacts { patient, provider })
    }
}
