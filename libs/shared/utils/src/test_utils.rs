use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub payment_gateway_base_url: String,
    pub payment_webhook_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            payment_gateway_base_url: "http://localhost:54322/v1".to_string(),
            payment_webhook_secret: String::new(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            payment_gateway_base_url: self.payment_gateway_base_url.clone(),
            payment_gateway_api_key: "test-gateway-key".to_string(),
            payment_gateway_space_id: "spc-test".to_string(),
            payment_gateway_timeout_secs: 5,
            payment_provider_name: "monime".to_string(),
            payment_webhook_secret: self.payment_webhook_secret.clone(),
            cron_secret: String::new(),
            sms_api_url: String::new(),
            sms_api_key: String::new(),
            sms_sender_id: "Telehealth".to_string(),
            email_api_url: String::new(),
            email_api_key: String::new(),
            email_from: "no-reply@example.com".to_string(),
            app_env: "test".to_string(),
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            app_metadata: Some(json!({ "role": self.role })),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "provider": "email", "role": user.role },
            "user_metadata": {},
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        Self::sign(&payload, secret)
    }

    /// Token whose only role claim is one the user wrote into their own `user_metadata`.
    pub fn create_user_metadata_role_token(user: &TestUser, secret: &str, claimed_role: &str) -> String {
        let now = Utc::now();
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "provider": "email", "role": user.role },
            "user_metadata": { "role": claimed_role },
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(1)).timestamp()
        });

        Self::sign(&payload, secret)
    }

    fn sign(payload: &serde_json::Value, secret: &str) -> String {
        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

/// Canned PostgREST rows for wiremock-backed tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn consultation_response(id: &str, user_id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "provider_id": null,
            "consultation_type": "video",
            "status": status,
            "scheduled_at": null,
            "preferred_date": "2026-11-02",
            "preferred_time_range": "09:00-12:00",
            "duration_minutes": 30,
            "cost_leone": 15000,
            "reason_for_consultation": "Persistent cough",
            "notes": null,
            "created_at": "2026-10-01T00:00:00Z",
            "updated_at": "2026-10-01T00:00:00Z"
        })
    }

    pub fn payment_response(id: &str, consultation_id: &str, transaction_id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "consultation_id": consultation_id,
            "user_id": Uuid::new_v4(),
            "amount_leone": 15000,
            "payment_method": "orange_money",
            "payment_provider": "monime",
            "payment_status": status,
            "transaction_id": transaction_id,
            "created_at": "2026-10-01T00:00:00Z",
            "updated_at": "2026-10-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}
