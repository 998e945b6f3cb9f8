use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub payment_gateway_base_url: String,
    pub payment_gateway_api_key: String,
    pub payment_gateway_space_id: String,
    pub payment_gateway_timeout_secs: u64,
    pub payment_provider_name: String,
    pub payment_webhook_secret: String,
    pub cron_secret: String,
    pub sms_api_url: String,
    pub sms_api_key: String,
    pub sms_sender_id: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub app_env: String,
    pub port: u16,
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn optional(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

fn with_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using default", name);
        default.to_string()
    })
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: required("SUPABASE_URL"),
            supabase_anon_key: required("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET"),
            payment_gateway_base_url: with_default(
                "PAYMENT_GATEWAY_BASE_URL",
                "https://api.monime.io/v1",
            ),
            payment_gateway_api_key: required("PAYMENT_GATEWAY_API_KEY"),
            payment_gateway_space_id: required("PAYMENT_GATEWAY_SPACE_ID"),
            payment_gateway_timeout_secs: env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            payment_provider_name: with_default("PAYMENT_PROVIDER_NAME", "monime"),
            payment_webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            cron_secret: optional("CRON_SECRET"),
            sms_api_url: optional("SMS_API_URL"),
            sms_api_key: optional("SMS_API_KEY"),
            sms_sender_id: with_default("SMS_SENDER_ID", "Telehealth"),
            email_api_url: with_default("EMAIL_API_URL", "https://api.resend.com/emails"),
            email_api_key: optional("EMAIL_API_KEY"),
            email_from: with_default("EMAIL_FROM", "no-reply@telehealth.local"),
            app_env: with_default("APP_ENV", "development"),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if config.webhook_secret().is_none() {
            warn!("PAYMENT_WEBHOOK_SECRET not set - payment webhooks will not be verified");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_gateway_configured(&self) -> bool {
        !self.payment_gateway_base_url.is_empty()
            && !self.payment_gateway_api_key.is_empty()
            && !self.payment_gateway_space_id.is_empty()
    }

    pub fn is_sms_configured(&self) -> bool {
        !self.sms_api_url.is_empty() && !self.sms_api_key.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_api_url.is_empty() && !self.email_api_key.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        Some(self.payment_webhook_secret.as_str()).filter(|s| !s.is_empty())
    }

    pub fn cron_secret(&self) -> Option<&str> {
        Some(self.cron_secret.as_str()).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> AppConfig {
        AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            payment_gateway_base_url: String::new(),
            payment_gateway_api_key: String::new(),
            payment_gateway_space_id: String::new(),
            payment_gateway_timeout_secs: 30,
            payment_provider_name: "monime".to_string(),
            payment_webhook_secret: String::new(),
            cron_secret: String::new(),
            sms_api_url: String::new(),
            sms_api_key: String::new(),
            sms_sender_id: String::new(),
            email_api_url: String::new(),
            email_api_key: String::new(),
            email_from: String::new(),
            app_env: "development".to_string(),
            port: 3000,
        }
    }

    #[test]
    fn empty_secrets_are_treated_as_unset() {
        let mut config = blank();
        assert!(config.webhook_secret().is_none());
        assert!(config.cron_secret().is_none());

        config.payment_webhook_secret = "whsec".to_string();
        config.cron_secret = "cron".to_string();
        assert_eq!(config.webhook_secret(), Some("whsec"));
        assert_eq!(config.cron_secret(), Some("cron"));
    }

    #[test]
    fn production_flag_is_case_insensitive() {
        let mut config = blank();
        assert!(!config.is_production());
        config.app_env = "Production".to_string();
        assert!(config.is_production());
    }
}
