use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;

/// Optional bearer gate for scheduled-job endpoints.
///
/// When `CRON_SECRET` is unset every caller is let through.
pub fn verify_cron_secret(headers: &HeaderMap, config: &AppConfig) -> Result<(), AppError> {
    let Some(secret) = config.cron_secret() else {
        return Ok(());
    };

    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if secrets_match(token, secret) => Ok(()),
        _ => {
            warn!("Rejected cron request with missing or invalid bearer token");
            Err(AppError::Auth("Unauthorized".to_string()))
        }
    }
}

// Both values key a MAC over the same message; `verify_slice` compares the tags in
// constant time, so neither length nor content leaks through timing.
fn secrets_match(provided: &str, expected: &str) -> bool {
    const LABEL: &[u8] = b"cron-secret";

    let (Ok(mut expected_mac), Ok(mut provided_mac)) = (
        Hmac::<Sha256>::new_from_slice(expected.as_bytes()),
        Hmac::<Sha256>::new_from_slice(provided.as_bytes()),
    ) else {
        return false;
    };
    expected_mac.update(LABEL);
    provided_mac.update(LABEL);

    provided_mac.verify_slice(&expected_mac.finalize().into_bytes()).is_ok()
}

/// Interpret a boolean-ish header value (`true`, `1`, `yes`, `on`).
pub fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestConfig;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    #[test]
    fn open_when_secret_unset() {
        let config = TestConfig::default().to_app_config();
        assert!(verify_cron_secret(&HeaderMap::new(), &config).is_ok());
    }

    #[test]
    fn requires_matching_bearer_when_secret_set() {
        let mut config = TestConfig::default().to_app_config();
        config.cron_secret = "s3cret".to_string();

        assert_matches!(verify_cron_secret(&HeaderMap::new(), &config), Err(AppError::Auth(_)));

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong"));
        assert_matches!(verify_cron_secret(&headers, &config), Err(AppError::Auth(_)));

        headers.insert("Authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(verify_cron_secret(&headers, &config).is_ok());
    }

    #[test]
    fn secret_comparison_is_exact() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cre", "s3cret"));
        assert!(!secrets_match("s3cret ", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn parses_flag_headers() {
        let mut headers = HeaderMap::new();
        assert!(!header_flag(&headers, "x-auto-fix"));
        headers.insert("x-auto-fix", HeaderValue::from_static("TRUE"));
        assert!(header_flag(&headers, "x-auto-fix"));
        headers.insert("x-auto-fix", HeaderValue::from_static("0"));
        assert!(!header_flag(&headers, "x-auto-fix"));
    }
}
