use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use payment_cell::models::{PaymentInitiationRequest, PaymentMethod, PaymentStatus};
use payment_cell::services::gateway::{MonimeGateway, PaymentGateway, UnconfiguredGateway};
use payment_cell::PaymentError;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.payment_gateway_base_url = server.uri();
    config
}

fn request(method: PaymentMethod) -> PaymentInitiationRequest {
    PaymentInitiationRequest {
        amount_leone: 15_000,
        payment_method: method,
        phone_number: Some("+23276123456".to_string()),
        email: Some("patient@example.com".to_string()),
        consultation_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        idempotency_key: "pay-key-1".to_string(),
    }
}

fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

#[tokio::test]
async fn mobile_money_creates_payment_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment-codes"))
        .and(header("Authorization", "Bearer test-gateway-key"))
        .and(header("Monime-Space-Id", "spc-test"))
        .and(header("Idempotency-Key", "pay-key-1"))
        .and(body_partial_json(json!({
            "amount": { "currency": "SLE", "value": 15000 },
            "authorizedPhoneNumber": "+23276123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "messages": [],
            "result": { "id": "pmc_123", "ussdCode": "*715*1*0123#", "status": "pending" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::OrangeMoney)).await;

    assert!(response.success);
    assert_eq!(response.transaction_id.as_deref(), Some("pmc_123"));
    assert_eq!(response.status, PaymentStatus::Pending);
    let instructions = response.payment_instructions.unwrap();
    assert!(instructions.contains("*715*1*0123#"));
    assert!(instructions.contains("Le 15,000"));
}

#[tokio::test]
async fn bank_transfer_returns_checkout_link() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/checkout-sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "result": {
                "id": "cos_789",
                "redirectUrl": "https://checkout.example.com/cos_789",
                "status": "pending"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::BankTransfer)).await;

    assert!(response.success);
    assert_eq!(response.transaction_id.as_deref(), Some("cos_789"));
    assert_eq!(response.payment_link.as_deref(), Some("https://checkout.example.com/cos_789"));
    assert!(response.payment_instructions.is_some());
}

#[tokio::test]
async fn cash_never_calls_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::Cash)).await;

    assert!(response.success);
    assert_eq!(response.status, PaymentStatus::Pending);
    assert!(response.transaction_id.unwrap().starts_with("CASH-"));
}

#[tokio::test]
async fn provider_error_is_returned_as_failed_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment-codes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::AfricellMoney)).await;

    assert!(!response.success);
    assert_eq!(response.status, PaymentStatus::Failed);
    assert_eq!(response.transaction_id, None);
    assert!(response.message.contains("500"));
}

#[tokio::test]
async fn unsuccessful_envelope_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment-codes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "messages": ["invalid phone number"],
            "result": null
        })))
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::Qmoney)).await;

    assert!(!response.success);
    assert!(response.message.contains("invalid phone number"));
}

#[tokio::test]
async fn slow_provider_times_out_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment-codes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(StdDuration::from_secs(3))
                .set_body_json(json!({ "success": true, "result": { "id": "late" } })),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.payment_gateway_timeout_secs = 1;
    let gateway = MonimeGateway::new(&config).unwrap();
    let response = gateway.initiate(&request(PaymentMethod::OrangeMoney)).await;

    assert!(!response.success);
    assert_eq!(response.status, PaymentStatus::Failed);
    assert!(response.message.contains("timed out"), "{}", response.message);
}

#[tokio::test]
async fn verify_maps_provider_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payment-codes/pmc_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "id": "pmc_123", "status": "completed" }
        })))
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let result = gateway.verify("pmc_123", PaymentMethod::OrangeMoney).await.unwrap();

    assert!(result.verified);
    assert_eq!(result.status, PaymentStatus::Completed);
    assert_eq!(result.provider_status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn listing_follows_pagination_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .and(query_param("after", "cursor-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": [
                {
                    "id": "pay_3",
                    "status": "failed",
                    "amount": { "currency": "SLE", "value": 5000 },
                    "paymentCodeId": "pmc_3",
                    "createTime": "2026-10-10T08:00:00Z"
                }
            ],
            "pagination": { "next": null }
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": [
                {
                    "id": "pay_1",
                    "status": "completed",
                    "amount": { "currency": "SLE", "value": 15000 },
                    "paymentCodeId": "pmc_1",
                    "createTime": "2026-10-01T08:00:00Z"
                },
                {
                    "id": "pay_2",
                    "status": "completed",
                    "amount": { "currency": "SLE", "value": 10000 },
                    "checkoutSessionId": "cos_2",
                    "createTime": "2026-10-02T08:00:00Z"
                },
                {
                    "id": "pay_old",
                    "status": "completed",
                    "amount": { "currency": "SLE", "value": 10000 },
                    "createTime": "2026-01-02T08:00:00Z"
                }
            ],
            "pagination": { "next": "cursor-2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MonimeGateway::new(&config_for(&server)).unwrap();
    let transactions = gateway
        .list_transactions(ts("2026-09-18T00:00:00Z"), ts("2026-10-18T00:00:00Z"))
        .await
        .unwrap();

    let references: Vec<&str> = transactions.iter().map(|t| t.reference.as_str()).collect();
    assert_eq!(references, vec!["pmc_1", "cos_2", "pmc_3"]);
    assert_eq!(transactions[2].status(), PaymentStatus::Failed);
    assert_eq!(transactions[1].amount_leone, 10_000);
}

#[tokio::test]
async fn unconfigured_gateway_only_accepts_cash() {
    let gateway = UnconfiguredGateway;

    assert!(gateway.initiate(&request(PaymentMethod::Cash)).await.success);
    assert!(!gateway.initiate(&request(PaymentMethod::OrangeMoney)).await.success);
    assert_matches!(
        gateway.verify("pmc_1", PaymentMethod::OrangeMoney).await,
        Err(PaymentError::NotConfigured)
    );
}

#[test]
fn gateway_requires_credentials() {
    let mut config = TestConfig::default().to_app_config();
    config.payment_gateway_api_key = String::new();
    assert_matches!(MonimeGateway::new(&config), Err(PaymentError::NotConfigured));
}
