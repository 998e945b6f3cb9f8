use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use consultation_cell::models::{Consultation, ConsultationStatus, ConsultationType};
use consultation_cell::{ConsultationService, InMemoryConsultationRepository};
use notification_cell::RecordingNotifier;
use payment_cell::models::{Payment, PaymentMethod, PaymentStatus};
use payment_cell::services::gateway::UnconfiguredGateway;
use payment_cell::{
    payment_routes_with_service, webhook_routes, InMemoryPaymentRepository, PaymentService,
    WebhookService,
};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

const WEBHOOK_SECRET: &str = "whsec_handlers";

struct TestApp {
    payments_app: Router,
    webhook_app: Router,
    consultations: Arc<InMemoryConsultationRepository>,
    payments: Arc<InMemoryPaymentRepository>,
    secret: String,
}

fn create_test_app() -> TestApp {
    let test_config = TestConfig {
        payment_webhook_secret: WEBHOOK_SECRET.to_string(),
        ..TestConfig::default()
    };
    let config = test_config.to_arc();

    let consultation_repo = Arc::new(InMemoryConsultationRepository::new());
    let payment_repo = Arc::new(InMemoryPaymentRepository::new());
    let consultations = Arc::new(ConsultationService::with_repository(consultation_repo.clone()));
    let payments = Arc::new(PaymentService::with_parts(
        payment_repo.clone(),
        Arc::new(UnconfiguredGateway),
        consultations.clone(),
        "monime",
    ));
    let webhooks = Arc::new(WebhookService::new(
        &config,
        payment_repo.clone(),
        consultations.clone(),
        Arc::new(RecordingNotifier::new()),
    ));

    TestApp {
        payments_app: payment_routes_with_service(config, consultations, payments),
        webhook_app: webhook_routes(webhooks),
        consultations: consultation_repo,
        payments: payment_repo,
        secret: test_config.jwt_secret,
    }
}

fn consultation_for(user: &TestUser, status: ConsultationStatus) -> Consultation {
    let now = Utc::now();
    Consultation {
        id: Uuid::new_v4(),
        user_id: Uuid::parse_str(&user.id).unwrap(),
        provider_id: None,
        consultation_type: ConsultationType::Voice,
        status,
        scheduled_at: None,
        preferred_date: None,
        preferred_time_range: None,
        duration_minutes: 30,
        cost_leone: 10_000,
        reason_for_consultation: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn payment_for(consultation: &Consultation, reference: &str, status: PaymentStatus) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        consultation_id: consultation.id,
        user_id: consultation.user_id,
        amount_leone: consultation.cost_leone,
        payment_method: PaymentMethod::OrangeMoney,
        payment_provider: "monime".to_string(),
        payment_status: status,
        transaction_id: Some(reference.to_string()),
        created_at: now,
        updated_at: now,
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, auth: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook_request(body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/payment")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("monime-signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn test_payment_routes_require_token() {
    let test_app = create_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Content-Type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(test_app.payments_app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing authorization header");
}

#[tokio::test]
async fn test_cash_payment_is_created_for_own_consultation() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::PendingAdminReview);
    test_app.consultations.seed(consultation.clone()).await;

    let request = json_request(
        "POST",
        "/",
        &JwtTestUtils::bearer(&patient, &test_app.secret),
        json!({
            "consultation_id": consultation.id,
            "payment_method": "cash",
            "amount_leone": 10000
        }),
    );
    let (status, body) = send(test_app.payments_app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["payment"]["payment_status"], "pending");
    assert_eq!(body["payment"]["payment_provider"], "cash");
    assert!(body["gateway"]["transactionId"].as_str().unwrap().starts_with("CASH-"));
}

#[tokio::test]
async fn test_wrong_amount_is_rejected() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::PendingAdminReview);
    test_app.consultations.seed(consultation.clone()).await;

    let request = json_request(
        "POST",
        "/",
        &JwtTestUtils::bearer(&patient, &test_app.secret),
        json!({
            "consultation_id": consultation.id,
            "payment_method": "cash",
            "amount_leone": 500
        }),
    );
    let (status, _) = send(test_app.payments_app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(test_app.payments.all().await.is_empty());
}

#[tokio::test]
async fn test_booking_reports_payment_failure_but_books() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");

    let request = json_request(
        "POST",
        "/book",
        &JwtTestUtils::bearer(&patient, &test_app.secret),
        json!({
            "consultation_type": "sms",
            "payment_method": "orange_money",
            "phone_number": "+23276123456"
        }),
    );
    let (status, body) = send(test_app.payments_app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["consultation"]["status"], "pending_admin_review");
    assert_eq!(body["consultation"]["cost_leone"], 5000);
    assert!(body["payment_error"].is_string());
    assert_eq!(test_app.consultations.all().await.len(), 1);
}

#[tokio::test]
async fn test_only_admin_can_refund() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let admin = TestUser::admin("admin@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::Scheduled);
    let payment = payment_for(&consultation, "pmc_refund", PaymentStatus::Completed);
    test_app.payments.seed(payment.clone()).await;

    let uri = format!("/{}/refund", payment.id);

    let request = json_request("POST", &uri, &JwtTestUtils::bearer(&patient, &test_app.secret), json!({}));
    let (status, _) = send(test_app.payments_app.clone(), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = json_request(
        "POST",
        &uri,
        &JwtTestUtils::bearer(&admin, &test_app.secret),
        json!({ "reason": "Provider no-show" }),
    );
    let (status, body) = send(test_app.payments_app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["payment_status"], "refunded");

    let request = json_request("POST", &uri, &JwtTestUtils::bearer(&admin, &test_app.secret), json!({}));
    let (status, _) = send(test_app.payments_app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_self_assigned_admin_role_cannot_refund() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::Scheduled);
    let payment = payment_for(&consultation, "pmc_self_admin", PaymentStatus::Completed);
    test_app.payments.seed(payment.clone()).await;

    let token = JwtTestUtils::create_user_metadata_role_token(&patient, &test_app.secret, "admin");
    let request = json_request(
        "POST",
        &format!("/{}/refund", payment.id),
        &format!("Bearer {}", token),
        json!({}),
    );
    let (status, _) = send(test_app.payments_app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = test_app.payments.all().await;
    assert_eq!(stored[0].payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::Confirmed);
    let payment = payment_for(&consultation, "pmc_hook", PaymentStatus::Pending);
    test_app.payments.seed(payment.clone()).await;

    let body = json!({
        "event": { "id": "evt_1", "name": "payment_code.completed" },
        "data": { "id": "pmc_hook", "status": "completed" }
    }).to_string();

    let (status, _) = send(test_app.webhook_app.clone(), webhook_request(body.as_bytes(), Some("deadbeef"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(test_app.webhook_app.clone(), webhook_request(body.as_bytes(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stored = test_app.payments.all().await;
    assert_eq!(stored[0].payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_webhook_acknowledges_every_verified_outcome() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let consultation = consultation_for(&patient, ConsultationStatus::Confirmed);
    test_app.consultations.seed(consultation.clone()).await;
    test_app.payments.seed(payment_for(&consultation, "pmc_ok", PaymentStatus::Pending)).await;

    let processed = json!({
        "event": { "id": "evt_1", "name": "payment_code.completed" },
        "data": { "id": "pmc_ok", "status": "completed" }
    }).to_string();
    let (status, body) = send(
        test_app.webhook_app.clone(),
        webhook_request(processed.as_bytes(), Some(&sign(processed.as_bytes()))),
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message"].is_string());

    let ignored = json!({
        "event": { "id": "evt_2", "name": "payment_code.created" },
        "data": { "id": "pmc_ok" }
    }).to_string();
    let (status, body) = send(
        test_app.webhook_app.clone(),
        webhook_request(ignored.as_bytes(), Some(&sign(ignored.as_bytes()))),
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");

    let unknown = json!({
        "event": { "id": "evt_3", "name": "payment.completed" },
        "data": { "id": "pay_missing", "status": "completed" }
    }).to_string();
    let (status, body) = send(
        test_app.webhook_app,
        webhook_request(unknown.as_bytes(), Some(&sign(unknown.as_bytes()))),
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn test_webhook_store_outage_is_server_error() {
    let test_app = create_test_app();
    test_app.payments.set_unavailable(true).await;

    let body = json!({
        "event": "payment.completed",
        "data": { "id": "pay_1", "status": "completed" }
    }).to_string();
    let (status, _) = send(
        test_app.webhook_app,
        webhook_request(body.as_bytes(), Some(&sign(body.as_bytes()))),
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
