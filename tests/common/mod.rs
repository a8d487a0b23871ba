//! Shared test fixtures: a mock payment processor, a real SQLite-backed
//! AppState, and webhook signing helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use hmac::{Hmac, Mac};
use rusqlite::{Connection, params};
use sha2::Sha256;
use tower::ServiceExt;

use coursepass::db::{self, AppState, queries};
use coursepass::error::{AppError, Result};
use coursepass::handlers;
use coursepass::models::{Course, CreateCourse, CreateUser, PaymentData, User};
use coursepass::payments::{
    BoxFuture, CheckoutSession, CreatePreapproval, CreatePreference, PaymentEventKind,
    PreapprovalData, ProcessorApi,
};

pub const TEST_SECRET: &str = "whsec_test_secret";

type HmacSha256 = Hmac<Sha256>;

/// Programmable stand-in for the processor API.
#[derive(Default)]
pub struct MockProcessor {
    pub payments: Mutex<HashMap<String, PaymentData>>,
    pub preapprovals: Mutex<HashMap<String, PreapprovalData>>,
    /// When true, every fetch fails like a network outage.
    pub fail_fetches: Mutex<bool>,
}

impl MockProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_payment(&self, data: PaymentData) {
        self.payments.lock().unwrap().insert(data.id.clone(), data);
    }

    pub fn insert_preapproval(&self, data: PreapprovalData) {
        self.preapprovals.lock().unwrap().insert(data.id.clone(), data);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        *self.fail_fetches.lock().unwrap() = fail;
    }
}

impl ProcessorApi for MockProcessor {
    fn fetch_payment<'a>(
        &'a self,
        _kind: PaymentEventKind,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentData>> {
        Box::pin(async move {
            if *self.fail_fetches.lock().unwrap() {
                return Err(AppError::DependencyFailure("mock processor outage".into()));
            }
            self.payments
                .lock()
                .unwrap()
                .get(payment_id)
                .cloned()
                .ok_or_else(|| {
                    AppError::DependencyFailure(format!("no mock payment {}", payment_id))
                })
        })
    }

    fn fetch_preapproval<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<PreapprovalData>> {
        Box::pin(async move {
            if *self.fail_fetches.lock().unwrap() {
                return Err(AppError::DependencyFailure("mock processor outage".into()));
            }
            self.preapprovals
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::DependencyFailure(format!("no mock preapproval {}", id)))
        })
    }

    fn create_preference<'a>(
        &'a self,
        req: &'a CreatePreference,
    ) -> BoxFuture<'a, Result<CheckoutSession>> {
        Box::pin(async move {
            Ok(CheckoutSession {
                id: Some("pref-1".to_string()),
                init_point: format!(
                    "https://processor.test/checkout?ref={}",
                    req.external_reference
                ),
            })
        })
    }

    fn create_preapproval<'a>(
        &'a self,
        req: &'a CreatePreapproval,
    ) -> BoxFuture<'a, Result<CheckoutSession>> {
        Box::pin(async move {
            Ok(CheckoutSession {
                id: Some("preapproval-1".to_string()),
                init_point: format!(
                    "https://processor.test/subscribe?ref={}",
                    req.external_reference
                ),
            })
        })
    }

    fn update_preapproval_status<'a>(
        &'a self,
        id: &'a str,
        status: &'a str,
    ) -> BoxFuture<'a, Result<PreapprovalData>> {
        Box::pin(async move {
            Ok(PreapprovalData {
                id: id.to_string(),
                status: status.to_string(),
                payer_email: None,
                external_reference: None,
                init_point: None,
            })
        })
    }
}

pub fn create_test_state(processor: Arc<MockProcessor>) -> AppState {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("coursepass-test.db");
    let pool = db::init_db_pool(db_path.to_str().unwrap()).unwrap();
    // Leak the tempdir so the database file outlives this function.
    std::mem::forget(dir);

    AppState {
        db: pool,
        processor,
        webhook_secret: TEST_SECRET.to_string(),
        base_url: "http://localhost:3000".to_string(),
    }
}

pub fn app(state: AppState) -> Router {
    handlers::router().with_state(state)
}

// ============ Fixtures ============

pub fn create_test_user(conn: &Connection) -> User {
    queries::create_user(
        conn,
        &CreateUser {
            email: "student@example.com".to_string(),
            name: "Test Student".to_string(),
        },
    )
    .unwrap()
}

pub fn create_test_course(conn: &Connection, access_duration: Option<&str>) -> Course {
    queries::create_course(
        conn,
        &CreateCourse {
            title: "Intro to Testing".to_string(),
            price_cents: Some(150_000),
            currency: Some("COP".to_string()),
            access_duration: access_duration.map(String::from),
        },
    )
    .unwrap()
}

/// Seed an entitlement row directly, bypassing the grant transaction, so
/// tests control the expiry.
pub fn seed_entitlement(conn: &Connection, user_id: &str, course_id: &str, expires_at: i64) {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO user_entitlements
            (user_id, course_id, access_duration, expires_at, status, purchased_at,
             course_title, completed_tutorials)
         VALUES (?1, ?2, 'monthly', ?3, 'active', ?4, 'Intro to Testing', '[]')",
        params![user_id, course_id, expires_at, now],
    )
    .unwrap();
}

/// Backdate an intent's started_at, for sweep tests.
pub fn backdate_intent(conn: &Connection, reference: &str, started_at: i64) {
    conn.execute(
        "UPDATE checkout_intents SET started_at = ?2 WHERE reference = ?1",
        params![reference, started_at],
    )
    .unwrap();
}

pub fn approved_payment(id: &str, external_reference: &str) -> PaymentData {
    payment_with_status(id, external_reference, "approved")
}

pub fn payment_with_status(id: &str, external_reference: &str, status: &str) -> PaymentData {
    PaymentData {
        id: id.to_string(),
        status: status.to_string(),
        external_reference: Some(external_reference.to_string()),
        subscription_id: None,
        transaction_amount: 1500.0,
        currency_id: Some("COP".to_string()),
        date_approved: None,
    }
}

// ============ Webhook helpers ============

pub fn hmac_hex(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn webhook_body(event_type: &str, action: Option<&str>, data_id: &str) -> Vec<u8> {
    let mut body = serde_json::json!({
        "type": event_type,
        "data": { "id": data_id },
    });
    if let Some(action) = action {
        body["action"] = serde_json::Value::String(action.to_string());
    }
    serde_json::to_vec(&body).unwrap()
}

/// POST a webhook signed with the legacy whole-body scheme.
pub async fn post_webhook_legacy(app: Router, body: &[u8]) -> Response<Body> {
    let signature = hmac_hex(TEST_SECRET, body);
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/webhooks/mercadopago")
            .header("content-type", "application/json")
            .header("x-hmac-signature", signature)
            .body(Body::from(body.to_vec()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// POST a webhook signed with the structured ts/v1 scheme.
pub async fn post_webhook_structured(app: Router, body: &[u8], data_id: &str) -> Response<Body> {
    let ts = "1700000000";
    let request_id = "req-test-1";
    let canonical = format!("id:{};request-id:{};ts:{};", data_id, request_id, ts);
    let v1 = hmac_hex(TEST_SECRET, canonical.as_bytes());
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/webhooks/mercadopago")
            .header("content-type", "application/json")
            .header("x-signature", format!("ts={},v1={}", ts, v1))
            .header("x-request-id", request_id)
            .body(Body::from(body.to_vec()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn response_json(response: Response<Body>) -> serde_json::Value {
    let bytes: Bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
