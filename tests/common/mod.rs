//! Shared test helpers: an in-memory store, a fake Mercado Pago and Telegram
//! server on a random local port, and request builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::{Value, json};
use tower::ServiceExt;

pub use pix_vip::config::Config;
pub use pix_vip::db::{AppState, DbPool, Store, queries};
pub use pix_vip::models::*;

pub const WEBHOOK_SECRET: &str = "mp-webhook-secret";
pub const BOT_TOKEN: &str = "123456:test-token";
pub const BOT_SECRET: &str = "telegram-secret";
pub const VIP_DAYS: i64 = 30;

// ============ Fake provider ============

#[derive(Default)]
pub struct ProviderState {
    /// Payments by id, as the provider would return them
    pub payments: HashMap<i64, Value>,
    pub next_id: i64,
    /// Status given to newly created payments
    pub create_status: Option<String>,
    pub fail_create: bool,
    pub fail_get: bool,
    pub created: Vec<Value>,
    pub idempotency_keys: Vec<String>,
    pub searches: Vec<HashMap<String, String>>,
    pub sent_messages: Vec<(i64, String)>,
}

#[derive(Clone, Default)]
pub struct FakeProvider {
    pub inner: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        let provider = Self::default();
        provider.inner.lock().unwrap().next_id = 1000;
        provider
    }

    /// Serve the fake APIs on 127.0.0.1 and return the base URL.
    pub async fn spawn(&self) -> String {
        let router = Router::new()
            .route("/v1/payments", post(create_payment))
            .route("/v1/payments/search", get(search_payments))
            .route("/v1/payments/{id}", get(get_payment))
            .route("/{bot}/sendMessage", post(send_message))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Register a payment the service never created (e.g. from another integration).
    pub fn add_payment(&self, id: i64, status: &str, external_reference: &str) {
        self.inner
            .lock()
            .unwrap()
            .payments
            .insert(id, payment_json(id, status, external_reference, 10.0));
    }

    pub fn set_status(&self, id: i64, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        let payment = inner.payments.get_mut(&id).expect("unknown payment");
        payment["status"] = json!(status);
        if status == "approved" {
            payment["date_approved"] = json!("2026-01-10T12:00:00.000-03:00");
        }
    }

    pub fn set_create_status(&self, status: &str) {
        self.inner.lock().unwrap().create_status = Some(status.to_string());
    }

    pub fn created(&self) -> Vec<Value> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn sent_messages(&self) -> Vec<(i64, String)> {
        self.inner.lock().unwrap().sent_messages.clone()
    }
}

fn payment_json(id: i64, status: &str, external_reference: &str, amount: f64) -> Value {
    let status_detail = if status == "approved" {
        "accredited"
    } else {
        "pending_waiting_transfer"
    };
    json!({
        "id": id,
        "status": status,
        "status_detail": status_detail,
        "external_reference": external_reference,
        "transaction_amount": amount,
        "point_of_interaction": {
            "transaction_data": {
                "qr_code": format!("00020126580014br.gov.bcb.pix-{}", id),
                "qr_code_base64": "iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB",
                "ticket_url": format!("https://www.mercadopago.com.br/payments/{}/ticket", id)
            }
        }
    })
}

async fn create_payment(
    State(provider): State<FakeProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = provider.inner.lock().unwrap();
    if inner.fail_create {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "payer.email must be a valid email"})),
        )
            .into_response();
    }

    inner.next_id += 1;
    let id = inner.next_id;
    let status = inner
        .create_status
        .clone()
        .unwrap_or_else(|| "pending".to_string());
    let payment = payment_json(
        id,
        &status,
        body["external_reference"].as_str().unwrap_or_default(),
        body["transaction_amount"].as_f64().unwrap_or_default(),
    );

    if let Some(key) = headers.get("x-idempotency-key") {
        inner
            .idempotency_keys
            .push(key.to_str().unwrap().to_string());
    }
    inner.created.push(body);
    inner.payments.insert(id, payment.clone());

    (StatusCode::CREATED, Json(payment)).into_response()
}

async fn get_payment(State(provider): State<FakeProvider>, Path(id): Path<String>) -> Response {
    let inner = provider.inner.lock().unwrap();
    if inner.fail_get {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    match id.parse::<i64>().ok().and_then(|id| inner.payments.get(&id)) {
        Some(payment) => Json(payment.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Payment not found"})),
        )
            .into_response(),
    }
}

async fn search_payments(
    State(provider): State<FakeProvider>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut inner = provider.inner.lock().unwrap();
    let reference = params.get("external_reference").cloned().unwrap_or_default();
    let mut results: Vec<Value> = inner
        .payments
        .values()
        .filter(|p| p["external_reference"] == json!(reference))
        .cloned()
        .collect();
    results.sort_by_key(|p| std::cmp::Reverse(p["id"].as_i64()));
    inner.searches.push(params);
    Json(json!({ "results": results }))
}

async fn send_message(State(provider): State<FakeProvider>, Json(body): Json<Value>) -> Json<Value> {
    provider.inner.lock().unwrap().sent_messages.push((
        body["chat_id"].as_i64().unwrap_or_default(),
        body["text"].as_str().unwrap_or_default().to_string(),
    ));
    Json(json!({"ok": true, "result": {}}))
}

// ============ App state ============

pub fn create_test_pool() -> DbPool {
    // One connection: every in-memory connection is its own database
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    pix_vip::db::init_db(&pool.get().unwrap()).unwrap();
    pool
}

/// Environment used by the tests, pointing every external API at `base_url`.
pub fn test_env(base_url: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("MP_ACCESS_TOKEN".into(), "TEST-access-token".into());
    env.insert("MP_WEBHOOK_SECRET".into(), WEBHOOK_SECRET.into());
    env.insert("MP_API_BASE_URL".into(), base_url.into());
    env.insert("PUBLIC_BASE_URL".into(), "https://vip.example.com".into());
    env.insert("TELEGRAM_BOT_TOKEN".into(), BOT_TOKEN.into());
    env.insert("TELEGRAM_WEBHOOK_SECRET".into(), BOT_SECRET.into());
    env.insert("TELEGRAM_API_BASE_URL".into(), base_url.into());
    env.insert("RATE_LIMIT_PER_MINUTE".into(), "1000".into());
    env.insert("VIP_DAYS".into(), VIP_DAYS.to_string());
    env
}

pub fn config_from(env: &HashMap<String, String>) -> Config {
    Config::from_lookup(|key| env.get(key).cloned()).unwrap()
}

pub struct TestApp {
    pub state: AppState,
    pub pool: DbPool,
    pub provider: FakeProvider,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_env(|_| {}).await
    }

    /// Build an app against a fresh fake provider, letting the test tweak
    /// the environment first.
    pub async fn with_env<F>(customize: F) -> Self
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let provider = FakeProvider::new();
        let base_url = provider.spawn().await;
        let mut env = test_env(&base_url);
        customize(&mut env);

        let config = config_from(&env);
        let pool = create_test_pool();
        let state = AppState::new(&config, Store::Sqlite(pool.clone()));

        Self {
            state,
            pool,
            provider,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = pix_vip::handlers::app(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, json)
    }

    /// Create a charge through the API and return the response body.
    pub async fn create_charge(&self, body: Value) -> Value {
        let (status, json) = self.send_json(post_json("/pix", &body)).await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", json);
        json
    }

    pub fn charge(&self, id: &str) -> Charge {
        let conn = self.pool.get().unwrap();
        queries::get_charge(&conn, id).unwrap().expect("charge exists")
    }

    pub fn subscriber(&self, id: &str) -> Option<Subscriber> {
        let conn = self.pool.get().unwrap();
        queries::get_subscriber(&conn, id).unwrap()
    }
}

// ============ Requests ============

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// `x-signature` header value for a webhook about `data_id`.
pub fn signature_header(secret: &str, request_id: &str, data_id: &str) -> String {
    let ts = "1704908010";
    let v1 = pix_vip::payments::signature_for(secret, ts, Some(request_id), Some(data_id)).unwrap();
    format!("ts={},v1={}", ts, v1)
}

/// A payment webhook as Mercado Pago sends it, signed with `secret` when given.
pub fn payment_webhook(payment_id: &str, secret: Option<&str>) -> Request<Body> {
    let request_id = "bb56a2f1-6aae-46ac-982e-9dcd3581d08e";
    let body = json!({
        "action": "payment.updated",
        "api_version": "v1",
        "data": {"id": payment_id},
        "type": "payment",
        "live_mode": false
    });

    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhook/mercadopago?data.id={}&type=payment", payment_id))
        .header("content-type", "application/json")
        .header("x-request-id", request_id);
    if let Some(secret) = secret {
        builder = builder.header("x-signature", signature_header(secret, request_id, payment_id));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn telegram_update(chat_id: i64, text: &str, secret: Option<&str>) -> Request<Body> {
    let body = json!({
        "update_id": 10000,
        "message": {
            "message_id": 1,
            "date": 1704908010,
            "chat": {"id": chat_id, "type": "private"},
            "text": text
        }
    });

    let mut builder = Request::builder()
        .method("POST")
        .uri("/telegram/webhook")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-telegram-bot-api-secret-token", secret);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
