//! End-to-end tests against a real HTTP server.
//!
//! Each fixture serves the full middleware stack on an ephemeral port with a
//! small host service mounted under `/api/v1`, then drives it with `reqwest`.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::sleep;

use api_commons::db::{DatabaseFailure, Session};
use api_commons::metrics::sample_count;
use api_commons::{
    AppState, Config, DuplicatePolicy, Endpoint, ListEnvelope, ListResponse, MetricsRegistry,
    Namespace, build_router,
};

const API_KEY: &str = "integration-key";

// ============================================================================
// Host Service
// ============================================================================

static ROLLBACKS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct UniqueViolation;

impl fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error returned from database: duplicate key")
    }
}

impl DatabaseFailure for UniqueViolation {
    fn vendor_code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn vendor_message(&self) -> Cow<'_, str> {
        Cow::Borrowed("duplicate key value violates unique constraint \"orders_pkey\"\nDETAIL: id=1")
    }
}

struct CountingSession;

impl Session for CountingSession {
    type Error = String;

    async fn rollback(&mut self) -> Result<(), String> {
        ROLLBACKS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn list_orders() -> ListEnvelope<Value> {
    ListEnvelope::new(5, vec![json!("a"), json!("b"), json!("c")])
}

async fn list_customers() -> ListResponse<Value> {
    ListResponse::new(1, vec![json!({"id": 7})])
}

async fn create_order(State(state): State<AppState>) -> Response {
    state
        .db_errors
        .translate(&UniqueViolation, &mut CountingSession)
        .await
        .into_response()
}

async fn plain_list() -> axum::Json<Value> {
    axum::Json(json!(["a", "b", "c"]))
}

fn host_routes(state: &AppState) -> Router<AppState> {
    let mut orders = Namespace::new("shop::orders")
        .define("list", Endpoint::new("/api/v1/orders", get(list_orders)))
        .define("create", Endpoint::new("/api/v1/orders/new", post(create_order)))
        .define("plain", Endpoint::new("/api/v1/plain", get(plain_list)))
        .reexport(
            "shop::customers",
            "customers",
            Endpoint::new("/api/v1/customers", get(list_customers)),
        );
    orders.instrument(&state.metrics.call_durations().unwrap(), &["plain"]);
    orders.into_router()
}

// ============================================================================
// Fixture
// ============================================================================

struct TestFixture {
    base_url: String,
    client: Client,
    metrics: Arc<MetricsRegistry>,
}

impl TestFixture {
    async fn new() -> Self {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            service_name: "shop".to_string(),
            allowed_api_keys: vec![API_KEY.to_string()],
            api_version_prefix: Some("/api/v1".to_string()),
            metrics_port: 0,
            ..Config::default()
        };
        let registry = MetricsRegistry::new("shop", DuplicatePolicy::Reuse).unwrap();
        let state = AppState::new(config, registry);
        let metrics = state.metrics.clone();

        let routes = host_routes(&state);
        let app = build_router(state, routes).expect("Failed to build router");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        let base_url = format!("http://{addr}");

        Self::wait_for_server(&client, &base_url).await;

        Self {
            base_url,
            client,
            metrics,
        }
    }

    /// Wait for the server to become ready
    async fn wait_for_server(client: &Client, base_url: &str) {
        let health_url = format!("{base_url}/health");
        let max_attempts = 50;

        for _ in 0..max_attempts {
            if let Ok(response) = client.get(&health_url).send().await
                && response.status().is_success()
            {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("Server failed to respond after {max_attempts} attempts");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, key: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(key) = key {
            request = request.header("X-API-Key", key);
        }
        request.send().await.expect("Request failed")
    }

    fn http_count(&self, path_prefix: &str, method: &str, status: &str) -> Option<u64> {
        sample_count(
            &self.metrics.render(),
            "shop_http_duration_seconds",
            &[
                &format!(r#"path_prefix="{path_prefix}""#),
                &format!(r#"method="{method}""#),
                &format!(r#"status="{status}""#),
            ],
        )
    }

    fn call_count(&self, call: &str) -> Option<u64> {
        sample_count(
            &self.metrics.render(),
            "shop_call_duration_seconds",
            &[&format!(r#"call="{call}""#)],
        )
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_health_is_unprotected() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "shop");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_missing_key_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "Unauthorized");
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders", Some("not-the-key")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "Unauthorized");
}

#[tokio::test]
async fn test_valid_key_grants_access() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders", Some(API_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = fixture.get("/metrics", Some(API_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// List Responses
// ============================================================================

#[tokio::test]
async fn test_list_envelope_is_rewritten() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders", Some(API_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-total-count"], "5");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!(["a", "b", "c"]));
}

#[tokio::test]
async fn test_plain_list_is_untouched() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/plain", Some(API_KEY)).await;
    assert!(response.headers().get("x-total-count").is_none());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!(["a", "b", "c"]));
}

#[tokio::test]
async fn test_list_response_helper() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/customers", Some(API_KEY)).await;
    assert_eq!(response.headers()["x-total-count"], "1");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!([{"id": 7}]));
}

// ============================================================================
// Database Errors
// ============================================================================

#[tokio::test]
async fn test_db_error_is_translated() {
    let fixture = TestFixture::new().await;
    let before = ROLLBACKS.load(Ordering::SeqCst);

    let response = fixture
        .client
        .post(fixture.url("/api/v1/orders/new"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"error": "duplicate key value violates unique constraint \"orders_pkey\" DETAIL: id=1"})
    );
    assert!(ROLLBACKS.load(Ordering::SeqCst) > before);
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_request_durations_by_status() {
    let fixture = TestFixture::new().await;

    fixture.get("/api/v1/orders", Some(API_KEY)).await;
    fixture.get("/api/v1/orders", None).await;

    assert_eq!(fixture.http_count("orders", "GET", "200"), Some(1));
    assert_eq!(fixture.http_count("orders", "GET", "401"), Some(1));
}

#[tokio::test]
async fn test_call_durations_follow_namespace_rules() {
    let fixture = TestFixture::new().await;

    fixture.get("/api/v1/orders", Some(API_KEY)).await;
    fixture.get("/api/v1/orders", Some(API_KEY)).await;
    fixture.get("/api/v1/plain", Some(API_KEY)).await;
    fixture.get("/api/v1/customers", Some(API_KEY)).await;

    assert_eq!(fixture.call_count("orders_list"), Some(2));
    // excluded
    assert_eq!(fixture.call_count("orders_plain"), None);
    // declared in another namespace
    assert_eq!(fixture.call_count("orders_customers"), None);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_histograms() {
    let fixture = TestFixture::new().await;

    fixture.get("/api/v1/orders", Some(API_KEY)).await;
    let response = fixture.get("/metrics", Some(API_KEY)).await;
    let text = response.text().await.unwrap();

    assert!(text.contains("shop_http_duration_seconds_bucket"));
    assert!(text.contains("shop_call_duration_seconds_bucket"));
}
