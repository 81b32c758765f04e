//! End-to-end tests against a real server bound to an ephemeral port.
//!
//! Each fixture starts its own server with fresh rate-limit state, so tests
//! can run in parallel.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use storefront_gateway::{AppState, Config, Environment, build_router, with_pipeline};

const SHOP_ORIGIN: &str = "https://shop.example.com";

/// Test fixture owning a running server.
struct TestFixture {
    state: AppState,
    base_url: String,
    client: Client,
}

impl TestFixture {
    /// Start the full application in the given environment.
    async fn new(environment: Environment) -> Self {
        Self::with_config(Self::config(environment), build_router).await
    }

    fn config(environment: Environment) -> Config {
        let mut config = Config::for_environment(environment);
        config.host = "127.0.0.1".to_string();
        config.client_origins = vec![SHOP_ORIGIN.to_string()];
        config
    }

    async fn with_config(config: Config, build: impl FnOnce(AppState) -> Router) -> Self {
        let state = AppState::new(config).expect("Failed to create state");
        let app = build(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            state,
            base_url: format!("http://{addr}"),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }
}

async fn boom() -> &'static str {
    panic!("inventory invariant violated")
}

fn panicking_routes() -> Router<AppState> {
    Router::new().route("/boom", get(boom))
}

// =============================================================================
// Routes
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_api_root() {
    let fixture = TestFixture::new(Environment::Production).await;

    let body: Value = fixture.get("/api/v1").await.json().await.unwrap();
    assert_eq!(body, json!({"message": "API is working!"}));
}

#[tokio::test]
async fn test_product_endpoints() {
    let fixture = TestFixture::new(Environment::Production).await;

    let body: Value = fixture.get("/api/v1/products").await.json().await.unwrap();
    assert_eq!(body, json!({"message": "Products retrieved successfully"}));

    let body: Value = fixture
        .get("/api/v1/products/data")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"message": "Product retrieved successfully"}));
}

#[tokio::test]
async fn test_unknown_route_envelope() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture.get("/api/v1/orders").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"success": false, "message": "Route GET /api/v1/orders not found"})
    );
}

// =============================================================================
// Sanitization
// =============================================================================

#[tokio::test]
async fn test_search_sanitizes_operator_keys_and_markup() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .post(fixture.url("/api/v1/products/search"))
        .json(&json!({
            "$where": "malicious",
            "name": "<script>alert(1)</script>Shoe",
            "filter": {"price.max": 50, "tags": ["<b>new</b>", "<img src=x onerror=alert(1)>"]}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Search completed successfully");
    assert_eq!(body["criteria"]["_where"], "malicious");
    assert_eq!(body["criteria"]["name"], "Shoe");
    assert_eq!(body["criteria"]["filter"]["price_max"], 50);
    assert_eq!(body["criteria"]["filter"]["tags"][0], "<b>new</b>");
    assert!(
        !body["criteria"]["filter"]["tags"][1]
            .as_str()
            .unwrap()
            .contains("onerror")
    );
    assert!(body["criteria"].get("$where").is_none());
}

#[tokio::test]
async fn test_search_form_body_pollution_collapsed() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .post(fixture.url("/api/v1/products/search"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("color=red&color=blue&fields=a&fields=b")
        .send()
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["criteria"],
        json!({"color": "blue", "fields": ["a", "b"]})
    );
}

#[tokio::test]
async fn test_query_markup_stripped() {
    let fixture = TestFixture::new(Environment::Production).await;

    let body: Value = fixture
        .get("/api/v1/products?q=%3Cscript%3Ex%3C%2Fscript%3Eboots")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["query"], json!({"q": "boots"}));
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .post(fixture.url("/api/v1/products/search"))
        .header("content-type", "application/json")
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body.get("stack").is_none());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = TestFixture::config(Environment::Production);
    config.max_request_body_size = 64;
    let fixture = TestFixture::with_config(config, build_router).await;

    let response = fixture
        .client
        .post(fixture.url("/api/v1/products/search"))
        .header("content-type", "application/json")
        .body(format!("{{\"name\": \"{}\"}}", "x".repeat(256)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[tokio::test]
async fn test_production_rate_limit() {
    let fixture = TestFixture::new(Environment::Production).await;

    for i in 0..100 {
        let response = fixture.get("/api/v1").await;
        assert_eq!(response.status(), StatusCode::OK, "request {i} denied");
    }

    let response = fixture.get("/api/v1").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["ratelimit-remaining"], "0");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Too many requests from this IP, please try again after 15 minutes"
    );
    assert!(body["retryAfter"].as_u64().unwrap() > 0);

    assert_eq!(fixture.state.limiter.tracked_clients(), 1);
}

#[tokio::test]
async fn test_development_rate_limit_is_generous() {
    let fixture = TestFixture::new(Environment::Development).await;

    for _ in 0..101 {
        assert_eq!(fixture.get("/health").await.status(), StatusCode::OK);
    }
    assert_eq!(fixture.state.limiter.max(), 10_000);
}

#[tokio::test]
async fn test_rate_limit_headers_present() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture.get("/health").await;
    assert_eq!(response.headers()["ratelimit-limit"], "100");
    assert_eq!(response.headers()["ratelimit-remaining"], "99");
    assert!(response.headers().contains_key("ratelimit-reset"));
}

// =============================================================================
// Security Headers & CORS
// =============================================================================

#[tokio::test]
async fn test_production_security_headers() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture.get("/health").await;
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(
        headers["referrer-policy"],
        "strict-origin-when-cross-origin"
    );
    assert!(
        headers["content-security-policy"]
            .to_str()
            .unwrap()
            .contains("default-src 'self'")
    );
    assert!(
        headers["strict-transport-security"]
            .to_str()
            .unwrap()
            .contains("max-age=31536000")
    );
    assert!(headers.get("x-powered-by").is_none());
}

#[tokio::test]
async fn test_development_omits_csp_and_hsts() {
    let fixture = TestFixture::new(Environment::Development).await;

    let response = fixture.get("/health").await;
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("content-security-policy").is_none());
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .get(fixture.url("/api/v1"))
        .header("origin", SHOP_ORIGIN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], SHOP_ORIGIN);
    assert_eq!(
        response.headers()["access-control-allow-credentials"],
        "true"
    );
}

#[tokio::test]
async fn test_cors_refuses_foreign_origin() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .get(fixture.url("/api/v1"))
        .header("origin", "https://evil.example.net")
        .send()
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let fixture = TestFixture::new(Environment::Production).await;

    let response = fixture
        .client
        .request(reqwest::Method::OPTIONS, fixture.url("/api/v1/products/search"))
        .header("origin", SHOP_ORIGIN)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], SHOP_ORIGIN);
    assert_eq!(response.headers()["access-control-max-age"], "86400");
}

// =============================================================================
// Error Boundary
// =============================================================================

#[tokio::test]
async fn test_panic_hidden_in_production() {
    let fixture = TestFixture::with_config(
        TestFixture::config(Environment::Production),
        |state| with_pipeline(panicking_routes(), state),
    )
    .await;

    let response = fixture.get("/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"success": false, "message": "Internal Server Error"})
    );
}

#[tokio::test]
async fn test_panic_detailed_in_development() {
    let fixture = TestFixture::with_config(
        TestFixture::config(Environment::Development),
        |state| with_pipeline(panicking_routes(), state),
    )
    .await;

    let response = fixture.get("/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("inventory invariant violated")
    );
    assert!(body["stack"].is_string());

    // The server keeps serving after a panic.
    assert_eq!(fixture.get("/boom").await.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
