//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (request order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────────┐
//! │       Tracing        │ ← HTTP request/response spans
//! ├──────────────────────┤
//! │     Compression      │ ← gzip/deflate above 1 KiB
//! ├──────────────────────┤
//! │   Failure Rendering  │ ← HandlerFailure → JSON envelope
//! ├──────────────────────┤
//! │   Security Headers   │ ← CSP/HSTS (production), nosniff, DENY, ...
//! ├──────────────────────┤
//! │         CORS         │ ← allow-list per environment
//! ├──────────────────────┤
//! │     Body Parsing     │ ← 400 malformed / 413 too large
//! ├──────────────────────┤
//! │    Rate Limiting     │ ← 429 when the window is exhausted
//! ├──────────────────────┤
//! │  Operator Key Guard  │ ← $where → _where, a.b → a_b
//! ├──────────────────────┤
//! │   Markup Stripping   │ ← <script> removed from values
//! ├──────────────────────┤
//! │  Pollution Guard     │ ← ?a=1&a=2 → a=2
//! ├──────────────────────┤
//! │    Panic Catcher     │ ← panic → 500 failure
//! └──────────┬───────────┘
//!            ▼
//!         Handler
//! ```
//!
//! # Routes
//!
//! - `/health` - Liveness
//! - `/api/v1` - API root
//! - `/api/v1/products`, `/api/v1/products/data`, `/api/v1/products/search`

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use axum::http::Method;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::{DefaultPredicate, Predicate, SizeAbove};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{
    BodyLimits, ParameterPollutionGuard, PanicResponder, RateLimitLayer, SecurityHeadersLayer,
    guard_operator_keys, guard_parameter_pollution, parse_body, render_failures, strip_markup,
};
use crate::state::AppState;

/// Responses smaller than this are sent uncompressed.
const COMPRESSION_THRESHOLD: u16 = 1024;

/// Preflight cache lifetime.
const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1", get(handlers::api_status))
        .route("/api/v1/products", get(handlers::list_products))
        .route("/api/v1/products/data", get(handlers::get_product))
        .route("/api/v1/products/search", post(handlers::search_products));

    with_pipeline(routes, state)
}

/// Wrap arbitrary routes in the full defensive pipeline.
///
/// Unmatched paths fall through to a 404 envelope.
pub fn with_pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let config = state.config.clone();

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================
    let mut router = routes.fallback(handlers::not_found);

    // 1. Panic catcher (innermost, closest to handlers)
    router = router.layer(CatchPanicLayer::custom(PanicResponder));

    // 2. Parameter pollution guard
    info!(whitelist = ?config.hpp_whitelist, "Parameter pollution guard configured");
    let hpp = Arc::new(ParameterPollutionGuard::new(config.hpp_whitelist.clone()));
    router = router.layer(from_fn_with_state(hpp, guard_parameter_pollution));

    // 3. XSS: markup stripping on body and query values
    router = router.layer(from_fn(strip_markup));

    // 4. NoSQL injection: operator key guard on the body
    router = router.layer(from_fn(guard_operator_keys));

    // 5. Rate limiting
    info!(
        max = config.rate_limit_max,
        window_secs = config.rate_limit_window.as_secs(),
        trust_proxy = config.trust_proxy(),
        "Rate limiting enabled"
    );
    router = router.layer(RateLimitLayer::new(
        state.limiter.clone(),
        config.trust_proxy(),
    ));

    // 6. Body parsing
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Request body size limit configured"
    );
    let limits = BodyLimits {
        max_body_size: config.max_request_body_size,
        max_form_params: config.max_form_params,
    };
    router = router.layer(from_fn_with_state(limits, parse_body));

    // 7. CORS
    router = router.layer(build_cors_layer(&config.cors_origins()));

    // 8. Security headers
    router = router.layer(SecurityHeadersLayer::new(config.environment));

    // 9. Error envelope rendering
    router = router.layer(from_fn_with_state(config.environment, render_failures));

    // 10. Compression
    router = router.layer(
        CompressionLayer::new()
            .compress_when(DefaultPredicate::new().and(SizeAbove::new(COMPRESSION_THRESHOLD))),
    );

    // 11. Tracing
    router = router.layer(TraceLayer::new_for_http());

    router.with_state(state)
}

/// Build CORS layer from an explicit origin allow-list.
///
/// Credentials are allowed, so the list must never contain `*`.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        warn!("No CORS origins configured; cross-origin requests will be refused");
    } else {
        info!(origins = ?allowed_origins, "CORS origins configured");
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(CORS_MAX_AGE)
}
