//! Per-client rate limiting with fixed windows.
//!
//! # Algorithm
//!
//! Each client identity owns a [`WindowRecord`] (request count plus window
//! start). A request:
//!
//! 1. starts a fresh window if none exists or `now >= start + window`
//! 2. increments the count (every request counts, allowed or not)
//! 3. is denied when the count exceeds the threshold
//!
//! Records live in a `DashMap`; the read-modify-write runs under the entry's
//! shard lock, so concurrent requests from one client are counted exactly.
//! Expired records are removed by [`FixedWindowLimiter::evict_expired`],
//! driven from a background task owned by `AppState`.
//!
//! # Response Headers
//!
//! On every response passing the limiter (IETF draft-7 style):
//! - `RateLimit-Policy`: `<max>;w=<window secs>`
//! - `RateLimit-Limit`: threshold per window
//! - `RateLimit-Remaining`: requests left in the current window
//! - `RateLimit-Reset`: seconds until the window resets
//!
//! On denial (429) additionally `Retry-After` in seconds, and a JSON body
//! carrying `retryAfter` in milliseconds.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::response::IntoResponse;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::client_identity;
use crate::metrics;

/// Message returned with every 429.
pub const RATE_LIMIT_MESSAGE: &str =
    "Too many requests from this IP, please try again after 15 minutes";

static RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Threshold cannot be zero.
    ZeroLimit,
    /// Window length cannot be zero.
    ZeroWindow,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => write!(f, "rate limit threshold must be greater than 0"),
            RateLimitError::ZeroWindow => write!(f, "rate limit window must be longer than 0s"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// State of one client's current window.
#[derive(Debug, Clone, Copy)]
pub struct WindowRecord {
    pub count: u32,
    pub started_at: Instant,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow {
        remaining: u32,
        reset_after: Duration,
    },
    Deny {
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Fixed-window counter keyed by client identity.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, WindowRecord>,
    max: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `max` requests per `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max` or `window` is zero.
    pub fn new(max: u32, window: Duration) -> Result<Self, RateLimitError> {
        if max == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        Ok(Self {
            windows: DashMap::new(),
            max,
            window,
        })
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, client: &str, now: Instant) -> Decision {
        let mut record = self
            .windows
            .entry(client.to_string())
            .or_insert(WindowRecord {
                count: 0,
                started_at: now,
            });

        if now.saturating_duration_since(record.started_at) >= self.window {
            record.count = 0;
            record.started_at = now;
        }

        record.count = record.count.saturating_add(1);

        let elapsed = now.saturating_duration_since(record.started_at);
        let reset_after = self.window.saturating_sub(elapsed);

        if record.count > self.max {
            Decision::Deny {
                retry_after: reset_after,
            }
        } else {
            Decision::Allow {
                remaining: self.max - record.count,
                reset_after,
            }
        }
    }

    /// Drop every record whose window has ended. Returns how many were removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, record| now.saturating_duration_since(record.started_at) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a live record.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Header value for `RateLimit-Policy`.
    fn policy(&self) -> String {
        format!("{};w={}", self.max, self.window.as_secs())
    }
}

/// 429 response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
    success: bool,
    message: &'static str,
    retry_after: u64,
}

/// Whole seconds, rounded up, for header values.
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn insert_header(headers: &mut HeaderMap, name: &HeaderName, value: impl fmt::Display) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name.clone(), value);
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(FixedWindowLimiter::new(100, RATE_LIMIT_WINDOW)?);
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(RateLimitLayer::new(limiter, config.trust_proxy()));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
    /// Read client identity from proxy headers
    trust_proxy: bool,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<FixedWindowLimiter>, trust_proxy: bool) -> Self {
        Self {
            limiter,
            trust_proxy,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
    trust_proxy: bool,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        let client = client_identity(&req, self.trust_proxy).into_owned();

        Box::pin(async move {
            let decision = limiter.check(&client);

            let (remaining, reset_after, mut response) = match decision {
                Decision::Allow {
                    remaining,
                    reset_after,
                } => {
                    debug!(client_ip = %client, remaining, "Rate limit check passed");
                    (remaining, reset_after, inner.call(req).await?)
                }
                Decision::Deny { retry_after } => {
                    warn!(
                        client_ip = %client,
                        path = %req.uri().path(),
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Rate limit exceeded for client"
                    );
                    metrics::record_rate_limited();

                    let body = RateLimitBody {
                        success: false,
                        message: RATE_LIMIT_MESSAGE,
                        retry_after: retry_after.as_millis() as u64,
                    };
                    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                    insert_header(
                        response.headers_mut(),
                        &RETRY_AFTER,
                        ceil_secs(retry_after).max(1),
                    );
                    (0, retry_after, response)
                }
            };

            let headers = response.headers_mut();
            insert_header(headers, &RATELIMIT_POLICY, limiter.policy());
            insert_header(headers, &RATELIMIT_LIMIT, limiter.max());
            insert_header(headers, &RATELIMIT_REMAINING, remaining);
            insert_header(headers, &RATELIMIT_RESET, ceil_secs(reset_after));

            Ok(response)
        })
    }
}
