//! Security response headers.
//!
//! [`SecurityHeaderPolicy::headers_for`] maps an [`Environment`] to a fixed,
//! ordered header list; [`SecurityHeadersLayer`] stamps that list on every
//! response and strips `X-Powered-By`.
//!
//! Production additionally gets a Content-Security-Policy and HSTS. Both are
//! absent in development so local HTTP tooling keeps working.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{
    CONTENT_SECURITY_POLICY, HeaderName, HeaderValue, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_DNS_PREFETCH_CONTROL, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::config::Environment;

pub const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; \
style-src 'self' 'unsafe-inline'; \
script-src 'self'; \
img-src 'self' data: https:; \
connect-src 'self'; \
font-src 'self'; \
object-src 'none'; \
media-src 'self'; \
frame-src 'none'; \
base-uri 'self'; \
form-action 'self'; \
frame-ancestors 'self'; \
script-src-attr 'none'; \
upgrade-insecure-requests";

pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains; preload";

static X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Environment-dependent security header set.
#[derive(Debug, Clone)]
pub struct SecurityHeaderPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaderPolicy {
    pub fn new(environment: Environment) -> Self {
        Self {
            headers: Self::headers_for(environment),
        }
    }

    /// Ordered header list for a mode. Deterministic.
    pub fn headers_for(environment: Environment) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
            (
                REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (
                HeaderName::from_static("permissions-policy"),
                HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
            ),
            (
                HeaderName::from_static("cross-origin-opener-policy"),
                HeaderValue::from_static("same-origin"),
            ),
            (
                HeaderName::from_static("cross-origin-resource-policy"),
                HeaderValue::from_static("same-origin"),
            ),
            (
                HeaderName::from_static("origin-agent-cluster"),
                HeaderValue::from_static("?1"),
            ),
            (X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")),
            (
                HeaderName::from_static("x-download-options"),
                HeaderValue::from_static("noopen"),
            ),
            (
                HeaderName::from_static("x-permitted-cross-domain-policies"),
                HeaderValue::from_static("none"),
            ),
        ];

        if environment.is_production() {
            headers.push((
                CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
            ));
            headers.push((STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE)));
        }

        headers
    }

    fn apply<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.remove(&X_POWERED_BY);
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Tower layer that adds security headers.
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    policy: Arc<SecurityHeaderPolicy>,
}

impl SecurityHeadersLayer {
    pub fn new(environment: Environment) -> Self {
        Self {
            policy: Arc::new(SecurityHeaderPolicy::new(environment)),
        }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Tower service that adds security headers.
#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    policy: Arc<SecurityHeaderPolicy>,
}

impl<S> Service<Request<Body>> for SecurityHeadersService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
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
        let policy = self.policy.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?;
            policy.apply(&mut response);
            Ok(response)
        })
    }
}
