//! Sanitization stages of the request pipeline.
//!
//! Both stages rewrite the extensions produced by
//! [`parse_body`](super::body::parse_body) in place and never reject a
//! request.
//!
//! - [`guard_operator_keys`]: renames `$`-prefixed and dotted keys in the body
//! - [`strip_markup`]: removes executable HTML from string values in the body
//!   and query parameters
//!
//! Route parameters are only known after routing; handlers read them through
//! [`SanitizedPath`](crate::extract::SanitizedPath), which applies the same
//! key guard.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use tracing::warn;

use super::body::{ParsedBody, QueryParams};
use crate::metrics;
use crate::sanitize::{self, KeyGuard};

/// Middleware that neutralizes NoSQL operator keys in the request body.
pub async fn guard_operator_keys(mut request: Request, next: Next) -> Response {
    let rewritten = match request.extensions_mut().get_mut::<ParsedBody>() {
        Some(body) => {
            let (clean, rewritten) = KeyGuard::default().apply(body.value.take());
            body.value = clean;
            rewritten
        }
        None => 0,
    };

    if rewritten > 0 {
        warn!(
            rewritten_keys = rewritten,
            path = %request.uri().path(),
            "Rewrote query operator keys in request body"
        );
        metrics::record_operator_keys_rewritten("body", rewritten);
    }

    next.run(request).await
}

/// Middleware that strips executable markup from body and query values.
pub async fn strip_markup(mut request: Request, next: Next) -> Response {
    let extensions = request.extensions_mut();

    if let Some(body) = extensions.get_mut::<ParsedBody>() {
        body.value = sanitize::strip_markup(body.value.take());
    }

    if let Some(QueryParams(params)) = extensions.get_mut::<QueryParams>() {
        for value in params.values_mut() {
            *value = sanitize::strip_markup(value.take());
        }
    }

    next.run(request).await
}
