//! Conversion of handler failures into the error envelope.
//!
//! Failures reach the client through two stages:
//!
//! 1. [`PanicResponder`] (installed with `CatchPanicLayer::custom`) turns a
//!    panic into an [`AppError::Panicked`] response, exactly like a returned
//!    error.
//! 2. [`render_failures`] sits near the outside of the stack and replaces any
//!    response carrying a [`HandlerFailure`] with the JSON envelope shaped
//!    for the configured [`Environment`].
//!
//! Every failure is logged server-side with its full detail regardless of
//! what the client is shown.

use std::any::Any;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::ResponseForPanic;
use tracing::{error, warn};

use crate::config::Environment;
use crate::error::{AppError, ErrorEnvelope, HandlerFailure};
use crate::metrics;

/// Fallback body if envelope serialization ever fails.
const FALLBACK_BODY: &str = r#"{"success":false,"message":"Internal Server Error"}"#;

/// Builds the response for a caught panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicResponder;

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Self::ResponseBody> {
        let message = panic_message(err.as_ref());
        error!(panic = %message, "Handler panicked");
        metrics::record_handler_panic();
        AppError::Panicked(message).into_response()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Middleware that renders [`HandlerFailure`] responses as envelopes.
///
/// Server errors and panics answer 500 in every environment. Client errors
/// raised during dispatch (malformed body, unknown route, bad route
/// parameters) keep their 4xx status in every environment too; only the
/// envelope's detail differs between production and development.
pub async fn render_failures(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;
    let Some(failure) = response.extensions_mut().remove::<HandlerFailure>() else {
        return response;
    };

    if failure.status.is_server_error() {
        error!(
            status = failure.status.as_u16(),
            method = %method,
            path = %path,
            error = %failure.message,
            detail = %failure.detail,
            "Request failed"
        );
    } else {
        warn!(
            status = failure.status.as_u16(),
            method = %method,
            path = %path,
            error = %failure.message,
            "Request rejected"
        );
    }
    metrics::record_handler_failure(failure.status.as_u16());

    let envelope = ErrorEnvelope::for_failure(&failure, environment);
    let body = serde_json::to_vec(&envelope).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize error envelope");
        FALLBACK_BODY.as_bytes().to_vec()
    });

    let status = if environment.is_production() && failure.status.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        failure.status
    };

    let (mut parts, _) = response.into_parts();
    parts.status = status;
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Response::from_parts(parts, Body::from(body))
}
