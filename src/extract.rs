//! Extractors handing handlers sanitized request inputs.
//!
//! The pipeline leaves cleaned inputs in request extensions; these extractors
//! read them back. When a router is built without the pipeline (unit tests,
//! embedding), [`SanitizedQuery`] parses and cleans the query string itself
//! and [`SanitizedBody`] yields an empty object.

use std::collections::HashMap;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::AppError;
use crate::metrics;
use crate::middleware::body::{ParsedBody, QueryParams, parse_query};
use crate::sanitize::{self, KeyGuard};

/// Sanitized request body. An absent body is an empty object.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedBody(pub Value);

impl<S> FromRequestParts<S> for SanitizedBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .extensions
            .get::<ParsedBody>()
            .map(|body| body.value.clone())
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self(value))
    }
}

/// Sanitized, pollution-guarded query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedQuery(pub Map<String, Value>);

impl<S> FromRequestParts<S> for SanitizedQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(QueryParams(params)) = parts.extensions.get::<QueryParams>() {
            return Ok(Self(params.clone()));
        }

        let QueryParams(params) = parse_query(parts.uri.query())?;
        let params = params
            .into_iter()
            .map(|(key, value)| (key, sanitize::strip_markup(value)))
            .collect();
        Ok(Self(params))
    }
}

/// Route parameters with operator-guarded names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedPath(pub HashMap<String, String>);

impl<S> FromRequestParts<S> for SanitizedPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        let (entries, rewritten) = KeyGuard::default().rewrite_entries(raw);
        let params: HashMap<String, String> = entries.into_iter().collect();

        if rewritten > 0 {
            warn!(rewritten_keys = rewritten, "Rewrote query operator keys in route parameters");
            metrics::record_operator_keys_rewritten("path", rewritten);
        }

        Ok(Self(params))
    }
}
