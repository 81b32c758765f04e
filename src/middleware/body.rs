//! Request input parsing.
//!
//! Turns the raw query string and body into owned `serde_json::Value` trees
//! stored as request extensions, so the sanitization stages and extractors
//! work on one representation:
//!
//! - [`QueryParams`]: always present, built fresh from the query string
//! - [`ParsedBody`]: present for non-empty JSON or URL-encoded form bodies
//!
//! Query strings and form bodies are parsed flat: `a=1&a=2` becomes
//! `{"a": ["1", "2"]}`, and bracket syntax (`a[b]=1`) is kept as a literal key.
//!
//! The raw body is consumed here and replaced by an empty one; handlers only
//! ever see the sanitized extensions.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Query parameters of the current request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(pub Map<String, Value>);

/// How a body was encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

/// Decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody {
    pub value: Value,
    pub kind: BodyKind,
}

/// Limits enforced while reading bodies.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub max_body_size: usize,
    pub max_form_params: usize,
}

/// Middleware that parses query and body into request extensions.
///
/// # Errors
///
/// - 413 when the body exceeds `max_body_size` or a form has more than
///   `max_form_params` parameters
/// - 400 for malformed JSON or form encoding
pub async fn parse_body(
    State(limits): State<BodyLimits>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let query = parse_query(request.uri().query())?;
    request.extensions_mut().insert(query);

    if let Some(kind) = body_kind(&request) {
        if let Some(length) = declared_length(&request)
            && length > limits.max_body_size
        {
            return Err(too_large(limits.max_body_size));
        }

        let body = std::mem::take(request.body_mut());
        let bytes = axum::body::to_bytes(body, limits.max_body_size)
            .await
            .map_err(|_| too_large(limits.max_body_size))?;

        if !bytes.is_empty() {
            let value = match kind {
                BodyKind::Json => parse_json(&bytes)?,
                BodyKind::Form => parse_form(&bytes, limits.max_form_params)?,
            };
            debug!(kind = ?kind, bytes = bytes.len(), "Parsed request body");
            request.extensions_mut().insert(ParsedBody { value, kind });
        }

        *request.body_mut() = Body::empty();
    }

    Ok(next.run(request).await)
}

fn too_large(limit: usize) -> AppError {
    AppError::PayloadTooLarge(format!("Request body exceeds the {limit} byte limit"))
}

fn declared_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Body kind from `Content-Type`, ignoring parameters such as `charset`.
fn body_kind(request: &Request) -> Option<BodyKind> {
    let content_type = request.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json")) {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn parse_json(bytes: &Bytes) -> AppResult<Value> {
    serde_json::from_slice(bytes).map_err(|e| {
        // Position only: the serde message can echo input fragments.
        AppError::BadRequest(format!(
            "Malformed JSON in request body at line {} column {}",
            e.line(),
            e.column()
        ))
    })
}

fn parse_form(bytes: &Bytes, max_params: usize) -> AppResult<Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|_| AppError::BadRequest("Malformed form body".to_string()))?;

    if pairs.len() > max_params {
        return Err(AppError::PayloadTooLarge(format!(
            "Form body has more than {max_params} parameters"
        )));
    }

    Ok(Value::Object(group_pairs(pairs)))
}

/// Parse a query string into a flat map.
pub fn parse_query(query: Option<&str>) -> AppResult<QueryParams> {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Ok(QueryParams::default());
    };

    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|_| AppError::BadRequest("Malformed query string".to_string()))?;

    Ok(QueryParams(group_pairs(pairs)))
}

/// Fold key/value pairs into a map; repeated keys collect into arrays.
fn group_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}
