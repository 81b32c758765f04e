//! HTTP parameter pollution guard.
//!
//! A parameter repeated in the query string (`?color=red&color=blue`) arrives
//! as an array. Unless its name is whitelisted, the array collapses to its
//! **last** value so handlers always see a scalar. URL-encoded form bodies get
//! the same treatment; JSON bodies are left alone since arrays are legitimate
//! there.
//!
//! The original arrays are kept in [`PollutedParams`] for handlers that want
//! them.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{Map, Value};
use tracing::debug;

use super::body::{BodyKind, ParsedBody, QueryParams};
use crate::metrics;

/// Multi-valued parameters removed by the guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollutedParams {
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
}

/// Collapses repeated parameters outside the whitelist.
#[derive(Debug, Clone, Default)]
pub struct ParameterPollutionGuard {
    whitelist: Vec<String>,
}

impl ParameterPollutionGuard {
    pub fn new(whitelist: Vec<String>) -> Self {
        Self { whitelist }
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist.iter().any(|allowed| allowed == name)
    }

    /// Collapse arrays in `params` to their last element.
    ///
    /// Returns the original arrays keyed by parameter name.
    pub fn collapse(&self, params: &mut Map<String, Value>) -> Map<String, Value> {
        let mut polluted = Map::new();

        for (name, value) in params.iter_mut() {
            if self.is_whitelisted(name) {
                continue;
            }
            let Value::Array(values) = value else {
                continue;
            };
            let last = values.last().cloned().unwrap_or(Value::Null);
            polluted.insert(name.clone(), std::mem::replace(value, last));
        }

        polluted
    }
}

/// Middleware applying [`ParameterPollutionGuard`] to query and form bodies.
pub async fn guard_parameter_pollution(
    State(guard): State<Arc<ParameterPollutionGuard>>,
    mut request: Request,
    next: Next,
) -> Response {
    let extensions = request.extensions_mut();

    let query = match extensions.get_mut::<QueryParams>() {
        Some(QueryParams(params)) => guard.collapse(params),
        None => Map::new(),
    };

    let body = match extensions.get_mut::<ParsedBody>() {
        Some(ParsedBody {
            value: Value::Object(fields),
            kind: BodyKind::Form,
        }) => guard.collapse(fields),
        _ => Map::new(),
    };

    if !query.is_empty() || !body.is_empty() {
        debug!(
            query_params = query.len(),
            body_params = body.len(),
            "Collapsed repeated parameters"
        );
        metrics::record_polluted_params("query", query.len());
        metrics::record_polluted_params("body", body.len());
        extensions.insert(PollutedParams { query, body });
    }

    next.run(request).await
}
