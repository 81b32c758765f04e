use serde::Serialize;
use serde_json::{Map, Value};

/// Liveness response for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Plain acknowledgement carrying only a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Response for the product listing.
#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub message: &'static str,
    /// Sanitized query parameters, echoed back when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
}

/// Response for product search.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub message: &'static str,
    /// Sanitized search body
    pub criteria: Value,
}
