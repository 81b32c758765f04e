//! Product endpoints.
//!
//! Stand-ins for the catalog service: they acknowledge the request and echo
//! the sanitized inputs they would forward.
//!
//! - `GET /api/v1/products` - listing with filtering and sorting via query
//! - `GET /api/v1/products/data` - single product data
//! - `POST /api/v1/products/search` - search by body criteria

use axum::Json;
use tracing::{debug, instrument};

use crate::error::AppResult;
use crate::extract::{SanitizedBody, SanitizedQuery};
use crate::models::{MessageResponse, ProductsResponse, SearchResponse};

/// List products. Echoes the query when one was given.
#[instrument(skip_all)]
pub async fn list_products(SanitizedQuery(query): SanitizedQuery) -> AppResult<Json<ProductsResponse>> {
    debug!(params = query.len(), "Listing products");

    Ok(Json(ProductsResponse {
        message: "Products retrieved successfully",
        query: (!query.is_empty()).then_some(query),
    }))
}

/// Retrieve product data.
#[instrument]
pub async fn get_product() -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Product retrieved successfully",
    }))
}

/// Search products by the criteria in the body.
#[instrument(skip_all)]
pub async fn search_products(SanitizedBody(criteria): SanitizedBody) -> AppResult<Json<SearchResponse>> {
    debug!("Searching products");

    Ok(Json(SearchResponse {
        message: "Search completed successfully",
        criteria,
    }))
}
