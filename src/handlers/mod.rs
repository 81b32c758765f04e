mod health;
mod products;

use axum::http::{Method, Uri};

use crate::error::AppError;

pub use health::{api_status, health_check};
pub use products::{get_product, list_products, search_products};

/// Fallback for unmatched routes.
pub async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {method} {} not found", uri.path()))
}
