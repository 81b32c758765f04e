mod api;

pub use api::{HealthResponse, MessageResponse, ProductsResponse, SearchResponse};
