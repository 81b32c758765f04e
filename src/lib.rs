//! # Storefront Gateway
//!
//! Defensive HTTP front for the storefront product API, built on Axum. Every
//! request passes a fixed middleware pipeline before reaching a handler:
//!
//! - **Hardening**: security headers (CSP and HSTS in production) and CORS
//! - **Abuse control**: fixed-window rate limiting per client
//! - **Input sanitization**: NoSQL operator keys rewritten, executable markup
//!   stripped, repeated parameters collapsed
//! - **Error boundary**: failures and panics rendered as a uniform JSON
//!   envelope, verbose only outside production
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compression → Envelope → Headers → CORS                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Body → Rate Limit → Key Guard → Markup → HPP → Panics      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, products)                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use storefront_gateway::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let addr = config.server_addr();
//!     let state = AppState::new(config)?;
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! NODE_ENV=production CLIENT_URL=https://shop.example.com cargo run
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod sanitize;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::{Config, Environment};
pub use error::{AppError, AppResult};
pub use extract::{SanitizedBody, SanitizedPath, SanitizedQuery};
pub use routes::{build_router, with_pipeline};
pub use sanitize::sanitize;
pub use state::AppState;
