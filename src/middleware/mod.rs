//! HTTP middleware for the defensive request pipeline.
//!
//! - **Body parsing**: query and body decoded into `serde_json::Value` extensions
//! - **Rate limiting**: fixed window per client identity
//! - **Sanitization**: operator key guard and markup stripping
//! - **Parameter pollution**: repeated parameters collapsed to their last value
//! - **Security headers**: environment-dependent hardening headers
//! - **Error boundary**: panic catching and error envelope rendering
//!
//! # Architecture
//!
//! ```text
//! Request → Headers → CORS → Body → Rate Limit → Keys → Markup → HPP → Handler
//!                             ↓          ↓
//!                          400/413      429
//! ```
//!
//! See [`crate::routes`] for the exact layering.

pub mod body;
pub mod error_boundary;
pub mod hpp;
pub mod ip;
pub mod rate_limit;
pub mod sanitize;
pub mod security_headers;

pub use body::{BodyKind, BodyLimits, ParsedBody, QueryParams, parse_body};
pub use error_boundary::{PanicResponder, render_failures};
pub use hpp::{ParameterPollutionGuard, PollutedParams, guard_parameter_pollution};
pub use ip::{UNKNOWN_CLIENT, client_identity};
pub use rate_limit::{Decision, FixedWindowLimiter, RateLimitError, RateLimitLayer};
pub use sanitize::{guard_operator_keys, strip_markup};
pub use security_headers::{SecurityHeaderPolicy, SecurityHeadersLayer};
