//! Application configuration loaded from environment variables.
//!
//! # Environment Mode
//!
//! `NODE_ENV=production` selects the production posture; any other value (or
//! none) selects development. The mode is resolved exactly once, stored in the
//! immutable [`Config`], and shared by reference with every component. It
//! controls:
//!
//! - CSP and HSTS presence (production only)
//! - the CORS allow-list (`CLIENT_URL` vs. fixed localhost origins)
//! - the rate-limit threshold (100 vs. 10000 requests per window)
//! - error verbosity (generic message vs. message + stack)
//!
//! # Required Variables
//!
//! - `PORT` and `HOST` must be set outside production. Their absence is a
//!   fatal startup error.
//!
//! # Optional Variables
//!
//! - `CLIENT_URL`: Comma-separated production CORS origins
//! - `RATE_LIMIT_MAX`: Overrides the per-window request threshold
//! - `MAX_REQUEST_BODY_SIZE`: Body size limit in bytes (default: 10MB)
//! - `HPP_WHITELIST`: Parameters allowed to repeat (default: `sort,fields`)
//! - `METRICS_PORT`: Prometheus listener port (default: 0 = disabled)
//! - `LOG_FORMAT`: `json` or `pretty` (default: json in production)

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Length of one fixed rate-limit window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Requests allowed per window in production.
pub const PRODUCTION_RATE_LIMIT: u32 = 100;

/// Requests allowed per window in development (effectively unlimited).
pub const DEVELOPMENT_RATE_LIMIT: u32 = 10_000;

/// Origins allowed by CORS outside production.
pub const DEVELOPMENT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:3001"];

/// Process-wide security posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Resolve the mode from a `NODE_ENV` value. Only `production` is special.
    pub fn from_node_env(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Default per-window request threshold for this mode.
    pub fn default_rate_limit(self) -> u32 {
        match self {
            Self::Production => PRODUCTION_RATE_LIMIT,
            Self::Development => DEVELOPMENT_RATE_LIMIT,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => f.write_str("production"),
            Self::Development => f.write_str("development"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration.
///
/// Built once at startup via [`Config::from_env`] and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Security posture for the lifetime of the process
    pub environment: Environment,

    /// Raw `NODE_ENV` value, used only for startup logging
    pub env_name: String,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Production CORS allow-list parsed from `CLIENT_URL`.
    /// Empty means no cross-origin request is allowed.
    pub client_origins: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests allowed per client per window
    pub rate_limit_max: u32,

    /// Fixed window length
    pub rate_limit_window: Duration,

    // =========================================================================
    // Input Limits Configuration
    // =========================================================================
    /// Maximum request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    /// Maximum number of URL-encoded form parameters (default: 1000)
    pub max_form_params: usize,

    /// Parameters that may legitimately repeat (default: sort, fields)
    pub hpp_whitelist: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` when a required variable is missing
    /// outside production or a value fails to parse.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let env_name = var("NODE_ENV").unwrap_or_else(|| "development".to_string());
        let environment = Environment::from_node_env(Some(&env_name));
        let production = environment.is_production();

        let port = match var("PORT") {
            Some(raw) => parse_value("PORT", &raw)?,
            None if production => 3000,
            None => {
                return Err(AppError::ConfigError(
                    "PORT is not defined in environment variables".to_string(),
                ));
            }
        };

        let host = match var("HOST") {
            Some(host) => host,
            None if production => "0.0.0.0".to_string(),
            None => {
                return Err(AppError::ConfigError(
                    "HOST is not defined in environment variables".to_string(),
                ));
            }
        };

        let defaults = Self::for_environment(environment);

        let config = Self {
            environment,
            env_name,
            host,
            port,
            client_origins: var("CLIENT_URL")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            rate_limit_max: parse_or("RATE_LIMIT_MAX", var("RATE_LIMIT_MAX"), defaults.rate_limit_max)?,
            rate_limit_window: defaults.rate_limit_window,
            max_request_body_size: parse_or(
                "MAX_REQUEST_BODY_SIZE",
                var("MAX_REQUEST_BODY_SIZE"),
                defaults.max_request_body_size,
            )?,
            max_form_params: defaults.max_form_params,
            hpp_whitelist: var("HPP_WHITELIST")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.hpp_whitelist),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                Some("pretty") => LogFormat::Pretty,
                Some(other) => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid LOG_FORMAT: {other} (expected json or pretty)"
                    )));
                }
                None => defaults.log_format,
            },
            metrics_port: parse_or("METRICS_PORT", var("METRICS_PORT"), defaults.metrics_port)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Defaults for a given mode. Host and port are placeholders here since
    /// `from_lookup` requires them outside production.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            env_name: environment.to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            client_origins: Vec::new(),
            rate_limit_max: environment.default_rate_limit(),
            rate_limit_window: RATE_LIMIT_WINDOW,
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            max_form_params: 1000,
            hpp_whitelist: vec!["sort".to_string(), "fields".to_string()],
            log_level: "info".to_string(),
            log_format: if environment.is_production() {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            metrics_port: 0,
        }
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_max == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_MAX must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if let Some(bad) = self
            .client_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(AppError::ConfigError(format!(
                "CLIENT_URL entry must be an http(s) origin: {bad}"
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origins CORS will accept in the current mode.
    pub fn cors_origins(&self) -> Vec<String> {
        if self.environment.is_production() {
            self.client_origins.clone()
        } else {
            DEVELOPMENT_ORIGINS.iter().map(|o| (*o).to_string()).collect()
        }
    }

    /// Whether client identity may be read from proxy headers.
    ///
    /// Production runs behind exactly one reverse proxy.
    pub fn trust_proxy(&self) -> bool {
        self.environment.is_production()
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }
}

/// Development defaults. Production deployments use `Config::from_env()`.
impl Default for Config {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

fn parse_value<T>(name: &str, raw: &str) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}")))
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
