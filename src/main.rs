use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storefront_gateway::config::LogFormat;
use storefront_gateway::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration decides the log format, so it is loaded before logging
    // starts and its error reported right after.
    let config = Config::from_env();

    let (log_level, log_format) = match &config {
        Ok(config) => (config.log_level.clone(), config.log_format),
        Err(_) => ("info".to_string(), LogFormat::Pretty),
    };
    init_tracing(&log_level, log_format);

    info!(
        "Starting Storefront Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => {
            error!("Configuration error: {e}");
            Err(exitcode::CONFIG)
        }
    };

    match result {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(log_level: &str, log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_thread_ids(true).init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        environment = %config.environment,
        host = %config.host,
        port = %config.port,
        rate_limit_max = config.rate_limit_max,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let addr = config.server_addr();
    let production = config.environment.is_production();
    let env_name = config.env_name.clone();
    let (host, port) = (config.host.clone(), config.port);

    // Build application state and router
    let state = AppState::new(config).map_err(|e| {
        error!("Invalid rate limit configuration: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    if production {
        info!("Server running in production mode on port {port}");
    } else {
        info!("Server is running in {env_name} mode");
        info!("HOST URL: http://{host}:{port}");
        info!("LOCAL URL: http://localhost:{port}");
        info!("API URL: http://localhost:{port}/api/v1/");
    }

    // Peer addresses feed rate limiting when no trusted proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!(
        uptime_secs = state.uptime_seconds(),
        "HTTP server stopped, shutting down background tasks..."
    );
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
