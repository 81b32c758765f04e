//! Shared application state for the pipeline and handlers.
//!
//! Holds the immutable [`Config`] and the only process-wide mutable state,
//! the rate limiter's per-client windows.
//!
//! # Structured Concurrency
//!
//! Background tasks are managed with `tokio_util::task::TaskTracker` and a
//! `CancellationToken`. Call `shutdown()` after the server has drained to stop
//! them.

use std::sync::Arc;

use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::metrics;
use crate::middleware::rate_limit::{FixedWindowLimiter, RateLimitError};

/// Shared application state.
///
/// Cloned into every request; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Per-client fixed-window counters
    pub limiter: Arc<FixedWindowLimiter>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create state from configuration and start the window eviction task.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if the configured threshold or window is zero.
    pub fn new(config: Config) -> Result<Self, RateLimitError> {
        let limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window,
        )?);

        let state = Self {
            config: Arc::new(config),
            limiter,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_eviction_task();

        Ok(state)
    }

    /// Sweep expired rate-limit windows once per window length.
    ///
    /// Holds only the limiter, not the whole state.
    fn spawn_eviction_task(&self) {
        let limiter = self.limiter.clone();
        let period = limiter.window();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Rate limit eviction task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_expired(Instant::now());
                        let tracked = limiter.tracked_clients();
                        metrics::set_tracked_clients(tracked);
                        trace!(evicted, tracked, "Evicted expired rate limit windows");
                    }
                }
            }

            debug!("Rate limit eviction task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
