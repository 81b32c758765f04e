//! Prometheus metrics for the defensive pipeline.
//!
//! Exposed on a dedicated listener when `METRICS_PORT` is non-zero. Recording
//! functions are no-ops until [`init_metrics`] installs the exporter, so the
//! middleware calls them unconditionally.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_rate_limited_total` - Requests rejected with 429
//! - `gateway_operator_keys_rewritten_total` - Payload keys renamed by the operator guard (label: source)
//! - `gateway_polluted_params_total` - Repeated parameters collapsed (label: source)
//! - `gateway_handler_failures_total` - Error envelopes rendered (label: status)
//! - `gateway_handler_panics_total` - Panics caught by the error boundary
//!
//! ## Gauges
//! - `gateway_rate_limit_tracked_clients` - Clients with a live rate-limit window

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
    pub const OPERATOR_KEYS_REWRITTEN_TOTAL: &str = "gateway_operator_keys_rewritten_total";
    pub const POLLUTED_PARAMS_TOTAL: &str = "gateway_polluted_params_total";
    pub const HANDLER_FAILURES_TOTAL: &str = "gateway_handler_failures_total";
    pub const HANDLER_PANICS_TOTAL: &str = "gateway_handler_panics_total";
    pub const RATE_LIMIT_TRACKED_CLIENTS: &str = "gateway_rate_limit_tracked_clients";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Returns a message when the recorder is already installed or the listener
/// cannot bind.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::OPERATOR_KEYS_REWRITTEN_TOTAL,
        "Total number of payload keys rewritten to neutralize query operators"
    );
    describe_counter!(
        names::POLLUTED_PARAMS_TOTAL,
        "Total number of repeated parameters collapsed to a single value"
    );
    describe_counter!(
        names::HANDLER_FAILURES_TOTAL,
        "Total number of error envelopes rendered"
    );
    describe_counter!(
        names::HANDLER_PANICS_TOTAL,
        "Total number of handler panics caught"
    );

    describe_gauge!(
        names::RATE_LIMIT_TRACKED_CLIENTS,
        "Number of clients with an active rate-limit window"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Record rewritten keys. `source` is `body`, `query` or `path`.
pub fn record_operator_keys_rewritten(source: &'static str, count: usize) {
    counter!(names::OPERATOR_KEYS_REWRITTEN_TOTAL, "source" => source).increment(count as u64);
}

/// Record collapsed parameters. `source` is `body` or `query`.
pub fn record_polluted_params(source: &'static str, count: usize) {
    counter!(names::POLLUTED_PARAMS_TOTAL, "source" => source).increment(count as u64);
}

pub fn record_handler_failure(status: u16) {
    counter!(names::HANDLER_FAILURES_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_handler_panic() {
    counter!(names::HANDLER_PANICS_TOTAL).increment(1);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_tracked_clients(count: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_CLIENTS).set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
        with_local_recorder,
    };

    use super::*;

    /// Keeps every counter and gauge in memory, keyed as `name{label=value}`.
    #[derive(Default)]
    struct InMemoryRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
        gauges: Mutex<HashMap<String, Arc<AtomicU64>>>,
    }

    impl InMemoryRecorder {
        fn counter(&self, key: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(key)
                .map_or(0, |value| value.load(Ordering::Relaxed))
        }

        fn gauge(&self, key: &str) -> Option<f64> {
            self.gauges
                .lock()
                .unwrap()
                .get(key)
                .map(|value| f64::from_bits(value.load(Ordering::Relaxed)))
        }
    }

    fn render(key: &Key) -> String {
        let labels: Vec<String> = key
            .labels()
            .map(|label| format!("{}={}", label.key(), label.value()))
            .collect();
        if labels.is_empty() {
            key.name().to_string()
        } else {
            format!("{}{{{}}}", key.name(), labels.join(","))
        }
    }

    impl Recorder for InMemoryRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let mut counters = self.counters.lock().unwrap();
            Counter::from_arc(counters.entry(render(key)).or_default().clone())
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            let mut gauges = self.gauges.lock().unwrap();
            Gauge::from_arc(gauges.entry(render(key)).or_default().clone())
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_counters_accumulate_with_labels() {
        let recorder = InMemoryRecorder::default();

        with_local_recorder(&recorder, || {
            record_rate_limited();
            record_rate_limited();
            record_operator_keys_rewritten("body", 2);
            record_operator_keys_rewritten("path", 1);
            record_polluted_params("query", 3);
            record_handler_failure(500);
            record_handler_failure(404);
            record_handler_failure(500);
            record_handler_panic();
        });

        assert_eq!(recorder.counter(names::RATE_LIMITED_TOTAL), 2);
        assert_eq!(
            recorder.counter("gateway_operator_keys_rewritten_total{source=body}"),
            2
        );
        assert_eq!(
            recorder.counter("gateway_operator_keys_rewritten_total{source=path}"),
            1
        );
        assert_eq!(
            recorder.counter("gateway_polluted_params_total{source=query}"),
            3
        );
        assert_eq!(
            recorder.counter("gateway_handler_failures_total{status=500}"),
            2
        );
        assert_eq!(
            recorder.counter("gateway_handler_failures_total{status=404}"),
            1
        );
        assert_eq!(recorder.counter(names::HANDLER_PANICS_TOTAL), 1);
    }

    #[test]
    fn test_tracked_clients_gauge_overwrites() {
        let recorder = InMemoryRecorder::default();

        with_local_recorder(&recorder, || {
            set_tracked_clients(42);
            set_tracked_clients(7);
        });

        assert_eq!(recorder.gauge(names::RATE_LIMIT_TRACKED_CLIENTS), Some(7.0));
    }
}
