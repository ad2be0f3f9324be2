//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Prometheus-backed metrics registry (counters and timers).
pub mod metrics;

pub use metrics::{PrometheusMetrics, MetricsError, MetricsRecorder, Tags, TimerSnapshot};
pub use tracing::init_with_default;
