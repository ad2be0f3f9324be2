//! Metrics recording on a Prometheus registry.
//!
//! Callers record through the [`MetricsRecorder`] trait and must treat every
//! error as non-fatal: instrumentation never changes the outcome of the code
//! being measured.
//!
//! Families are registered on first use: a counter name becomes an
//! `IntCounterVec`, a timer name a `HistogramVec` in seconds, both labelled
//! by the tag keys of that first observation. Later observations must use
//! the same keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("invalid metric name '{0}'")]
    InvalidName(String),

    #[error("metric '{name}' is labelled {expected:?}, got {actual:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("prometheus: {0}")]
    Prometheus(String),

    #[error("metrics registry lock poisoned")]
    Poisoned,
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        Self::Prometheus(err.to_string())
    }
}

/// Ordered label set attached to an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label. Empty values are recorded as `UNKNOWN`.
    pub fn with(mut self, key: impl Into<String>, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        let value = if value.is_empty() { "UNKNOWN" } else { value };
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    fn values(&self) -> Vec<&str> {
        self.0.values().map(String::as_str).collect()
    }
}

/// Sink for counters and timers.
pub trait MetricsRecorder: Send + Sync {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), MetricsError>;

    fn record_timer(&self, name: &str, tags: &Tags, elapsed: Duration) -> Result<(), MetricsError>;
}

impl<T: MetricsRecorder + ?Sized> MetricsRecorder for std::sync::Arc<T> {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), MetricsError> {
        (**self).increment_counter(name, tags)
    }

    fn record_timer(&self, name: &str, tags: &Tags, elapsed: Duration) -> Result<(), MetricsError> {
        (**self).record_timer(name, tags, elapsed)
    }
}

/// Count and summed duration of one timer series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
}

struct Family<V> {
    labels: Vec<String>,
    vec: V,
}

/// Prometheus-backed recorder, readable by tests and the `/metrics` endpoint.
pub struct PrometheusMetrics {
    registry: Registry,
    counters: RwLock<HashMap<String, Family<IntCounterVec>>>,
    timers: RwLock<HashMap<String, Family<HistogramVec>>>,
}

impl core::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::with_registry(Registry::new())
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            counters: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current value of a counter series (0 if never incremented).
    pub fn counter(&self, name: &str, tags: &Tags) -> u64 {
        let Ok(counters) = self.counters.read() else {
            return 0;
        };
        counters
            .get(name)
            .filter(|family| family.labels == tags.keys())
            .and_then(|family| family.vec.get_metric_with_label_values(&tags.values()).ok())
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    /// Sum of a counter across all of its label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }

    pub fn timer(&self, name: &str, tags: &Tags) -> Option<TimerSnapshot> {
        let timers = self.timers.read().ok()?;
        let family = timers.get(name).filter(|family| family.labels == tags.keys())?;
        let histogram = family.vec.get_metric_with_label_values(&tags.values()).ok()?;
        let count = histogram.get_sample_count();
        (count > 0).then(|| TimerSnapshot {
            count,
            total: Duration::from_secs_f64(histogram.get_sample_sum()),
        })
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| MetricsError::Prometheus(e.to_string()))
    }

    fn counter_family<'a>(
        families: &'a mut HashMap<String, Family<IntCounterVec>>,
        registry: &Registry,
        name: &str,
        tags: &Tags,
    ) -> Result<&'a IntCounterVec, MetricsError> {
        if !families.contains_key(name) {
            let labels = tags.keys();
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let vec = IntCounterVec::new(Opts::new(name, format!("{name} counter")), &label_refs)?;
            registry.register(Box::new(vec.clone()))?;
            families.insert(name.to_string(), Family { labels, vec });
        }
        let family = families
            .get(name)
            .ok_or_else(|| MetricsError::InvalidName(name.to_string()))?;
        check_labels(name, &family.labels, tags)?;
        Ok(&family.vec)
    }

    fn timer_family<'a>(
        families: &'a mut HashMap<String, Family<HistogramVec>>,
        registry: &Registry,
        name: &str,
        tags: &Tags,
    ) -> Result<&'a HistogramVec, MetricsError> {
        if !families.contains_key(name) {
            let labels = tags.keys();
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let vec = HistogramVec::new(
                HistogramOpts::new(name, format!("{name} duration in seconds")),
                &label_refs,
            )?;
            registry.register(Box::new(vec.clone()))?;
            families.insert(name.to_string(), Family { labels, vec });
        }
        let family = families
            .get(name)
            .ok_or_else(|| MetricsError::InvalidName(name.to_string()))?;
        check_labels(name, &family.labels, tags)?;
        Ok(&family.vec)
    }
}

fn check_labels(name: &str, expected: &[String], tags: &Tags) -> Result<(), MetricsError> {
    let actual = tags.keys();
    if actual == expected {
        Ok(())
    } else {
        Err(MetricsError::LabelMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual,
        })
    }
}

fn validate_name(name: &str) -> Result<(), MetricsError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MetricsError::InvalidName(name.to_string()))
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), MetricsError> {
        validate_name(name)?;
        let mut families = self.counters.write().map_err(|_| MetricsError::Poisoned)?;
        let vec = Self::counter_family(&mut families, &self.registry, name, tags)?;
        vec.get_metric_with_label_values(&tags.values())?.inc();
        Ok(())
    }

    fn record_timer(&self, name: &str, tags: &Tags, elapsed: Duration) -> Result<(), MetricsError> {
        validate_name(name)?;
        let mut families = self.timers.write().map_err(|_| MetricsError::Poisoned)?;
        let vec = Self::timer_family(&mut families, &self.registry, name, tags)?;
        vec.get_metric_with_label_values(&tags.values())?
            .observe(elapsed.as_secs_f64());
        Ok(())
    }
}
