//! Internal metrics.
use std::{
    fmt::{self, Write as _},
    sync::{atomic::Ordering, Arc},
};

use admission_core::packetizer::MetricsSource;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};

struct State {
    registry: Registry<Key, AtomicStorage>,
    metrics_prefix: String,
}

/// The store behind the internal metrics recorder.
///
/// Every counter, gauge, and histogram registered through the recorder lives here. The registry is a [`MetricsSource`]
/// so it can be handed straight to a packetizer:
///
/// - counters report their running total
/// - gauges report their current value
/// - histograms report `count` and `sum` of the samples recorded since the last visit, plus `min` and `max` when there
///   was at least one sample
///
/// Series are named `name,label=value,...`, with histogram fields appended after a space (`name count`).
#[derive(Clone)]
pub struct MetricsRegistry {
    state: Arc<State>,
}

impl MetricsRegistry {
    /// Creates a new, empty `MetricsRegistry`.
    ///
    /// When `metrics_prefix` is not empty, it is prepended to every metric name, followed by a period.
    pub fn new<S: Into<String>>(metrics_prefix: S) -> Self {
        Self {
            state: Arc::new(State {
                registry: Registry::new(AtomicStorage),
                metrics_prefix: metrics_prefix.into(),
            }),
        }
    }

    /// Returns a recorder that registers metrics in this registry.
    pub fn recorder(&self) -> MetricsRecorder {
        MetricsRecorder {
            state: Arc::clone(&self.state),
        }
    }
}

impl MetricsSource for MetricsRegistry {
    fn for_each(&self, f: &mut dyn FnMut(&str, f64)) {
        let registry = &self.state.registry;
        let mut name = String::new();

        registry.visit_counters(|key, counter| {
            series_name(&mut name, key, None);
            f(&name, counter.load(Ordering::Relaxed) as f64);
        });

        registry.visit_gauges(|key, gauge| {
            series_name(&mut name, key, None);
            f(&name, f64::from_bits(gauge.load(Ordering::Relaxed)));
        });

        registry.visit_histograms(|key, histogram| {
            let mut summary = Summary::default();
            histogram.clear_with(|samples| summary.extend(samples));

            series_name(&mut name, key, Some("count"));
            f(&name, summary.count as f64);
            series_name(&mut name, key, Some("sum"));
            f(&name, summary.sum);

            if summary.count > 0 {
                series_name(&mut name, key, Some("min"));
                f(&name, summary.min);
                series_name(&mut name, key, Some("max"));
                f(&name, summary.max);
            }
        });
    }
}

struct Summary {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Summary {
    fn extend(&mut self, samples: &[f64]) {
        for &sample in samples {
            self.count += 1;
            self.sum += sample;
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
    }
}

fn series_name(buf: &mut String, key: &Key, field: Option<&str>) {
    buf.clear();
    buf.push_str(key.name());
    for label in key.labels() {
        let _ = write!(buf, ",{}={}", label.key(), label.value());
    }
    if let Some(field) = field {
        buf.push(' ');
        buf.push_str(field);
    }
}

/// A [`Recorder`] backed by a [`MetricsRegistry`].
pub struct MetricsRecorder {
    state: Arc<State>,
}

impl MetricsRecorder {
    fn prefix_key(&self, key: &Key) -> Key {
        if self.state.metrics_prefix.is_empty() {
            return key.clone();
        }
        Key::from_parts(format!("{}.{}", self.state.metrics_prefix, key.name()), key.labels())
    }
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("metrics_prefix", &self.state.metrics_prefix)
            .finish_non_exhaustive()
    }
}

impl Recorder for MetricsRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let prefixed_key = self.prefix_key(key);
        self.state
            .registry
            .get_or_create_counter(&prefixed_key, |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        let prefixed_key = self.prefix_key(key);
        self.state
            .registry
            .get_or_create_gauge(&prefixed_key, |g| g.clone().into())
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        let prefixed_key = self.prefix_key(key);
        self.state
            .registry
            .get_or_create_histogram(&prefixed_key, |h| h.clone().into())
    }
}

/// Initializes the metrics subsystem for `metrics`.
///
/// The given prefix is used to namespace all metrics that are emitted by the application, and is prepended to all
/// metrics, followed by a period (e.g. `<prefix>.<metric name>`). The returned registry can be used to read the
/// current values.
///
/// ## Errors
///
/// If the metrics subsystem was already initialized, an error will be returned.
pub fn initialize_metrics<S: Into<String>>(
    metrics_prefix: S,
) -> Result<MetricsRegistry, Box<dyn std::error::Error + Send + Sync>> {
    let registry = MetricsRegistry::new(metrics_prefix);
    metrics::set_global_recorder(registry.recorder())?;
    Ok(registry)
}
