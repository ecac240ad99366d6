//! Metrics emission through the `metrics` facade
//!
//! A [`Telemetry`] value is built at startup and handed to the components
//! that emit. [`LogRecorder`] is the process recorder behind the facade: it
//! keeps counters, gauges and histogram summaries in memory and reports a
//! snapshot through `tracing` on a fixed interval. Without a recorder
//! installed every call is a no-op.

use dashmap::DashMap;
use metrics::{Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Recorder, SharedString, Unit};
use netacct_common::{NetAcctError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Prefixed metric emitter
#[derive(Debug, Clone)]
pub struct Telemetry {
    prefix: String,
}

impl Telemetry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn name(&self, metric: &str) -> String {
        if self.prefix.is_empty() {
            metric.to_string()
        } else {
            format!("{}.{}", self.prefix, metric)
        }
    }

    pub fn gauge(&self, metric: &str, value: f64) {
        metrics::gauge!(self.name(metric), value);
    }

    /// Gauge labelled with a worker lane
    pub fn lane_gauge(&self, metric: &str, lane: usize, value: f64) {
        metrics::gauge!(self.name(metric), value, "lane" => lane.to_string());
    }

    pub fn increment(&self, metric: &str) {
        metrics::counter!(self.name(metric), 1);
    }

    /// Elapsed time in milliseconds
    pub fn timing(&self, metric: &str, elapsed: Duration) {
        metrics::histogram!(self.name(metric), elapsed.as_secs_f64() * 1000.0);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new("netacct")
    }
}

/// Histogram state since the last snapshot
#[derive(Debug, Default)]
struct Summary {
    state: Mutex<SummaryState>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SummaryState {
    count: u64,
    sum: f64,
    max: f64,
}

impl HistogramFn for Summary {
    fn record(&self, value: f64) {
        let mut state = self.state.lock();
        state.count += 1;
        state.sum += value;
        if state.count == 1 || value > state.max {
            state.max = value;
        }
    }
}

/// Value of one metric at snapshot time
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Cumulative since startup
    Counter(u64),
    Gauge(f64),
    /// Observations since the previous snapshot
    Histogram { count: u64, sum: f64, max: f64 },
}

/// One reported metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Default)]
struct Registry {
    counters: DashMap<Key, Arc<AtomicU64>>,
    gauges: DashMap<Key, Arc<AtomicU64>>,
    histograms: DashMap<Key, Arc<Summary>>,
}

/// In-process recorder reporting through the log
#[derive(Debug, Clone, Default)]
pub struct LogRecorder {
    registry: Arc<Registry>,
}

impl LogRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make this the global recorder. Fails when one is already installed.
    pub fn install(&self) -> Result<()> {
        metrics::set_boxed_recorder(Box::new(self.clone()))
            .map_err(|e| NetAcctError::Config(format!("metrics recorder: {e}")))
    }

    /// Current values, sorted by name. Histogram summaries restart afterwards.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let registry = &self.registry;
        let mut samples = Vec::new();

        for entry in registry.counters.iter() {
            let value = MetricValue::Counter(entry.value().load(Ordering::Relaxed));
            samples.push(sample(entry.key(), value));
        }
        for entry in registry.gauges.iter() {
            let value = MetricValue::Gauge(f64::from_bits(entry.value().load(Ordering::Relaxed)));
            samples.push(sample(entry.key(), value));
        }
        for entry in registry.histograms.iter() {
            let state = std::mem::take(&mut *entry.value().state.lock());
            if state.count == 0 {
                continue;
            }
            let value = MetricValue::Histogram {
                count: state.count,
                sum: state.sum,
                max: state.max,
            };
            samples.push(sample(entry.key(), value));
        }

        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }

    /// Log a snapshot every `interval`
    pub fn spawn_reporter(&self, interval: Duration) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                for sample in recorder.snapshot() {
                    info!(
                        target: "netacct::metrics",
                        metric = %sample.name,
                        labels = ?sample.labels,
                        value = ?sample.value,
                        "metric"
                    );
                }
            }
        })
    }
}

fn sample(key: &Key, value: MetricValue) -> MetricSample {
    MetricSample {
        name: key.name().to_string(),
        labels: key
            .labels()
            .map(|label| (label.key().to_string(), label.value().to_string()))
            .collect(),
        value,
    }
}

impl Recorder for LogRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key) -> Counter {
        let handle = self.registry.counters.entry(key.clone()).or_default();
        Counter::from_arc(Arc::clone(&handle))
    }

    fn register_gauge(&self, key: &Key) -> Gauge {
        let handle = self.registry.gauges.entry(key.clone()).or_default();
        Gauge::from_arc(Arc::clone(&handle))
    }

    fn register_histogram(&self, key: &Key) -> Histogram {
        let handle = self.registry.histograms.entry(key.clone()).or_default();
        Histogram::from_arc(Arc::clone(&handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        let telemetry = Telemetry::new("acct");
        assert_eq!(telemetry.name("sink_errors"), "acct.sink_errors");
        assert_eq!(Telemetry::new("").name("sink_errors"), "sink_errors");
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = LogRecorder::new();
        recorder.register_counter(&Key::from_name("dropped")).increment(2);
        recorder.register_counter(&Key::from_name("dropped")).increment(1);
        recorder.register_gauge(&Key::from_name("depth")).set(7.0);
        let latency = recorder.register_histogram(&Key::from_name("latency"));
        latency.record(4.0);
        latency.record(10.0);

        let values: Vec<(String, MetricValue)> = recorder
            .snapshot()
            .into_iter()
            .map(|s| (s.name, s.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("depth".to_string(), MetricValue::Gauge(7.0)),
                ("dropped".to_string(), MetricValue::Counter(3)),
                (
                    "latency".to_string(),
                    MetricValue::Histogram {
                        count: 2,
                        sum: 14.0,
                        max: 10.0
                    }
                ),
            ]
        );

        // Histograms restart per report, counters do not
        let again = recorder.snapshot();
        assert_eq!(again.len(), 2);
        assert!(again.iter().all(|s| s.name != "latency"));
    }

    #[test]
    fn test_telemetry_reaches_installed_recorder() {
        let recorder = LogRecorder::new();
        recorder.install().unwrap();
        assert!(LogRecorder::new().install().is_err());

        let telemetry = Telemetry::new("acct");
        telemetry.increment("sink_errors");
        telemetry.lane_gauge("dispatch.queue_depth", 2, 10.0);
        telemetry.timing("handle", Duration::from_millis(4));

        let samples = recorder.snapshot();
        let find = |name: &str| samples.iter().find(|s| s.name == name).cloned();
        assert_eq!(
            find("acct.sink_errors").map(|s| s.value),
            Some(MetricValue::Counter(1))
        );
        let depth = find("acct.dispatch.queue_depth").unwrap();
        assert_eq!(depth.labels, vec![("lane".to_string(), "2".to_string())]);
        assert_eq!(depth.value, MetricValue::Gauge(10.0));
        assert!(matches!(
            find("acct.handle").map(|s| s.value),
            Some(MetricValue::Histogram { count: 1, .. })
        ));
    }
}
