//! Shared helpers: an isolated Prometheus registry per test and a tracing
//! layer that counts the crate's error and warn events.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kv_client::{Client, ClientConfig, MemoryDialer};
use kv_metrics::Options;
use opentelemetry_sdk::metrics::MeterProvider as SdkMeterProvider;
use prometheus::Registry;
use prometheus::proto::{Metric, MetricFamily};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

// ── Metrics ─────────────────────────────────────────────────────────────

pub struct Harness {
    pub registry: Registry,
    pub provider: SdkMeterProvider,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Registry::new();
        let provider = kv_metrics::new_prometheus_meter_provider(&registry).unwrap();
        Self { registry, provider }
    }

    pub fn options(&self) -> Options {
        Options::new().with_meter_provider(&self.provider)
    }

    /// Series of the instrument `name` (OpenTelemetry spelling) whose labels
    /// include every pair in `labels`.
    pub fn series(&self, name: &str, labels: &[(&str, &str)]) -> Vec<Metric> {
        let base = prom_name(name);
        self.registry
            .gather()
            .into_iter()
            .filter(|f| matches_family(f, &base))
            .flat_map(|f| f.get_metric().to_vec())
            .filter(|m| has_labels(m, labels))
            .collect()
    }

    /// Sum of gauge values across matching series, or `None` if there are none.
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<i64> {
        let series = self.series(name, labels);
        if series.is_empty() {
            return None;
        }
        Some(series.iter().map(|m| m.get_gauge().get_value() as i64).sum())
    }

    /// Total histogram observations across matching series.
    pub fn observations(&self, labels: &[(&str, &str)]) -> u64 {
        self.series(kv_metrics::USE_TIME, labels)
            .iter()
            .map(|m| m.get_histogram().get_sample_count())
            .sum()
    }

    /// Distinct values of `label` on instrument `name`.
    pub fn label_values(&self, name: &str, label: &str) -> BTreeSet<String> {
        self.series(name, &[])
            .iter()
            .flat_map(|m| m.get_label().to_vec())
            .filter(|l| l.get_name() == label)
            .map(|l| l.get_value().to_string())
            .collect()
    }
}

fn prom_name(name: &str) -> String {
    name.replace('.', "_")
}

fn matches_family(family: &MetricFamily, base: &str) -> bool {
    let name = family.get_name();
    name == base || name.strip_prefix(base).is_some_and(|rest| rest.starts_with('_'))
}

fn has_labels(metric: &Metric, labels: &[(&str, &str)]) -> bool {
    labels.iter().all(|(k, v)| {
        let key = prom_name(k);
        metric
            .get_label()
            .iter()
            .any(|l| l.get_name() == key && l.get_value() == *v)
    })
}

// ── Clients ─────────────────────────────────────────────────────────────

pub fn memory_client(addr: &str) -> Client {
    Client::with_dialer(ClientConfig::new(addr), Arc::new(MemoryDialer::new()))
}

pub fn slow_client(addr: &str, latency: Duration, config: ClientConfig) -> Client {
    Client::with_dialer(
        ClientConfig {
            addr: addr.to_string(),
            ..config
        },
        Arc::new(MemoryDialer::with_latency(latency)),
    )
}

// ── Logs ────────────────────────────────────────────────────────────────

/// Counts error and warn events emitted by kv_metrics.
#[derive(Clone, Default)]
pub struct LogCounter {
    errors: Arc<AtomicUsize>,
    warns: Arc<AtomicUsize>,
}

impl LogCounter {
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn warns(&self) -> usize {
        self.warns.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for LogCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.target().starts_with("kv_metrics") {
            return;
        }
        match *meta.level() {
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            Level::WARN => {
                self.warns.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

/// Route this thread's events to a fresh counter until the guard drops.
pub fn capture_logs() -> (LogCounter, tracing::subscriber::DefaultGuard) {
    let counter = LogCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (counter, guard)
}
