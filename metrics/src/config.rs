use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider, MetricsError};
use opentelemetry::{KeyValue, global};

use crate::error::{Error, Result};
use crate::settings::MetricsSettings;

/// Instrumentation scope name reported with every instrument.
pub const INSTRUMENTATION_NAME: &str = "kv-metrics";

/// Default slow-operation threshold.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(1);

/// Label carrying the pool identity.
pub(crate) const POOL_NAME_KEY: &str = "pool.name";

type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// Caller-supplied instrumentation options.
///
/// ```
/// use std::time::Duration;
/// use kv_metrics::Options;
/// use opentelemetry::KeyValue;
///
/// let options = Options::new()
///     .with_slow_threshold(Duration::from_millis(250))
///     .with_attributes([KeyValue::new("service.name", "api")]);
/// ```
#[derive(Clone, Default)]
pub struct Options {
    meter: Option<Meter>,
    provider_meter: Option<Meter>,
    attrs: Vec<KeyValue>,
    pool_name: Option<String>,
    slow_threshold: Option<Duration>,
    error_handler: Option<ErrorHandler>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from file settings.
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        let attrs = settings
            .attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()));
        let mut options = Self::new()
            .with_slow_threshold(settings.slow_threshold())
            .with_attributes(attrs);
        if let Some(name) = &settings.pool_name {
            options = options.with_pool_name(name.clone());
        }
        options
    }

    /// Obtain the meter from `provider`. An explicit
    /// [`with_meter`](Self::with_meter) takes precedence.
    pub fn with_meter_provider<P: MeterProvider>(mut self, provider: &P) -> Self {
        self.provider_meter = Some(scoped_meter(provider));
        self
    }

    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Labels added ahead of `pool.name` on every series.
    pub fn with_attributes<I>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attrs.extend(attrs);
        self
    }

    /// Pool identity for a single-node client. Rings and clusters always use
    /// each node's address.
    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = Some(name.into());
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Receives per-node setup failures for rings and clusters. Defaults to
    /// the OpenTelemetry global error handler.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub(crate) fn pool_name(&self) -> Option<&str> {
        self.pool_name.as_deref()
    }

    /// Use `provider` unless the caller already chose a meter.
    pub(crate) fn or_meter_provider<P: MeterProvider>(mut self, provider: &P) -> Self {
        if self.meter.is_none() && self.provider_meter.is_none() {
            self.provider_meter = Some(scoped_meter(provider));
        }
        self
    }

    pub(crate) fn build(&self) -> Config {
        let meter = self
            .meter
            .clone()
            .or_else(|| self.provider_meter.clone())
            .unwrap_or_else(|| scoped_meter(&global::meter_provider()));
        Config {
            meter,
            attrs: self.attrs.clone(),
            slow_threshold: self.slow_threshold.unwrap_or(DEFAULT_SLOW_THRESHOLD),
            error_handler: self
                .error_handler
                .clone()
                .unwrap_or_else(|| Arc::new(otel_error_handler)),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("attrs", &self.attrs)
            .field("pool_name", &self.pool_name)
            .field("slow_threshold", &self.slow_threshold)
            .field("meter", &(self.meter.is_some() || self.provider_meter.is_some()))
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

fn scoped_meter<P: MeterProvider>(provider: &P) -> Meter {
    provider.versioned_meter(
        INSTRUMENTATION_NAME,
        Some(env!("CARGO_PKG_VERSION")),
        None::<&'static str>,
        None,
    )
}

fn otel_error_handler(err: Error) {
    match err {
        Error::Metrics(e) => global::handle_error(e),
        other => global::handle_error(MetricsError::Other(other.to_string())),
    }
}

/// Resolved configuration. Cloned per node; each clone owns its labels.
#[derive(Clone)]
pub(crate) struct Config {
    pub meter: Meter,
    pub attrs: Vec<KeyValue>,
    pub slow_threshold: Duration,
    pub error_handler: ErrorHandler,
}

impl Config {
    /// A copy labeled with `pool_name`.
    pub fn for_node(&self, pool_name: &str) -> Result<Config> {
        if pool_name.is_empty() {
            return Err(Error::MissingPoolName);
        }
        let mut config = self.clone();
        config
            .attrs
            .push(KeyValue::new(POOL_NAME_KEY, pool_name.to_string()));
        Ok(config)
    }

    pub fn report(&self, err: Error) {
        (self.error_handler)(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn defaults() {
        let config = Options::new().build();
        assert_eq!(config.slow_threshold, DEFAULT_SLOW_THRESHOLD);
        assert!(config.attrs.is_empty());
    }

    #[test]
    fn node_clones_are_independent() {
        let base = Options::new()
            .with_attributes([KeyValue::new("env", "test")])
            .build();
        let a = base.for_node("10.0.0.1:6379").unwrap();
        let b = base.for_node("10.0.0.2:6379").unwrap();

        assert_eq!(base.attrs.len(), 1);
        assert_eq!(a.attrs.len(), 2);
        assert_eq!(a.attrs[1].value.as_str(), "10.0.0.1:6379");
        assert_eq!(b.attrs[1].value.as_str(), "10.0.0.2:6379");
        assert_eq!(a.attrs[0].key.as_str(), "env");
    }

    #[test]
    fn empty_pool_name() {
        let config = Options::new().build();
        assert!(matches!(config.for_node(""), Err(Error::MissingPoolName)));
    }

    #[test]
    fn error_handler_receives_errors() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let config = Options::new()
            .with_error_handler(move |e| sink.lock().unwrap().push(e.to_string()))
            .build();
        config.report(Error::MissingPoolName);
        assert_eq!(*captured.lock().unwrap(), ["pool name is required"]);
    }

    #[test]
    fn from_settings() {
        let settings = MetricsSettings::from_toml(
            r#"
            pool_name = "cache"
            slow_threshold_ms = 5
            [attributes]
            region = "eu"
            "#,
        )
        .unwrap();
        let options = Options::from_settings(&settings);
        assert_eq!(options.pool_name(), Some("cache"));
        let config = options.build();
        assert_eq!(config.slow_threshold, Duration::from_millis(5));
        assert_eq!(config.attrs[0].key.as_str(), "region");
    }
}
