//! Prometheus bootstrap.

use opentelemetry_sdk::metrics::MeterProvider as SdkMeterProvider;
use prometheus::Registry;

use crate::config::Options;
use crate::error::Result;
use crate::instrument_metrics;
use kv_client::UniversalClient;

/// Build a meter provider whose metrics are collected into `registry`.
///
/// Instruments stay registered until the provider is shut down.
pub fn new_prometheus_meter_provider(registry: &Registry) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;
    Ok(SdkMeterProvider::builder().with_reader(exporter).build())
}

/// Instrument `client` against the default Prometheus registry.
///
/// A meter or meter provider already set on `options` takes precedence over
/// the one built here. The returned provider owns the exporter; keep it
/// alive for as long as metrics should be collected.
///
/// The exporter can be registered with the default registry once per
/// process; later calls fail with [`Error::Metrics`](crate::Error::Metrics).
pub fn export_metrics_for_prometheus(
    client: impl Into<UniversalClient>,
    options: Options,
) -> Result<SdkMeterProvider> {
    let provider = new_prometheus_meter_provider(prometheus::default_registry())?;
    instrument_metrics(client, options.or_meter_provider(&provider))?;
    Ok(provider)
}
