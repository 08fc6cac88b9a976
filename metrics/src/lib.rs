//! OpenTelemetry metrics for [`kv_client`].
//!
//! [`instrument_metrics`] attaches two things to every single-node client
//! behind a [`UniversalClient`]:
//!
//! - a pool-stats callback reporting `db.client.connections.idle.max`,
//!   `.idle.min`, `.max`, `.usage` (by `state`) and `.timeouts`
//! - a [`MetricsHook`] recording `db.client.connections.use_time` (ms) per
//!   command and pipeline, labeled with `type` and `status`
//!
//! Each node is labeled with `pool.name`: the explicit pool name for a
//! single client, otherwise the node address.
//!
//! # Example
//!
//! ```no_run
//! use kv_client::{Client, ClientConfig};
//! use kv_metrics::Options;
//!
//! # fn example() -> Result<(), kv_metrics::Error> {
//! let client = Client::new(ClientConfig::new("127.0.0.1:6379"));
//! let provider = kv_metrics::export_metrics_for_prometheus(client.clone(), Options::new())?;
//! # drop(provider);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod exporter;
mod hook;
mod node;
mod pool;
mod settings;

pub use config::{DEFAULT_SLOW_THRESHOLD, INSTRUMENTATION_NAME, Options};
pub use error::{Error, Result};
pub use exporter::{export_metrics_for_prometheus, new_prometheus_meter_provider};
pub use hook::{HOOK_NAME, MetricsHook, USE_TIME};
pub use node::Node;
pub use pool::{IDLE_MAX, IDLE_MIN, MAX, TIMEOUTS, USAGE};
pub use settings::MetricsSettings;

use std::collections::HashSet;
use std::sync::Arc;

use kv_client::{Client, UniversalClient};

use config::Config;

/// Attach pool and command metrics to every node of `client`.
///
/// For a single client, setup errors are returned. For rings and clusters,
/// a failing node is logged and passed to the error handler, and the
/// remaining nodes are still instrumented.
pub fn instrument_metrics(client: impl Into<UniversalClient>, options: Options) -> Result<()> {
    let client = client.into();
    let base = options.build();

    match &client {
        UniversalClient::Single(node) => {
            let pool_name = options.pool_name().unwrap_or_else(|| node.addr());
            let config = base.for_node(pool_name)?;
            instrument(node, &config)
        }
        UniversalClient::Ring(ring) => {
            fan_out(ring.shards(), &base);
            Ok(())
        }
        UniversalClient::Cluster(cluster) => {
            fan_out(cluster.masters(), &base);
            Ok(())
        }
        other => Err(Error::Unsupported(other.kind())),
    }
}

/// Instrument one node with `options`, using the explicit pool name or the
/// node address as its identity.
pub fn instrument_node<N: Node>(node: &N, options: &Options) -> Result<()> {
    let pool_name = options.pool_name().unwrap_or_else(|| node.addr());
    let config = options.build().for_node(pool_name)?;
    instrument(node, &config)
}

/// A node that already carries [`MetricsHook`] is left alone. The hook is
/// built before the pool callback is registered so a failure leaves the
/// node untouched.
fn instrument<N: Node>(node: &N, config: &Config) -> Result<()> {
    if node.has_hook(HOOK_NAME) {
        tracing::debug!(addr = node.addr(), "already instrumented");
        return Ok(());
    }
    let hook = MetricsHook::new(config)?;
    pool::report_pool_stats(node, config)?;
    node.add_hook(Arc::new(hook));
    Ok(())
}

/// Instrument each node under its own address. The first node with a given
/// address wins; nodes that already carry the hook are left alone.
fn fan_out(nodes: &[Client], base: &Config) {
    let mut seen = HashSet::new();
    for node in nodes {
        let addr = node.addr();
        if !seen.insert(addr) {
            tracing::debug!(addr, "skipping duplicate node");
            continue;
        }
        let result = base.for_node(addr).and_then(|config| instrument(node, &config));
        if let Err(e) = result {
            tracing::error!(addr, error = %e, "failed to instrument node");
            base.report(e);
        }
    }
}
