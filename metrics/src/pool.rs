//! Pool-state instruments.
//!
//! Five asynchronous up/down counters share one callback. Every collection
//! reads a fresh snapshot from the node, so idle and used always add up to
//! the total seen by the pool at that instant.

use opentelemetry::KeyValue;
use opentelemetry::metrics::Observer;

use crate::config::Config;
use crate::error::Result;
use crate::node::Node;

pub const IDLE_MAX: &str = "db.client.connections.idle.max";
pub const IDLE_MIN: &str = "db.client.connections.idle.min";
pub const MAX: &str = "db.client.connections.max";
pub const USAGE: &str = "db.client.connections.usage";
pub const TIMEOUTS: &str = "db.client.connections.timeouts";

const STATE_KEY: &str = "state";

pub(crate) fn report_pool_stats<N: Node>(node: &N, config: &Config) -> Result<()> {
    let meter = &config.meter;

    let idle_max = meter
        .i64_observable_up_down_counter(IDLE_MAX)
        .with_description("The maximum number of idle open connections allowed")
        .try_init()?;
    let idle_min = meter
        .i64_observable_up_down_counter(IDLE_MIN)
        .with_description("The minimum number of idle open connections allowed")
        .try_init()?;
    let conns_max = meter
        .i64_observable_up_down_counter(MAX)
        .with_description("The maximum number of open connections allowed")
        .try_init()?;
    let usage = meter
        .i64_observable_up_down_counter(USAGE)
        .with_description(
            "The number of connections that are currently in state described by the state attribute",
        )
        .try_init()?;
    let timeouts = meter
        .i64_observable_up_down_counter(TIMEOUTS)
        .with_description(
            "The number of connection timeouts that have occurred trying to obtain a connection from the pool",
        )
        .try_init()?;

    let attrs = config.attrs.clone();
    let idle_attrs = with_state(&attrs, "idle");
    let used_attrs = with_state(&attrs, "used");
    let observed = node.clone();

    meter.register_callback(
        &[
            idle_max.as_any(),
            idle_min.as_any(),
            conns_max.as_any(),
            usage.as_any(),
            timeouts.as_any(),
        ],
        move |observer: &dyn Observer| {
            let stats = observed.pool_stats();
            let limits = observed.pool_limits();

            observer.observe_i64(&idle_max, saturate(limits.max_idle_conns), &attrs);
            observer.observe_i64(&idle_min, saturate(limits.min_idle_conns), &attrs);
            observer.observe_i64(&conns_max, saturate(limits.pool_size), &attrs);
            observer.observe_i64(&usage, saturate(stats.idle_conns), &idle_attrs);
            observer.observe_i64(&usage, saturate(stats.used_conns()), &used_attrs);
            observer.observe_i64(&timeouts, saturate(stats.timeouts), &attrs);
        },
    )?;

    tracing::debug!(addr = %node.addr(), "pool stats reporting enabled");
    Ok(())
}

fn with_state(attrs: &[KeyValue], state: &'static str) -> Vec<KeyValue> {
    let mut attrs = attrs.to_vec();
    attrs.push(KeyValue::new(STATE_KEY, state));
    attrs
}

fn saturate<T: TryInto<i64>>(n: T) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}
