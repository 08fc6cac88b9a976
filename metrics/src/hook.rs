//! Command and pipeline timing.

use std::time::{Duration, Instant};

use kv_client::{ClientError, Cmd, Context, Hook};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Histogram, Unit};

use crate::config::Config;
use crate::error::Result;

pub const USE_TIME: &str = "db.client.connections.use_time";

/// Name the metrics hook is installed under.
pub const HOOK_NAME: &str = "kv_metrics::MetricsHook";

const TYPE_KEY: &str = "type";
const STATUS_KEY: &str = "status";

/// Start of the operation in flight. Private so no other hook can read or
/// overwrite it.
struct StartTime(Instant);

/// Records one `use_time` observation per command or pipeline, labeled
/// with `type` and `status`. Errors (other than nil) are logged at error
/// level and operations at or above the slow threshold at warn level.
pub struct MetricsHook {
    use_time: Histogram<u64>,
    attrs: Vec<KeyValue>,
    slow_threshold: Duration,
}

impl MetricsHook {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let use_time = config
            .meter
            .u64_histogram(USE_TIME)
            .with_description("The time between borrowing a connection and returning it to the pool")
            .with_unit(Unit::new("ms"))
            .try_init()?;
        Ok(Self {
            use_time,
            attrs: config.attrs.clone(),
            slow_threshold: config.slow_threshold,
        })
    }

    fn record(&self, elapsed: Duration, kind: &'static str, err: Option<&ClientError>) {
        let mut attrs = Vec::with_capacity(self.attrs.len() + 2);
        attrs.extend_from_slice(&self.attrs);
        attrs.push(KeyValue::new(TYPE_KEY, kind));
        attrs.push(KeyValue::new(STATUS_KEY, status(err)));
        self.use_time.record(millis(elapsed), &attrs);
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed >= self.slow_threshold
    }
}

impl Hook for MetricsHook {
    fn name(&self) -> &'static str {
        HOOK_NAME
    }

    fn before_process(&self, ctx: &mut Context, _cmd: &Cmd) {
        ctx.insert(StartTime(Instant::now()));
    }

    fn after_process(&self, ctx: &Context, cmd: &Cmd) {
        let Some(&StartTime(start)) = ctx.get::<StartTime>() else {
            return;
        };
        let elapsed = start.elapsed();
        let err = cmd.err();
        self.record(elapsed, "command", err);

        if is_failure(err) {
            tracing::error!(cmd = %cmd, "command failed");
        }
        if self.is_slow(elapsed) {
            tracing::warn!(duration = ?elapsed, cmd = %cmd, "slow command");
        }
    }

    fn before_process_pipeline(&self, ctx: &mut Context, _cmds: &[Cmd]) {
        ctx.insert(StartTime(Instant::now()));
    }

    fn after_process_pipeline(&self, ctx: &Context, cmds: &[Cmd]) {
        let Some(&StartTime(start)) = ctx.get::<StartTime>() else {
            return;
        };
        let elapsed = start.elapsed();

        // The first command stands for the whole batch.
        let first = cmds.first();
        let err = first.and_then(Cmd::err);
        self.record(elapsed, "pipeline", err);

        if let Some(first) = first
            && is_failure(err)
        {
            tracing::error!(cmd = %first, cmds = cmds.len(), "pipeline failed");
        }
        if self.is_slow(elapsed) {
            match first {
                Some(first) => {
                    tracing::warn!(duration = ?elapsed, cmd = %first, cmds = cmds.len(), "slow pipeline")
                }
                None => tracing::warn!(duration = ?elapsed, cmds = 0, "slow pipeline"),
            }
        }
    }
}

/// The nil reply is a normal outcome.
fn is_failure(err: Option<&ClientError>) -> bool {
    err.is_some_and(|e| !e.is_nil())
}

fn status(err: Option<&ClientError>) -> &'static str {
    if is_failure(err) { "error" } else { "ok" }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
