use std::sync::Arc;

use kv_client::{Client, Hook, PoolLimits, PoolStats};

/// A single-node client that can be instrumented.
///
/// Cloning must be cheap and share state: the pool callback keeps a clone
/// for as long as the meter provider lives.
pub trait Node: Clone + Send + Sync + 'static {
    /// Server address; the default pool identity.
    fn addr(&self) -> &str;

    fn pool_stats(&self) -> PoolStats;

    fn pool_limits(&self) -> PoolLimits;

    fn add_hook(&self, hook: Arc<dyn Hook>);

    fn has_hook(&self, name: &str) -> bool;
}

impl Node for Client {
    fn addr(&self) -> &str {
        Client::addr(self)
    }

    fn pool_stats(&self) -> PoolStats {
        Client::pool_stats(self)
    }

    fn pool_limits(&self) -> PoolLimits {
        Client::pool_limits(self)
    }

    fn add_hook(&self, hook: Arc<dyn Hook>) {
        Client::add_hook(self, hook)
    }

    fn has_hook(&self, name: &str) -> bool {
        Client::has_hook(self, name)
    }
}
