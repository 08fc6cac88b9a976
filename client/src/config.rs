use std::collections::BTreeMap;
use std::time::Duration;

use crate::pool::PoolLimits;

/// Configuration for a single-node client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address ("host:port").
    pub addr: String,
    /// Maximum number of connections checked out at once (default: 10 per CPU).
    pub pool_size: usize,
    /// Idle connections the pool keeps open in the background (default: 0).
    pub min_idle_conns: usize,
    /// Cap on idle connections; `None` means up to `pool_size`.
    pub max_idle_conns: Option<usize>,
    /// How long to wait for a free connection (default: 4s).
    pub pool_timeout: Duration,
    /// Connect timeout (default: 5s).
    pub dial_timeout: Duration,
    /// Enable TCP_NODELAY (default: true).
    pub tcp_nodelay: bool,
}

impl ClientConfig {
    /// Configuration for `addr` with all other settings at their defaults.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// The pool limits this configuration resolves to.
    pub fn limits(&self) -> PoolLimits {
        let pool_size = self.pool_size.max(1);
        PoolLimits {
            pool_size,
            min_idle_conns: self.min_idle_conns.min(pool_size),
            max_idle_conns: self.max_idle_conns.unwrap_or(pool_size),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            addr: "127.0.0.1:6379".to_string(),
            pool_size: 10 * cpus,
            min_idle_conns: 0,
            max_idle_conns: None,
            pool_timeout: Duration::from_secs(4),
            dial_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
        }
    }
}

/// Configuration for a sharded ring.
#[derive(Debug, Clone, Default)]
pub struct RingConfig {
    /// Shard name to server address.
    pub shards: BTreeMap<String, String>,
    /// Pool settings applied to every shard. `addr` is ignored.
    pub client: ClientConfig,
}

/// Configuration for a cluster client.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Master node addresses. Hash slots are split evenly across them in order.
    pub masters: Vec<String>,
    /// Replica node addresses.
    pub replicas: Vec<String>,
    /// Pool settings applied to every node. `addr` is ignored.
    pub client: ClientConfig,
}
