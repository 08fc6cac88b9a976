//! Consistent sharding over named single-node clients.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Cmd;
use crate::config::{ClientConfig, RingConfig};
use crate::conn::{Dialer, TcpDialer};
use crate::error::ClientError;
use crate::hook::Hook;
use crate::pool::PoolStats;
use crate::router::route_key;
use crate::{Client, Cmdable};

/// Keys are routed to shards with FNV-1a. Keyless commands go to the first
/// shard. Each shard is an independent [`Client`] with its own pool and
/// hooks.
#[derive(Clone)]
pub struct Ring {
    inner: Arc<RingInner>,
}

struct RingInner {
    names: Vec<String>,
    shards: Vec<Client>,
}

impl Ring {
    pub fn new(config: RingConfig) -> Self {
        let dialer = Arc::new(TcpDialer {
            nodelay: config.client.tcp_nodelay,
        });
        Self::with_dialer(config, dialer)
    }

    /// Build a ring whose shards share `dialer`.
    pub fn with_dialer(config: RingConfig, dialer: Arc<dyn Dialer>) -> Self {
        let mut names = Vec::with_capacity(config.shards.len());
        let mut shards = Vec::with_capacity(config.shards.len());
        for (name, addr) in config.shards {
            let shard_config = ClientConfig {
                addr,
                ..config.client.clone()
            };
            shards.push(Client::with_dialer(shard_config, dialer.clone()));
            names.push(name);
        }
        tracing::debug!(shards = shards.len(), "ring created");
        Self {
            inner: Arc::new(RingInner { names, shards }),
        }
    }

    /// Every shard, ordered by shard name.
    pub fn shards(&self) -> &[Client] {
        &self.inner.shards
    }

    /// Look up a shard by name.
    pub fn shard(&self, name: &str) -> Option<&Client> {
        let idx = self.inner.names.iter().position(|n| n == name)?;
        self.inner.shards.get(idx)
    }

    /// Install `hook` on every shard.
    pub fn add_hook(&self, hook: Arc<dyn Hook>) {
        for shard in self.shards() {
            shard.add_hook(hook.clone());
        }
    }

    /// Pool counters summed over all shards.
    pub fn pool_stats(&self) -> PoolStats {
        self.shards()
            .iter()
            .map(Client::pool_stats)
            .fold(PoolStats::default(), |acc, s| acc + s)
    }

    pub fn close(&self) {
        for shard in self.shards() {
            shard.close();
        }
    }

    fn route(&self, cmd: &Cmd) -> usize {
        cmd.key()
            .map(|key| route_key(key, self.inner.shards.len()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Cmdable for Ring {
    async fn process(&self, cmd: &mut Cmd) {
        match self.inner.shards.get(self.route(cmd)) {
            Some(shard) => shard.process(cmd).await,
            None => cmd.set_err(ClientError::NoNodes),
        }
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Vec<Cmd> {
        crate::split_pipeline(&self.inner.shards, cmds, |cmd| self.route(cmd)).await
    }
}
