//! Client for a cluster of master and replica nodes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Cmd;
use crate::config::{ClientConfig, ClusterConfig};
use crate::conn::{Dialer, TcpDialer};
use crate::error::ClientError;
use crate::hook::Hook;
use crate::pool::PoolStats;
use crate::router::{key_slot, slot_owner};
use crate::{Client, Cmdable};

/// Hash slots are split evenly across the masters in configuration order.
/// Keyless commands go to the first master. Replicas are connected but
/// only serve traffic when addressed directly through
/// [`replicas`](Self::replicas).
///
/// Nodes are keyed by address; a repeated address yields one node.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    masters: Vec<Client>,
    replicas: Vec<Client>,
}

impl ClusterClient {
    pub fn new(config: ClusterConfig) -> Self {
        let dialer = Arc::new(TcpDialer {
            nodelay: config.client.tcp_nodelay,
        });
        Self::with_dialer(config, dialer)
    }

    pub fn with_dialer(config: ClusterConfig, dialer: Arc<dyn Dialer>) -> Self {
        let mut seen = HashSet::new();
        let mut build = |addrs: Vec<String>| -> Vec<Client> {
            addrs
                .into_iter()
                .filter(|addr| seen.insert(addr.clone()))
                .map(|addr| {
                    let node_config = ClientConfig {
                        addr,
                        ..config.client.clone()
                    };
                    Client::with_dialer(node_config, dialer.clone())
                })
                .collect()
        };
        let masters = build(config.masters);
        let replicas = build(config.replicas);
        tracing::debug!(
            masters = masters.len(),
            replicas = replicas.len(),
            "cluster client created"
        );
        Self {
            inner: Arc::new(ClusterInner { masters, replicas }),
        }
    }

    pub fn masters(&self) -> &[Client] {
        &self.inner.masters
    }

    pub fn replicas(&self) -> &[Client] {
        &self.inner.replicas
    }

    /// Masters then replicas.
    pub fn nodes(&self) -> impl Iterator<Item = &Client> {
        self.inner.masters.iter().chain(self.inner.replicas.iter())
    }

    /// Install `hook` on every node.
    pub fn add_hook(&self, hook: Arc<dyn Hook>) {
        for node in self.nodes() {
            node.add_hook(hook.clone());
        }
    }

    /// Pool counters summed over all nodes.
    pub fn pool_stats(&self) -> PoolStats {
        self.nodes()
            .map(Client::pool_stats)
            .fold(PoolStats::default(), |acc, s| acc + s)
    }

    pub fn close(&self) {
        for node in self.nodes() {
            node.close();
        }
    }

    /// Index of the master serving `key`.
    pub fn master_for(&self, key: &[u8]) -> usize {
        slot_owner(key_slot(key), self.inner.masters.len())
    }

    fn route(&self, cmd: &Cmd) -> usize {
        cmd.key().map(|key| self.master_for(key)).unwrap_or(0)
    }
}

#[async_trait]
impl Cmdable for ClusterClient {
    async fn process(&self, cmd: &mut Cmd) {
        match self.inner.masters.get(self.route(cmd)) {
            Some(master) => master.process(cmd).await,
            None => cmd.set_err(ClientError::NoNodes),
        }
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Vec<Cmd> {
        crate::split_pipeline(&self.inner.masters, cmds, |cmd| self.route(cmd)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDialer;

    fn cluster(masters: &[&str], replicas: &[&str]) -> ClusterClient {
        ClusterClient::with_dialer(
            ClusterConfig {
                masters: masters.iter().map(|s| s.to_string()).collect(),
                replicas: replicas.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            Arc::new(MemoryDialer::new()),
        )
    }

    #[tokio::test]
    async fn routes_by_slot() {
        let cluster = cluster(&["mem:1", "mem:2", "mem:3"], &["mem:4"]);
        cluster.set(b"foo", "1").await.unwrap();
        cluster.set(b"bar", "2").await.unwrap();

        // foo -> slot 12182 -> third master, bar -> slot 5061 -> first.
        assert_eq!(cluster.master_for(b"foo"), 2);
        assert_eq!(cluster.master_for(b"bar"), 0);
        assert!(cluster.masters()[2].get(b"foo").await.unwrap().is_some());
        assert!(cluster.masters()[0].get(b"bar").await.unwrap().is_some());
        assert!(cluster.masters()[1].get(b"foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hash_tags_colocate() {
        let cluster = cluster(&["mem:1", "mem:2", "mem:3"], &[]);
        let done = cluster
            .pipeline(vec![
                Cmd::set(b"{user}.a", "1"),
                Cmd::set(b"{user}.b", "2"),
                Cmd::get(b"{user}.a"),
            ])
            .await;
        assert!(done.iter().all(|c| c.err().is_none()));
        assert_eq!(
            cluster.master_for(b"{user}.a"),
            cluster.master_for(b"{user}.b")
        );
    }

    #[test]
    fn duplicate_addresses_collapse() {
        let cluster = cluster(&["mem:1", "mem:1", "mem:2"], &["mem:2", "mem:3"]);
        let masters: Vec<&str> = cluster.masters().iter().map(Client::addr).collect();
        let replicas: Vec<&str> = cluster.replicas().iter().map(Client::addr).collect();
        assert_eq!(masters, ["mem:1", "mem:2"]);
        assert_eq!(replicas, ["mem:3"]);
        assert_eq!(cluster.nodes().count(), 3);
    }

    #[tokio::test]
    async fn no_masters() {
        let cluster = cluster(&[], &["mem:1"]);
        assert!(matches!(cluster.get(b"k").await, Err(ClientError::NoNodes)));
    }
}
