use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::ClusterClient;
use crate::command::Cmd;
use crate::config::{ClientConfig, ClusterConfig};
use crate::conn::{Dialer, TcpDialer};
use crate::error::ClientError;
use crate::ring::Ring;
use crate::{Client, Cmdable};

/// Any of the supported client topologies.
#[derive(Clone)]
#[non_exhaustive]
pub enum UniversalClient {
    Single(Client),
    Ring(Ring),
    Cluster(ClusterClient),
}

impl UniversalClient {
    /// One address builds a single-node client, several build a cluster
    /// client with every address as a master. `template` supplies pool
    /// settings; its `addr` is ignored.
    pub fn new<I, S>(addrs: I, template: ClientConfig) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dialer = Arc::new(TcpDialer {
            nodelay: template.tcp_nodelay,
        });
        Self::with_dialer(addrs, template, dialer)
    }

    pub fn with_dialer<I, S>(
        addrs: I,
        template: ClientConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut addrs: Vec<String> = addrs.into_iter().map(Into::into).collect();
        match addrs.len() {
            0 => Err(ClientError::NoNodes),
            1 => {
                let config = ClientConfig {
                    addr: addrs.remove(0),
                    ..template
                };
                Ok(Self::Single(Client::with_dialer(config, dialer)))
            }
            _ => Ok(Self::Cluster(ClusterClient::with_dialer(
                ClusterConfig {
                    masters: addrs,
                    replicas: Vec::new(),
                    client: template,
                },
                dialer,
            ))),
        }
    }

    /// Name of the underlying client type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "Client",
            Self::Ring(_) => "Ring",
            Self::Cluster(_) => "ClusterClient",
        }
    }

    pub fn close(&self) {
        match self {
            Self::Single(c) => c.close(),
            Self::Ring(r) => r.close(),
            Self::Cluster(c) => c.close(),
        }
    }
}

impl From<Client> for UniversalClient {
    fn from(client: Client) -> Self {
        Self::Single(client)
    }
}

impl From<Ring> for UniversalClient {
    fn from(ring: Ring) -> Self {
        Self::Ring(ring)
    }
}

impl From<ClusterClient> for UniversalClient {
    fn from(cluster: ClusterClient) -> Self {
        Self::Cluster(cluster)
    }
}

#[async_trait]
impl Cmdable for UniversalClient {
    async fn process(&self, cmd: &mut Cmd) {
        match self {
            Self::Single(c) => c.process(cmd).await,
            Self::Ring(r) => r.process(cmd).await,
            Self::Cluster(c) => c.process(cmd).await,
        }
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Vec<Cmd> {
        match self {
            Self::Single(c) => c.pipeline(cmds).await,
            Self::Ring(r) => r.pipeline(cmds).await,
            Self::Cluster(c) => c.pipeline(cmds).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDialer;

    fn universal(addrs: &[&str]) -> Result<UniversalClient, ClientError> {
        UniversalClient::with_dialer(
            addrs.iter().copied(),
            ClientConfig::default(),
            Arc::new(MemoryDialer::new()),
        )
    }

    #[test]
    fn topology_from_addrs() {
        assert_eq!(universal(&["mem:1"]).unwrap().kind(), "Client");
        let cluster = universal(&["mem:1", "mem:2"]).unwrap();
        assert_eq!(cluster.kind(), "ClusterClient");
        let UniversalClient::Cluster(cluster) = cluster else {
            panic!("expected cluster");
        };
        assert_eq!(cluster.masters().len(), 2);
        assert!(matches!(universal(&[]), Err(ClientError::NoNodes)));
    }

    #[tokio::test]
    async fn delegates() {
        let client = universal(&["mem:1"]).unwrap();
        client.set(b"k", "v").await.unwrap();
        assert!(client.get(b"k").await.unwrap().is_some());

        let ring: UniversalClient = Ring::with_dialer(
            crate::config::RingConfig::default(),
            Arc::new(MemoryDialer::new()),
        )
        .into();
        assert_eq!(ring.kind(), "Ring");
    }
}
