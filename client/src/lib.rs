//! Pooled async key-value client with per-operation hooks.
//!
//! A [`Client`] talks to one server through a connection pool. A [`Ring`]
//! shards keys across several clients by name, and a [`ClusterClient`]
//! spreads hash slots across master nodes. [`UniversalClient`] wraps any of
//! the three.
//!
//! Every command and pipeline passes through the client's [`Hook`] chain,
//! which is how instrumentation attaches without touching call sites.
//!
//! # Example
//!
//! ```no_run
//! use kv_client::{Client, ClientConfig, Cmdable};
//!
//! # async fn example() -> Result<(), kv_client::ClientError> {
//! let client = Client::new(ClientConfig::new("127.0.0.1:6379"));
//!
//! client.set(b"hello", &b"world"[..]).await?;
//! let val = client.get(b"hello").await?;
//! assert_eq!(val.as_deref(), Some(b"world".as_ref()));
//!
//! client.del(b"hello").await?;
//! # Ok(())
//! # }
//! ```

mod cluster;
mod command;
mod config;
mod conn;
mod context;
mod error;
mod hook;
mod memory;
mod pool;
mod ring;
mod router;
mod universal;

pub use cluster::ClusterClient;
pub use command::Cmd;
pub use config::{ClientConfig, ClusterConfig, RingConfig};
pub use conn::{Connection, Dialer, TcpDialer};
pub use context::Context;
pub use error::ClientError;
pub use hook::Hook;
pub use memory::MemoryDialer;
pub use pool::{PoolLimits, PoolStats};
pub use protocol_resp::Value;
pub use ring::Ring;
pub use universal::UniversalClient;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use hook::Hooks;
use pool::ConnPool;

/// Command API shared by every client type.
///
/// Implementors provide [`process`](Self::process) and
/// [`pipeline`](Self::pipeline); the typed helpers are built on those.
#[async_trait]
pub trait Cmdable: Send + Sync {
    /// Execute one command. The outcome is recorded on `cmd`.
    async fn process(&self, cmd: &mut Cmd);

    /// Execute a batch, returning the commands with their outcomes in the
    /// original order.
    async fn pipeline(&self, cmds: Vec<Cmd>) -> Vec<Cmd>;

    /// Execute `cmd` and return its reply.
    async fn call(&self, cmd: Cmd) -> Result<Value, ClientError> {
        let mut cmd = cmd;
        self.process(&mut cmd).await;
        cmd.take_result()
    }

    /// Get a value by key. A missing key is `Ok(None)`.
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, ClientError> {
        match self.call(Cmd::get(key)).await {
            Ok(Value::BulkString(value)) => Ok(Some(value)),
            Ok(other) => Err(unexpected("GET", &other)),
            Err(ClientError::Nil) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a key-value pair.
    async fn set<V>(&self, key: &[u8], value: V) -> Result<(), ClientError>
    where
        V: Into<Bytes> + Send,
    {
        self.call(Cmd::set(key, value)).await.map(|_| ())
    }

    /// Set a key-value pair with a TTL in seconds.
    async fn set_ex<V>(&self, key: &[u8], value: V, ttl_secs: u64) -> Result<(), ClientError>
    where
        V: Into<Bytes> + Send,
    {
        self.call(Cmd::set_ex(key, value, ttl_secs)).await.map(|_| ())
    }

    /// Delete a key. Returns the number of keys deleted.
    async fn del(&self, key: &[u8]) -> Result<u64, ClientError> {
        match self.call(Cmd::del(key)).await? {
            Value::Integer(n) => Ok(n.max(0) as u64),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// Increment an integer value, returning the new value.
    async fn incr(&self, key: &[u8]) -> Result<i64, ClientError> {
        match self.call(Cmd::incr(key)).await? {
            Value::Integer(n) => Ok(n),
            other => Err(unexpected("INCR", &other)),
        }
    }

    /// Ping the server.
    async fn ping(&self) -> Result<(), ClientError> {
        self.call(Cmd::ping()).await.map(|_| ())
    }
}

fn unexpected(cmd: &str, value: &Value) -> ClientError {
    ClientError::Protocol(format!("unexpected {cmd} reply: {value}"))
}

/// Client for a single server.
///
/// Clone-able, Send + Sync. All clones share the same pool and hooks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    pool: Arc<ConnPool>,
    hooks: Hooks,
}

impl Client {
    /// Create a client that dials TCP. Connections are opened lazily.
    pub fn new(config: ClientConfig) -> Self {
        let dialer = Arc::new(TcpDialer {
            nodelay: config.tcp_nodelay,
        });
        Self::with_dialer(config, dialer)
    }

    /// Create a client over a custom transport.
    pub fn with_dialer(config: ClientConfig, dialer: Arc<dyn Dialer>) -> Self {
        let pool = ConnPool::new(&config, dialer);
        Self {
            inner: Arc::new(ClientInner {
                config,
                pool,
                hooks: Hooks::new(),
            }),
        }
    }

    /// Server address this client dials.
    pub fn addr(&self) -> &str {
        &self.inner.config.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Snapshot of the pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// The pool bounds this client was configured with.
    pub fn pool_limits(&self) -> PoolLimits {
        self.inner.pool.limits()
    }

    /// Append a hook to the chain. Operations already in flight keep the
    /// chain they started with.
    pub fn add_hook(&self, hook: Arc<dyn Hook>) {
        tracing::debug!(addr = %self.addr(), hook = hook.name(), "adding hook");
        self.inner.hooks.add(hook);
    }

    /// Whether a hook with this [`Hook::name`] is installed.
    pub fn has_hook(&self, name: &str) -> bool {
        self.inner.hooks.contains(name)
    }

    /// Close the pool. Idle connections are dropped and later commands fail
    /// with [`ClientError::ClientClosed`].
    pub fn close(&self) {
        self.inner.pool.close();
    }

    async fn run(&self, cmd: &mut Cmd) {
        if cmd.args().is_empty() {
            return cmd.set_err(empty_command());
        }
        let mut pooled = match self.inner.pool.get().await {
            Ok(pooled) => pooled,
            Err(e) => return cmd.set_err(e),
        };
        let Some(conn) = pooled.conn_mut() else {
            return cmd.set_err(ClientError::ConnectionClosed);
        };
        match conn.exec(cmd).await {
            Ok(()) => pooled.release(),
            Err(e) => {
                if e.is_bad_conn() {
                    tracing::debug!(addr = %self.addr(), error = %e, "discarding connection");
                } else {
                    pooled.release();
                }
                cmd.set_err(e);
            }
        }
    }

    async fn run_pipeline(&self, cmds: &mut [Cmd]) {
        for cmd in cmds.iter_mut().filter(|c| c.args().is_empty()) {
            cmd.set_err(empty_command());
        }
        if cmds.iter().all(Cmd::is_done) {
            return;
        }
        let mut pooled = match self.inner.pool.get().await {
            Ok(pooled) => pooled,
            Err(e) => return fail_all(cmds, &e),
        };
        let Some(conn) = pooled.conn_mut() else {
            return fail_all(cmds, &ClientError::ConnectionClosed);
        };
        match conn.exec_pipeline(cmds).await {
            Ok(()) => pooled.release(),
            Err(e) => {
                if e.is_bad_conn() {
                    tracing::debug!(addr = %self.addr(), error = %e, "discarding connection");
                } else {
                    pooled.release();
                }
                fail_all(cmds, &e);
            }
        }
    }
}

fn empty_command() -> ClientError {
    ClientError::Protocol("empty command".to_string())
}

/// Record a copy of `err` on every command that has no outcome yet.
fn fail_all(cmds: &mut [Cmd], err: &ClientError) {
    for cmd in cmds.iter_mut().filter(|c| !c.is_done()) {
        cmd.set_err(copy_err(err));
    }
}

fn copy_err(err: &ClientError) -> ClientError {
    match err {
        ClientError::Nil => ClientError::Nil,
        ClientError::ConnectionClosed => ClientError::ConnectionClosed,
        ClientError::PoolTimeout => ClientError::PoolTimeout,
        ClientError::ClientClosed => ClientError::ClientClosed,
        ClientError::NoNodes => ClientError::NoNodes,
        ClientError::Cancelled => ClientError::Cancelled,
        ClientError::Redis(msg) => ClientError::Redis(msg.clone()),
        ClientError::Protocol(msg) => ClientError::Protocol(msg.clone()),
        ClientError::Io(e) => ClientError::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}

#[async_trait]
impl Cmdable for Client {
    async fn process(&self, cmd: &mut Cmd) {
        let mut call = HookedCall::new(self.inner.hooks.snapshot(), cmd);
        self.run(&mut *call.cmd).await;
        call.finish();
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Vec<Cmd> {
        let mut call = HookedPipeline::new(self.inner.hooks.snapshot(), cmds);
        if !call.cmds.is_empty() {
            self.run_pipeline(&mut call.cmds).await;
        }
        call.finish()
    }
}

/// Runs the before hooks on creation and the after hooks exactly once,
/// either from [`finish`](Self::finish) or on drop. A dropped call marks
/// its command [`ClientError::Cancelled`] first.
struct HookedCall<'a> {
    hooks: Arc<[Arc<dyn Hook>]>,
    ctx: Context,
    cmd: &'a mut Cmd,
    finished: bool,
}

impl<'a> HookedCall<'a> {
    fn new(hooks: Arc<[Arc<dyn Hook>]>, cmd: &'a mut Cmd) -> Self {
        let mut ctx = Context::new();
        for hook in hooks.iter() {
            hook.before_process(&mut ctx, &*cmd);
        }
        Self {
            hooks,
            ctx,
            cmd,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.run_after();
    }

    fn run_after(&mut self) {
        self.finished = true;
        for hook in self.hooks.iter().rev() {
            hook.after_process(&self.ctx, &*self.cmd);
        }
    }
}

impl Drop for HookedCall<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if !self.cmd.is_done() {
                self.cmd.set_err(ClientError::Cancelled);
            }
            self.run_after();
        }
    }
}

/// Pipeline counterpart of [`HookedCall`].
struct HookedPipeline {
    hooks: Arc<[Arc<dyn Hook>]>,
    ctx: Context,
    cmds: Vec<Cmd>,
    finished: bool,
}

impl HookedPipeline {
    fn new(hooks: Arc<[Arc<dyn Hook>]>, cmds: Vec<Cmd>) -> Self {
        let mut ctx = Context::new();
        for hook in hooks.iter() {
            hook.before_process_pipeline(&mut ctx, &cmds);
        }
        Self {
            hooks,
            ctx,
            cmds,
            finished: false,
        }
    }

    fn finish(mut self) -> Vec<Cmd> {
        self.run_after();
        std::mem::take(&mut self.cmds)
    }

    fn run_after(&mut self) {
        self.finished = true;
        for hook in self.hooks.iter().rev() {
            hook.after_process_pipeline(&self.ctx, &self.cmds);
        }
    }
}

impl Drop for HookedPipeline {
    fn drop(&mut self) {
        if !self.finished {
            fail_all(&mut self.cmds, &ClientError::Cancelled);
            self.run_after();
        }
    }
}

/// Run a pipeline across several nodes: commands are grouped by `route`,
/// each group goes to its node as one pipeline, and outcomes come back in
/// the caller's order.
pub(crate) async fn split_pipeline<F>(nodes: &[Client], cmds: Vec<Cmd>, route: F) -> Vec<Cmd>
where
    F: Fn(&Cmd) -> usize + Send,
{
    if nodes.is_empty() {
        let mut cmds = cmds;
        fail_all(&mut cmds, &ClientError::NoNodes);
        return cmds;
    }

    let total = cmds.len();
    let mut groups: Vec<(Vec<usize>, Vec<Cmd>)> = nodes.iter().map(|_| Default::default()).collect();
    for (idx, cmd) in cmds.into_iter().enumerate() {
        let node = route(&cmd).min(nodes.len() - 1);
        groups[node].0.push(idx);
        groups[node].1.push(cmd);
    }

    let mut slots: Vec<Option<Cmd>> = (0..total).map(|_| None).collect();
    for (node, (indices, group)) in nodes.iter().zip(groups) {
        if group.is_empty() {
            continue;
        }
        let done = node.pipeline(group).await;
        for (idx, cmd) in indices.into_iter().zip(done) {
            slots[idx] = Some(cmd);
        }
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn client() -> Client {
        Client::with_dialer(ClientConfig::new("mem:1"), Arc::new(MemoryDialer::new()))
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Hook for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn before_process(&self, _ctx: &mut Context, cmd: &Cmd) {
            self.log.lock().push(format!("{} before {}", self.name, cmd.name()));
        }

        fn after_process(&self, _ctx: &Context, cmd: &Cmd) {
            self.log.lock().push(format!("{} after {}", self.name, cmd.name()));
        }

        fn before_process_pipeline(&self, _ctx: &mut Context, cmds: &[Cmd]) {
            self.log.lock().push(format!("{} before pipeline {}", self.name, cmds.len()));
        }

        fn after_process_pipeline(&self, _ctx: &Context, cmds: &[Cmd]) {
            let done = cmds.iter().filter(|c| c.is_done()).count();
            self.log.lock().push(format!("{} after pipeline {done}", self.name));
        }
    }

    #[tokio::test]
    async fn typed_commands() {
        let client = client();
        client.ping().await.unwrap();
        assert_eq!(client.get(b"k").await.unwrap(), None);
        client.set(b"k", "v").await.unwrap();
        assert_eq!(client.get(b"k").await.unwrap().as_deref(), Some(b"v".as_ref()));
        assert_eq!(client.incr(b"n").await.unwrap(), 1);
        assert_eq!(client.del(b"k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hook_order() {
        let client = client();
        let log = Arc::new(Mutex::new(Vec::new()));
        client.add_hook(Arc::new(Recorder { name: "a", log: log.clone() }));
        client.add_hook(Arc::new(Recorder { name: "b", log: log.clone() }));

        client.ping().await.unwrap();
        assert_eq!(
            *log.lock(),
            ["a before PING", "b before PING", "b after PING", "a after PING"]
        );
        assert!(client.has_hook("a"));
        assert!(!client.has_hook("c"));
    }

    #[tokio::test]
    async fn pipeline_hooks_see_results() {
        let client = client();
        let log = Arc::new(Mutex::new(Vec::new()));
        client.add_hook(Arc::new(Recorder { name: "a", log: log.clone() }));

        let cmds = client
            .pipeline(vec![Cmd::set(b"k", "1"), Cmd::incr(b"k"), Cmd::get(b"k")])
            .await;
        assert_eq!(cmds[2].reply(), Some(&Value::BulkString("2".into())));
        assert_eq!(*log.lock(), ["a before pipeline 3", "a after pipeline 3"]);

        let empty = client.pipeline(Vec::new()).await;
        assert!(empty.is_empty());
        assert_eq!(log.lock().len(), 4);
    }

    #[tokio::test]
    async fn hooks_fire_on_failure() {
        let client = client();
        let log = Arc::new(Mutex::new(Vec::new()));
        client.add_hook(Arc::new(Recorder { name: "a", log: log.clone() }));
        client.close();

        assert!(matches!(client.ping().await, Err(ClientError::ClientClosed)));
        assert_eq!(*log.lock(), ["a before PING", "a after PING"]);
    }

    #[tokio::test]
    async fn dropped_call_still_runs_after_hooks() {
        let dialer = MemoryDialer::with_latency(std::time::Duration::from_millis(200));
        let client = Client::with_dialer(ClientConfig::new("mem:1"), Arc::new(dialer));
        let log = Arc::new(Mutex::new(Vec::new()));
        client.add_hook(Arc::new(Recorder { name: "a", log: log.clone() }));

        let mut cmd = Cmd::ping();
        let res =
            tokio::time::timeout(std::time::Duration::from_millis(20), client.process(&mut cmd))
                .await;
        assert!(res.is_err());
        assert_eq!(*log.lock(), ["a before PING", "a after PING"]);
        assert!(matches!(cmd.err(), Some(ClientError::Cancelled)));
        assert_eq!(client.pool_stats().total_conns, 0);
    }

    #[tokio::test]
    async fn dropped_pipeline_still_runs_after_hooks() {
        let dialer = MemoryDialer::with_latency(std::time::Duration::from_millis(200));
        let client = Client::with_dialer(ClientConfig::new("mem:1"), Arc::new(dialer));
        let log = Arc::new(Mutex::new(Vec::new()));
        client.add_hook(Arc::new(Recorder { name: "a", log: log.clone() }));

        let res = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            client.pipeline(vec![Cmd::ping(), Cmd::ping()]),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(*log.lock(), ["a before pipeline 2", "a after pipeline 2"]);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let client = client();
        let err = client.call(Cmd::new(Vec::<Bytes>::new())).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(client.pool_stats().misses, 0);

        let cmds = client
            .pipeline(vec![Cmd::set(b"k", "v"), Cmd::new(Vec::<Bytes>::new()), Cmd::get(b"k")])
            .await;
        assert!(cmds[0].err().is_none());
        assert!(matches!(cmds[1].err(), Some(ClientError::Protocol(_))));
        assert_eq!(cmds[2].reply(), Some(&Value::BulkString("v".into())));
    }

    #[tokio::test]
    async fn server_error_keeps_connection() {
        let client = client();
        assert!(matches!(
            client.call(Cmd::new(["BOGUS"])).await,
            Err(ClientError::Redis(_))
        ));
        client.ping().await.unwrap();
        let stats = client.pool_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn pool_stats_track_usage() {
        let client = client();
        client.ping().await.unwrap();
        client.ping().await.unwrap();
        let stats = client.pool_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_conns, 1);
        assert_eq!(stats.idle_conns, 1);
    }
}
