//! Connection pool.
//!
//! Checkouts are bounded by a semaphore with `pool_size` permits; waiting
//! longer than `pool_timeout` for a permit counts as a pool timeout. Idle
//! and total connection counts live under one lock so a [`PoolStats`]
//! snapshot is always self-consistent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ClientConfig;
use crate::conn::{Connection, Dialer};
use crate::error::ClientError;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkouts served by an idle connection.
    pub hits: u64,
    /// Checkouts that had to dial.
    pub misses: u64,
    /// Checkouts that gave up waiting for a free connection.
    pub timeouts: u64,
    /// Open connections, idle or in use.
    pub total_conns: usize,
    /// Connections waiting in the pool.
    pub idle_conns: usize,
}

impl PoolStats {
    /// Connections currently checked out.
    pub fn used_conns(&self) -> usize {
        self.total_conns.saturating_sub(self.idle_conns)
    }
}

impl std::ops::Add for PoolStats {
    type Output = PoolStats;

    fn add(self, other: PoolStats) -> PoolStats {
        PoolStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            timeouts: self.timeouts + other.timeouts,
            total_conns: self.total_conns + other.total_conns,
            idle_conns: self.idle_conns + other.idle_conns,
        }
    }
}

/// Configured pool bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub pool_size: usize,
    pub min_idle_conns: usize,
    pub max_idle_conns: usize,
}

struct PoolState {
    idle: VecDeque<Box<dyn Connection>>,
    /// Idle + checked out + being dialed.
    total: usize,
}

pub(crate) struct ConnPool {
    addr: String,
    dialer: Arc<dyn Dialer>,
    limits: PoolLimits,
    pool_timeout: Duration,
    dial_timeout: Duration,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    hits: AtomicU64,
    misses: AtomicU64,
    timeouts: AtomicU64,
    closed: AtomicBool,
}

impl ConnPool {
    pub fn new(config: &ClientConfig, dialer: Arc<dyn Dialer>) -> Arc<Self> {
        let limits = config.limits();
        let pool = Arc::new(Self {
            addr: config.addr.clone(),
            dialer,
            limits,
            pool_timeout: config.pool_timeout,
            dial_timeout: config.dial_timeout,
            permits: Arc::new(Semaphore::new(limits.pool_size)),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        pool.check_min_idle();
        pool
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn stats(&self) -> PoolStats {
        let (total_conns, idle_conns) = {
            let state = self.state.lock();
            (state.total, state.idle.len())
        };
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_conns,
            idle_conns,
        }
    }

    /// Check out a connection, dialing a new one if none are idle.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConn, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ClientClosed);
        }

        let permit =
            match tokio::time::timeout(self.pool_timeout, self.permits.clone().acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(ClientError::ClientClosed),
                Err(_) => {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(addr = %self.addr, "connection pool timeout");
                    return Err(ClientError::PoolTimeout);
                }
            };

        let idle = {
            let mut state = self.state.lock();
            let idle = state.idle.pop_back();
            if idle.is_none() {
                state.total += 1;
            }
            idle
        };
        if let Some(conn) = idle {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(PooledConn::new(conn, self.clone(), permit));
        }
        let reservation = Reservation::new(self);

        self.misses.fetch_add(1, Ordering::Relaxed);
        let conn = self.dial().await?;
        reservation.commit();
        Ok(PooledConn::new(conn, self.clone(), permit))
    }

    async fn dial(&self) -> Result<Box<dyn Connection>, ClientError> {
        tracing::debug!(addr = %self.addr, "dialing");
        match tokio::time::timeout(self.dial_timeout, self.dialer.dial(&self.addr)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("dial {} timed out", self.addr),
            ))),
        }
    }

    fn put(&self, conn: Box<dyn Connection>) {
        let mut state = self.state.lock();
        if self.closed.load(Ordering::Acquire) || state.idle.len() >= self.limits.max_idle_conns {
            state.total -= 1;
            return;
        }
        state.idle.push_back(conn);
    }

    fn remove(self: &Arc<Self>) {
        self.state.lock().total -= 1;
        self.check_min_idle();
    }

    /// Top up idle connections to `min_idle_conns` in the background.
    ///
    /// Does nothing outside a tokio runtime.
    fn check_min_idle(self: &Arc<Self>) {
        if self.limits.min_idle_conns == 0 || self.closed.load(Ordering::Acquire) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let needed = {
            let mut state = self.state.lock();
            let missing = self.limits.min_idle_conns.saturating_sub(state.idle.len());
            let room = self.limits.pool_size.saturating_sub(state.total);
            let needed = missing.min(room);
            state.total += needed;
            needed
        };

        for _ in 0..needed {
            let pool = self.clone();
            handle.spawn(async move {
                let reservation = Reservation::new(&pool);
                match pool.dial().await {
                    Ok(conn) => {
                        reservation.commit();
                        pool.put(conn);
                    }
                    Err(e) => {
                        tracing::debug!(addr = %pool.addr, error = %e, "min idle dial failed");
                    }
                }
            });
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.permits.close();
        let mut state = self.state.lock();
        let drained = state.idle.len();
        state.idle.clear();
        state.total -= drained;
    }
}

/// Releases a reserved slot in `total` unless committed. Keeps the count
/// right when a dial fails or the dialing future is dropped.
struct Reservation<'a> {
    pool: &'a ConnPool,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn new(pool: &'a ConnPool) -> Self {
        Self {
            pool,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.state.lock().total -= 1;
        }
    }
}

/// A checked-out connection. Dropping it without [`release`](Self::release)
/// discards the connection.
pub(crate) struct PooledConn {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<ConnPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConn {
    fn new(conn: Box<dyn Connection>, pool: Arc<ConnPool>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            pool,
            _permit: permit,
        }
    }

    pub fn conn_mut(&mut self) -> Option<&mut (dyn Connection + 'static)> {
        self.conn.as_deref_mut()
    }

    /// Return the connection to the idle list.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            self.pool.remove();
        }
    }
}
