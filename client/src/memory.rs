//! In-process server for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use protocol_resp::Value;

use crate::command::Cmd;
use crate::conn::{Connection, Dialer};
use crate::error::ClientError;

type Store = Arc<Mutex<HashMap<Bytes, Entry>>>;

struct Entry {
    value: Bytes,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|at| at > now)
    }
}

/// Dials connections to in-memory stores, one store per address.
///
/// Supports `PING`, `ECHO`, `GET`, `SET` (with `EX`), `DEL`, `INCR` and
/// `FLUSHALL`. Anything else gets an error reply.
#[derive(Clone, Default)]
pub struct MemoryDialer {
    stores: Arc<Mutex<HashMap<String, Store>>>,
    latency: Duration,
}

impl MemoryDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn store(&self, addr: &str) -> Store {
        self.stores
            .lock()
            .entry(addr.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>, ClientError> {
        Ok(Box::new(MemoryConnection {
            store: self.store(addr),
            latency: self.latency,
        }))
    }
}

struct MemoryConnection {
    store: Store,
    latency: Duration,
}

impl MemoryConnection {
    fn apply(&self, args: &[Bytes]) -> Value {
        let Some(name) = args.first() else {
            return error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        let args = &args[1..];
        let now = Instant::now();
        let mut store = self.store.lock();

        match (name.as_str(), args.len()) {
            ("PING", 0) => Value::SimpleString(Bytes::from_static(b"PONG")),
            ("PING", 1) | ("ECHO", 1) => Value::BulkString(args[0].clone()),
            ("GET", 1) => match store.get(&args[0]) {
                Some(entry) if entry.is_live(now) => Value::BulkString(entry.value.clone()),
                _ => Value::Null,
            },
            ("SET", 2) | ("SET", 4) => {
                let expires = match args.get(2..4) {
                    Some([ex, secs]) if ex.eq_ignore_ascii_case(b"EX") => {
                        match parse_int(secs) {
                            Some(secs) if secs > 0 => {
                                Some(now + Duration::from_secs(secs as u64))
                            }
                            _ => return error("ERR invalid expire time in 'set' command"),
                        }
                    }
                    Some(_) => return error("ERR syntax error"),
                    None => None,
                };
                store.insert(
                    args[0].clone(),
                    Entry {
                        value: args[1].clone(),
                        expires,
                    },
                );
                Value::SimpleString(Bytes::from_static(b"OK"))
            }
            ("DEL", n) if n > 0 => {
                let removed = args
                    .iter()
                    .filter(|k| store.remove(*k).is_some_and(|e| e.is_live(now)))
                    .count();
                Value::Integer(removed as i64)
            }
            ("INCR", 1) => {
                let current = match store.get(&args[0]) {
                    Some(entry) if entry.is_live(now) => match parse_int(&entry.value) {
                        Some(n) => n,
                        None => return error("ERR value is not an integer or out of range"),
                    },
                    _ => 0,
                };
                let Some(next) = current.checked_add(1) else {
                    return error("ERR increment or decrement would overflow");
                };
                store.insert(
                    args[0].clone(),
                    Entry {
                        value: Bytes::from(next.to_string()),
                        expires: None,
                    },
                );
                Value::Integer(next)
            }
            ("FLUSHALL", 0) => {
                store.clear();
                Value::SimpleString(Bytes::from_static(b"OK"))
            }
            ("PING" | "ECHO" | "GET" | "SET" | "DEL" | "INCR" | "FLUSHALL", _) => error(&format!(
                "ERR wrong number of arguments for '{}' command",
                name.to_ascii_lowercase()
            )),
            _ => error(&format!(
                "ERR unknown command '{}'",
                name.to_ascii_lowercase()
            )),
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn exec(&mut self, cmd: &mut Cmd) -> Result<(), ClientError> {
        self.delay().await;
        let value = self.apply(cmd.args());
        cmd.set_reply(value);
        Ok(())
    }

    async fn exec_pipeline(&mut self, cmds: &mut [Cmd]) -> Result<(), ClientError> {
        self.delay().await;
        for cmd in cmds.iter_mut().filter(|c| !c.is_done()) {
            let value = self.apply(cmd.args());
            cmd.set_reply(value);
        }
        Ok(())
    }
}

fn error(msg: &str) -> Value {
    Value::Error(Bytes::copy_from_slice(msg.as_bytes()))
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
