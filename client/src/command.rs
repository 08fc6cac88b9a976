use std::fmt;

use bytes::Bytes;
use protocol_resp::{Request, Value};

use crate::error::ClientError;

/// Commands that carry no key and are routed to the first node.
const KEYLESS: &[&[u8]] = &[b"PING", b"ECHO", b"INFO", b"DBSIZE", b"FLUSHDB", b"FLUSHALL"];

/// A command and, once executed, its reply.
///
/// Server error replies and the nil reply are stored as errors so callers and
/// hooks can classify outcomes through [`Cmd::err`].
pub struct Cmd {
    args: Vec<Bytes>,
    reply: Option<Result<Value, ClientError>>,
}

impl Cmd {
    /// Build a command from its arguments, name first.
    pub fn new<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            reply: None,
        }
    }

    pub fn ping() -> Self {
        Self::new([Bytes::from_static(b"PING")])
    }

    pub fn get(key: &[u8]) -> Self {
        Self::new([Bytes::from_static(b"GET"), Bytes::copy_from_slice(key)])
    }

    pub fn set(key: &[u8], value: impl Into<Bytes>) -> Self {
        Self::new([
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key),
            value.into(),
        ])
    }

    pub fn set_ex(key: &[u8], value: impl Into<Bytes>, ttl_secs: u64) -> Self {
        Self::new([
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key),
            value.into(),
            Bytes::from_static(b"EX"),
            Bytes::from(ttl_secs.to_string()),
        ])
    }

    pub fn del(key: &[u8]) -> Self {
        Self::new([Bytes::from_static(b"DEL"), Bytes::copy_from_slice(key)])
    }

    pub fn incr(key: &[u8]) -> Self {
        Self::new([Bytes::from_static(b"INCR"), Bytes::copy_from_slice(key)])
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The command name, uppercased.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|n| String::from_utf8_lossy(n).to_ascii_uppercase())
            .unwrap_or_default()
    }

    /// Extract the key for routing. Returns `None` for keyless commands.
    pub fn key(&self) -> Option<&[u8]> {
        let name = self.args.first()?;
        if KEYLESS.iter().any(|k| name.eq_ignore_ascii_case(k)) {
            return None;
        }
        self.args.get(1).map(|k| k.as_ref())
    }

    /// Whether a reply or error has been recorded.
    pub fn is_done(&self) -> bool {
        self.reply.is_some()
    }

    /// The error this command finished with, if any.
    pub fn err(&self) -> Option<&ClientError> {
        match &self.reply {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    /// The successful reply, if any.
    pub fn reply(&self) -> Option<&Value> {
        match &self.reply {
            Some(Ok(v)) => Some(v),
            _ => None,
        }
    }

    /// Record a server reply. Error and nil replies become errors.
    pub fn set_reply(&mut self, value: Value) {
        self.reply = Some(match value {
            Value::Error(msg) => Err(ClientError::Redis(
                String::from_utf8_lossy(&msg).into_owned(),
            )),
            Value::Null => Err(ClientError::Nil),
            other => Ok(other),
        });
    }

    pub fn set_err(&mut self, err: ClientError) {
        self.reply = Some(Err(err));
    }

    /// Take the outcome, leaving the command un-executed.
    pub fn take_result(&mut self) -> Result<Value, ClientError> {
        self.reply
            .take()
            .unwrap_or_else(|| Err(ClientError::Protocol("command was not executed".into())))
    }

    /// Append the RESP encoding of this command to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut args = self.args.iter();
        let Some(name) = args.next() else {
            return;
        };
        let mut req = Request::new(name);
        for arg in args {
            req = req.arg(arg);
        }
        req.encode(buf);
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i == 0 {
                write!(f, "{}", String::from_utf8_lossy(arg).to_ascii_lowercase())?;
            } else {
                write!(f, " {}", String::from_utf8_lossy(arg))?;
            }
        }
        match &self.reply {
            Some(Ok(value)) => write!(f, ": {value}"),
            Some(Err(err)) => write!(f, ": {err}"),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cmd({self})")
    }
}
