//! Connections and dialers.
//!
//! The pool owns connections through the [`Connection`] trait so a client
//! can run over TCP or any other transport a [`Dialer`] produces.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use protocol_resp::{ParseError, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::command::Cmd;
use crate::error::ClientError;

/// Initial read buffer capacity.
const READ_BUF_SIZE: usize = 16 * 1024;

/// A single server connection.
///
/// `exec` records the reply (or a server error) on the command. An `Err`
/// return means the connection itself failed and must not be reused.
#[async_trait]
pub trait Connection: Send {
    async fn exec(&mut self, cmd: &mut Cmd) -> Result<(), ClientError>;

    /// Write every command, then read every reply in order. Commands that
    /// already carry an outcome are skipped.
    async fn exec_pipeline(&mut self, cmds: &mut [Cmd]) -> Result<(), ClientError>;
}

/// Opens connections to an address.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>, ClientError>;
}

/// Dials plain TCP connections speaking RESP2.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    pub nodelay: bool,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Connection>, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(Box::new(TcpConnection::new(stream)))
    }
}

struct TcpConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUF_SIZE),
            write_buf: Vec::with_capacity(READ_BUF_SIZE),
        }
    }

    async fn flush(&mut self) -> Result<(), ClientError> {
        self.stream.write_all(&self.write_buf).await?;
        self.write_buf.clear();
        Ok(())
    }

    async fn read_value(&mut self) -> Result<Value, ClientError> {
        loop {
            match Value::parse(&self.read_buf) {
                Ok((value, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(value);
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(ClientError::Protocol(e.to_string())),
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn exec(&mut self, cmd: &mut Cmd) -> Result<(), ClientError> {
        cmd.encode(&mut self.write_buf);
        self.flush().await?;
        let value = self.read_value().await?;
        cmd.set_reply(value);
        Ok(())
    }

    async fn exec_pipeline(&mut self, cmds: &mut [Cmd]) -> Result<(), ClientError> {
        for cmd in cmds.iter().filter(|c| !c.is_done()) {
            cmd.encode(&mut self.write_buf);
        }
        self.flush().await?;
        for cmd in cmds.iter_mut().filter(|c| !c.is_done()) {
            let value = self.read_value().await?;
            cmd.set_reply(value);
        }
        Ok(())
    }
}
