#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The key does not exist. A normal outcome, not a failure.
    #[error("redis: nil")]
    Nil,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection pool timeout")]
    PoolTimeout,
    #[error("client is closed")]
    ClientClosed,
    #[error("no nodes available")]
    NoNodes,
    /// The caller dropped the operation before it completed.
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Redis(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true for the "key not found" sentinel.
    pub fn is_nil(&self) -> bool {
        matches!(self, ClientError::Nil)
    }

    /// Whether the connection that produced this error must be discarded.
    pub(crate) fn is_bad_conn(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionClosed
                | ClientError::Cancelled
                | ClientError::Protocol(_)
                | ClientError::Io(_)
        )
    }
}
