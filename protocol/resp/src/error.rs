/// Errors returned while parsing RESP data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// More bytes are needed to complete the current value.
    #[error("incomplete data")]
    Incomplete,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    #[error("bulk string too long: {len} > {max}")]
    BulkStringTooLong { len: usize, max: usize },
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}
