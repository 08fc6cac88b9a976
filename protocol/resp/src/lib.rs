//! RESP2 protocol support for the key-value client.
//!
//! Requests are always encoded as arrays of bulk strings. Replies are parsed
//! into owned [`Value`]s; a partial buffer yields [`ParseError::Incomplete`]
//! so callers can read more bytes and retry.
//!
//! # Example
//!
//! ```
//! use protocol_resp::{Request, Value};
//!
//! let mut buf = Vec::new();
//! Request::get(b"hello").encode(&mut buf);
//! assert_eq!(buf, b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n");
//!
//! let (value, consumed) = Value::parse(b"$5\r\nworld\r\n").unwrap();
//! assert_eq!(value, Value::BulkString("world".into()));
//! assert_eq!(consumed, 11);
//! ```

mod error;
mod request;
mod value;

pub use error::ParseError;
pub use request::Request;
pub use value::{ParseOptions, Value};
