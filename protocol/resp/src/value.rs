//! Reply parsing.
//!
//! Parses RESP2 replies from a byte buffer. Values own their data so the
//! caller can drop or reuse the read buffer immediately after parsing.

use bytes::Bytes;

use crate::error::ParseError;

/// Default maximum bulk string size: 512MB (the RESP limit).
const DEFAULT_MAX_BULK_STRING_LEN: usize = 512 * 1024 * 1024;

/// Maximum array nesting accepted by the parser.
const MAX_DEPTH: usize = 32;

/// Reject unreasonably large arrays to prevent OOM.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub max_bulk_string_len: usize,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_bulk_string_len(mut self, len: usize) -> Self {
        self.max_bulk_string_len = len;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_bulk_string_len: DEFAULT_MAX_BULK_STRING_LEN,
        }
    }
}

/// A parsed RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK\r\n`
    SimpleString(Bytes),
    /// `-ERR message\r\n`
    Error(Bytes),
    /// `:42\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    BulkString(Bytes),
    /// `$-1\r\n` or `*-1\r\n`
    Null,
    /// `*2\r\n...`
    Array(Vec<Value>),
}

impl Value {
    /// Parse one value using default limits.
    ///
    /// Returns the value and the number of bytes consumed.
    #[inline]
    pub fn parse(buffer: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_options(buffer, &ParseOptions::default())
    }

    /// Parse one value with custom limits.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Incomplete` if more data is needed.
    pub fn parse_with_options(
        buffer: &[u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let mut cursor = Cursor::new(buffer, options.max_bulk_string_len);
        let value = cursor.read_value(0)?;
        Ok((value, cursor.position()))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::SimpleString(s) | Value::Error(s) | Value::BulkString(s) => {
                write!(f, "{}", String::from_utf8_lossy(s))
            }
            Value::Integer(n) => write!(f, "{n}"),
            Value::Null => write!(f, "<nil>"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A cursor for reading RESP data from a buffer.
struct Cursor<'a> {
    buffer: &'a [u8],
    pos: usize,
    max_bulk_string_len: usize,
}

impl<'a> Cursor<'a> {
    fn new(buffer: &'a [u8], max_bulk_string_len: usize) -> Self {
        Self {
            buffer,
            pos: 0,
            max_bulk_string_len,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    #[inline]
    fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn get_u8(&mut self) -> u8 {
        let b = self.buffer[self.pos];
        self.pos += 1;
        b
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        if self.remaining() < 1 {
            return Err(ParseError::Incomplete);
        }
        match self.get_u8() {
            b'+' => Ok(Value::SimpleString(Bytes::copy_from_slice(self.read_line()?))),
            b'-' => Ok(Value::Error(Bytes::copy_from_slice(self.read_line()?))),
            b':' => Ok(Value::Integer(self.read_integer()?)),
            b'$' => self.read_bulk_string(),
            b'*' => {
                let count = self.read_integer()?;
                if count < 0 {
                    return Ok(Value::Null);
                }
                let count = count as usize;
                if count > MAX_ARRAY_LEN {
                    return Err(ParseError::Protocol("array too large".to_string()));
                }
                // Every element takes at least 3 bytes ("+\r\n"), so don't
                // reserve for more than the buffer can hold.
                let mut items = Vec::with_capacity(count.min(self.remaining() / 3));
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            other => Err(ParseError::Protocol(format!(
                "unexpected type byte: 0x{other:02x}"
            ))),
        }
    }

    fn read_integer(&mut self) -> Result<i64, ParseError> {
        let line = self.read_line()?;

        let (negative, digits) = match line.split_first() {
            Some((b'-', rest)) => (true, rest),
            Some((b'+', rest)) => (false, rest),
            _ => (false, line),
        };

        if digits.is_empty() {
            return Err(ParseError::InvalidInteger("empty integer".to_string()));
        }

        // i64::MAX is 19 digits.
        if digits.len() > 19 {
            return Err(ParseError::InvalidInteger("integer too large".to_string()));
        }

        let mut result = 0i64;
        for &byte in digits {
            if !byte.is_ascii_digit() {
                return Err(ParseError::InvalidInteger(
                    "non-digit character".to_string(),
                ));
            }
            result = result
                .checked_mul(10)
                .and_then(|r| r.checked_add((byte - b'0') as i64))
                .ok_or_else(|| ParseError::InvalidInteger("integer overflow".to_string()))?;
        }
        Ok(if negative { -result } else { result })
    }

    fn read_bulk_string(&mut self) -> Result<Value, ParseError> {
        let len = self.read_integer()?;
        if len < 0 {
            return Ok(Value::Null);
        }
        let len = len as usize;

        if len > self.max_bulk_string_len {
            return Err(ParseError::BulkStringTooLong {
                len,
                max: self.max_bulk_string_len,
            });
        }

        if self.remaining() < len + 2 {
            return Err(ParseError::Incomplete);
        }

        let data = &self.buffer[self.pos..self.pos + len];
        self.pos += len;

        if self.get_u8() != b'\r' || self.get_u8() != b'\n' {
            return Err(ParseError::Protocol(
                "expected CRLF after bulk string".to_string(),
            ));
        }

        Ok(Value::BulkString(Bytes::copy_from_slice(data)))
    }

    fn read_line(&mut self) -> Result<&'a [u8], ParseError> {
        let start = self.pos;
        let slice = &self.buffer[start..];

        if let Some(pos) = memchr::memchr(b'\r', slice)
            && let Some(&next) = slice.get(pos + 1)
        {
            if next != b'\n' {
                return Err(ParseError::Protocol("expected CRLF".to_string()));
            }
            let end = start + pos;
            let line = &self.buffer[start..end];
            self.pos = end + 2;
            return Ok(line);
        }

        Err(ParseError::Incomplete)
    }
}
