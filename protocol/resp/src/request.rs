//! Client-side request encoding.

/// A command to send, as a list of arguments including the command name.
///
/// Every argument is encoded as a bulk string:
/// `*<argc>\r\n$<len>\r\n<arg>\r\n...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    args: Vec<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// Start a request with the given command name.
    pub fn new(name: &'a [u8]) -> Self {
        Self { args: vec![name] }
    }

    /// Build a request from a full argument list.
    pub fn from_args<A: AsRef<[u8]> + ?Sized>(args: &'a [&'a A]) -> Self {
        Self {
            args: args.iter().map(|a| a.as_ref()).collect(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: &'a [u8]) -> Self {
        self.args.push(arg);
        self
    }

    pub fn ping() -> Self {
        Self::new(b"PING")
    }

    pub fn get(key: &'a [u8]) -> Self {
        Self::new(b"GET").arg(key)
    }

    pub fn set(key: &'a [u8], value: &'a [u8]) -> Self {
        Self::new(b"SET").arg(key).arg(value)
    }

    pub fn del(key: &'a [u8]) -> Self {
        Self::new(b"DEL").arg(key)
    }

    /// Number of bytes [`encode`](Self::encode) will write.
    pub fn encoded_len(&self) -> usize {
        let mut len = 1 + decimal_len(self.args.len() as u64) + 2;
        for arg in &self.args {
            len += 1 + decimal_len(arg.len() as u64) + 2 + arg.len() + 2;
        }
        len
    }

    /// Append the RESP encoding of this request to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.push(b'*');
        push_decimal(buf, self.args.len() as u64);
        buf.extend_from_slice(b"\r\n");
        for arg in &self.args {
            buf.push(b'$');
            push_decimal(buf, arg.len() as u64);
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
    }
}

/// Write a u64 as decimal digits into a Vec.
fn push_decimal(buf: &mut Vec<u8>, n: u64) {
    if n == 0 {
        buf.push(b'0');
        return;
    }
    let start = buf.len();
    let mut val = n;
    while val > 0 {
        buf.push(b'0' + (val % 10) as u8);
        val /= 10;
    }
    buf[start..].reverse();
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}
