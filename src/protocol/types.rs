//! RESP Value Type
//!
//! Every frame that crosses the wire, and every record in the append-only
//! log, is a [`RespValue`]. The type tag is the first byte of a line:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-key not found\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null bulk: `$-1\r\n`)
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//!
//! Lines are terminated by CRLF only.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single protocol value.
///
/// Used for incoming requests, outgoing replies and log records alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe line. Must not contain CR or LF.
    SimpleString(String),

    /// Error line, same framing as a simple string.
    Error(String),

    /// Signed 64-bit integer.
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    BulkString(Bytes),

    /// The null bulk string, `$-1\r\n`.
    Null,

    /// Length-prefixed sequence of values.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string value.
    ///
    /// # Example
    /// ```
    /// use gredis::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error value.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use gredis::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Builds a request record from a command name and its arguments,
    /// every element encoded as a bulk string.
    ///
    /// # Example
    /// ```
    /// use gredis::protocol::types::RespValue;
    /// let record = RespValue::command(["SET", "k1", "v1"]);
    /// assert_eq!(record.serialize(), b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n");
    /// ```
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|part| RespValue::BulkString(part.into()))
                .collect(),
        )
    }

    /// Serializes the value to its wire representation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the payload of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

#[inline]
fn write_line(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(" "))
            }
        }
    }
}
