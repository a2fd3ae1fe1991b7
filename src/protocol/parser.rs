//! Incremental RESP Parser
//!
//! The parser works on a byte slice and returns either:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the value is incomplete, more bytes are needed
//! - `Err(ParseError)` - the bytes can never form a valid value
//!
//! Callers append incoming bytes to a buffer, call [`RespParser::parse`], and
//! advance the buffer by `consumed` on success. [`RespReader`](super::RespReader)
//! packages that loop over an async stream.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding RESP data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// First byte of a value is not one of `+ - : $ *`
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Length or integer field is not a base-10 number
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error, or length line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (other than the -1 null marker)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Framing violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The stream closed in the middle of a value
    #[error("unexpected end of stream ({buffered} bytes of a partial value)")]
    UnexpectedEof { buffered: usize },

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevents stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a single line (simple string, error, integer or a
/// length header), excluding the tag and CRLF
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use gredis::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"*1\r\n$4\r\nPING\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::command(["PING"]));
/// assert_eq!(consumed, 14);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current array nesting depth
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => {
                Ok(read_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s.to_string()), n)))
            }
            prefix::ERROR => Ok(read_line(buf)?.map(|(s, n)| (RespValue::Error(s.to_string()), n))),
            prefix::INTEGER => match read_line(buf)? {
                Some((s, n)) => Ok(Some((RespValue::Integer(parse_int(s)?), n))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length_str, header_len) = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let length = parse_int(length_str)?;

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header_len + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count_str, mut consumed) = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let count = parse_int(count_str)?;

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Cap the preallocation: the count comes from the peer.
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the line after the type tag. Returns the line body and the number of
/// bytes consumed including the tag and CRLF.
///
/// Only the first `MAX_LINE_LENGTH + 2` bytes are scanned; a longer line
/// without a CRLF is rejected instead of waiting for more input.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let scan_end = buf.len().min(1 + MAX_LINE_LENGTH + 2);
    match find_crlf(&buf[1..scan_end]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + 2)))
        }
        None if buf.len() - 1 >= MAX_LINE_LENGTH + 2 => Err(ParseError::MessageTooLarge {
            size: buf.len() - 1,
            max: MAX_LINE_LENGTH,
        }),
        None => Ok(None),
    }
}

fn parse_int(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single value from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = parse_message(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert!(parse_message(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let (value, consumed) = parse_message(b"-key not found\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Error("key not found".to_string()));
        assert_eq!(consumed, 16);
    }

    #[test]
    fn test_parse_integer() {
        let (value, consumed) = parse_message(b":1000\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(1000));
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_bulk_string() {
        let (value, consumed) = parse_message(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let (value, consumed) = parse_message(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_parse_bulk_string_incomplete() {
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhello").unwrap().is_none());
    }

    #[test]
    fn test_parse_bulk_string_bad_terminator() {
        let result = parse_message(b"$5\r\nhelloXY");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_parse_negative_bulk_length() {
        let result = parse_message(b"$-2\r\n");
        assert_eq!(result, Err(ParseError::InvalidBulkLength(-2)));
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::command(["GET", "name"]));
        assert_eq!(consumed, 23);
    }

    #[test]
    fn test_parse_empty_array() {
        let (value, _) = parse_message(b"*0\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Array(vec![]));
    }

    #[test]
    fn test_parse_negative_array_length() {
        assert_eq!(
            parse_message(b"*-1\r\n"),
            Err(ParseError::InvalidArrayLength(-1))
        );
    }

    #[test]
    fn test_parse_array_incomplete() {
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parse_message(b"*2\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_nested_array() {
        let input = b"*2\r\n:1\r\n*2\r\n+a\r\n$-1\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::simple_string("a"), RespValue::Null]),
            ])
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_unknown_prefix() {
        assert_eq!(
            parse_message(b"@invalid\r\n"),
            Err(ParseError::UnknownPrefix(b'@'))
        );
    }

    #[test]
    fn test_parse_non_numeric_length() {
        assert!(matches!(
            parse_message(b"$abc\r\nxyz\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_message(b"*x\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_parse_too_deep() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert!(matches!(
            parse_message(&input),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let input = b"+OK\r\n+PONG\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::ok());
        let (next, _) = parse_message(&input[consumed..]).unwrap().unwrap();
        assert_eq!(next, RespValue::pong());
    }

    #[test]
    fn test_roundtrip() {
        let values = [
            RespValue::command(["SET", "key", "value", "10"]),
            RespValue::simple_string("OK"),
            RespValue::error("Unknown Command"),
            RespValue::Integer(-7),
            RespValue::Null,
            RespValue::array(vec![]),
            RespValue::array(vec![
                RespValue::simple_string("field"),
                RespValue::bulk_string(Bytes::from_static(b"\r\n\x00")),
                RespValue::array(vec![RespValue::Null]),
            ]),
        ];

        for original in values {
            let serialized = original.serialize();
            let (parsed, consumed) = parse_message(&serialized).unwrap().unwrap();
            assert_eq!(parsed, original);
            assert_eq!(consumed, serialized.len());
        }
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let (value, _) = parse_message(b"$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from(&b"hel\x00o"[..])));
    }

    #[test]
    fn test_unterminated_line_is_rejected_at_cap() {
        let mut buf = vec![b'+'];
        buf.extend(std::iter::repeat(b'a').take(MAX_LINE_LENGTH + 1));
        assert_eq!(parse_message(&buf), Ok(None));

        buf.push(b'a');
        assert_eq!(
            parse_message(&buf),
            Err(ParseError::MessageTooLarge {
                size: MAX_LINE_LENGTH + 2,
                max: MAX_LINE_LENGTH,
            })
        );
    }

    #[test]
    fn test_line_at_cap_is_accepted() {
        let mut buf = vec![b'+'];
        buf.extend(std::iter::repeat(b'a').take(MAX_LINE_LENGTH));
        buf.extend_from_slice(b"\r\n");

        let (value, consumed) = parse_message(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(value, RespValue::SimpleString("a".repeat(MAX_LINE_LENGTH)));
    }

    #[test]
    fn test_oversized_bulk_length_header() {
        let header = format!("${}\r\n", MAX_BULK_SIZE + 1);
        assert!(matches!(
            parse_message(header.as_bytes()),
            Err(ParseError::MessageTooLarge { .. })
        ));
    }
}
