//! Streaming decoder over an async byte stream.
//!
//! TCP and files both deliver bytes in arbitrary chunks: one read may hold
//! half a value or several values. [`RespReader`] keeps a `BytesMut` buffer,
//! asks the [`RespParser`] for a complete value, and reads more bytes only
//! when the buffer holds an incomplete one.

use crate::protocol::parser::{MAX_BULK_SIZE, MAX_LINE_LENGTH};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Most bytes one undecoded value may occupy in the buffer: the largest bulk
/// payload plus room for the headers around it.
pub const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 16 * MAX_LINE_LENGTH;

/// Errors from [`RespReader::read_value`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),
}

/// Decodes a sequence of [`RespValue`]s from an `AsyncRead`.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use gredis::protocol::{RespReader, RespValue};
///
/// let bytes: &[u8] = b"+OK\r\n$-1\r\n";
/// let mut reader = RespReader::new(bytes);
/// assert_eq!(reader.read_value().await.unwrap(), Some(RespValue::ok()));
/// assert_eq!(reader.read_value().await.unwrap(), Some(RespValue::Null));
/// assert_eq!(reader.read_value().await.unwrap(), None);
/// # });
/// ```
#[derive(Debug)]
pub struct RespReader<R> {
    inner: R,
    buffer: BytesMut,
    parser: RespParser,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            bytes_read: 0,
        }
    }

    /// Reads the next complete value.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between values, and
    /// [`ParseError::UnexpectedEof`] when it ends inside one.
    pub async fn read_value(&mut self) -> Result<Option<RespValue>, ReadError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    self.buffer.advance(consumed);
                    trace!(consumed, remaining = self.buffer.len(), "Decoded value");
                    return Ok(Some(value));
                }
            }

            if self.buffer.len() >= MAX_BUFFER_SIZE {
                return Err(ParseError::MessageTooLarge {
                    size: self.buffer.len(),
                    max: MAX_BUFFER_SIZE,
                }
                .into());
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ParseError::UnexpectedEof {
                    buffered: self.buffer.len(),
                }
                .into());
            }
            self.bytes_read += n as u64;
        }
    }

    /// Total bytes pulled from the underlying stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The underlying stream, e.g. to write requests on a duplex socket.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}
