//! Connection Session
//!
//! One session per client. It owns the client's duplex stream and runs until
//! the stream ends.
//!
//! ## Session Loop
//!
//! ```text
//!    ┌──────────────────────────────┐
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode request          │ │  RespReader
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse Command           │ │  bad arity → error reply
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Append to log           │ │  mutating commands only
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Apply + send reply      │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//! ```
//!
//! A decode failure ends the session. Command errors are replies.

use crate::aof::AppendOnlyLog;
use crate::commands::{Command, CommandHandler};
use crate::protocol::{ParseError, ReadError, RespReader, RespValue};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tracing::{debug, error, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Mutating commands whose log append failed
    pub aof_write_errors: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aof_write_failed(&self) {
        self.aof_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed or truncated request
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
}

impl From<ReadError> for ConnectionError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => ConnectionError::IoError(e),
            ReadError::Parse(e) => ConnectionError::ParseError(e),
        }
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler<S> {
    reader: RespReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,

    /// Peer name used in log events
    peer: String,

    command_handler: CommandHandler,

    /// Where mutating commands are recorded. `None` runs without durability.
    aof: Option<Arc<AppendOnlyLog>>,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Creates a session over `stream`.
    ///
    /// * `peer` - how the client shows up in logs (usually its socket address)
    /// * `aof` - the shared log, or `None` to skip durability
    pub fn new(
        stream: S,
        peer: impl fmt::Display,
        command_handler: CommandHandler,
        aof: Option<Arc<AppendOnlyLog>>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: RespReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer: peer.to_string(),
            command_handler,
            aof,
            stats,
        }
    }

    /// Runs the session until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.stats.connection_opened();
        info!(client = %self.peer, "Client connected");

        let result = self.main_loop().await;
        self.stats.bytes_read(self.reader.bytes_read());

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.peer, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(record) = self.reader.read_value().await? {
            let response = self.handle_record(record).await;
            self.stats.command_processed();
            self.send_response(&response).await?;
        }
        Ok(())
    }

    /// Parse → log → apply for one request record.
    async fn handle_record(&self, record: RespValue) -> RespValue {
        let command = match Command::from_resp(&record) {
            Ok(command) => command,
            Err(e) => {
                debug!(client = %self.peer, error = %e, "Rejected command");
                return RespValue::error(e.to_string());
            }
        };

        if command.is_mutating() {
            if let Some(aof) = &self.aof {
                // No rollback: the command is applied either way.
                if let Err(e) = aof.append(&record).await {
                    self.stats.aof_write_failed();
                    error!(
                        client = %self.peer,
                        command = command.name(),
                        error = %e,
                        "Failed to append command to log"
                    );
                }
            }
        }

        self.command_handler.apply(&command)
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.peer, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Runs a session to completion, logging how it ended.
pub async fn handle_connection<S>(
    stream: S,
    peer: impl fmt::Display,
    command_handler: CommandHandler,
    aof: Option<Arc<AppendOnlyLog>>,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite,
{
    let handler = ConnectionHandler::new(stream, peer, command_handler, aof, stats);
    // `run` already logged the outcome.
    let _ = handler.run().await;
}
