//! Append-Only Log
//!
//! Every mutating command is appended to the log as the exact RESP bytes of
//! its request record. There is no header, checksum or index: the file is a
//! flat sequence of values in wire format, so the same [`RespReader`] that
//! serves client connections reads it back at startup.
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nDEL\r\n$2\r\nk1\r\n...
//! └──────────────── record 1 ──────────────┘└──────── record 2 ───────┘
//! ```
//!
//! The log is never truncated or compacted. Appends are serialized by a
//! mutex around the file handle and each record is self-framed, so a crash
//! can lose the tail but cannot interleave two records.

use crate::protocol::{ReadError, RespReader, RespValue};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// When appended bytes are forced to stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// `fdatasync` after every append.
    Always,
    /// Flush to the OS and let it decide.
    #[default]
    No,
}

impl std::str::FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(FsyncPolicy::Always),
            "no" => Ok(FsyncPolicy::No),
            other => Err(format!("unknown fsync policy '{}' (expected always|no)", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AofConfig {
    pub fsync: FsyncPolicy,
}

/// Errors from the append-only log.
#[derive(Debug, thiserror::Error)]
pub enum AofError {
    #[error("append-only log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file holds bytes that do not decode, or ends mid-record.
    #[error("append-only log {path} is corrupt after {records} records: {reason}")]
    Corrupt {
        path: PathBuf,
        records: usize,
        reason: String,
    },
}

/// The durability log shared by every connection.
#[derive(Debug)]
pub struct AppendOnlyLog {
    path: PathBuf,
    file: Mutex<File>,
    config: AofConfig,
}

impl AppendOnlyLog {
    /// Opens (creating if needed) the log at `path` with default settings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AofError> {
        Self::open_with(path, AofConfig::default()).await
    }

    pub async fn open_with(path: impl AsRef<Path>, config: AofConfig) -> Result<Self, AofError> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opening append-only log");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AofError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), fsync = ?config.fsync, "Append-only log opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. The bytes have been handed to the OS (and synced,
    /// under [`FsyncPolicy::Always`]) when this returns `Ok`.
    pub async fn append(&self, record: &RespValue) -> Result<(), AofError> {
        let bytes = record.serialize();

        let mut file = self.file.lock().await;
        file.write_all(&bytes).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        if self.config.fsync == FsyncPolicy::Always {
            file.sync_data().await.map_err(|e| self.io_error(e))?;
        }

        trace!(bytes = bytes.len(), "Appended record");
        Ok(())
    }

    /// Reads the log from the beginning and hands each record to `apply`, in
    /// file order. Returns the number of records replayed.
    ///
    /// Any undecodable byte, including a record cut short by a crash, fails
    /// the whole replay.
    pub async fn replay<F>(&self, mut apply: F) -> Result<usize, AofError>
    where
        F: FnMut(RespValue),
    {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No log file, nothing to replay");
                return Ok(0);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut reader = RespReader::new(BufReader::new(file));
        let mut records = 0usize;

        loop {
            match reader.read_value().await {
                Ok(Some(record)) => {
                    apply(record);
                    records += 1;
                }
                Ok(None) => break,
                Err(ReadError::Io(e)) => return Err(self.io_error(e)),
                Err(ReadError::Parse(e)) => {
                    return Err(AofError::Corrupt {
                        path: self.path.clone(),
                        records,
                        reason: e.to_string(),
                    })
                }
            }
        }

        info!(
            path = %self.path.display(),
            records,
            bytes = reader.bytes_read(),
            "Append-only log replayed"
        );
        Ok(records)
    }

    /// Forces everything written so far to stable storage.
    pub async fn sync(&self) -> Result<(), AofError> {
        let file = self.file.lock().await;
        file.sync_all().await.map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> AofError {
        AofError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
