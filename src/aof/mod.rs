//! Durability Log
//!
//! An append-only file of mutating commands, replayed at startup to rebuild
//! the in-memory store.
//!
//! ## Startup
//!
//! ```text
//! StorageEngine::new()
//!        │
//!        ▼
//! AppendOnlyLog::open(path) ──► replay(|record| handler.execute(record))
//!        │
//!        ▼
//! accept connections (each session appends its SET/HSET/DEL/HDEL/HDELALL)
//! ```
//!
//! Replay goes straight to the [`CommandHandler`](crate::commands::CommandHandler),
//! which never writes to the log, so replayed records are not re-appended.

pub mod log;

pub use log::{AofConfig, AofError, AppendOnlyLog, FsyncPolicy};
