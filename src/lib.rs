//! # gredis - An In-Memory Key-Value Server with an Append-Only Log
//!
//! gredis keeps string keys (with optional TTLs) and hash keys in memory,
//! speaks the RESP wire protocol over TCP, and records every mutating command
//! in an append-only log that is replayed on startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               gredis                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Session    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                   ┌─────────────┐    ┌──────────────────────────┐   │
//! │                   │ AppendOnly  │    │      StorageEngine       │   │
//! │                   │    Log      │    │ strings │ hashes │ TTLs  │   │
//! │                   └──────┬──────┘    └──────────────────────────┘   │
//! │                          │ replay at startup  ▲                     │
//! │                          └────────────────────┤                     │
//! │                                               │                     │
//! │                              ┌────────────────┴──────────────┐      │
//! │                              │        ExpirySweeper          │      │
//! │                              │   (Background Tokio Task)     │      │
//! │                              └───────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use gredis::aof::AppendOnlyLog;
//! use gredis::commands::CommandHandler;
//! use gredis::connection::{handle_connection, ConnectionStats};
//! use gredis::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let handler = CommandHandler::new(Arc::clone(&storage));
//!
//!     let aof = Arc::new(AppendOnlyLog::open("appendonly.aof").await?);
//!     aof.replay(|record| {
//!         handler.execute(record);
//!     })
//!     .await?;
//!
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6252").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler.clone(),
//!             Some(Arc::clone(&aof)),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `SET key value [ttlSeconds]`
//! - `GET key`
//! - `DEL key`
//! - `HSET hash field value`
//! - `HGET hash field`
//! - `HGETALL hash`
//! - `HDEL hash field`
//! - `HDELALL hash`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value type, parser and streaming reader
//! - [`storage`]: Thread-safe storage engine with TTL support
//! - [`commands`]: Command parsing and dispatch
//! - [`aof`]: The append-only durability log
//! - [`connection`]: Client sessions
//!
//! ## Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: a read that finds an expired key removes it and reports it absent
//! 2. **Active**: a background task periodically removes every expired key

pub mod aof;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use aof::{AofConfig, AppendOnlyLog, FsyncPolicy};
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespReader, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port gredis listens on
pub const DEFAULT_PORT: u16 = 6252;

/// The default host gredis binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default append-only log file, relative to the working directory
pub const DEFAULT_AOF_PATH: &str = "appendonly.aof";

/// Version of gredis
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
