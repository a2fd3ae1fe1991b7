//! Connection Session Module
//!
//! Each client connection runs in its own task. A session decodes request
//! records from the stream, records mutating commands in the append-only log,
//! and writes one reply per request in request order.
//!
//! ```text
//! TcpListener (main.rs)
//!        │ accept()
//!        ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                        │
//! │                                                          │
//! │  RespReader ──> Command ──> AppendOnlyLog ──> apply()    │
//! │                                                 │        │
//! │                                   reply <───────┘        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions are generic over the stream, so tests drive them with
//! in-memory duplex pipes as well as real sockets.
//!
//! ## Example
//!
//! ```ignore
//! use gredis::connection::{handle_connection, ConnectionStats};
//! use gredis::commands::CommandHandler;
//! use gredis::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, Some(aof), stats));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
