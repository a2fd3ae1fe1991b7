//! Storage Engine Module
//!
//! A thread-safe in-memory store of string keys and hash keys with TTL
//! support on string keys, plus the background expiry sweeper.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               StorageEngine                 │
//! │   RwLock { strings, hashes, expirations }   │
//! └─────────────────────────────────────────────┘
//!                       ▲
//!                       │
//!         ┌─────────────┴─────────────┐
//!         │      ExpirySweeper        │
//!         │  (Background Tokio Task)  │
//!         └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use gredis::storage::{StorageEngine, StorageError};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set_with_ttl(Bytes::from("k1"), Bytes::from("v1"), Duration::from_secs(3600));
//! assert_eq!(engine.get(b"k1"), Some(Bytes::from("v1")));
//!
//! engine.delete(b"k1").unwrap();
//! assert_eq!(engine.delete(b"k1"), Err(StorageError::KeyNotFound));
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{HashFields, StorageEngine, StorageError, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
