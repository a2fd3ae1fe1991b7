//! Thread-Safe Storage Engine with Expiry Support
//!
//! Holds string keys, hash keys, and the expiration index for string keys.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                StorageEngine                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │           RwLock<Keyspace>             │  │
//! │  │  strings   hashes   expirations        │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All three maps sit behind one lock and are always updated together, so a
//! reader never observes a string without its expiration or vice versa. The
//! expiry sweeper takes the same lock, which linearizes it with `get`/`set`.
//!
//! Expiration is enforced lazily on every read and delete; the sweeper only
//! reclaims memory.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failures reported by keyed deletes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("key not found")]
    KeyNotFound,

    #[error("field not found")]
    FieldNotFound,
}

/// A hash value: field -> value.
pub type HashFields = HashMap<Bytes, Bytes>;

#[derive(Debug, Default)]
struct Keyspace {
    strings: HashMap<Bytes, Bytes>,
    hashes: HashMap<Bytes, HashFields>,
    /// Absolute expiration per string key. Keys without a TTL have no entry.
    expirations: HashMap<Bytes, Instant>,
}

impl Keyspace {
    #[inline]
    fn is_expired(&self, key: &[u8], now: Instant) -> bool {
        self.expirations
            .get(key)
            .map(|exp| now >= *exp)
            .unwrap_or(false)
    }

    /// Drops `key` if its expiration has passed. Returns true if it was dropped.
    fn evict_if_expired(&mut self, key: &[u8], now: Instant) -> bool {
        if self.is_expired(key, now) {
            self.strings.remove(key);
            self.expirations.remove(key);
            true
        } else {
            false
        }
    }
}

/// The in-memory store shared by every connection.
///
/// Wrap in an `Arc` and hand a clone to each consumer.
///
/// # Example
///
/// ```
/// use gredis::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
///
/// engine.hset(Bytes::from("user:1"), Bytes::from("email"), Bytes::from("a@b.c"));
/// assert_eq!(engine.hget(b"user:1", b"email"), Some(Bytes::from("a@b.c")));
/// ```
pub struct StorageEngine {
    keyspace: RwLock<Keyspace>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    /// Keys removed because their TTL passed (lazily or by the sweeper)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("StorageEngine")
            .field("keys", &stats.keys)
            .field("hashes", &stats.hashes)
            .field("volatile", &stats.volatile)
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the maps half-updated:
    // every mutation is a single insert/remove sequence with no fallible step.
    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.keyspace.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.keyspace.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // STRING OPERATIONS
    // ========================================================================

    /// Sets a key with no expiry, clearing any previous TTL.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.set_with_ttl(key, value, Duration::ZERO);
    }

    /// Sets a key, overwriting any previous value.
    ///
    /// A non-zero `ttl` makes the key expire at now + `ttl`; a zero `ttl`
    /// makes it persistent. A deadline too far out to represent as an
    /// `Instant` also makes the key persistent.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let deadline = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };

        let mut ks = self.write();
        match deadline {
            Some(at) => {
                ks.expirations.insert(key.clone(), at);
            }
            None => {
                ks.expirations.remove(&key);
            }
        }
        ks.strings.insert(key, value);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or its expiration instant is at
    /// or before now. An expired key found here is removed.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        {
            let ks = self.read();
            match ks.strings.get(key) {
                Some(value) if !ks.is_expired(key, now) => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - take the write lock to reclaim it. Another writer may
        // have refreshed the key in between, so re-check.
        let mut ks = self.write();
        if ks.evict_if_expired(key, now) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        ks.strings.get(key).cloned()
    }

    /// Deletes a string key.
    ///
    /// Fails with [`StorageError::KeyNotFound`] if the key does not exist or
    /// has expired.
    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        if ks.evict_if_expired(key, Instant::now()) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::KeyNotFound);
        }

        match ks.strings.remove(key) {
            Some(_) => {
                ks.expirations.remove(key);
                Ok(())
            }
            None => Err(StorageError::KeyNotFound),
        }
    }

    /// Remaining time to live for a string key, `None` if it is missing,
    /// expired, or persistent.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let now = Instant::now();
        let ks = self.read();
        ks.expirations
            .get(key)
            .filter(|exp| now < **exp)
            .map(|exp| *exp - now)
    }

    // ========================================================================
    // HASH OPERATIONS
    // ========================================================================

    /// Sets `field` in hash `hash`, creating the hash on first use.
    pub fn hset(&self, hash: Bytes, field: Bytes, value: Bytes) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        ks.hashes.entry(hash).or_default().insert(field, value);
    }

    pub fn hget(&self, hash: &[u8], field: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let ks = self.read();
        ks.hashes.get(hash).and_then(|fields| fields.get(field)).cloned()
    }

    /// Returns a snapshot of every field in `hash`, or `None` if the hash has
    /// never been created or was removed with [`hdel_all`](Self::hdel_all).
    pub fn hgetall(&self, hash: &[u8]) -> Option<HashFields> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let ks = self.read();
        ks.hashes.get(hash).cloned()
    }

    /// Removes one field. The hash container is kept even when it becomes
    /// empty.
    pub fn hdel(&self, hash: &[u8], field: &[u8]) -> Result<(), StorageError> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        ks.hashes
            .get_mut(hash)
            .and_then(|fields| fields.remove(field))
            .map(|_| ())
            .ok_or(StorageError::FieldNotFound)
    }

    /// Removes a whole hash.
    pub fn hdel_all(&self, hash: &[u8]) -> Result<(), StorageError> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        ks.hashes
            .remove(hash)
            .map(|_| ())
            .ok_or(StorageError::KeyNotFound)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Removes every string key whose expiration has passed.
    ///
    /// Called by the background sweeper. Returns the number of keys removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut ks = self.write();

        let expired: Vec<Bytes> = ks
            .expirations
            .iter()
            .filter(|(_, exp)| now >= **exp)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            ks.strings.remove(key);
            ks.expirations.remove(key);
        }

        let cleaned = expired.len() as u64;
        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }
        cleaned
    }

    /// Number of physically present string keys (expired-but-unswept
    /// included).
    pub fn len(&self) -> usize {
        self.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        let ks = self.read();
        ks.strings.is_empty() && ks.hashes.is_empty()
    }

    pub fn stats(&self) -> StorageStats {
        let ks = self.read();
        StorageStats {
            keys: ks.strings.len() as u64,
            hashes: ks.hashes.len() as u64,
            volatile: ks.expirations.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for operator logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// String keys currently stored
    pub keys: u64,
    /// Hash keys currently stored
    pub hashes: u64,
    /// String keys carrying a TTL
    pub volatile: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    /// Keys reclaimed after their TTL passed
    pub expired: u64,
}
