//! Command Dispatcher
//!
//! Maps a [`Command`] to a storage operation and builds the reply.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────────┐    ┌─────────────┐                    │
//! │  │ Command::from_resp│───>│   apply()   │───> RespValue      │
//! │  └──────────────────┘    └──────┬──────┘                    │
//! │                                  ▼                          │
//! │                           StorageEngine                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Command | Reply |
//! |---|---|
//! | `PING [msg]` | `+PONG` or bulk `msg` |
//! | `SET key value [ttl]` | `+OK` |
//! | `GET key` | bulk value or null |
//! | `DEL key` | `+OK` or `-key not found` |
//! | `HSET hash field value` | `+OK` |
//! | `HGET hash field` | bulk value or null |
//! | `HGETALL hash` | array of field/value simple strings, or null |
//! | `HDEL hash field` | `+OK` or `-field not found` |
//! | `HDELALL hash` | `+OK` or `-key not found` |
//!
//! Errors never escape as Rust errors: every failure becomes an error reply
//! and the connection carries on.

use crate::commands::{Command, CommandError};
use crate::protocol::RespValue;
use crate::storage::{StorageEngine, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// Executes commands against a shared [`StorageEngine`].
///
/// Cheap to clone; each connection gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Parses and executes a request record, returning the reply.
    ///
    /// # Example
    ///
    /// ```
    /// use gredis::commands::CommandHandler;
    /// use gredis::protocol::RespValue;
    /// use gredis::storage::StorageEngine;
    /// use std::sync::Arc;
    ///
    /// let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    /// let reply = handler.execute(RespValue::command(["SET", "k1", "v1", "0"]));
    /// assert_eq!(reply, RespValue::ok());
    /// ```
    pub fn execute(&self, record: RespValue) -> RespValue {
        match Command::from_resp(&record) {
            Ok(command) => self.apply(&command),
            Err(e) => command_error(e),
        }
    }

    /// Executes an already-parsed command.
    pub fn apply(&self, command: &Command) -> RespValue {
        trace!(command = command.name(), "Executing command");

        match command {
            Command::Ping(None) => RespValue::pong(),
            Command::Ping(Some(msg)) => RespValue::bulk_string(msg.clone()),

            Command::Set { key, value, ttl } => {
                self.storage
                    .set_with_ttl(key.clone(), value.clone(), *ttl);
                RespValue::ok()
            }

            Command::Get { key } => match self.storage.get(key) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },

            Command::Del { key } => ok_or_error(self.storage.delete(key)),

            Command::HSet { hash, field, value } => {
                self.storage
                    .hset(hash.clone(), field.clone(), value.clone());
                RespValue::ok()
            }

            Command::HGet { hash, field } => match self.storage.hget(hash, field) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },

            Command::HGetAll { hash } => match self.storage.hgetall(hash) {
                Some(fields) => {
                    // Sorted by field so replies are deterministic.
                    let mut pairs: Vec<(Bytes, Bytes)> = fields.into_iter().collect();
                    pairs.sort();
                    let items = pairs
                        .into_iter()
                        .flat_map(|(field, value)| [simple(&field), simple(&value)])
                        .collect();
                    RespValue::array(items)
                }
                None => RespValue::null(),
            },

            Command::HDel { hash, field } => ok_or_error(self.storage.hdel(hash, field)),

            Command::HDelAll { hash } => ok_or_error(self.storage.hdel_all(hash)),
        }
    }
}

fn ok_or_error(result: Result<(), StorageError>) -> RespValue {
    match result {
        Ok(()) => RespValue::ok(),
        Err(e) => RespValue::error(e.to_string()),
    }
}

fn command_error(e: CommandError) -> RespValue {
    RespValue::error(e.to_string())
}

/// Simple strings are single lines; CR/LF in stored data would break the
/// framing, so they are replaced with spaces.
fn simple(data: &[u8]) -> RespValue {
    let text = String::from_utf8_lossy(data).replace(['\r', '\n'], " ");
    RespValue::simple_string(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::command(args.iter().map(|s| Bytes::from(s.to_string())))
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["PING"]));
        assert_eq!(response, RespValue::simple_string("PONG"));

        let response = handler.execute(make_command(&["ping", "hello"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_set_with_ttl() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value", "100"]));
        assert_eq!(response, RespValue::ok());

        let ttl = handler.storage().ttl(b"key").unwrap();
        assert!(ttl > Duration::from_secs(98) && ttl <= Duration::from_secs(100));

        handler.execute(make_command(&["SET", "key", "value", "0"]));
        assert_eq!(handler.storage().ttl(b"key"), None);
    }

    #[test]
    fn test_set_invalid_ttl() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value", "soon"]));
        assert_eq!(response, RespValue::error("ERR invalid TTL value"));
        assert_eq!(handler.execute(make_command(&["GET", "key"])), RespValue::null());
    }

    #[test]
    fn test_set_ttl_overflow_is_rejected() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "k", "v", "18446744073709551615"]));
        assert_eq!(response, RespValue::error("ERR invalid TTL value"));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
    }

    #[test]
    fn test_example_scenario() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "k1", "v1", "0"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(make_command(&["GET", "k1"])),
            RespValue::bulk_string(Bytes::from("v1"))
        );
        assert_eq!(handler.execute(make_command(&["DEL", "k1"])), RespValue::ok());
        assert_eq!(handler.execute(make_command(&["GET", "k1"])), RespValue::null());
        assert_eq!(
            handler.execute(make_command(&["DEL", "k1"])),
            RespValue::error("key not found")
        );
    }

    #[test]
    fn test_hash_commands() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["HSET", "user", "name", "Ariz"])),
            RespValue::ok()
        );
        handler.execute(make_command(&["HSET", "user", "city", "Pune"]));

        assert_eq!(
            handler.execute(make_command(&["HGET", "user", "name"])),
            RespValue::bulk_string(Bytes::from("Ariz"))
        );
        assert_eq!(
            handler.execute(make_command(&["HGET", "user", "age"])),
            RespValue::null()
        );
        assert_eq!(
            handler.execute(make_command(&["HGETALL", "user"])),
            RespValue::array(vec![
                RespValue::simple_string("city"),
                RespValue::simple_string("Pune"),
                RespValue::simple_string("name"),
                RespValue::simple_string("Ariz"),
            ])
        );
        assert_eq!(
            handler.execute(make_command(&["HGETALL", "nobody"])),
            RespValue::null()
        );

        assert_eq!(
            handler.execute(make_command(&["HDEL", "user", "city"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(make_command(&["HDEL", "user", "city"])),
            RespValue::error("field not found")
        );

        assert_eq!(
            handler.execute(make_command(&["HDELALL", "user"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(make_command(&["HDELALL", "user"])),
            RespValue::error("key not found")
        );
        assert_eq!(
            handler.execute(make_command(&["HGETALL", "user"])),
            RespValue::null()
        );
    }

    #[test]
    fn test_hgetall_sanitizes_line_breaks() {
        let handler = create_handler();

        handler.execute(make_command(&["HSET", "h", "f", "two\r\nlines"]));
        let reply = handler.execute(make_command(&["HGETALL", "h"]));
        assert_eq!(
            reply,
            RespValue::array(vec![
                RespValue::simple_string("f"),
                RespValue::simple_string("two  lines"),
            ])
        );
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'GET' command")
        );
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["UNKNOWN"]));
        assert_eq!(response, RespValue::error("Unknown Command"));
    }

    #[test]
    fn test_invalid_format() {
        let handler = create_handler();

        let response = handler.execute(RespValue::Integer(5));
        assert_eq!(response, RespValue::error("ERR invalid command format"));
    }
}
