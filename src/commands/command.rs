//! Typed commands.
//!
//! A request record is parsed into a [`Command`] before anything touches the
//! store, so arity and argument checks happen in one place and the
//! dispatcher's `match` is checked for exhaustiveness by the compiler.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reasons a record cannot be turned into a [`Command`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Not a non-empty array of bulk or simple strings
    #[error("ERR invalid command format")]
    InvalidFormat,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR invalid TTL value")]
    InvalidTtl,

    #[error("Unknown Command")]
    Unknown(String),
}

/// Every command the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING [message]`
    Ping(Option<Bytes>),
    /// `SET key value [ttlSeconds]`; a zero TTL means no expiry
    Set { key: Bytes, value: Bytes, ttl: Duration },
    /// `GET key`
    Get { key: Bytes },
    /// `DEL key`
    Del { key: Bytes },
    /// `HSET hash field value`
    HSet { hash: Bytes, field: Bytes, value: Bytes },
    /// `HGET hash field`
    HGet { hash: Bytes, field: Bytes },
    /// `HGETALL hash`
    HGetAll { hash: Bytes },
    /// `HDEL hash field`
    HDel { hash: Bytes, field: Bytes },
    /// `HDELALL hash`
    HDelAll { hash: Bytes },
}

impl Command {
    /// Parses a request record. The command name is matched
    /// case-insensitively; arity is strict.
    ///
    /// # Example
    ///
    /// ```
    /// use gredis::commands::Command;
    /// use gredis::protocol::RespValue;
    /// use bytes::Bytes;
    ///
    /// let cmd = Command::from_resp(&RespValue::command(["get", "k1"])).unwrap();
    /// assert_eq!(cmd, Command::Get { key: Bytes::from("k1") });
    /// ```
    pub fn from_resp(record: &RespValue) -> Result<Command, CommandError> {
        let parts = record.as_array().ok_or(CommandError::InvalidFormat)?;
        let (name, args) = parts.split_first().ok_or(CommandError::InvalidFormat)?;

        let name = name.as_bytes().ok_or(CommandError::InvalidFormat)?;
        let args = args
            .iter()
            .map(RespValue::as_bytes)
            .collect::<Option<Vec<Bytes>>>()
            .ok_or(CommandError::InvalidFormat)?;

        let upper = String::from_utf8_lossy(&name).to_ascii_uppercase();
        let mut args = args.into_iter();

        let command = match (upper.as_str(), args.len()) {
            ("PING", 0) => Command::Ping(None),
            ("PING", 1) => Command::Ping(args.next()),
            ("PING", _) => return Err(CommandError::WrongArity("PING")),

            ("SET", 2 | 3) => {
                let key = next(&mut args);
                let value = next(&mut args);
                let ttl = match args.next() {
                    Some(raw) => parse_ttl(&raw)?,
                    None => Duration::ZERO,
                };
                Command::Set { key, value, ttl }
            }
            ("SET", _) => return Err(CommandError::WrongArity("SET")),

            ("GET", 1) => Command::Get { key: next(&mut args) },
            ("GET", _) => return Err(CommandError::WrongArity("GET")),

            ("DEL", 1) => Command::Del { key: next(&mut args) },
            ("DEL", _) => return Err(CommandError::WrongArity("DEL")),

            ("HSET", 3) => Command::HSet {
                hash: next(&mut args),
                field: next(&mut args),
                value: next(&mut args),
            },
            ("HSET", _) => return Err(CommandError::WrongArity("HSET")),

            ("HGET", 2) => Command::HGet {
                hash: next(&mut args),
                field: next(&mut args),
            },
            ("HGET", _) => return Err(CommandError::WrongArity("HGET")),

            ("HGETALL", 1) => Command::HGetAll { hash: next(&mut args) },
            ("HGETALL", _) => return Err(CommandError::WrongArity("HGETALL")),

            ("HDEL", 2) => Command::HDel {
                hash: next(&mut args),
                field: next(&mut args),
            },
            ("HDEL", _) => return Err(CommandError::WrongArity("HDEL")),

            ("HDELALL", 1) => Command::HDelAll { hash: next(&mut args) },
            ("HDELALL", _) => return Err(CommandError::WrongArity("HDELALL")),

            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(command)
    }

    /// Upper-case command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::HSet { .. } => "HSET",
            Command::HGet { .. } => "HGET",
            Command::HGetAll { .. } => "HGETALL",
            Command::HDel { .. } => "HDEL",
            Command::HDelAll { .. } => "HDELALL",
        }
    }

    /// Whether the command changes the store and so belongs in the
    /// append-only log.
    pub fn is_mutating(&self) -> bool {
        match self {
            Command::Set { .. }
            | Command::Del { .. }
            | Command::HSet { .. }
            | Command::HDel { .. }
            | Command::HDelAll { .. } => true,
            Command::Ping(_)
            | Command::Get { .. }
            | Command::HGet { .. }
            | Command::HGetAll { .. } => false,
        }
    }
}

// Arity was checked by the caller's match arm.
fn next(args: &mut std::vec::IntoIter<Bytes>) -> Bytes {
    args.next().unwrap_or_default()
}

/// TTL in whole seconds, base-10, non-negative, and small enough that
/// now + TTL is a representable instant.
fn parse_ttl(raw: &[u8]) -> Result<Duration, CommandError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .filter(|ttl| Instant::now().checked_add(*ttl).is_some())
        .ok_or(CommandError::InvalidTtl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(parts: &[&str]) -> Result<Command, CommandError> {
        Command::from_resp(&RespValue::command(
            parts.iter().map(|s| Bytes::from(s.to_string())),
        ))
    }

    #[test]
    fn test_name_is_case_insensitive() {
        assert_eq!(
            parse(&["sEt", "k", "v"]),
            Ok(Command::Set {
                key: Bytes::from("k"),
                value: Bytes::from("v"),
                ttl: Duration::ZERO,
            })
        );
        assert_eq!(parse(&["ping"]), Ok(Command::Ping(None)));
    }

    #[test]
    fn test_set_ttl() {
        assert_eq!(
            parse(&["SET", "k", "v", "10"]),
            Ok(Command::Set {
                key: Bytes::from("k"),
                value: Bytes::from("v"),
                ttl: Duration::from_secs(10),
            })
        );
        assert_eq!(parse(&["SET", "k", "v", "-1"]), Err(CommandError::InvalidTtl));
        assert_eq!(parse(&["SET", "k", "v", "ten"]), Err(CommandError::InvalidTtl));
        assert_eq!(parse(&["SET", "k", "v", ""]), Err(CommandError::InvalidTtl));
    }

    #[test]
    fn test_set_ttl_upper_bound() {
        assert_eq!(
            parse(&["SET", "k", "v", "18446744073709551615"]),
            Err(CommandError::InvalidTtl)
        );
        assert_eq!(
            parse(&["SET", "k", "v", "18446744073709551616"]),
            Err(CommandError::InvalidTtl)
        );
        // A year is fine.
        assert!(parse(&["SET", "k", "v", "31536000"]).is_ok());
    }

    #[test]
    fn test_strict_arity() {
        assert_eq!(parse(&["SET", "k"]), Err(CommandError::WrongArity("SET")));
        assert_eq!(
            parse(&["SET", "k", "v", "1", "x"]),
            Err(CommandError::WrongArity("SET"))
        );
        assert_eq!(parse(&["GET"]), Err(CommandError::WrongArity("GET")));
        assert_eq!(parse(&["DEL", "a", "b"]), Err(CommandError::WrongArity("DEL")));
        assert_eq!(parse(&["HSET", "h", "f"]), Err(CommandError::WrongArity("HSET")));
        assert_eq!(parse(&["HGET", "h"]), Err(CommandError::WrongArity("HGET")));
        assert_eq!(parse(&["HGETALL"]), Err(CommandError::WrongArity("HGETALL")));
        assert_eq!(parse(&["HDEL", "h"]), Err(CommandError::WrongArity("HDEL")));
        assert_eq!(
            parse(&["HDELALL", "h", "x"]),
            Err(CommandError::WrongArity("HDELALL"))
        );
        assert_eq!(parse(&["PING", "a", "b"]), Err(CommandError::WrongArity("PING")));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse(&["FLUSHALL"]).unwrap_err();
        assert_eq!(err, CommandError::Unknown("FLUSHALL".to_string()));
        assert_eq!(err.to_string(), "Unknown Command");
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            Command::from_resp(&RespValue::simple_string("PING")),
            Err(CommandError::InvalidFormat)
        );
        assert_eq!(
            Command::from_resp(&RespValue::array(vec![])),
            Err(CommandError::InvalidFormat)
        );
        assert_eq!(
            Command::from_resp(&RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("GET")),
                RespValue::Integer(1),
            ])),
            Err(CommandError::InvalidFormat)
        );
    }

    #[test]
    fn test_simple_string_arguments_accepted() {
        let record = RespValue::array(vec![
            RespValue::simple_string("GET"),
            RespValue::simple_string("k"),
        ]);
        assert_eq!(
            Command::from_resp(&record),
            Ok(Command::Get { key: Bytes::from("k") })
        );
    }

    #[test]
    fn test_is_mutating() {
        for parts in [
            &["SET", "k", "v"][..],
            &["DEL", "k"],
            &["HSET", "h", "f", "v"],
            &["HDEL", "h", "f"],
            &["HDELALL", "h"],
        ] {
            assert!(parse(parts).unwrap().is_mutating(), "{:?}", parts);
        }
        for parts in [
            &["PING"][..],
            &["GET", "k"],
            &["HGET", "h", "f"],
            &["HGETALL", "h"],
        ] {
            assert!(!parse(parts).unwrap().is_mutating(), "{:?}", parts);
        }
    }
}
