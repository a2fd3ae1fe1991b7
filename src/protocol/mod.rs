//! RESP Protocol Codec
//!
//! Lossless encode/decode between [`RespValue`] and its wire form. The same
//! framing is used on client connections and inside the append-only log.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and serialization
//! - `parser`: incremental parser over a byte buffer
//! - `reader`: streaming decoder over any `AsyncRead`
//!
//! ## Example
//!
//! ```
//! use gredis::protocol::{parse_message, RespValue};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(value, RespValue::command(["GET", "name"]));
//! assert_eq!(consumed, data.len());
//! ```

pub mod parser;
pub mod reader;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use reader::{ReadError, RespReader};
pub use types::RespValue;
