//! Command Dispatcher Module
//!
//! Turns decoded request records into storage operations and replies.
//!
//! ```text
//! Request record
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command         │  parse + validate (command.rs)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  dispatch (handler.rs)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │
//! └─────────────────┘
//! ```
//!
//! The dispatcher holds nothing but its engine reference. Logging mutating
//! commands to the append-only log is the connection's job, which keeps
//! startup replay from re-appending what it reads.

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
