//! Memcached Text Protocol Implementation
//!
//! This module implements the subset of the memcached text protocol the
//! server speaks: `get` and `set`.
//!
//! ## Modules
//!
//! - `framing`: Buffered reader that turns a byte stream into lines and blocks
//! - `parser`: Turns a command line into a [`Command`]
//! - `types`: Commands, replies, and protocol constants
//!
//! ## Example
//!
//! ```ignore
//! use lrucached::protocol::{parse_command, FrameReader, Reply};
//!
//! let mut reader = FrameReader::new(socket);
//! let line = reader.read_line().await?;
//! let command = parse_command(&line)?;
//!
//! let bytes = Reply::Stored.serialize();
//! ```

pub mod framing;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use framing::{FrameError, FrameReader};
pub use parser::{parse_command, ParseError, ParseResult};
pub use types::{Command, Reply, SetCommand, CRLF};
