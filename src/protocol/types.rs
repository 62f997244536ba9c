//! Memcached Text Protocol Types
//!
//! This module defines the requests the server understands and the replies
//! it sends back. Only the `get` and `set` storage commands are supported.
//!
//! ## Protocol Format
//!
//! Every command line and every reply line is terminated with CRLF (`\r\n`).
//!
//! ```text
//! set <key> <flags> <exptime> <bytes> [noreply]\r\n
//! <data block of <bytes> bytes>\r\n
//!
//! get <key>\r\n
//! ```
//!
//! ## Replies
//!
//! Stored: `STORED\r\n`
//! Hit: `VALUE <key> 0 <bytes>\r\n<data>\r\nEND\r\n`
//! Miss: `END\r\n`
//! Unknown command: `ERROR\r\n`
//! Malformed request: `CLIENT_ERROR <message>\r\n`
//! Server refusal: `SERVER_ERROR <message>\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used by the memcached text protocol
pub const CRLF: &[u8] = b"\r\n";

/// Command verbs and keywords. Matching is case-sensitive, like memcached.
pub mod verb {
    pub const GET: &[u8] = b"get";
    pub const SET: &[u8] = b"set";
    pub const NOREPLY: &[u8] = b"noreply";
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `get <key>`
    Get { key: Bytes },

    /// `set <key> <flags> <exptime> <bytes> [noreply]`
    ///
    /// The data block has not been read yet when this is produced.
    Set(SetCommand),
}

/// The header line of a `set` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCommand {
    pub key: Bytes,
    /// Opaque client flags. Validated, then ignored.
    pub flags: u32,
    /// Expiry time. Validated, then ignored.
    pub exptime: i64,
    /// Declared payload length, excluding the trailing CRLF.
    pub bytes: usize,
    /// Accepted for compatibility; the reply is sent regardless.
    pub noreply: bool,
}

impl SetCommand {
    /// Number of bytes the client sends after the command line: the payload
    /// followed by its CRLF terminator.
    pub fn frame_len(&self) -> usize {
        self.bytes.saturating_add(CRLF.len())
    }
}

/// A reply written back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `STORED\r\n`
    Stored,

    /// A cache hit: `VALUE <key> 0 <bytes>\r\n<data>\r\nEND\r\n`
    Value { key: Bytes, data: Bytes },

    /// A cache miss (or the end of a hit): `END\r\n`
    End,

    /// Unknown command: `ERROR\r\n`
    Error,

    /// The request was malformed: `CLIENT_ERROR <message>\r\n`
    ClientError(String),

    /// The request was well-formed but cannot be served: `SERVER_ERROR <message>\r\n`
    ServerError(String),
}

impl Reply {
    /// Creates a `CLIENT_ERROR` reply.
    pub fn client_error(message: impl Into<String>) -> Self {
        Reply::ClientError(message.into())
    }

    /// Creates a `SERVER_ERROR` reply.
    pub fn server_error(message: impl Into<String>) -> Self {
        Reply::ServerError(message.into())
    }

    /// Serializes the reply to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Stored => {
                buf.extend_from_slice(b"STORED");
                buf.extend_from_slice(CRLF);
            }
            Reply::Value { key, data } => {
                buf.extend_from_slice(b"VALUE ");
                buf.extend_from_slice(key);
                // Flags are not stored, so they always read back as 0.
                buf.extend_from_slice(b" 0 ");
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(b"END");
                buf.extend_from_slice(CRLF);
            }
            Reply::End => {
                buf.extend_from_slice(b"END");
                buf.extend_from_slice(CRLF);
            }
            Reply::Error => {
                buf.extend_from_slice(b"ERROR");
                buf.extend_from_slice(CRLF);
            }
            Reply::ClientError(message) => {
                buf.extend_from_slice(b"CLIENT_ERROR ");
                buf.extend_from_slice(message.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::ServerError(message) => {
                buf.extend_from_slice(b"SERVER_ERROR ");
                buf.extend_from_slice(message.as_bytes());
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Rough size hint for the serialized form.
    fn encoded_len(&self) -> usize {
        match self {
            Reply::Value { key, data } => key.len() + data.len() + 32,
            Reply::ClientError(message) | Reply::ServerError(message) => message.len() + 16,
            _ => 8,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Stored => write!(f, "STORED"),
            Reply::Value { key, data } => write!(
                f,
                "VALUE {} ({} bytes)",
                String::from_utf8_lossy(key),
                data.len()
            ),
            Reply::End => write!(f, "END"),
            Reply::Error => write!(f, "ERROR"),
            Reply::ClientError(message) => write!(f, "CLIENT_ERROR {}", message),
            Reply::ServerError(message) => write!(f, "SERVER_ERROR {}", message),
        }
    }
}
