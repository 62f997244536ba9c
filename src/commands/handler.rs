//! Command Handler
//!
//! Executes complete requests against the shared cache and builds the
//! protocol reply. A request is complete once its value block (for `set`)
//! has been read off the wire, so nothing here touches the socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │   Request::Get ──> cmd_get ──┐                              │
//! │                              ├──> CacheEngine ──> Reply     │
//! │   Request::Set ──> cmd_set ──┘                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::Reply;
use crate::storage::CacheEngine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// A request ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Look up a key
    Get { key: Bytes },

    /// Store a value, already stripped of its CRLF terminator
    Set { key: Bytes, value: Bytes },
}

/// Executes requests against the shared cache.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The shared cache
    storage: Arc<CacheEngine>,
}

impl CommandHandler {
    /// Creates a new command handler over the given cache.
    pub fn new(storage: Arc<CacheEngine>) -> Self {
        Self { storage }
    }

    /// Executes a request and returns the reply to send.
    pub fn execute(&self, request: Request) -> Reply {
        match request {
            Request::Get { key } => self.cmd_get(key),
            Request::Set { key, value } => self.cmd_set(key, value),
        }
    }

    /// The cache this handler operates on.
    pub fn storage(&self) -> &Arc<CacheEngine> {
        &self.storage
    }

    fn cmd_get(&self, key: Bytes) -> Reply {
        match self.storage.get(&key) {
            Some(data) => {
                trace!(key = %String::from_utf8_lossy(&key), bytes = data.len(), "Hit");
                Reply::Value { key, data }
            }
            None => {
                trace!(key = %String::from_utf8_lossy(&key), "Miss");
                Reply::End
            }
        }
    }

    fn cmd_set(&self, key: Bytes, value: Bytes) -> Reply {
        trace!(key = %String::from_utf8_lossy(&key), bytes = value.len(), "Store");
        self.storage.set(key, value);
        Reply::Stored
    }
}
