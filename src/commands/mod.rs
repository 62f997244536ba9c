//! Command Handler Module
//!
//! This module implements the command processing layer. It receives complete
//! requests from the connection layer, executes them against the cache, and
//! returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame + Parse  │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  CacheEngine    │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get <key>`
//! - `set <key> <flags> <exptime> <bytes> [noreply]`

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandHandler, Request};
