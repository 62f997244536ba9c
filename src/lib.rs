//! # lrucached - A Small Memcached-Compatible Cache Server
//!
//! lrucached speaks the `get`/`set` subset of the memcached text protocol
//! and keeps a fixed number of entries, evicting the least recently used
//! one when full.
//!
//! ## Features
//!
//! - **Memcached-Compatible**: `get` and `set` over the text protocol
//! - **Bounded**: An O(1) LRU cache with a fixed entry capacity
//! - **Stream-Safe**: Commands and values may arrive split or pipelined
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              lrucached                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌──────────────────────────────┐    ┌────────────────────────────────┐ │
//! │  │ FrameReader + parse_command  │    │          CacheEngine           │ │
//! │  │ (lines, value blocks, idle)  │    │  Mutex<LruCache<Bytes,Bytes>>  │ │
//! │  └──────────────────────────────┘    └────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use lrucached::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `set <key> <flags> <exptime> <bytes> [noreply]` followed by the data block
//! - `get <key>`
//!
//! Flags and expiry are validated and then ignored: values are stored
//! without metadata and never expire.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Stream framing, command parsing, and reply encoding
//! - [`storage`]: The LRU cache and its thread-safe wrapper
//! - [`commands`]: Executes requests against the cache
//! - [`connection`]: Client connection management
//! - [`server`]: Listener setup and the accept loop
//! - [`config`]: Startup configuration and argument parsing

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionOptions, ConnectionStats};
pub use protocol::{parse_command, FrameReader, ParseError, Reply};
pub use server::{Server, StartupError};
pub use storage::{CacheEngine, LruCache};

/// The default port lrucached listens on (same as memcached)
pub const DEFAULT_PORT: u16 = 11211;

/// The default host lrucached binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of lrucached
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
