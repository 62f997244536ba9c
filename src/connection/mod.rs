//! Connection Handler Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task; connections share only the
//! cache and the statistics counters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ FrameReader │───>│ Parse line  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Pipelining**: Several commands in one TCP segment are answered in order
//! - **Idle timeout**: Silent peers are disconnected
//! - **Statistics**: Tracks connection and command metrics
//!
//! ## Example
//!
//! ```ignore
//! use lrucached::connection::{handle_connection, ConnectionOptions, ConnectionStats};
//! use lrucached::commands::CommandHandler;
//! use lrucached::storage::CacheEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(CacheEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, ConnectionOptions::default(), stats));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionOptions, ConnectionStats,
};
