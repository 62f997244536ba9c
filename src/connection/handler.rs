//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading commands and sending
//! replies in the order the commands arrived.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read line (FrameReader) │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse get / set         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ set: read <bytes>+CRLF  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute, send reply     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Peer closes, goes idle, or sends an unrecoverable frame
//!        │
//!        ▼
//! 5. Writer shut down, handler task ends
//! ```
//!
//! Malformed commands are answered and the connection carries on. Only a
//! broken stream (EOF, idle timeout, over-long line, truncated value) ends it.

use crate::commands::{CommandHandler, Request};
use crate::config::{Config, DEFAULT_MAX_VALUE_SIZE};
use crate::protocol::framing::{DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT};
use crate::protocol::{parse_command, Command, FrameError, FrameReader, Reply, SetCommand, CRLF};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands answered
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
    }
}

/// Per-connection settings, copied out of [`Config`] once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Bytes pulled from the socket per read
    pub chunk_size: usize,
    /// Close the connection after this long without incoming bytes
    pub idle_timeout: Duration,
    /// Largest value a `set` may store
    pub max_value_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl From<&Config> for ConnectionOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            idle_timeout: config.idle_timeout,
            max_value_size: config.max_value_size,
        }
    }
}

/// Handles a single client connection.
///
/// Generic over the two halves of the transport so the same loop runs over
/// a TCP stream or an in-memory pipe.
pub struct ConnectionHandler<R, W> {
    /// Framed read half
    reader: FrameReader<R>,

    /// Buffered write half
    writer: BufWriter<W>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The command handler (shared cache behind it)
    command_handler: CommandHandler,

    /// Largest value a `set` may store
    max_value_size: usize,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Portion of `reader.bytes_read()` already added to `stats`
    reported_read: u64,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - The read half of the transport
    /// * `writer` - The write half of the transport
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing requests
    /// * `options` - Chunk size, idle timeout, and value size limit
    /// * `stats` - Shared connection statistics
    pub fn new(
        reader: R,
        writer: W,
        addr: SocketAddr,
        command_handler: CommandHandler,
        options: &ConnectionOptions,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            reader: FrameReader::with_config(reader, options.chunk_size, options.idle_timeout),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
            max_value_size: options.max_value_size,
            stats,
            reported_read: 0,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Returns once the connection is over. A peer that closed or went idle
    /// between commands is reported as [`ConnectionError::Closed`] or
    /// [`ConnectionError::IdleTimeout`]; both are normal endings.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;
        self.record_bytes_read();

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected"),
            Err(e) if e.is_disconnect() => {
                debug!(client = %self.addr, reason = %e, "Client disconnected")
            }
            Err(e @ ConnectionError::ValueTruncated { .. }) => {
                warn!(client = %self.addr, error = %e, "Value block truncated, nothing stored")
            }
            Err(e) => debug!(client = %self.addr, error = %e, "Connection ended with error"),
        }

        if let Err(e) = self.writer.shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown after close failed");
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let line = match self.reader.read_line().await {
                Ok(line) => line,
                Err(e @ FrameError::LineTooLong { .. }) => {
                    self.send_reply(&Reply::client_error("line too long")).await;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            let reply = match parse_command(&line) {
                Ok(Command::Get { key }) => self.command_handler.execute(Request::Get { key }),
                Ok(Command::Set(set)) => self.handle_set(set).await?,
                Err(e) => {
                    trace!(client = %self.addr, error = %e, "Rejected command line");
                    e.reply()
                }
            };

            self.record_bytes_read();
            self.stats.command_processed();
            self.send_reply(&reply).await;
        }
    }

    /// Reads the value block of a `set` and stores it.
    async fn handle_set(&mut self, set: SetCommand) -> Result<Reply, ConnectionError> {
        if set.bytes > self.max_value_size {
            debug!(
                client = %self.addr,
                key = %String::from_utf8_lossy(&set.key),
                bytes = set.bytes,
                max = self.max_value_size,
                "Value too large, discarding"
            );
            if let Err(e) = self.reader.skip(set.frame_len()).await {
                return Err(ConnectionError::from_value_read(&set.key, e));
            }
            return Ok(Reply::server_error("object too large for cache"));
        }

        let mut block = match self.reader.read_exact(set.frame_len()).await {
            Ok(block) => block,
            Err(e) => return Err(ConnectionError::from_value_read(&set.key, e)),
        };

        if !block.ends_with(CRLF) {
            trace!(client = %self.addr, bytes = set.bytes, "Value block not terminated by CRLF");
            return Ok(Reply::client_error("bad data chunk"));
        }
        block.truncate(set.bytes);

        Ok(self.command_handler.execute(Request::Set {
            key: set.key,
            value: block,
        }))
    }

    /// Sends a reply to the client.
    ///
    /// A failed write is logged and otherwise ignored; the next read sees
    /// the closed peer and ends the loop.
    async fn send_reply(&mut self, reply: &Reply) {
        let bytes = reply.serialize();

        match self.write_frame(&bytes).await {
            Ok(()) => {
                self.stats.bytes_written(bytes.len() as u64);
                trace!(client = %self.addr, reply = %reply, bytes = bytes.len(), "Sent reply");
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Failed to send reply"),
        }
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    fn record_bytes_read(&mut self) {
        let total = self.reader.bytes_read();
        self.stats.bytes_read(total - self.reported_read);
        self.reported_read = total;
    }
}

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Peer closed the connection between commands
    #[error("Client disconnected")]
    Closed,

    /// No bytes arrived within the idle timeout
    #[error("Idle for {0:?}")]
    IdleTimeout(Duration),

    /// Peer stopped before sending the whole value block of a `set`
    #[error("Value for {key:?} truncated: expected {expected} bytes, received {received}")]
    ValueTruncated {
        key: String,
        expected: usize,
        received: usize,
    },

    /// Any other framing or I/O failure
    #[error("Frame error: {0}")]
    Frame(FrameError),
}

impl ConnectionError {
    /// True for the normal endings: peer closed or went idle.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ConnectionError::Closed | ConnectionError::IdleTimeout(_))
    }

    fn from_value_read(key: &Bytes, err: FrameError) -> Self {
        match err {
            FrameError::Truncated { expected, received } => ConnectionError::ValueTruncated {
                key: String::from_utf8_lossy(key).into_owned(),
                expected,
                received,
            },
            other => other.into(),
        }
    }
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Closed => ConnectionError::Closed,
            FrameError::IdleTimeout(idle) => ConnectionError::IdleTimeout(idle),
            other => ConnectionError::Frame(other),
        }
    }
}

/// Handles a client connection.
///
/// This is a convenience function that splits the stream, creates a
/// ConnectionHandler and runs it to completion. The handler logs how the
/// connection ended.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        trace!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let handler = ConnectionHandler::new(reader, writer, addr, command_handler, &options, stats);
    let _ = handler.run().await;
}
