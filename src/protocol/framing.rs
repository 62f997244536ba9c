//! Framed Stream Reader
//!
//! TCP is a byte stream: a command line or a value block may arrive split
//! across many reads, and one read may carry several commands. `FrameReader`
//! hides that and offers two operations:
//!
//! - [`FrameReader::read_line`]: the bytes up to the next CRLF
//! - [`FrameReader::read_exact`]: exactly `n` bytes
//!
//! ## Buffer Management
//!
//! ```text
//!   buffer: [ consumed... | line bytes ... \r \n | next command ... ]
//!                           ^                      ^
//!                           split_to(pos)          advance(2)
//! ```
//!
//! Each refill pulls at most `chunk_size` bytes from the transport. Bytes
//! already scanned for a terminator are not scanned again after a refill.
//!
//! ## Idle Timeout and EOF
//!
//! Every transport read is bounded by `idle_timeout`. A read that returns
//! zero bytes means the peer closed the connection, which is reported
//! separately from an idle peer.

use crate::protocol::types::CRLF;
use bytes::{Buf, Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Default number of bytes pulled from the transport per read
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default time a read may wait for bytes before the peer is presumed gone
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum length of a command line, excluding its CRLF
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Most `read_exact` reserves up front; larger blocks grow as bytes arrive
const MAX_PREALLOC: usize = 1024 * 1024;

/// Errors produced while framing the byte stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the connection between commands
    #[error("connection closed by peer")]
    Closed,

    /// No bytes arrived within the idle timeout
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    /// The peer closed the connection in the middle of a line
    #[error("connection closed with {0} bytes of an unterminated line")]
    UnexpectedEof(usize),

    /// A line grew past [`MAX_LINE_LENGTH`] without a terminator
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    /// The stream ended (closed or idle) before a block was complete
    #[error("expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// I/O error from the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A buffered reader that yields command lines and fixed-size blocks.
#[derive(Debug)]
pub struct FrameReader<R> {
    /// The underlying transport
    inner: R,

    /// Bytes read from the transport but not yet handed out
    buffer: BytesMut,

    /// Prefix of `buffer` already known to contain no CRLF
    scanned: usize,

    /// Upper bound for a single transport read
    chunk_size: usize,

    /// How long a single transport read may wait
    idle_timeout: Duration,

    /// Total bytes pulled from the transport
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a reader with the default chunk size and idle timeout.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT)
    }

    /// Creates a reader with an explicit chunk size and idle timeout.
    ///
    /// A chunk size of zero is treated as one.
    pub fn with_config(inner: R, chunk_size: usize, idle_timeout: Duration) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            buffer: BytesMut::with_capacity(chunk_size),
            scanned: 0,
            chunk_size,
            idle_timeout,
            bytes_read: 0,
        }
    }

    /// Reads the next command line, without its CRLF terminator.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Closed`] if the peer closed with nothing buffered
    /// - [`FrameError::UnexpectedEof`] if the peer closed mid-line
    /// - [`FrameError::IdleTimeout`] if the peer stopped sending
    /// - [`FrameError::LineTooLong`] if no CRLF shows up within the limit
    pub async fn read_line(&mut self) -> Result<Bytes, FrameError> {
        loop {
            if let Some(pos) = self.find_crlf() {
                let line = self.buffer.split_to(pos).freeze();
                self.buffer.advance(CRLF.len());
                self.scanned = 0;
                return Ok(line);
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(FrameError::LineTooLong {
                    max: MAX_LINE_LENGTH,
                });
            }

            if self.fill().await? == 0 {
                return Err(if self.buffer.is_empty() {
                    FrameError::Closed
                } else {
                    FrameError::UnexpectedEof(self.buffer.len())
                });
            }
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// Buffered bytes are used first; the transport is read until `n` bytes
    /// are available. At most 1 MiB is reserved before the bytes arrive.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] with the number of bytes received
    /// so far if the peer closes or goes idle before `n` bytes arrive.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, FrameError> {
        self.scanned = 0;
        if n > self.buffer.len() {
            self.buffer.reserve((n - self.buffer.len()).min(MAX_PREALLOC));
        }

        while self.buffer.len() < n {
            let received = self.buffer.len();
            self.fill_or_truncate(n, received).await?;
        }

        Ok(self.buffer.split_to(n).freeze())
    }

    /// Discards exactly `n` bytes without keeping them in memory.
    ///
    /// # Errors
    ///
    /// Same as [`FrameReader::read_exact`].
    pub async fn skip(&mut self, n: usize) -> Result<(), FrameError> {
        self.scanned = 0;
        let mut remaining = n;

        loop {
            let take = remaining.min(self.buffer.len());
            self.buffer.advance(take);
            remaining -= take;

            if remaining == 0 {
                return Ok(());
            }

            self.fill_or_truncate(n, n - remaining).await?;
        }
    }

    /// Total bytes read from the transport so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Finds the first CRLF past the already-scanned prefix.
    fn find_crlf(&mut self) -> Option<usize> {
        let start = self.scanned;
        let found = self.buffer[start..]
            .windows(CRLF.len())
            .position(|window| window == CRLF)
            .map(|pos| start + pos);

        if found.is_none() {
            // Keep the last byte: it may be a CR whose LF has not arrived yet.
            self.scanned = self.buffer.len().saturating_sub(1);
        }

        found
    }

    /// Pulls up to `chunk_size` bytes from the transport.
    ///
    /// Returns the number of bytes read; zero means EOF.
    async fn fill(&mut self) -> Result<usize, FrameError> {
        self.buffer.reserve(self.chunk_size);

        let mut limited = (&mut self.inner).take(self.chunk_size as u64);
        let result =
            tokio::time::timeout(self.idle_timeout, limited.read_buf(&mut self.buffer)).await;

        match result {
            Ok(Ok(n)) => {
                self.bytes_read += n as u64;
                trace!(bytes = n, buffered = self.buffer.len(), "Read chunk");
                Ok(n)
            }
            Ok(Err(e)) => Err(FrameError::Io(e)),
            Err(_) => Err(FrameError::IdleTimeout(self.idle_timeout)),
        }
    }

    /// Like `fill`, but reports EOF and idle timeout as a truncated block.
    async fn fill_or_truncate(
        &mut self,
        expected: usize,
        received: usize,
    ) -> Result<(), FrameError> {
        match self.fill().await {
            Ok(0) | Err(FrameError::IdleTimeout(_)) => {
                Err(FrameError::Truncated { expected, received })
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
