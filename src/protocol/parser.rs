//! Command Line Parser
//!
//! Turns one command line (already stripped of its CRLF by the framed
//! reader) into a [`Command`].
//!
//! ## Grammar
//!
//! ```text
//! line    := get | set
//! get     := "get" SP key [SP token]*
//! set     := "set" SP key SP flags SP exptime SP bytes [SP "noreply"]
//! key     := 1*(non-whitespace byte)
//! flags   := u32
//! exptime := i64
//! bytes   := usize
//! ```
//!
//! Tokens are separated by runs of ASCII whitespace. `get` stops consuming
//! tokens after the key. A `set` line is validated completely; anything
//! missing, non-numeric, or extra is rejected instead of being truncated.
//!
//! Keys are slices of the input line; the cache copies them when storing.

use crate::protocol::types::{verb, Command, Reply, SetCommand};
use bytes::Bytes;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The line contained no tokens at all
    #[error("empty command line")]
    Empty,

    /// The verb is not `get` or `set`
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The verb was not followed by a key
    #[error("missing key")]
    MissingKey,

    /// A required `set` argument was missing
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// A numeric `set` argument did not parse
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// Tokens after the last accepted `set` argument
    #[error("unexpected trailing argument: {0:?}")]
    TooManyArguments(String),
}

impl ParseError {
    /// The protocol reply for this error.
    ///
    /// Unknown verbs get a bare `ERROR`, malformed known commands get a
    /// `CLIENT_ERROR`, matching what memcached clients expect.
    pub fn reply(&self) -> Reply {
        match self {
            ParseError::Empty | ParseError::UnknownCommand(_) => Reply::Error,
            _ => Reply::client_error("bad command line format"),
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a single command line.
pub fn parse_command(line: &Bytes) -> ParseResult<Command> {
    let mut tokens = Tokens::new(line);

    let name = tokens.next().ok_or(ParseError::Empty)?;
    match &name[..] {
        verb::GET => parse_get(&mut tokens),
        verb::SET => parse_set(&mut tokens),
        other => Err(ParseError::UnknownCommand(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

fn parse_get(tokens: &mut Tokens<'_>) -> ParseResult<Command> {
    let key = tokens.next().ok_or(ParseError::MissingKey)?;
    Ok(Command::Get { key })
}

fn parse_set(tokens: &mut Tokens<'_>) -> ParseResult<Command> {
    let key = tokens.next().ok_or(ParseError::MissingKey)?;
    let flags = parse_number(tokens, "flags")?;
    let exptime = parse_number(tokens, "exptime")?;
    let bytes = parse_number(tokens, "bytes")?;

    let noreply = match tokens.next() {
        None => false,
        Some(token) if &token[..] == verb::NOREPLY => true,
        Some(token) => {
            return Err(ParseError::TooManyArguments(
                String::from_utf8_lossy(&token).into_owned(),
            ))
        }
    };

    if let Some(token) = tokens.next() {
        return Err(ParseError::TooManyArguments(
            String::from_utf8_lossy(&token).into_owned(),
        ));
    }

    Ok(Command::Set(SetCommand {
        key,
        flags,
        exptime,
        bytes,
        noreply,
    }))
}

fn parse_number<T: FromStr>(tokens: &mut Tokens<'_>, field: &'static str) -> ParseResult<T> {
    let token = tokens.next().ok_or(ParseError::MissingArgument(field))?;
    std::str::from_utf8(&token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: String::from_utf8_lossy(&token).into_owned(),
        })
}

/// Iterator over whitespace-separated tokens of a line.
struct Tokens<'a> {
    line: &'a Bytes,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a Bytes) -> Self {
        Self { line, pos: 0 }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let buf = &self.line[..];

        while self.pos < buf.len() && buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos == buf.len() {
            return None;
        }

        let start = self.pos;
        while self.pos < buf.len() && !buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }

        Some(self.line.slice(start..self.pos))
    }
}
