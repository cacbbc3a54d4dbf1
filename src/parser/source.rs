//! Low-level input handling: byte sources and the character source.
//!
//! [`ByteSource`] is the abstract resource contract: sequential bytes plus
//! a rewind used when an external entity turns out to have no text
//! declaration. [`CharSource`] sits on top and presents the input as a
//! stream of Unicode scalar values with one-character lookahead, UTF-8
//! validation, end-of-line normalization (XML 1.0 §2.11), and line/column
//! tracking.

use std::io::{Read, Seek, SeekFrom};

use crate::error::SourceLocation;

/// A sequential byte stream with rewind support.
///
/// The parser consumes resources exclusively through this trait: the main
/// document, external DTD subsets, and external entities each open one
/// byte source, owned by the stream that reads it. `seek_to_start` is only
/// used when an external entity lacks a text declaration and the already
/// consumed prefix must be re-read as content.
pub trait ByteSource {
    /// Returns the next byte, or `None` at end of input.
    fn next_byte(&mut self) -> std::io::Result<Option<u8>>;

    /// Rewinds the source to its first byte.
    fn seek_to_start(&mut self) -> std::io::Result<()>;
}

impl<T: Read + Seek> ByteSource for T {
    fn next_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn seek_to_start(&mut self) -> std::io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

/// A failure while producing characters from a byte source.
#[derive(Debug)]
pub(crate) enum SourceError {
    /// The underlying byte source failed.
    Io(std::io::Error),
    /// A malformed UTF-8 sequence or a code point beyond U+10FFFF.
    InvalidUtf8,
}

impl SourceError {
    pub(crate) fn message(&self) -> String {
        match self {
            Self::Io(e) => format!("I/O error: {e}"),
            Self::InvalidUtf8 => "invalid UTF-8 sequence".to_string(),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A character stream over a [`ByteSource`].
///
/// Decodes UTF-8 one scalar at a time, normalizes `\r\n` and lone `\r` to
/// `\n` before the parser sees them, and tracks the 1-based line and
/// column of the next unconsumed character.
pub(crate) struct CharSource<'a> {
    source: Box<dyn ByteSource + 'a>,
    /// The normalized lookahead character, if already decoded.
    lookahead: Option<char>,
    /// A decoded character displaced by `\r` normalization, delivered
    /// before any further decoding.
    displaced: Option<char>,
    line: u32,
    column: u32,
}

impl<'a> CharSource<'a> {
    pub fn new(source: Box<dyn ByteSource + 'a>) -> Self {
        Self {
            source,
            lookahead: None,
            displaced: None,
            line: 1,
            column: 1,
        }
    }

    /// The location of the next unconsumed character.
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }

    /// Returns the current character without consuming it, or `None` at
    /// end of input.
    pub fn peek(&mut self) -> Result<Option<char>, SourceError> {
        if self.lookahead.is_some() {
            return Ok(self.lookahead);
        }
        let c = match self.displaced.take() {
            Some(c) => Some(c),
            None => self.decode_scalar()?,
        };
        let Some(c) = c else {
            return Ok(None);
        };
        if c == '\r' {
            // End-of-line normalization: CR LF and lone CR both become LF.
            match self.decode_scalar()? {
                Some('\n') | None => {}
                other => self.displaced = other,
            }
            self.lookahead = Some('\n');
        } else {
            self.lookahead = Some(c);
        }
        Ok(self.lookahead)
    }

    /// Consumes the current character. Panics if called past end of input
    /// without a preceding successful `peek`.
    pub fn advance(&mut self) {
        match self.lookahead.take() {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => unreachable!("advance past end of input"),
        }
    }

    /// Consumes and returns the next character, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<char>, SourceError> {
        let c = self.peek()?;
        if c.is_some() {
            self.advance();
        }
        Ok(c)
    }

    /// Rewinds to the first byte, discarding lookahead and location state.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.source.seek_to_start()?;
        self.lookahead = None;
        self.displaced = None;
        self.line = 1;
        self.column = 1;
        Ok(())
    }

    /// Decodes one UTF-8 scalar from the byte source.
    ///
    /// One leading byte `0xxxxxxx` yields ASCII; otherwise the count of
    /// leading ones gives the sequence length (2–4), each continuation
    /// byte must begin `10`, and the result must be a Unicode scalar
    /// value no greater than U+10FFFF.
    fn decode_scalar(&mut self) -> Result<Option<char>, SourceError> {
        let Some(first) = self.source.next_byte()? else {
            return Ok(None);
        };
        if first < 0x80 {
            return Ok(Some(first as char));
        }
        let (len, mut value) = match first {
            0xC0..=0xDF => (2, u32::from(first & 0x1F)),
            0xE0..=0xEF => (3, u32::from(first & 0x0F)),
            0xF0..=0xF7 => (4, u32::from(first & 0x07)),
            _ => return Err(SourceError::InvalidUtf8),
        };
        for _ in 1..len {
            let Some(byte) = self.source.next_byte()? else {
                return Err(SourceError::InvalidUtf8);
            };
            if byte & 0xC0 != 0x80 {
                return Err(SourceError::InvalidUtf8);
            }
            value = (value << 6) | u32::from(byte & 0x3F);
        }
        char::from_u32(value)
            .map(Some)
            .ok_or(SourceError::InvalidUtf8)
    }
}
