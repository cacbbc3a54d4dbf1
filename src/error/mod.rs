//! Error types and diagnostics for XML parsing.
//!
//! This module provides structured error reporting with source location
//! tracking. Errors carry line and column information plus the stack of
//! external resources that were open when the failure occurred, so an error
//! inside an external DTD subset or external entity names the file it came
//! from.
//!
//! Parsing fails fast: the first well-formedness or validity violation
//! aborts the parse and surfaces as a single [`ParseError`].

use std::fmt;
use std::path::PathBuf;

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error type returned when XML parsing or validation fails.
///
/// Parse-time errors carry the location of the offending character.
/// Validation errors are produced by a pass over the finished tree and
/// carry no location.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the source the error occurred, if known.
    pub location: Option<SourceLocation>,
    /// Stack of external resources open at the time of the error,
    /// outermost first. Empty when parsing a plain string with no
    /// external entities active.
    pub resources: Vec<PathBuf>,
}

impl ParseError {
    /// Creates an error with no location, as produced by the validator.
    pub(crate) fn validity(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            resources: Vec::new(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "parse error at {loc}: {}", self.message)?,
            None => write!(f, "validation error: {}", self.message)?,
        }
        if let Some(innermost) = self.resources.last() {
            write!(f, " (in {})", innermost.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
