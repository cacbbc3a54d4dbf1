//! Active entity inclusions.
//!
//! An [`EntityStream`] represents one entity whose replacement text is
//! currently being read: an internal entity owns a decoded buffer and a
//! cursor, an external entity owns the [`CharSource`] opened over its
//! system identifier. Streams are stacked by the parser (general and
//! parameter entities separately) and popped when their last character is
//! consumed.
//!
//! A parameter entity included outside an entity value reads as
//! `SPACE text SPACE` (XML 1.0 §4.4.8); inside an entity value no padding
//! is applied. On opening, an external entity may begin with a text
//! declaration (`<?xml version="1.0" encoding="utf-8"?>`), which is
//! consumed here; if the signature is absent the stream is rewound to its
//! start.

use crate::parser::source::{ByteSource, CharSource, SourceError};
use crate::{chars, error::SourceLocation};

enum StreamKind {
    Internal { text: Vec<char>, pos: usize },
    External { chars: CharSource<'static> },
}

/// One active entity inclusion.
pub(crate) struct EntityStream {
    /// The entity name; empty for the external DTD subset.
    pub name: String,
    /// `true` for parameter entities (and the external subset).
    pub is_parameter: bool,
    /// `true` when the replacement text comes from an external resource.
    pub is_external: bool,
    kind: StreamKind,
    /// Apply the surrounding-space padding rule.
    pad: bool,
    leading_space_done: bool,
    trailing_space_done: bool,
    /// The underlying text has been fully consumed.
    exhausted: bool,
}

impl EntityStream {
    /// Creates a stream over an internal entity's replacement text.
    pub fn internal(name: &str, is_parameter: bool, text: &str, pad: bool) -> Self {
        Self {
            name: name.to_string(),
            is_parameter,
            is_external: false,
            kind: StreamKind::Internal {
                text: text.chars().collect(),
                pos: 0,
            },
            pad,
            leading_space_done: !pad,
            trailing_space_done: !pad,
            exhausted: false,
        }
    }

    /// Creates a stream over an external entity, consuming its text
    /// declaration if one is present.
    pub fn external(
        name: &str,
        is_parameter: bool,
        source: Box<dyn ByteSource>,
        pad: bool,
    ) -> Result<Self, String> {
        let mut chars = CharSource::new(source);
        parse_text_declaration(&mut chars)?;
        Ok(Self {
            name: name.to_string(),
            is_parameter,
            is_external: true,
            kind: StreamKind::External { chars },
            pad,
            leading_space_done: !pad,
            trailing_space_done: !pad,
            exhausted: false,
        })
    }

    /// Returns the current character without consuming it, or `None` once
    /// the stream (including any trailing pad space) is spent.
    pub fn peek(&mut self) -> Result<Option<char>, SourceError> {
        if !self.leading_space_done {
            return Ok(Some(' '));
        }
        let underlying = match &mut self.kind {
            StreamKind::Internal { text, pos } => text.get(*pos).copied(),
            StreamKind::External { chars } => chars.peek()?,
        };
        match underlying {
            Some(c) => Ok(Some(c)),
            None => {
                self.exhausted = true;
                if self.trailing_space_done {
                    Ok(None)
                } else {
                    Ok(Some(' '))
                }
            }
        }
    }

    /// Consumes the character last returned by `peek`.
    pub fn advance(&mut self) {
        if !self.leading_space_done {
            self.leading_space_done = true;
            return;
        }
        if self.exhausted {
            debug_assert!(!self.trailing_space_done);
            self.trailing_space_done = true;
            return;
        }
        match &mut self.kind {
            StreamKind::Internal { text, pos } => {
                debug_assert!(*pos < text.len());
                *pos += 1;
            }
            StreamKind::External { chars } => chars.advance(),
        }
    }

    /// Returns `true` once every character (padding included) is consumed.
    pub fn at_end(&mut self) -> Result<bool, SourceError> {
        Ok(self.peek()?.is_none())
    }

    /// The location within the external resource, if this stream is
    /// external.
    pub fn location(&self) -> Option<SourceLocation> {
        match &self.kind {
            StreamKind::Internal { .. } => None,
            StreamKind::External { chars } => Some(chars.location()),
        }
    }
}

/// Consumes a text declaration at the start of an external entity.
///
/// ```text
/// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
/// ```
///
/// The declaration is recognized by the signature `<?xml` followed by
/// whitespace; anything else rewinds the stream so the prefix is re-read
/// as ordinary content. Once recognized, the encoding pseudo-attribute is
/// mandatory and must name `utf-8` (compared case-insensitively).
fn parse_text_declaration(chars: &mut CharSource<'_>) -> Result<(), String> {
    let source_err = |e: SourceError| e.message();
    let rewind = |chars: &mut CharSource<'_>| {
        chars
            .rewind()
            .map_err(|e| format!("cannot rewind external entity: {e}"))
    };

    for expected in "<?xml".chars() {
        match chars.peek().map_err(source_err)? {
            Some(c) if c == expected => chars.advance(),
            _ => return rewind(chars),
        }
    }
    match chars.peek().map_err(source_err)? {
        Some(c) if chars::is_whitespace(c) => {}
        _ => return rewind(chars),
    }
    skip_whitespace(chars).map_err(source_err)?;

    let mut name = pseudo_attribute_name(chars).map_err(source_err)?;
    if name == "version" {
        let version = pseudo_attribute_value(chars)?;
        if !is_valid_version(&version) {
            return Err(format!("invalid version number '{version}' in text declaration"));
        }
        if !skip_whitespace(chars).map_err(source_err)? {
            return Err("whitespace required before encoding declaration".to_string());
        }
        name = pseudo_attribute_name(chars).map_err(source_err)?;
    }
    if name != "encoding" {
        return Err("text declaration requires an encoding declaration".to_string());
    }
    let encoding = pseudo_attribute_value(chars)?.to_lowercase();
    if encoding != "utf-8" {
        return Err(format!("unsupported encoding '{encoding}'"));
    }

    skip_whitespace(chars).map_err(source_err)?;
    for expected in "?>".chars() {
        match chars.next().map_err(source_err)? {
            Some(c) if c == expected => {}
            _ => return Err("expected '?>' to close text declaration".to_string()),
        }
    }
    Ok(())
}

fn skip_whitespace(chars: &mut CharSource<'_>) -> Result<bool, SourceError> {
    let mut any = false;
    while let Some(c) = chars.peek()? {
        if !chars::is_whitespace(c) {
            break;
        }
        chars.advance();
        any = true;
    }
    Ok(any)
}

fn pseudo_attribute_name(chars: &mut CharSource<'_>) -> Result<String, SourceError> {
    let mut name = String::new();
    while let Some(c) = chars.peek()? {
        if c.is_ascii_lowercase() {
            name.push(c);
            chars.advance();
        } else {
            break;
        }
    }
    Ok(name)
}

fn pseudo_attribute_value(chars: &mut CharSource<'_>) -> Result<String, String> {
    let source_err = |e: SourceError| e.message();
    skip_whitespace(chars).map_err(source_err)?;
    match chars.next().map_err(source_err)? {
        Some('=') => {}
        _ => return Err("expected '=' in text declaration".to_string()),
    }
    skip_whitespace(chars).map_err(source_err)?;
    let quote = match chars.next().map_err(source_err)? {
        Some(q @ ('"' | '\'')) => q,
        _ => return Err("expected quoted value in text declaration".to_string()),
    };
    let mut value = String::new();
    loop {
        match chars.next().map_err(source_err)? {
            Some(c) if c == quote => break,
            Some(c) => value.push(c),
            None => return Err("unexpected end of input in text declaration".to_string()),
        }
    }
    Ok(value)
}

/// `VersionNum ::= '1.' [0-9]+` (XML 1.0 §2.8).
pub(crate) fn is_valid_version(s: &str) -> bool {
    s.strip_prefix("1.")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
