//! Shared parser state and lexical helpers.
//!
//! [`ParserInput`] owns the character source of the main document plus the
//! stacks of active entity inclusions (general and parameter entities are
//! tracked separately), the resource-path stack used for error reporting
//! and relative system-identifier resolution, and the document-level
//! flags. A set of in-progress entity names per stack guards against
//! recursive self-reference.
//!
//! Reads are character-at-a-time with one-character lookahead. `peek`
//! transparently drains exhausted entity streams, so the stack depth
//! observed alongside a character identifies the entity that produced it —
//! this is what enforces the same-entity rules for quoted literals and for
//! start/end tag pairing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::chars;
use crate::error::{ParseError, SourceLocation};
use crate::parser::entity::EntityStream;
use crate::parser::source::{ByteSource, CharSource, SourceError};
use crate::parser::EntityOpener;
use crate::validation::dtd::{EntityDecl, ExternalId};

/// Names exempt from the reserved-prefix check.
const RESERVED_NAME_EXEMPTIONS: [&str; 2] = ["xml:space", "xml:lang"];

pub(crate) struct ParserInput<'a> {
    base: CharSource<'a>,
    general_stack: Vec<EntityStream>,
    parameter_stack: Vec<EntityStream>,
    general_names: HashSet<String>,
    parameter_names: HashSet<String>,
    /// Paths of open external resources, outermost first. Seeded with the
    /// main document's path when parsing a file.
    resources: Vec<PathBuf>,
    /// Folder of the main document, for relative resolution when no
    /// external resource is open.
    base_folder: Option<PathBuf>,
    opener: EntityOpener,

    /// The document declared `standalone="yes"`.
    pub standalone: bool,
    /// Currently parsing the external DTD subset.
    pub external_dtd_active: bool,

    entity_expansions: u32,
    max_entity_expansions: u32,
    depth: u32,
    max_depth: u32,
}

impl<'a> ParserInput<'a> {
    pub fn new(
        source: Box<dyn ByteSource + 'a>,
        opener: EntityOpener,
        document_path: Option<&Path>,
    ) -> Self {
        Self {
            base: CharSource::new(source),
            general_stack: Vec::new(),
            parameter_stack: Vec::new(),
            general_names: HashSet::new(),
            parameter_names: HashSet::new(),
            resources: document_path.map(Path::to_path_buf).into_iter().collect(),
            base_folder: document_path.and_then(Path::parent).map(Path::to_path_buf),
            opener,
            standalone: false,
            external_dtd_active: false,
            entity_expansions: 0,
            max_entity_expansions: u32::MAX,
            depth: 0,
            max_depth: u32::MAX,
        }
    }

    pub fn set_max_depth(&mut self, max: u32) {
        self.max_depth = max;
    }

    pub fn set_max_entity_expansions(&mut self, max: u32) {
        self.max_entity_expansions = max;
    }

    // -- Error helpers --

    /// The location of the next unconsumed character, taken from the
    /// innermost active external resource, or from the main document when
    /// only internal entity text is active.
    pub fn location(&self) -> SourceLocation {
        self.general_stack
            .iter()
            .rev()
            .chain(self.parameter_stack.iter().rev())
            .find_map(EntityStream::location)
            .unwrap_or_else(|| self.base.location())
    }

    /// Creates a fatal [`ParseError`] at the current location.
    pub fn fatal(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: Some(self.location()),
            resources: self.resources.clone(),
        }
    }

    fn fatal_source(&self, e: &SourceError) -> ParseError {
        self.fatal(e.message())
    }

    // -- Depth tracking --

    /// Increments the element nesting depth, failing past the limit.
    pub fn increment_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.fatal(format!(
                "maximum nesting depth exceeded ({})",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Decrements the element nesting depth (saturating at 0).
    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -- Entity stack queries --

    /// Number of active general-entity inclusions.
    pub fn general_depth(&self) -> usize {
        self.general_stack.len()
    }

    /// Number of active parameter-entity inclusions (the external subset
    /// counts as one).
    pub fn parameter_depth(&self) -> usize {
        self.parameter_stack.len()
    }

    /// `true` while reading markup that came from an external source: the
    /// external subset or an external parameter entity. Declarations seen
    /// here are marked `from_external` for standalone validation.
    pub fn in_external_context(&self) -> bool {
        self.external_dtd_active || self.parameter_stack.iter().any(|s| s.is_external)
    }

    /// `true` where parameter-entity references are recognized: outside
    /// markup always; inside markup only in the external subset or within
    /// another parameter entity.
    pub fn pe_recognized(&self, in_markup: bool) -> bool {
        !in_markup || self.external_dtd_active || !self.parameter_stack.is_empty()
    }

    // -- Character access --

    /// Pops exhausted entity streams off both stacks.
    pub fn prune(&mut self) -> Result<(), ParseError> {
        loop {
            let use_general = !self.general_stack.is_empty();
            let status = {
                let top = if use_general {
                    self.general_stack.last_mut()
                } else {
                    self.parameter_stack.last_mut()
                };
                match top {
                    None => return Ok(()),
                    Some(stream) => stream.at_end(),
                }
            };
            match status {
                Ok(false) => return Ok(()),
                Ok(true) => {
                    let finished = if use_general {
                        self.general_stack.pop().expect("non-empty")
                    } else {
                        self.parameter_stack.pop().expect("non-empty")
                    };
                    if use_general {
                        self.general_names.remove(&finished.name);
                    } else {
                        self.parameter_names.remove(&finished.name);
                    }
                    if finished.is_external {
                        self.resources.pop();
                    }
                }
                Err(e) => return Err(self.fatal_source(&e)),
            }
        }
    }

    /// Returns the current character without consuming it. Characters are
    /// supplied by the innermost active entity stream; exhausted streams
    /// are popped first.
    pub fn peek(&mut self) -> Result<Option<char>, ParseError> {
        self.prune()?;
        let result = if let Some(top) = self.general_stack.last_mut() {
            top.peek()
        } else if let Some(top) = self.parameter_stack.last_mut() {
            top.peek()
        } else {
            self.base.peek()
        };
        result.map_err(|e| self.fatal_source(&e))
    }

    /// Returns the current character, failing at end of input.
    pub fn peek_or_fail(&mut self) -> Result<char, ParseError> {
        self.peek()?
            .ok_or_else(|| self.fatal("unexpected end of input"))
    }

    /// Consumes the character returned by the preceding `peek`.
    pub fn advance(&mut self) {
        if let Some(top) = self.general_stack.last_mut() {
            top.advance();
            return;
        }
        if let Some(top) = self.parameter_stack.last_mut() {
            top.advance();
            return;
        }
        self.base.advance();
    }

    /// Consumes and returns the next character, failing at end of input.
    pub fn next_or_fail(&mut self) -> Result<char, ParseError> {
        let c = self.peek_or_fail()?;
        self.advance();
        Ok(c)
    }

    /// `true` if all input (including active entity text) is consumed.
    pub fn at_end(&mut self) -> Result<bool, ParseError> {
        Ok(self.peek()?.is_none())
    }

    // -- Expectations --

    /// Consumes the next character and asserts it matches `expected`.
    pub fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        let c = self.next_or_fail()?;
        if c == expected {
            Ok(())
        } else {
            Err(self.fatal(format!("expected '{expected}', found '{c}'")))
        }
    }

    /// Consumes characters and asserts they match `expected`.
    pub fn expect_str(&mut self, expected: &str) -> Result<(), ParseError> {
        for c in expected.chars() {
            self.expect_char(c)?;
        }
        Ok(())
    }

    // -- Whitespace --

    /// Skips whitespace characters. Returns `true` if any were consumed.
    pub fn skip_whitespace(&mut self) -> Result<bool, ParseError> {
        let mut any = false;
        while let Some(c) = self.peek()? {
            if !chars::is_whitespace(c) {
                break;
            }
            self.advance();
            any = true;
        }
        Ok(any)
    }

    /// Skips whitespace, failing if none is found.
    pub fn skip_whitespace_required(&mut self) -> Result<(), ParseError> {
        if !self.skip_whitespace()? {
            return Err(self.fatal("whitespace required"));
        }
        Ok(())
    }

    // -- Name parsing (XML 1.0 §2.3) --

    /// Parses an XML `Name` per production `[5]`.
    ///
    /// When `validate` is set, names beginning with the reserved prefix
    /// `xml` (any case) are rejected, with `xml:space` and `xml:lang`
    /// exempt.
    pub fn parse_name(&mut self, validate: bool) -> Result<String, ParseError> {
        let first = self.peek_or_fail()?;
        if !chars::is_name_start_char(first) {
            return Err(self.fatal(format!("invalid name start character: '{first}'")));
        }
        self.advance();
        let mut name = String::new();
        name.push(first);
        while let Some(c) = self.peek()? {
            if chars::is_name_char(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if validate {
            self.check_reserved_name(&name)?;
        }
        Ok(name)
    }

    fn check_reserved_name(&self, name: &str) -> Result<(), ParseError> {
        let prefix: String = name.chars().take(3).collect();
        if prefix.eq_ignore_ascii_case("xml") && !RESERVED_NAME_EXEMPTIONS.contains(&name) {
            return Err(self.fatal(format!(
                "name '{name}' may not begin with the reserved prefix 'xml'"
            )));
        }
        Ok(())
    }

    /// Parses an `Nmtoken` per production `[7]`.
    pub fn parse_nmtoken(&mut self) -> Result<String, ParseError> {
        let first = self.peek_or_fail()?;
        if !chars::is_name_char(first) {
            return Err(self.fatal(format!("invalid Nmtoken character: '{first}'")));
        }
        self.advance();
        let mut token = String::new();
        token.push(first);
        while let Some(c) = self.peek()? {
            if chars::is_name_char(c) {
                token.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(token)
    }

    // -- Character references (XML 1.0 §4.1) --

    /// Decodes a character reference after the leading `&#` has been
    /// consumed: `D+;` or `xH+;`. The result must satisfy the `Char`
    /// production.
    pub fn parse_char_ref_tail(&mut self) -> Result<char, ParseError> {
        let hex = self.peek()? == Some('x');
        if hex {
            self.advance();
        }
        let mut digits = String::new();
        while let Some(c) = self.peek()? {
            let is_digit = if hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            };
            if is_digit {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.fatal("empty character reference"));
        }
        self.expect_char(';')?;
        let radix = if hex { 16 } else { 10 };
        let value = u32::from_str_radix(&digits, radix)
            .map_err(|_| self.fatal("character reference out of range"))?;
        let c = char::from_u32(value)
            .ok_or_else(|| self.fatal(format!("invalid character reference: U+{value:04X}")))?;
        if !chars::is_char(c) {
            return Err(self.fatal(format!(
                "character reference &#x{value:X}; is not a valid XML character"
            )));
        }
        Ok(c)
    }

    // -- Quoted literals without reference recognition --

    /// Parses a system literal: a quoted string whose closing quote must
    /// sit at the parameter-entity depth of the opening quote.
    pub fn parse_system_literal(&mut self) -> Result<PathBuf, ParseError> {
        Ok(PathBuf::from(self.parse_raw_literal(false)?))
    }

    /// Parses a public identifier literal, restricted to `PubidChar`s.
    pub fn parse_pubid_literal(&mut self) -> Result<String, ParseError> {
        self.parse_raw_literal(true)
    }

    /// Parses a plain quoted value with no reference recognition, as used
    /// by the XML declaration's pseudo-attributes.
    pub fn parse_quoted_value(&mut self) -> Result<String, ParseError> {
        self.parse_raw_literal(false)
    }

    fn parse_raw_literal(&mut self, pubid: bool) -> Result<String, ParseError> {
        let quote = self.next_or_fail()?;
        if quote != '"' && quote != '\'' {
            return Err(self.fatal("expected quoted literal"));
        }
        let open_depth = self.parameter_depth();
        let mut value = String::new();
        loop {
            let c = self.peek_or_fail()?;
            if c == quote && self.parameter_depth() == open_depth {
                self.advance();
                break;
            }
            if pubid && !chars::is_pubid_char(c) {
                return Err(self.fatal(format!(
                    "invalid character in public identifier: U+{:04X}",
                    c as u32
                )));
            }
            if !chars::is_char(c) {
                return Err(self.fatal(format!("invalid XML character: U+{:04X}", c as u32)));
            }
            self.advance();
            value.push(c);
        }
        Ok(value)
    }

    // -- Entity inclusion --

    fn bump_expansions(&mut self) -> Result<(), ParseError> {
        self.entity_expansions += 1;
        if self.entity_expansions > self.max_entity_expansions {
            return Err(self.fatal(format!(
                "entity expansion limit exceeded ({})",
                self.max_entity_expansions
            )));
        }
        Ok(())
    }

    /// Pushes a general entity onto the inclusion stack.
    ///
    /// Rejects self-reference, unparsed entities, externally declared
    /// entities in standalone documents, and external entities inside
    /// attribute values. External replacement text is fetched lazily here,
    /// through the opener.
    pub fn push_general_entity(
        &mut self,
        decl: &EntityDecl,
        in_attribute: bool,
    ) -> Result<(), ParseError> {
        self.bump_expansions()?;
        if self.general_names.contains(&decl.name) {
            return Err(self.fatal(format!("recursive reference to entity '{}'", decl.name)));
        }
        if decl.is_unparsed {
            return Err(self.fatal(format!(
                "reference to unparsed entity '{}' in content",
                decl.name
            )));
        }
        if self.standalone && decl.from_external {
            return Err(self.fatal(format!(
                "standalone document references externally declared entity '{}'",
                decl.name
            )));
        }
        let stream = if decl.is_external {
            if in_attribute {
                return Err(self.fatal(format!(
                    "reference to external entity '{}' in attribute value",
                    decl.name
                )));
            }
            self.open_external_stream(&decl.name, false, &decl.external_id, false)?
        } else {
            EntityStream::internal(&decl.name, false, &decl.value, false)
        };
        self.general_names.insert(decl.name.clone());
        self.general_stack.push(stream);
        Ok(())
    }

    /// Pushes a parameter entity onto the inclusion stack. Outside entity
    /// values the replacement text is padded with surrounding spaces.
    pub fn push_parameter_entity(
        &mut self,
        decl: &EntityDecl,
        in_entity_value: bool,
    ) -> Result<(), ParseError> {
        self.bump_expansions()?;
        if self.parameter_names.contains(&decl.name) {
            return Err(self.fatal(format!(
                "recursive reference to parameter entity '{}'",
                decl.name
            )));
        }
        let pad = !in_entity_value;
        let stream = if decl.is_external {
            self.open_external_stream(&decl.name, true, &decl.external_id, pad)?
        } else {
            EntityStream::internal(&decl.name, true, &decl.value, pad)
        };
        self.parameter_names.insert(decl.name.clone());
        self.parameter_stack.push(stream);
        Ok(())
    }

    /// Pushes the external DTD subset as an unnamed parameter-entity-like
    /// stream. The caller drives parsing until [`Self::parameter_depth`]
    /// returns to zero.
    pub fn push_external_subset(&mut self, external_id: &ExternalId) -> Result<(), ParseError> {
        let stream = self.open_external_stream("", true, external_id, false)?;
        self.parameter_stack.push(stream);
        Ok(())
    }

    fn open_external_stream(
        &mut self,
        name: &str,
        is_parameter: bool,
        external_id: &ExternalId,
        pad: bool,
    ) -> Result<EntityStream, ParseError> {
        let system_id = external_id
            .system_id()
            .ok_or_else(|| self.fatal(format!("entity '{name}' has no system identifier")))?;
        let path = self.resolve_system_id(system_id);
        let source = (self.opener)(&path)
            .map_err(|e| self.fatal(format!("cannot open '{}': {e}", path.display())))?;
        let stream =
            EntityStream::external(name, is_parameter, source, pad).map_err(|m| self.fatal(m))?;
        self.resources.push(path);
        Ok(stream)
    }

    /// Resolves a system identifier against the folder of the enclosing
    /// resource. Values whose lowercased prefix is `http://` or `https://`
    /// are absolute and pass through verbatim.
    pub fn resolve_system_id(&self, system_id: &Path) -> PathBuf {
        let text = system_id.to_string_lossy().to_lowercase();
        if text.starts_with("http://") || text.starts_with("https://") {
            return system_id.to_path_buf();
        }
        if system_id.is_absolute() {
            return system_id.to_path_buf();
        }
        let folder = self
            .resources
            .last()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .or_else(|| self.base_folder.clone());
        match folder {
            Some(folder) if !folder.as_os_str().is_empty() => folder.join(system_id),
            _ => system_id.to_path_buf(),
        }
    }

    #[cfg(test)]
    pub(crate) fn clear_resources_for_test(&mut self) {
        self.resources.clear();
        self.base_folder = None;
    }
}

/// Collapses runs of SPACE and trims leading/trailing SPACE, the second
/// normalization step for attribute values whose type is not CDATA
/// (XML 1.0 §3.3.3).
pub(crate) fn collapse_spaces(value: &str) -> String {
    value
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
