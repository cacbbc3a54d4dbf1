//! Core XML 1.0 parser.
//!
//! A hand-rolled recursive descent parser for XML 1.0 (Fifth Edition).
//! See <https://www.w3.org/TR/xml/> for the specification.
//!
//! [`XmlParser`] drives the prolog, the element tree, and (through the
//! methods in `parser::dtd`) the document type declaration. Characters
//! come from [`ParserInput`], which transparently expands entity
//! inclusions; markup found inside replacement text is parsed exactly
//! like markup in the document, with the entity-stack depth enforcing
//! that tags open and close within the same entity.

use crate::chars;
use crate::error::ParseError;
use crate::parser::input::{collapse_spaces, ParserInput};
use crate::tree::{Document, Element, ProcessingInstruction, Tag, TagKind};
use crate::validation::dtd::DoctypeDeclaration;

/// The core XML parser.
pub(crate) struct XmlParser<'a> {
    /// Shared low-level input state (entity stacks, lexical helpers).
    pub(crate) input: ParserInput<'a>,
    /// Declarations collected so far. Pre-seeded with the built-in
    /// entities; becomes the document's doctype when a DOCTYPE appears.
    pub(crate) dtd: DoctypeDeclaration,
    /// A DOCTYPE declaration has been parsed.
    pub(crate) doctype_seen: bool,
}

impl<'a> XmlParser<'a> {
    pub fn new(input: ParserInput<'a>) -> Self {
        Self {
            input,
            dtd: DoctypeDeclaration::default(),
            doctype_seen: false,
        }
    }

    /// Main parse entry point. Parses the entire document.
    pub fn parse(mut self) -> Result<Document, ParseError> {
        let mut document_pis = Vec::new();
        let mut version = String::from("1.0");
        let mut encoding = String::from("utf-8");
        let mut root: Option<Element> = None;

        // The XML declaration must be the very first thing in the
        // document, not preceded even by whitespace (XML 1.0 §2.8).
        let mut xml_declaration_possible = true;

        while !self.input.at_end()? {
            let c = self.input.peek_or_fail()?;
            if chars::is_whitespace(c) {
                self.input.advance();
                xml_declaration_possible = false;
                continue;
            }
            if c != '<' {
                return Err(self
                    .input
                    .fatal(format!("unexpected character '{c}' outside the root element")));
            }
            self.input.advance();
            let c = self.input.peek_or_fail()?;
            match c {
                '?' => {
                    self.input.advance();
                    let target = self.input.parse_name(false)?;
                    if target == "xml" && xml_declaration_possible {
                        let decl = self.parse_xml_declaration()?;
                        version = decl.0;
                        if let Some(enc) = decl.1 {
                            encoding = enc;
                        }
                    } else {
                        document_pis.push(self.parse_pi_tail(target)?);
                    }
                }
                '!' => {
                    self.input.advance();
                    if self.input.peek_or_fail()? == '-' {
                        self.input.advance();
                        self.input.expect_char('-')?;
                        self.parse_comment_body()?;
                    } else {
                        self.input.expect_str("DOCTYPE")?;
                        if self.doctype_seen {
                            return Err(self
                                .input
                                .fatal("only one DOCTYPE declaration is permitted"));
                        }
                        if root.is_some() {
                            return Err(self
                                .input
                                .fatal("DOCTYPE declaration after the root element"));
                        }
                        self.doctype_seen = true;
                        self.parse_doctype()?;
                    }
                }
                _ => {
                    if root.is_some() {
                        return Err(self.input.fatal("multiple root elements"));
                    }
                    root = Some(self.parse_element_tail(self.input.general_depth())?);
                }
            }
            xml_declaration_possible = false;
        }

        let Some(root) = root else {
            return Err(self.input.fatal("no root element"));
        };
        Ok(Document {
            version,
            encoding,
            standalone: self.input.standalone,
            doctype: self.doctype_seen.then_some(self.dtd),
            root,
            processing_instructions: document_pis,
        })
    }

    // --- XML Declaration ---
    // See XML 1.0 §2.8: [23] XMLDecl

    /// Parses the XML declaration after `<?xml` has been consumed.
    /// Returns `(version, encoding)`; standalone is recorded on the input.
    fn parse_xml_declaration(&mut self) -> Result<(String, Option<String>), ParseError> {
        let mut version: Option<String> = None;
        let mut encoding: Option<String> = None;
        let mut version_possible = true;
        let mut encoding_possible = true;
        let mut standalone_possible = true;

        loop {
            let had_ws = self.input.skip_whitespace()?;
            let c = self.input.peek_or_fail()?;
            if c == '?' {
                self.input.advance();
                self.input.expect_char('>')?;
                break;
            }
            if !had_ws {
                return Err(self
                    .input
                    .fatal("whitespace required in XML declaration"));
            }
            let name = self.input.parse_name(false)?;
            self.input.skip_whitespace()?;
            self.input.expect_char('=')?;
            self.input.skip_whitespace()?;
            let value = self.input.parse_quoted_value()?;
            match name.as_str() {
                "version" => {
                    if !version_possible {
                        return Err(self.input.fatal("misplaced version declaration"));
                    }
                    if !super::entity::is_valid_version(&value) {
                        return Err(self
                            .input
                            .fatal(format!("invalid version number: '{value}'")));
                    }
                    version = Some(value);
                    version_possible = false;
                }
                "encoding" => {
                    if !encoding_possible {
                        return Err(self.input.fatal("misplaced encoding declaration"));
                    }
                    let lowered = value.to_lowercase();
                    if lowered != "utf-8" {
                        return Err(self
                            .input
                            .fatal(format!("unsupported encoding '{lowered}'")));
                    }
                    encoding = Some(lowered);
                    version_possible = false;
                    encoding_possible = false;
                }
                "standalone" => {
                    if !standalone_possible {
                        return Err(self.input.fatal("misplaced standalone declaration"));
                    }
                    self.input.standalone = match value.as_str() {
                        "yes" => true,
                        "no" => false,
                        _ => {
                            return Err(self.input.fatal("standalone must be 'yes' or 'no'"));
                        }
                    };
                    version_possible = false;
                    encoding_possible = false;
                    standalone_possible = false;
                }
                _ => {
                    return Err(self
                        .input
                        .fatal(format!("unexpected XML declaration attribute '{name}'")));
                }
            }
        }

        let Some(version) = version else {
            return Err(self.input.fatal("XML declaration requires a version"));
        };
        Ok((version, encoding))
    }

    // --- Processing Instructions ---
    // See XML 1.0 §2.6: [16] PI

    /// Parses a processing instruction after `<?target` has been
    /// consumed.
    pub(crate) fn parse_pi_tail(
        &mut self,
        target: String,
    ) -> Result<ProcessingInstruction, ParseError> {
        let prefix: String = target.chars().take(3).collect();
        if prefix.eq_ignore_ascii_case("xml") {
            return Err(self.input.fatal(format!(
                "processing instruction target '{target}' is reserved"
            )));
        }

        let mut instruction = String::new();
        let c = self.input.peek_or_fail()?;
        if c == '?' {
            self.input.advance();
            self.input.expect_char('>')?;
        } else {
            if !chars::is_whitespace(c) {
                return Err(self
                    .input
                    .fatal("whitespace required after processing instruction target"));
            }
            self.input.skip_whitespace()?;
            loop {
                let c = self.input.next_or_fail()?;
                if c == '?' && self.input.peek()? == Some('>') {
                    self.input.advance();
                    break;
                }
                if !chars::is_char(c) {
                    return Err(self
                        .input
                        .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
                }
                instruction.push(c);
            }
        }
        Ok(ProcessingInstruction {
            target,
            instruction,
        })
    }

    // --- Comments ---
    // See XML 1.0 §2.5: [15] Comment

    /// Consumes a comment body after `<!--`. Content is discarded.
    pub(crate) fn parse_comment_body(&mut self) -> Result<(), ParseError> {
        loop {
            let c = self.input.next_or_fail()?;
            if c == '-' && self.input.peek()? == Some('-') {
                self.input.advance();
                let c = self.input.next_or_fail()?;
                if c == '>' {
                    return Ok(());
                }
                return Err(self.input.fatal("'--' not allowed inside comments"));
            }
            if !chars::is_char(c) {
                return Err(self
                    .input
                    .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
            }
        }
    }

    // --- CDATA Sections ---
    // See XML 1.0 §2.7: [18] CDSect

    /// Parses a CDATA section body after `<![CDATA[`, returning the
    /// literal content.
    fn parse_cdata_body(&mut self) -> Result<String, ParseError> {
        let mut content = String::new();
        loop {
            let c = self.input.next_or_fail()?;
            if c == '>' && content.ends_with("]]") {
                content.truncate(content.len() - 2);
                return Ok(content);
            }
            if !chars::is_char(c) {
                return Err(self
                    .input
                    .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
            }
            content.push(c);
        }
    }

    // --- Elements ---
    // See XML 1.0 §3.1: [40] STag, [42] ETag, [44] EmptyElemTag

    /// Parses an element after its opening `<` has been consumed.
    /// `depth_at_tag` is the general-entity depth at that `<`; the tag,
    /// its content, and its end tag must all return to this depth.
    pub(crate) fn parse_element_tail(
        &mut self,
        depth_at_tag: usize,
    ) -> Result<Element, ParseError> {
        self.input.increment_depth()?;
        let name = self.input.parse_name(true)?;
        let mut tag = Tag::new(name, TagKind::Start);

        loop {
            let had_ws = self.input.skip_whitespace()?;
            let c = self.input.peek_or_fail()?;
            match c {
                '>' => {
                    self.input.advance();
                    break;
                }
                '/' => {
                    self.input.advance();
                    self.input.expect_char('>')?;
                    tag.kind = TagKind::Empty;
                    break;
                }
                _ => {
                    if !had_ws {
                        return Err(self
                            .input
                            .fatal("whitespace required between attributes"));
                    }
                    let (attr_name, attr_value) = self.parse_attribute(&tag.name)?;
                    if tag.attributes.contains_key(&attr_name) {
                        return Err(self
                            .input
                            .fatal(format!("duplicate attribute '{attr_name}'")));
                    }
                    tag.attributes.insert(attr_name, attr_value);
                }
            }
        }
        if self.input.general_depth() != depth_at_tag {
            return Err(self
                .input
                .fatal("tag must open and close within the same entity"));
        }

        self.apply_default_attributes(&mut tag)?;
        let mut element = Element::new(tag);
        if element.tag.kind == TagKind::Empty {
            self.input.decrement_depth();
            return Ok(element);
        }
        self.parse_content(&mut element, depth_at_tag)?;
        self.input.decrement_depth();
        Ok(element)
    }

    /// Adds DTD-defaulted attributes absent from the tag (XML 1.0 §3.3.2).
    fn apply_default_attributes(&mut self, tag: &mut Tag) -> Result<(), ParseError> {
        let Some(attlist) = self.dtd.attlists.get(&tag.name) else {
            return Ok(());
        };
        let mut defaulted: Vec<(String, String)> = Vec::new();
        for decl in attlist.values() {
            if let Some(default) = decl.default.value() {
                if !tag.attributes.contains_key(&decl.name) {
                    if self.input.standalone && decl.from_external {
                        return Err(self.input.fatal(format!(
                            "standalone document relies on externally declared default for attribute '{}'",
                            decl.name
                        )));
                    }
                    defaulted.push((decl.name.clone(), default.to_string()));
                }
            }
        }
        tag.attributes.extend(defaulted);
        Ok(())
    }

    // --- Content ---
    // See XML 1.0 §3.1: [43] content

    #[allow(clippy::too_many_lines)]
    fn parse_content(
        &mut self,
        element: &mut Element,
        start_depth: usize,
    ) -> Result<(), ParseError> {
        // Tail of the current literal character-data run, for the `]]>`
        // well-formedness check. Reset at markup and references.
        let mut prev = '\0';
        let mut prev2 = '\0';

        loop {
            let c = self.input.peek_or_fail()?;
            match c {
                '&' => {
                    self.input.advance();
                    if self.input.peek()? == Some('#') {
                        self.input.advance();
                        let decoded = self.input.parse_char_ref_tail()?;
                        element.text.push(decoded);
                        element.is_empty = false;
                        element.children_only = false;
                    } else {
                        let name = self.parse_entity_reference_name()?;
                        let decl = self
                            .dtd
                            .general_entities
                            .get(&name)
                            .cloned()
                            .ok_or_else(|| {
                                self.input
                                    .fatal(format!("reference to undeclared entity '&{name};'"))
                            })?;
                        self.input.push_general_entity(&decl, false)?;
                    }
                    prev = '\0';
                    prev2 = '\0';
                }
                '<' => {
                    let depth_at_tag = self.input.general_depth();
                    self.input.advance();
                    let c = self.input.peek_or_fail()?;
                    match c {
                        '!' => {
                            self.input.advance();
                            let c = self.input.peek_or_fail()?;
                            if c == '-' {
                                self.input.advance();
                                self.input.expect_char('-')?;
                                self.parse_comment_body()?;
                                element.is_empty = false;
                                element.children_only = false;
                            } else if c == '[' {
                                self.input.advance();
                                self.input.expect_str("CDATA[")?;
                                let cdata = self.parse_cdata_body()?;
                                element.text.push_str(&cdata);
                                element.is_empty = false;
                                element.children_only = false;
                            } else {
                                return Err(self
                                    .input
                                    .fatal("expected comment or CDATA section"));
                            }
                        }
                        '?' => {
                            self.input.advance();
                            let target = self.input.parse_name(false)?;
                            let pi = self.parse_pi_tail(target)?;
                            element.processing_instructions.push(pi);
                            element.is_empty = false;
                            element.children_only = false;
                        }
                        '/' => {
                            self.input.advance();
                            let end_name = self.input.parse_name(true)?;
                            self.input.skip_whitespace()?;
                            self.input.expect_char('>')?;
                            if end_name != element.tag.name {
                                return Err(self.input.fatal(format!(
                                    "mismatched end tag: expected </{}>, found </{end_name}>",
                                    element.tag.name
                                )));
                            }
                            if depth_at_tag != start_depth
                                || self.input.general_depth() != start_depth
                            {
                                return Err(self.input.fatal(
                                    "element must start and end within the same entity",
                                ));
                            }
                            return Ok(());
                        }
                        _ => {
                            let child = self.parse_element_tail(depth_at_tag)?;
                            element.children.push(child);
                            element.is_empty = false;
                        }
                    }
                    prev = '\0';
                    prev2 = '\0';
                }
                _ => {
                    self.input.advance();
                    if c == '>' && prev == ']' && prev2 == ']' {
                        return Err(self.input.fatal("']]>' not allowed in character data"));
                    }
                    if !chars::is_char(c) {
                        return Err(self
                            .input
                            .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
                    }
                    element.text.push(c);
                    element.is_empty = false;
                    if !chars::is_whitespace(c) {
                        element.children_only = false;
                    }
                    prev2 = prev;
                    prev = c;
                }
            }
        }
    }

    /// Parses the name and closing `;` of a general entity reference
    /// (the `&` has been consumed).
    fn parse_entity_reference_name(&mut self) -> Result<String, ParseError> {
        let name = self.input.parse_name(false)?;
        self.input.expect_char(';')?;
        Ok(name)
    }

    // --- Attributes ---
    // See XML 1.0 §3.1: [41] Attribute

    fn parse_attribute(&mut self, tag_name: &str) -> Result<(String, String), ParseError> {
        let name = self.input.parse_name(true)?;
        self.input.skip_whitespace()?;
        self.input.expect_char('=')?;
        self.input.skip_whitespace()?;
        let is_cdata = self.attribute_is_cdata(tag_name, &name);
        let value = self.parse_attribute_value(is_cdata)?;
        Ok((name, value))
    }

    /// `true` unless the DTD declares this attribute with a tokenized
    /// type. Undeclared attributes normalize as CDATA.
    fn attribute_is_cdata(&self, tag_name: &str, attr_name: &str) -> bool {
        self.dtd
            .attlists
            .get(tag_name)
            .and_then(|list| list.get(attr_name))
            .map_or(true, |decl| !decl.attr_type.is_tokenized())
    }

    /// Parses a quoted attribute value with reference expansion and
    /// normalization (XML 1.0 §3.3.3).
    ///
    /// Literal whitespace (including whitespace arriving from entity
    /// replacement text) becomes SPACE; characters produced by character
    /// references are included verbatim. Non-CDATA values additionally
    /// have SPACE runs collapsed and trimmed. The closing quote must sit
    /// at the general-entity depth of the opening quote.
    pub(crate) fn parse_attribute_value(&mut self, is_cdata: bool) -> Result<String, ParseError> {
        let quote = self.input.next_or_fail()?;
        if quote != '"' && quote != '\'' {
            return Err(self.input.fatal("attribute value must be quoted"));
        }
        let open_depth = self.input.general_depth();
        let mut value = String::new();
        loop {
            let c = self.input.peek_or_fail()?;
            if c == quote && self.input.general_depth() == open_depth {
                self.input.advance();
                break;
            }
            match c {
                '&' => {
                    self.input.advance();
                    if self.input.peek()? == Some('#') {
                        self.input.advance();
                        let decoded = self.input.parse_char_ref_tail()?;
                        value.push(decoded);
                    } else {
                        let name = self.parse_entity_reference_name()?;
                        let decl = self
                            .dtd
                            .general_entities
                            .get(&name)
                            .cloned()
                            .ok_or_else(|| {
                                self.input
                                    .fatal(format!("reference to undeclared entity '&{name};'"))
                            })?;
                        self.input.push_general_entity(&decl, true)?;
                    }
                }
                '<' => {
                    return Err(self.input.fatal("'<' not allowed in attribute values"));
                }
                _ => {
                    self.input.advance();
                    if !chars::is_char(c) {
                        return Err(self
                            .input
                            .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
                    }
                    if chars::is_whitespace(c) {
                        value.push(' ');
                    } else {
                        value.push(c);
                    }
                }
            }
        }
        if is_cdata {
            Ok(value)
        } else {
            Ok(collapse_spaces(&value))
        }
    }
}
