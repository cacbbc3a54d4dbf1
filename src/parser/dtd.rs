//! DTD parsing: the DOCTYPE declaration, internal and external subsets,
//! conditional sections, and all markup declarations.
//!
//! Parameter-entity recognition follows XML 1.0 §2.8: between declarations
//! a `%name;` reference is always recognized; inside markup it is only
//! recognized in the external subset or within the text of another
//! parameter entity. Replacement text included outside an entity value is
//! padded with surrounding spaces, so a parameter entity can never supply
//! part of a token.
//!
//! Cross-entity constraints are enforced through the parameter-entity
//! stack depth: a markup declaration, a content-model group, and a
//! conditional section must each open and close at the same depth.

use std::collections::HashSet;

use crate::chars;
use crate::error::ParseError;
use crate::parser::xml::XmlParser;
use crate::validation::dtd::{
    AttributeDecl, AttributeDefault, AttributeType, ContentModel, ContentSpec, ContentSpecKind,
    ElementDecl, EntityDecl, ExternalId, NotationDecl, Occurrence, BUILT_IN_GENERAL_ENTITIES,
};

impl XmlParser<'_> {
    // --- DOCTYPE ---
    // See XML 1.0 §2.8: [28] doctypedecl

    /// Parses a DOCTYPE declaration after `<!DOCTYPE` has been consumed,
    /// including the internal subset and, when an external identifier is
    /// present, the external subset.
    pub(crate) fn parse_doctype(&mut self) -> Result<(), ParseError> {
        self.input.skip_whitespace_required()?;
        self.dtd.root_name = self.input.parse_name(true)?;
        self.input.skip_whitespace()?;
        let c = self.input.peek_or_fail()?;
        if c == 'S' || c == 'P' {
            self.dtd.external_id = self.parse_external_id()?;
            self.input.skip_whitespace()?;
        }
        if self.input.peek()? == Some('[') {
            self.input.advance();
            self.parse_internal_subset()?;
            self.input.skip_whitespace()?;
        }
        self.input.expect_char('>')?;
        if self.dtd.external_id.exists() {
            self.parse_external_subset()?;
        }
        Ok(())
    }

    /// Parses the internal subset up to (and including) the closing `]`.
    fn parse_internal_subset(&mut self) -> Result<(), ParseError> {
        loop {
            let Some(c) = self.input.peek()? else {
                return Err(self.input.fatal("unexpected end of input in internal subset"));
            };
            if chars::is_whitespace(c) {
                self.input.advance();
                continue;
            }
            match c {
                ']' => {
                    if self.input.parameter_depth() != 0 {
                        return Err(self
                            .input
                            .fatal("unexpected ']' in parameter entity text"));
                    }
                    self.input.advance();
                    return Ok(());
                }
                '%' => self.expand_parameter_reference(false)?,
                '<' => self.parse_markup_or_comment()?,
                _ => {
                    return Err(self.input.fatal(format!("unexpected character '{c}' in DTD")));
                }
            }
        }
    }

    /// Opens and parses the external subset named by the DOCTYPE's
    /// external identifier. The subset reads like a parameter-entity
    /// inclusion; parsing stops when the stream is spent.
    fn parse_external_subset(&mut self) -> Result<(), ParseError> {
        let external_id = self.dtd.external_id.clone();
        self.input.push_external_subset(&external_id)?;
        self.input.external_dtd_active = true;
        loop {
            self.input.prune()?;
            if self.input.parameter_depth() == 0 {
                break;
            }
            let c = self.input.peek_or_fail()?;
            if chars::is_whitespace(c) {
                self.input.advance();
            } else if c == '%' {
                self.expand_parameter_reference(false)?;
            } else if c == '<' {
                self.parse_markup_or_comment()?;
            } else {
                return Err(self.input.fatal(format!("unexpected character '{c}' in DTD")));
            }
        }
        self.input.external_dtd_active = false;
        Ok(())
    }

    // --- Parameter-entity recognition ---

    /// Expands a parameter-entity reference at the cursor (`%` not yet
    /// consumed), pushing its replacement text with surrounding-space
    /// padding.
    fn expand_parameter_reference(&mut self, in_markup: bool) -> Result<(), ParseError> {
        if !self.input.pe_recognized(in_markup) {
            return Err(self.input.fatal(
                "parameter-entity reference not allowed inside markup in the internal subset",
            ));
        }
        self.input.advance();
        let name = self.input.parse_name(false)?;
        self.input.expect_char(';')?;
        let decl = self
            .dtd
            .parameter_entities
            .get(&name)
            .cloned()
            .ok_or_else(|| {
                self.input
                    .fatal(format!("reference to undeclared parameter entity '%{name};'"))
            })?;
        self.input.push_parameter_entity(&decl, false)
    }

    /// Skips whitespace, expanding parameter-entity references that occur
    /// at a token boundary. Returns `true` if any whitespace (or an
    /// expansion, whose padding supplies whitespace) was consumed.
    fn dtd_skip_ws(&mut self, in_markup: bool) -> Result<bool, ParseError> {
        let mut any = false;
        loop {
            any |= self.input.skip_whitespace()?;
            if self.input.peek()? == Some('%') {
                self.expand_parameter_reference(in_markup)?;
                any = true;
            } else {
                return Ok(any);
            }
        }
    }

    fn dtd_require_ws(&mut self, in_markup: bool) -> Result<(), ParseError> {
        if !self.dtd_skip_ws(in_markup)? {
            return Err(self.input.fatal("whitespace required"));
        }
        Ok(())
    }

    // --- Markup dispatch ---

    /// Parses one item at subset level beginning with `<`: a comment, a
    /// processing instruction, a conditional section, or a markup
    /// declaration.
    fn parse_markup_or_comment(&mut self) -> Result<(), ParseError> {
        let decl_depth = self.input.parameter_depth();
        self.input.advance(); // '<'
        let c = self.input.peek_or_fail()?;
        if c == '?' {
            self.input.advance();
            let target = self.input.parse_name(false)?;
            let pi = self.parse_pi_tail(target)?;
            self.dtd.processing_instructions.push(pi);
            return Ok(());
        }
        if c != '!' {
            return Err(self.input.fatal("expected markup declaration"));
        }
        self.input.advance();
        let c = self.input.peek_or_fail()?;
        if c == '-' {
            self.input.advance();
            self.input.expect_char('-')?;
            return self.parse_comment_body();
        }
        if c == '[' {
            self.input.advance();
            if !self.input.external_dtd_active && decl_depth == 0 {
                return Err(self
                    .input
                    .fatal("conditional sections are only allowed in the external subset"));
            }
            return self.parse_conditional_section(decl_depth);
        }
        let keyword = self.parse_keyword()?;
        match keyword.as_str() {
            "ELEMENT" => self.parse_element_decl(decl_depth),
            "ATTLIST" => self.parse_attlist_decl(decl_depth),
            "ENTITY" => self.parse_entity_decl(decl_depth),
            "NOTATION" => self.parse_notation_decl(decl_depth),
            _ => Err(self
                .input
                .fatal(format!("unknown markup declaration '<!{keyword}'"))),
        }
    }

    /// Reads a run of ASCII uppercase letters.
    fn parse_keyword(&mut self) -> Result<String, ParseError> {
        let mut keyword = String::new();
        while let Some(c) = self.input.peek()? {
            if c.is_ascii_uppercase() {
                keyword.push(c);
                self.input.advance();
            } else {
                break;
            }
        }
        if keyword.is_empty() {
            return Err(self.input.fatal("expected a keyword"));
        }
        Ok(keyword)
    }

    /// Skips trailing whitespace and consumes the `>` that closes a
    /// markup declaration, which must sit at the declaration's
    /// parameter-entity depth.
    fn close_declaration(&mut self, decl_depth: usize) -> Result<(), ParseError> {
        self.dtd_skip_ws(true)?;
        self.input.expect_char('>')?;
        if self.input.parameter_depth() != decl_depth {
            return Err(self.input.fatal("markup declaration spans entity boundaries"));
        }
        Ok(())
    }

    // --- Conditional sections ---
    // See XML 1.0 §3.4: [61] conditionalSect

    /// Parses a conditional section after `<![` has been consumed.
    fn parse_conditional_section(&mut self, open_depth: usize) -> Result<(), ParseError> {
        self.dtd_skip_ws(true)?;
        let keyword = self.parse_keyword()?;
        self.dtd_skip_ws(true)?;
        self.input.expect_char('[')?;
        match keyword.as_str() {
            "INCLUDE" => self.parse_include_section(open_depth),
            "IGNORE" => self.parse_ignore_section(open_depth),
            _ => Err(self
                .input
                .fatal("conditional section keyword must be INCLUDE or IGNORE")),
        }
    }

    /// Parses the contents of an INCLUDE section as a nested subset, up
    /// to the matching `]]>`.
    fn parse_include_section(&mut self, open_depth: usize) -> Result<(), ParseError> {
        loop {
            self.input.prune()?;
            let Some(c) = self.input.peek()? else {
                return Err(self
                    .input
                    .fatal("unexpected end of input in conditional section"));
            };
            if chars::is_whitespace(c) {
                self.input.advance();
                continue;
            }
            match c {
                ']' => {
                    if self.input.parameter_depth() != open_depth {
                        return Err(self
                            .input
                            .fatal("conditional section must open and close within the same entity"));
                    }
                    self.input.advance();
                    self.input.expect_char(']')?;
                    self.input.expect_char('>')?;
                    return Ok(());
                }
                '%' => self.expand_parameter_reference(false)?,
                '<' => self.parse_markup_or_comment()?,
                _ => {
                    return Err(self.input.fatal(format!("unexpected character '{c}' in DTD")));
                }
            }
        }
    }

    /// Consumes an IGNORE section, counting nested `<![` openings until
    /// the matching `]]>`. Parameter entities are not recognized here.
    fn parse_ignore_section(&mut self, open_depth: usize) -> Result<(), ParseError> {
        let mut depth = 1u32;
        let mut prev = '\0';
        let mut prev2 = '\0';
        loop {
            let c = self.input.next_or_fail()?;
            if !chars::is_char(c) {
                return Err(self
                    .input
                    .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
            }
            if c == '[' && prev == '!' && prev2 == '<' {
                depth += 1;
                prev = '\0';
                prev2 = '\0';
                continue;
            }
            if c == '>' && prev == ']' && prev2 == ']' {
                depth -= 1;
                if depth == 0 {
                    if self.input.parameter_depth() != open_depth {
                        return Err(self
                            .input
                            .fatal("conditional section must open and close within the same entity"));
                    }
                    return Ok(());
                }
                prev = '\0';
                prev2 = '\0';
                continue;
            }
            prev2 = prev;
            prev = c;
        }
    }

    // --- ELEMENT declaration ---
    // See XML 1.0 §3.2: [45] elementdecl

    fn parse_element_decl(&mut self, decl_depth: usize) -> Result<(), ParseError> {
        self.dtd_require_ws(true)?;
        let name = self.input.parse_name(true)?;
        self.dtd_require_ws(true)?;
        let c = self.input.peek_or_fail()?;
        let content_model = match c {
            'E' => {
                self.input.expect_str("EMPTY")?;
                ContentModel::Empty
            }
            'A' => {
                self.input.expect_str("ANY")?;
                ContentModel::Any
            }
            '(' => self.parse_content_model()?,
            _ => {
                return Err(self
                    .input
                    .fatal("expected EMPTY, ANY, or a content model"));
            }
        };
        self.close_declaration(decl_depth)?;
        if self.dtd.elements.contains_key(&name) {
            return Err(self
                .input
                .fatal(format!("duplicate declaration of element '{name}'")));
        }
        self.dtd.elements.insert(
            name.clone(),
            ElementDecl {
                name,
                content_model,
            },
        );
        Ok(())
    }

    /// Parses a content model starting at its opening `(`: either mixed
    /// content or an element content model.
    fn parse_content_model(&mut self) -> Result<ContentModel, ParseError> {
        let group_depth = self.input.parameter_depth();
        self.input.advance(); // '('
        self.dtd_skip_ws(true)?;
        if self.input.peek()? != Some('#') {
            return Ok(ContentModel::Children(
                self.parse_content_group(group_depth)?,
            ));
        }

        // Mixed content: ( #PCDATA ( | name )* )*
        self.input.expect_str("#PCDATA")?;
        let mut names = HashSet::new();
        loop {
            self.dtd_skip_ws(true)?;
            let c = self.input.peek_or_fail()?;
            match c {
                ')' => {
                    if self.input.parameter_depth() != group_depth {
                        return Err(self
                            .input
                            .fatal("content model group must open and close within the same entity"));
                    }
                    self.input.advance();
                    if names.is_empty() {
                        // (#PCDATA) may omit the trailing '*'.
                        if self.input.peek()? == Some('*') {
                            self.input.advance();
                        }
                    } else if self.input.peek()? == Some('*') {
                        self.input.advance();
                    } else {
                        return Err(self
                            .input
                            .fatal("mixed content model with element names must end in ')*'"));
                    }
                    return Ok(ContentModel::Mixed(names));
                }
                '|' => {
                    self.input.advance();
                    self.dtd_skip_ws(true)?;
                    let name = self.input.parse_name(true)?;
                    if !names.insert(name.clone()) {
                        return Err(self
                            .input
                            .fatal(format!("duplicate name '{name}' in mixed content model")));
                    }
                }
                _ => {
                    return Err(self
                        .input
                        .fatal("expected '|' or ')' in mixed content model"));
                }
            }
        }
    }

    /// Parses an element-content group after its `(` has been consumed.
    /// All separators within one group must agree; the closing `)` must
    /// sit at the group's parameter-entity depth.
    fn parse_content_group(&mut self, open_depth: usize) -> Result<ContentSpec, ParseError> {
        let mut parts: Vec<ContentSpec> = Vec::new();
        let mut separator: Option<char> = None;
        loop {
            self.dtd_skip_ws(true)?;
            let c = self.input.peek_or_fail()?;
            let part = if c == '(' {
                let inner_depth = self.input.parameter_depth();
                self.input.advance();
                self.parse_content_group(inner_depth)?
            } else {
                let name = self.input.parse_name(true)?;
                let occurrence = self.parse_occurrence()?;
                ContentSpec {
                    kind: ContentSpecKind::Name(name),
                    occurrence,
                }
            };
            parts.push(part);
            self.dtd_skip_ws(true)?;
            let c = self.input.peek_or_fail()?;
            match c {
                ')' => {
                    if self.input.parameter_depth() != open_depth {
                        return Err(self
                            .input
                            .fatal("content model group must open and close within the same entity"));
                    }
                    self.input.advance();
                    let occurrence = self.parse_occurrence()?;
                    return Ok(build_group(parts, separator, occurrence));
                }
                ',' | '|' => {
                    match separator {
                        None => separator = Some(c),
                        Some(s) if s == c => {}
                        Some(_) => {
                            return Err(self
                                .input
                                .fatal("cannot mix ',' and '|' within a content model group"));
                        }
                    }
                    self.input.advance();
                }
                _ => {
                    return Err(self
                        .input
                        .fatal("expected ',', '|', or ')' in content model"));
                }
            }
        }
    }

    /// Parses an optional occurrence indicator (`?`, `*`, `+`).
    fn parse_occurrence(&mut self) -> Result<Occurrence, ParseError> {
        let occurrence = match self.input.peek()? {
            Some('?') => Occurrence::Optional,
            Some('*') => Occurrence::ZeroOrMore,
            Some('+') => Occurrence::OneOrMore,
            _ => return Ok(Occurrence::Once),
        };
        self.input.advance();
        Ok(occurrence)
    }

    // --- ATTLIST declaration ---
    // See XML 1.0 §3.3: [52] AttlistDecl

    fn parse_attlist_decl(&mut self, decl_depth: usize) -> Result<(), ParseError> {
        self.dtd_require_ws(true)?;
        let element_name = self.input.parse_name(true)?;
        loop {
            let had_ws = self.dtd_skip_ws(true)?;
            let c = self.input.peek_or_fail()?;
            if c == '>' {
                self.input.advance();
                if self.input.parameter_depth() != decl_depth {
                    return Err(self
                        .input
                        .fatal("markup declaration spans entity boundaries"));
                }
                return Ok(());
            }
            if !had_ws {
                return Err(self.input.fatal("whitespace required"));
            }
            let attr_name = self.input.parse_name(true)?;
            self.dtd_require_ws(true)?;
            let attr_type = self.parse_attribute_type()?;
            self.dtd_require_ws(true)?;
            let default = self.parse_attribute_default(&attr_type)?;

            if attr_name == "xml:space" {
                self.check_xml_space_declaration(&attr_type)?;
            }
            if let Some(value) = default.value() {
                self.check_default_value_type(value, &attr_type)?;
            }

            let decl = AttributeDecl {
                name: attr_name.clone(),
                attr_type,
                default,
                from_external: self.input.in_external_context(),
            };
            // The first declaration of a given (element, attribute) pair
            // wins; later ones are ignored silently.
            self.dtd
                .attlists
                .entry(element_name.clone())
                .or_default()
                .entry(attr_name)
                .or_insert(decl);
        }
    }

    fn parse_attribute_type(&mut self) -> Result<AttributeType, ParseError> {
        if self.input.peek()? == Some('(') {
            self.input.advance();
            return Ok(AttributeType::Enumeration(self.parse_enumerated(false)?));
        }
        let keyword = self.parse_keyword()?;
        match keyword.as_str() {
            "CDATA" => Ok(AttributeType::CData),
            "ID" => Ok(AttributeType::Id),
            "IDREF" => Ok(AttributeType::IdRef),
            "IDREFS" => Ok(AttributeType::IdRefs),
            "ENTITY" => Ok(AttributeType::Entity),
            "ENTITIES" => Ok(AttributeType::Entities),
            "NMTOKEN" => Ok(AttributeType::NmToken),
            "NMTOKENS" => Ok(AttributeType::NmTokens),
            "NOTATION" => {
                self.dtd_require_ws(true)?;
                self.input.expect_char('(')?;
                Ok(AttributeType::Notation(self.parse_enumerated(true)?))
            }
            _ => Err(self.input.fatal("expected attribute type")),
        }
    }

    /// Parses the body of an enumerated type after its `(`. `names`
    /// selects between `Name` tokens (NOTATION form) and `Nmtoken`s.
    fn parse_enumerated(&mut self, names: bool) -> Result<Vec<String>, ParseError> {
        let mut values = Vec::new();
        loop {
            self.dtd_skip_ws(true)?;
            let value = if names {
                self.input.parse_name(true)?
            } else {
                self.input.parse_nmtoken()?
            };
            if values.contains(&value) {
                return Err(self
                    .input
                    .fatal(format!("duplicate token '{value}' in enumerated attribute type")));
            }
            values.push(value);
            self.dtd_skip_ws(true)?;
            let c = self.input.next_or_fail()?;
            match c {
                ')' => return Ok(values),
                '|' => {}
                _ => {
                    return Err(self
                        .input
                        .fatal("expected '|' or ')' in enumerated attribute type"));
                }
            }
        }
    }

    fn parse_attribute_default(
        &mut self,
        attr_type: &AttributeType,
    ) -> Result<AttributeDefault, ParseError> {
        let c = self.input.peek_or_fail()?;
        if c == '#' {
            self.input.advance();
            let keyword = self.parse_keyword()?;
            return match keyword.as_str() {
                "REQUIRED" => Ok(AttributeDefault::Required),
                "IMPLIED" => Ok(AttributeDefault::Implied),
                "FIXED" => {
                    self.dtd_require_ws(true)?;
                    let value = self.parse_attribute_value(!attr_type.is_tokenized())?;
                    Ok(AttributeDefault::Fixed(value))
                }
                _ => Err(self.input.fatal("expected #REQUIRED, #IMPLIED, or #FIXED")),
            };
        }
        if c == '"' || c == '\'' {
            let value = self.parse_attribute_value(!attr_type.is_tokenized())?;
            return Ok(AttributeDefault::Default(value));
        }
        Err(self.input.fatal("expected an attribute default"))
    }

    /// `xml:space`, if declared, must be an enumeration over `default`
    /// and `preserve` (XML 1.0 §2.10).
    fn check_xml_space_declaration(&self, attr_type: &AttributeType) -> Result<(), ParseError> {
        if let AttributeType::Enumeration(values) = attr_type {
            if !values.is_empty() && values.iter().all(|v| v == "default" || v == "preserve") {
                return Ok(());
            }
        }
        Err(self
            .input
            .fatal("xml:space must be declared as an enumeration of 'default' and/or 'preserve'"))
    }

    /// A declared default value must itself satisfy the attribute type
    /// (VC: Attribute Default Value Syntactically Correct).
    fn check_default_value_type(
        &self,
        value: &str,
        attr_type: &AttributeType,
    ) -> Result<(), ParseError> {
        let ok = match attr_type {
            AttributeType::CData => true,
            AttributeType::Id | AttributeType::IdRef | AttributeType::Entity => {
                chars::is_valid_name(value)
            }
            AttributeType::IdRefs | AttributeType::Entities => {
                !value.is_empty() && value.split(' ').all(chars::is_valid_name)
            }
            AttributeType::NmToken => chars::is_valid_nmtoken(value),
            AttributeType::NmTokens => {
                !value.is_empty() && value.split(' ').all(chars::is_valid_nmtoken)
            }
            AttributeType::Notation(values) | AttributeType::Enumeration(values) => {
                values.iter().any(|v| v == value)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(self.input.fatal(format!(
                "attribute default value '{value}' does not match its declared type"
            )))
        }
    }

    // --- ENTITY declaration ---
    // See XML 1.0 §4.2: [70] EntityDecl

    #[allow(clippy::too_many_lines)]
    fn parse_entity_decl(&mut self, decl_depth: usize) -> Result<(), ParseError> {
        self.input.skip_whitespace_required()?;

        // `%` followed by whitespace introduces a parameter entity
        // declaration; `%name;` is a reference supplying what follows.
        let mut is_parameter = false;
        loop {
            let c = self.input.peek_or_fail()?;
            if c == '%' {
                self.input.advance();
                let c = self.input.peek_or_fail()?;
                if chars::is_whitespace(c) {
                    is_parameter = true;
                    self.input.skip_whitespace()?;
                    break;
                }
                if !self.input.pe_recognized(true) {
                    return Err(self.input.fatal(
                        "parameter-entity reference not allowed inside markup in the internal subset",
                    ));
                }
                let name = self.input.parse_name(false)?;
                self.input.expect_char(';')?;
                let decl = self
                    .dtd
                    .parameter_entities
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| {
                        self.input.fatal(format!(
                            "reference to undeclared parameter entity '%{name};'"
                        ))
                    })?;
                self.input.push_parameter_entity(&decl, false)?;
                self.input.skip_whitespace()?;
                continue;
            }
            if chars::is_whitespace(c) {
                self.input.advance();
                continue;
            }
            break;
        }

        let name = self.input.parse_name(true)?;
        self.dtd_require_ws(true)?;

        let mut decl = EntityDecl {
            name: name.clone(),
            value: String::new(),
            is_external: false,
            external_id: ExternalId::None,
            from_external: self.input.in_external_context(),
            is_unparsed: false,
            notation_name: None,
            is_parameter,
        };

        let c = self.input.peek_or_fail()?;
        if c == '"' || c == '\'' {
            decl.value = self.parse_entity_value()?;
        } else {
            decl.is_external = true;
            decl.external_id = self.parse_external_id()?;
            let had_ws = self.dtd_skip_ws(true)?;
            if self.input.peek()? == Some('N') {
                if is_parameter {
                    return Err(self
                        .input
                        .fatal("NDATA is not allowed on parameter entities"));
                }
                if !had_ws {
                    return Err(self.input.fatal("whitespace required before NDATA"));
                }
                self.input.expect_str("NDATA")?;
                self.dtd_require_ws(true)?;
                decl.is_unparsed = true;
                decl.notation_name = Some(self.input.parse_name(true)?);
            }
        }
        self.close_declaration(decl_depth)?;

        // The first declaration of an entity is binding; later ones are
        // ignored silently. The built-ins are pre-seeded and always win,
        // but a redeclaration must still expand to the right character.
        if is_parameter {
            self.dtd.parameter_entities.entry(name).or_insert(decl);
        } else {
            if BUILT_IN_GENERAL_ENTITIES
                .iter()
                .any(|&(builtin, _)| builtin == name)
            {
                self.check_builtin_redeclaration(&decl)?;
            }
            self.dtd.general_entities.entry(name).or_insert(decl);
        }
        Ok(())
    }

    /// Parses an entity-value literal (XML 1.0 §4.3.2, `[9]`).
    ///
    /// Character references are decoded here; general-entity references
    /// are bypassed and stored verbatim; parameter-entity references are
    /// expanded inline without padding. The closing quote must sit at the
    /// parameter-entity depth of the opening quote.
    fn parse_entity_value(&mut self) -> Result<String, ParseError> {
        let quote = self.input.next_or_fail()?;
        if quote != '"' && quote != '\'' {
            return Err(self.input.fatal("expected quoted entity value"));
        }
        let open_depth = self.input.parameter_depth();
        let mut value = String::new();
        loop {
            let c = self.input.peek_or_fail()?;
            if c == quote && self.input.parameter_depth() == open_depth {
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
                        let name = self.input.parse_name(false)?;
                        self.input.expect_char(';')?;
                        value.push('&');
                        value.push_str(&name);
                        value.push(';');
                    }
                }
                '%' => {
                    self.input.advance();
                    let name = self.input.parse_name(false)?;
                    self.input.expect_char(';')?;
                    let decl = self
                        .dtd
                        .parameter_entities
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| {
                            self.input.fatal(format!(
                                "reference to undeclared parameter entity '%{name};'"
                            ))
                        })?;
                    self.input.push_parameter_entity(&decl, true)?;
                }
                _ => {
                    self.input.advance();
                    if !chars::is_char(c) {
                        return Err(self
                            .input
                            .fatal(format!("invalid XML character: U+{:04X}", c as u32)));
                    }
                    value.push(c);
                }
            }
        }
        Ok(value)
    }

    /// Redeclarations of the built-in entities must expand to the
    /// corresponding character; `lt` and `amp` additionally require a
    /// double-escaped value (XML 1.0 §4.6).
    fn check_builtin_redeclaration(&self, decl: &EntityDecl) -> Result<(), ParseError> {
        let expected = match decl.name.as_str() {
            "lt" => "<",
            "gt" => ">",
            "amp" => "&",
            "apos" => "'",
            "quot" => "\"",
            _ => return Ok(()),
        };
        if decl.is_external {
            return Err(self.input.fatal(format!(
                "built-in entity '{}' may not be redeclared as external",
                decl.name
            )));
        }
        let expansion = expand_character_references(&decl.value);
        if expansion != expected {
            return Err(self.input.fatal(format!(
                "redeclaration of built-in entity '{}' must expand to \"{expected}\"",
                decl.name
            )));
        }
        if matches!(decl.name.as_str(), "lt" | "amp") && decl.value == expected {
            return Err(self.input.fatal(format!(
                "redeclaration of '{}' requires a double-escaped value",
                decl.name
            )));
        }
        Ok(())
    }

    // --- NOTATION declaration ---
    // See XML 1.0 §4.7: [82] NotationDecl

    fn parse_notation_decl(&mut self, decl_depth: usize) -> Result<(), ParseError> {
        self.dtd_require_ws(true)?;
        let name = self.input.parse_name(true)?;
        self.dtd_require_ws(true)?;
        let keyword = self.parse_keyword()?;
        let (public_id, system_id) = match keyword.as_str() {
            "SYSTEM" => {
                self.dtd_require_ws(true)?;
                (None, Some(self.input.parse_system_literal()?))
            }
            "PUBLIC" => {
                self.dtd_require_ws(true)?;
                let public_id = self.input.parse_pubid_literal()?;
                // The system identifier is optional for notations.
                let had_ws = self.dtd_skip_ws(true)?;
                let system_id = if had_ws && matches!(self.input.peek()?, Some('"' | '\'')) {
                    Some(self.input.parse_system_literal()?)
                } else {
                    None
                };
                (Some(public_id), system_id)
            }
            _ => {
                return Err(self
                    .input
                    .fatal("expected SYSTEM or PUBLIC in notation declaration"));
            }
        };
        self.close_declaration(decl_depth)?;
        if self.dtd.notations.contains_key(&name) {
            return Err(self
                .input
                .fatal(format!("duplicate declaration of notation '{name}'")));
        }
        self.dtd.notations.insert(
            name.clone(),
            NotationDecl {
                name,
                public_id,
                system_id,
            },
        );
        Ok(())
    }

    // --- External identifiers ---
    // See XML 1.0 §4.2.2: [75] ExternalID

    fn parse_external_id(&mut self) -> Result<ExternalId, ParseError> {
        let keyword = self.parse_keyword()?;
        match keyword.as_str() {
            "SYSTEM" => {
                self.dtd_require_ws(true)?;
                Ok(ExternalId::System {
                    system_id: self.input.parse_system_literal()?,
                })
            }
            "PUBLIC" => {
                self.dtd_require_ws(true)?;
                let public_id = self.input.parse_pubid_literal()?;
                self.dtd_require_ws(true)?;
                Ok(ExternalId::Public {
                    public_id,
                    system_id: self.input.parse_system_literal()?,
                })
            }
            _ => Err(self.input.fatal("expected SYSTEM or PUBLIC")),
        }
    }
}

/// Folds a single-part group into its particle where the occurrence
/// allows, otherwise builds the sequence or choice group.
fn build_group(
    mut parts: Vec<ContentSpec>,
    separator: Option<char>,
    occurrence: Occurrence,
) -> ContentSpec {
    if parts.len() == 1 && separator.is_none() {
        let single = parts.remove(0);
        if occurrence == Occurrence::Once {
            return single;
        }
        if single.occurrence == Occurrence::Once {
            return ContentSpec {
                kind: single.kind,
                occurrence,
            };
        }
        // Both the particle and the group carry indicators, e.g. (x?)*.
        return ContentSpec {
            kind: ContentSpecKind::Seq(vec![single]),
            occurrence,
        };
    }
    let kind = if separator == Some('|') {
        ContentSpecKind::Choice(parts)
    } else {
        ContentSpecKind::Seq(parts)
    };
    ContentSpec { kind, occurrence }
}

/// Decodes the character references in an entity value, leaving all other
/// text (including general-entity references) untouched. Used to check
/// redeclarations of the built-in entities.
fn expand_character_references(value: &str) -> String {
    let chars_vec: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars_vec.len() {
        if chars_vec[i] == '&' && i + 1 < chars_vec.len() && chars_vec[i + 1] == '#' {
            let mut j = i + 2;
            let hex = chars_vec.get(j) == Some(&'x');
            if hex {
                j += 1;
            }
            let digits_start = j;
            while j < chars_vec.len() && chars_vec[j].is_ascii_hexdigit() {
                j += 1;
            }
            if j > digits_start && chars_vec.get(j) == Some(&';') {
                let digits: String = chars_vec[digits_start..j].iter().collect();
                let radix = if hex { 16 } else { 10 };
                if let Some(c) =
                    u32::from_str_radix(&digits, radix).ok().and_then(char::from_u32)
                {
                    out.push(c);
                    i = j + 1;
                    continue;
                }
            }
        }
        out.push(chars_vec[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_character_references() {
        assert_eq!(expand_character_references("a&#98;&#x63;d"), "abcd");
        assert_eq!(expand_character_references("&#38;#38;"), "&#38;");
        assert_eq!(expand_character_references("&amp;amp;"), "&amp;amp;");
        assert_eq!(expand_character_references("no refs"), "no refs");
    }

    #[test]
    fn test_build_group_folds_single_particle() {
        let leaf = ContentSpec {
            kind: ContentSpecKind::Name("a".to_string()),
            occurrence: Occurrence::Once,
        };
        // (a) keeps the particle as-is.
        let folded = build_group(vec![leaf.clone()], None, Occurrence::Once);
        assert_eq!(folded, leaf);
        // (a)* transfers the group indicator onto the particle.
        let starred = build_group(vec![leaf.clone()], None, Occurrence::ZeroOrMore);
        assert_eq!(starred.kind, ContentSpecKind::Name("a".to_string()));
        assert_eq!(starred.occurrence, Occurrence::ZeroOrMore);
        // (a?)* must keep both indicators.
        let optional = ContentSpec {
            kind: ContentSpecKind::Name("a".to_string()),
            occurrence: Occurrence::Optional,
        };
        let wrapped = build_group(vec![optional.clone()], None, Occurrence::ZeroOrMore);
        assert_eq!(
            wrapped.kind,
            ContentSpecKind::Seq(vec![optional]),
        );
        assert_eq!(wrapped.occurrence, Occurrence::ZeroOrMore);
    }
}
