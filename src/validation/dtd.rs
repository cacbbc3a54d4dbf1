//! DTD (Document Type Definition) data model and validator.
//!
//! The data model captures every declaration kind from XML 1.0 (Fifth
//! Edition) sections 2.8, 3.2, 3.3, 4.2, and 4.7: elements, attribute
//! lists, general and parameter entities, and notations. The parser fills
//! a [`DoctypeDeclaration`] while reading the internal and external
//! subsets; the validator then checks a parsed document against it.
//!
//! # Content Model Matching
//!
//! The validator implements greedy left-to-right content model matching:
//! - `EMPTY`: the element must have no content of any kind
//! - `ANY`: any content is allowed
//! - Mixed content `(#PCDATA|a|b)*`: text plus the listed elements in any
//!   order
//! - Element content with sequences `(a,b,c)`, choices `(a|b|c)`, and
//!   occurrence indicators `?`, `*`, `+`
//!
//! Greedy matching of models such as `(x?)*` can loop without consuming
//! input; an iteration that makes no progress is treated as having reached
//! its maximum count so the match terminates (see [`match_content_spec`]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::chars::{is_valid_name, is_valid_nmtoken};
use crate::error::ParseError;
use crate::tree::{Document, Element};

// ---------------------------------------------------------------------------
// DTD Data Model
// ---------------------------------------------------------------------------

/// An external identifier locating an external resource.
///
/// See XML 1.0 §4.2.2 production `[75]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExternalId {
    /// No external identifier.
    #[default]
    None,
    /// `SYSTEM "sysid"`.
    System {
        /// The system identifier, treated as a resource path.
        system_id: PathBuf,
    },
    /// `PUBLIC "pubid" "sysid"`.
    Public {
        /// The public identifier.
        public_id: String,
        /// The system identifier, treated as a resource path.
        system_id: PathBuf,
    },
}

impl ExternalId {
    /// The system identifier, if any.
    #[must_use]
    pub fn system_id(&self) -> Option<&std::path::Path> {
        match self {
            Self::None => None,
            Self::System { system_id } | Self::Public { system_id, .. } => Some(system_id),
        }
    }

    /// `true` unless this is [`ExternalId::None`].
    #[must_use]
    pub fn exists(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The document type declaration and every definition collected from the
/// internal and external subsets.
#[derive(Debug, Clone)]
pub struct DoctypeDeclaration {
    /// The declared root element name.
    pub root_name: String,
    /// The external identifier of the external subset, if any.
    pub external_id: ExternalId,
    /// Processing instructions that appeared inside the DTD, in order.
    pub processing_instructions: Vec<crate::tree::ProcessingInstruction>,
    /// Element declarations keyed by element name.
    pub elements: HashMap<String, ElementDecl>,
    /// Attribute-list declarations keyed by element name.
    pub attlists: HashMap<String, AttributeList>,
    /// General entity declarations keyed by entity name, pre-seeded with
    /// the five built-ins `lt`, `gt`, `amp`, `apos`, `quot`.
    pub general_entities: HashMap<String, EntityDecl>,
    /// Parameter entity declarations keyed by entity name.
    pub parameter_entities: HashMap<String, EntityDecl>,
    /// Notation declarations keyed by notation name.
    pub notations: HashMap<String, NotationDecl>,
}

/// The built-in general entities, stored with the double-escaped
/// replacement text the standard declares them with (XML 1.0 §4.6).
pub(crate) const BUILT_IN_GENERAL_ENTITIES: [(&str, &str); 5] = [
    ("lt", "&#60;"),
    ("gt", "&#62;"),
    ("amp", "&#38;"),
    ("apos", "&#39;"),
    ("quot", "&#34;"),
];

impl Default for DoctypeDeclaration {
    fn default() -> Self {
        let general_entities = BUILT_IN_GENERAL_ENTITIES
            .iter()
            .map(|&(name, value)| (name.to_string(), EntityDecl::internal(name, value)))
            .collect();
        Self {
            root_name: String::new(),
            external_id: ExternalId::None,
            processing_instructions: Vec::new(),
            elements: HashMap::new(),
            attlists: HashMap::new(),
            general_entities,
            parameter_entities: HashMap::new(),
            notations: HashMap::new(),
        }
    }
}

/// An element declaration from `<!ELEMENT name content-model>`.
///
/// See XML 1.0 §3.2.
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// The element name.
    pub name: String,
    /// The declared content model.
    pub content_model: ContentModel,
}

/// The content model of an element declaration.
///
/// See XML 1.0 §3.2: `contentspec ::= 'EMPTY' | 'ANY' | Mixed | children`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentModel {
    /// The element must have no content at all.
    Empty,
    /// Any content is allowed.
    Any,
    /// Mixed content: character data plus the listed child elements in any
    /// order. `#PCDATA` is implicit and always allowed; the set holds the
    /// permitted child element names.
    Mixed(HashSet<String>),
    /// Element-only content following a content particle pattern.
    Children(ContentSpec),
}

/// A content specification for element-only content models.
///
/// Represents the recursive structure of `(a,b)`, `(a|b)`, etc. with
/// occurrence indicators. See XML 1.0 §3.2.1.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSpec {
    /// The content particle kind.
    pub kind: ContentSpecKind,
    /// How many times this particle may occur.
    pub occurrence: Occurrence,
}

/// The kind of a content specification particle.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSpecKind {
    /// A single named element, e.g., `a`.
    Name(String),
    /// A sequence of particles, e.g., `(a, b, c)`.
    Seq(Vec<ContentSpec>),
    /// A choice among particles, e.g., `(a | b | c)`.
    Choice(Vec<ContentSpec>),
}

/// Occurrence indicator for a content particle.
///
/// See XML 1.0 §3.2.1: `'?' | '*' | '+'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// Exactly once (no indicator).
    Once,
    /// Zero or one time (`?`).
    Optional,
    /// Zero or more times (`*`).
    ZeroOrMore,
    /// One or more times (`+`).
    OneOrMore,
}

impl Occurrence {
    /// The inclusive `(min, max)` repetition bounds.
    fn bounds(self) -> (usize, usize) {
        match self {
            Self::Once => (1, 1),
            Self::Optional => (0, 1),
            Self::ZeroOrMore => (0, usize::MAX),
            Self::OneOrMore => (1, usize::MAX),
        }
    }
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "EMPTY"),
            Self::Any => write!(f, "ANY"),
            Self::Mixed(names) => {
                if names.is_empty() {
                    write!(f, "(#PCDATA)")
                } else {
                    let mut sorted: Vec<_> = names.iter().map(String::as_str).collect();
                    sorted.sort_unstable();
                    write!(f, "(#PCDATA|{})*", sorted.join("|"))
                }
            }
            Self::Children(spec) => write!(f, "{spec}"),
        }
    }
}

impl fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ContentSpecKind::Name(name) => write!(f, "{name}")?,
            ContentSpecKind::Seq(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")?;
            }
            ContentSpecKind::Choice(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")?;
            }
        }
        match self.occurrence {
            Occurrence::Once => {}
            Occurrence::Optional => write!(f, "?")?,
            Occurrence::ZeroOrMore => write!(f, "*")?,
            Occurrence::OneOrMore => write!(f, "+")?,
        }
        Ok(())
    }
}

/// Attribute declarations for one element, keyed by attribute name.
///
/// Repeat `<!ATTLIST>` declarations for the same element merge into one
/// list; the first declaration of a given attribute wins.
pub type AttributeList = HashMap<String, AttributeDecl>;

/// An attribute declaration from `<!ATTLIST element name type default>`.
///
/// See XML 1.0 §3.3.
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// The attribute name.
    pub name: String,
    /// The declared attribute type.
    pub attr_type: AttributeType,
    /// The default value specification.
    pub default: AttributeDefault,
    /// `true` if declared in the external subset or in an external
    /// parameter entity (relevant for standalone validation).
    pub from_external: bool,
}

/// The type of an attribute as declared in `<!ATTLIST>`.
///
/// See XML 1.0 §3.3.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// Character data (`CDATA`).
    CData,
    /// A unique identifier (`ID`).
    Id,
    /// A reference to an ID (`IDREF`).
    IdRef,
    /// Space-separated list of ID references (`IDREFS`).
    IdRefs,
    /// An unparsed entity name (`ENTITY`).
    Entity,
    /// Space-separated list of unparsed entity names (`ENTITIES`).
    Entities,
    /// A name token (`NMTOKEN`).
    NmToken,
    /// Space-separated list of name tokens (`NMTOKENS`).
    NmTokens,
    /// A notation type with its allowed notation names (`NOTATION (a|b)`).
    Notation(Vec<String>),
    /// An enumeration of allowed nmtokens (`(a|b|c)`).
    Enumeration(Vec<String>),
}

impl AttributeType {
    /// `true` for types whose values undergo non-CDATA normalization
    /// (XML 1.0 §3.3.3).
    #[must_use]
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::CData)
    }
}

/// The default-value specification of an attribute declaration.
///
/// See XML 1.0 §3.3.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefault {
    /// The attribute must be specified (`#REQUIRED`).
    Required,
    /// The attribute is optional with no default (`#IMPLIED`).
    Implied,
    /// The attribute has a fixed value (`#FIXED "value"`).
    Fixed(String),
    /// The attribute has a default value (`"value"`).
    Default(String),
}

impl AttributeDefault {
    /// The declared default value, if the specification carries one.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Required | Self::Implied => None,
            Self::Fixed(v) | Self::Default(v) => Some(v),
        }
    }
}

/// A general or parameter entity declaration.
///
/// The variants share all fields except `is_parameter`, `is_unparsed`, and
/// `notation_name`, so a single struct carries both kinds.
/// See XML 1.0 §4.2.
#[derive(Debug, Clone)]
pub struct EntityDecl {
    /// The entity name.
    pub name: String,
    /// The replacement text; empty for external entities (their content is
    /// fetched lazily when referenced).
    pub value: String,
    /// `true` for entities declared with an external identifier.
    pub is_external: bool,
    /// The external identifier; [`ExternalId::None`] for internal entities.
    pub external_id: ExternalId,
    /// `true` if declared in the external subset or in an external
    /// parameter entity (relevant for standalone validation).
    pub from_external: bool,
    /// `true` for unparsed entities (declared with `NDATA`).
    pub is_unparsed: bool,
    /// The associated notation name; present only for unparsed entities.
    pub notation_name: Option<String>,
    /// `true` for parameter entities.
    pub is_parameter: bool,
}

impl EntityDecl {
    pub(crate) fn internal(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            is_external: false,
            external_id: ExternalId::None,
            from_external: false,
            is_unparsed: false,
            notation_name: None,
            is_parameter: false,
        }
    }
}

/// A notation declaration from `<!NOTATION name ...>`.
///
/// See XML 1.0 §4.7.
#[derive(Debug, Clone)]
pub struct NotationDecl {
    /// The notation name.
    pub name: String,
    /// The PUBLIC identifier, if any.
    pub public_id: Option<String>,
    /// The SYSTEM identifier, if any.
    pub system_id: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// DTD Validator
// ---------------------------------------------------------------------------

/// Validates a document against its document type declaration.
///
/// The element-structure and attribute-structure passes can be disabled
/// independently; the declared-root check belongs to the element pass.
/// The first violation aborts validation.
///
/// # Errors
///
/// Returns a location-free [`ParseError`] describing the first violation.
pub fn validate_document(
    doc: &Document,
    validate_elements: bool,
    validate_attributes: bool,
) -> Result<(), ParseError> {
    let Some(dtd) = doc.doctype.as_ref() else {
        return Ok(());
    };

    if validate_elements {
        if doc.root.name() != dtd.root_name {
            return Err(ParseError::validity(format!(
                "root element '{}' does not match DOCTYPE name '{}'",
                doc.root.name(),
                dtd.root_name
            )));
        }
        validate_element(&doc.root, dtd, doc.standalone)?;
    }

    if validate_attributes {
        validate_attribute_declarations(dtd)?;
        let mut ids = HashSet::new();
        let mut idrefs = Vec::new();
        let mut entity_refs = Vec::new();
        validate_attributes_recursive(&doc.root, dtd, &mut ids, &mut idrefs, &mut entity_refs)?;

        for idref in &idrefs {
            if !ids.contains(idref) {
                return Err(ParseError::validity(format!(
                    "IDREF '{idref}' does not match any ID in the document"
                )));
            }
        }
        for name in &entity_refs {
            let is_unparsed = dtd
                .general_entities
                .get(name)
                .is_some_and(|e| e.is_unparsed);
            if !is_unparsed {
                return Err(ParseError::validity(format!(
                    "ENTITY attribute value '{name}' does not name a declared unparsed entity"
                )));
            }
        }
    }

    Ok(())
}

/// Recursively validates an element's structure against the DTD.
fn validate_element(
    element: &Element,
    dtd: &DoctypeDeclaration,
    standalone: bool,
) -> Result<(), ParseError> {
    let name = element.name();
    let Some(decl) = dtd.elements.get(name) else {
        return Err(ParseError::validity(format!(
            "element '{name}' is not declared in the DTD"
        )));
    };

    match &decl.content_model {
        ContentModel::Empty => {
            if !element.is_empty {
                return Err(ParseError::validity(format!(
                    "element '{name}' is declared EMPTY but has content"
                )));
            }
        }
        ContentModel::Any => {}
        ContentModel::Mixed(allowed) => {
            for child in &element.children {
                if !allowed.contains(child.name()) {
                    return Err(ParseError::validity(format!(
                        "element '{}' is not allowed in mixed content of '{name}'",
                        child.name()
                    )));
                }
            }
        }
        ContentModel::Children(spec) => {
            if !element.text.chars().all(crate::chars::is_whitespace) {
                return Err(ParseError::validity(format!(
                    "element '{name}' has element content but contains character data"
                )));
            }
            if !element.children_only {
                return Err(ParseError::validity(format!(
                    "element '{name}' has element content but contains non-element content"
                )));
            }
            if standalone && !element.text.is_empty() {
                return Err(ParseError::validity(format!(
                    "standalone document has whitespace in element content of '{name}'"
                )));
            }
            let child_names: Vec<&str> = element.children.iter().map(Element::name).collect();
            let mut pos = 0;
            if !match_content_spec(spec, &child_names, &mut pos) || pos < child_names.len() {
                return Err(ParseError::validity(format!(
                    "content of element '{name}' does not match declared model {spec}"
                )));
            }
        }
    }

    for child in &element.children {
        validate_element(child, dtd, standalone)?;
    }
    Ok(())
}

/// Matches a content spec against a slice of child element names.
///
/// Greedy and left-to-right: a leaf consumes as many consecutive matching
/// names as its occurrence allows; a sequence matches each part in order
/// and repeats, restoring the position when a repetition fails partway so
/// a failed repetition consumes nothing; a choice takes the first part
/// that advances and repeats. An iteration that matches without making
/// progress caps the repetition count so models like `(x?)*` cannot loop
/// forever.
fn match_content_spec(spec: &ContentSpec, names: &[&str], pos: &mut usize) -> bool {
    let (min, max) = spec.occurrence.bounds();
    let mut count = 0usize;
    match &spec.kind {
        ContentSpecKind::Name(expected) => {
            while count < max && *pos < names.len() && names[*pos] == expected {
                count += 1;
                *pos += 1;
            }
        }
        ContentSpecKind::Seq(parts) => {
            while count < max {
                let start = *pos;
                if !parts
                    .iter()
                    .all(|part| match_content_spec(part, names, pos))
                {
                    *pos = start;
                    break;
                }
                if *pos == start {
                    count = max;
                    break;
                }
                count += 1;
            }
        }
        ContentSpecKind::Choice(parts) => {
            while count < max {
                let start = *pos;
                let mut advanced = false;
                let mut matched_empty = false;
                for part in parts {
                    let saved = *pos;
                    let matched = match_content_spec(part, names, pos);
                    if matched && *pos > saved {
                        advanced = true;
                        break;
                    }
                    // An empty match (a nullable particle) must not win
                    // over a later branch that would consume input.
                    *pos = saved;
                    if matched {
                        matched_empty = true;
                    }
                }
                if !advanced {
                    *pos = start;
                    if matched_empty {
                        count = max;
                    }
                    break;
                }
                count += 1;
            }
        }
    }
    count >= min
}

/// Declaration-level attribute checks that do not depend on the instance
/// document: ID and NOTATION cardinality, ID presence constraints, and
/// notation declarations.
fn validate_attribute_declarations(dtd: &DoctypeDeclaration) -> Result<(), ParseError> {
    for (element_name, attlist) in &dtd.attlists {
        let mut id_count = 0;
        let mut notation_count = 0;
        for decl in attlist.values() {
            match &decl.attr_type {
                AttributeType::Id => {
                    id_count += 1;
                    if !matches!(
                        decl.default,
                        AttributeDefault::Required | AttributeDefault::Implied
                    ) {
                        return Err(ParseError::validity(format!(
                            "ID attribute '{}' on element '{element_name}' must be #REQUIRED or #IMPLIED",
                            decl.name
                        )));
                    }
                }
                AttributeType::Notation(notations) => {
                    notation_count += 1;
                    let is_empty_element = dtd
                        .elements
                        .get(element_name)
                        .is_some_and(|e| e.content_model == ContentModel::Empty);
                    if is_empty_element {
                        return Err(ParseError::validity(format!(
                            "NOTATION attribute '{}' must not be declared on EMPTY element '{element_name}'",
                            decl.name
                        )));
                    }
                    for notation in notations {
                        if !dtd.notations.contains_key(notation) {
                            return Err(ParseError::validity(format!(
                                "notation '{notation}' in attribute '{}' on element '{element_name}' is not declared",
                                decl.name
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        if id_count > 1 {
            return Err(ParseError::validity(format!(
                "element '{element_name}' declares more than one ID attribute"
            )));
        }
        if notation_count > 1 {
            return Err(ParseError::validity(format!(
                "element '{element_name}' declares more than one NOTATION attribute"
            )));
        }
    }
    Ok(())
}

/// Recursively validates attribute instances, collecting ID values and
/// IDREF / ENTITY tokens for the cross-document checks.
fn validate_attributes_recursive(
    element: &Element,
    dtd: &DoctypeDeclaration,
    ids: &mut HashSet<String>,
    idrefs: &mut Vec<String>,
    entity_refs: &mut Vec<String>,
) -> Result<(), ParseError> {
    let elem_name = element.name();
    let attlist = dtd.attlists.get(elem_name);

    for attr_name in element.tag.attributes.keys() {
        let declared = attlist.is_some_and(|list| list.contains_key(attr_name));
        if !declared {
            return Err(ParseError::validity(format!(
                "attribute '{attr_name}' on element '{elem_name}' is not declared"
            )));
        }
    }

    if let Some(attlist) = attlist {
        for decl in attlist.values() {
            let actual = element.attribute(&decl.name);
            match (&decl.default, actual) {
                (AttributeDefault::Required, None) => {
                    return Err(ParseError::validity(format!(
                        "required attribute '{}' missing on element '{elem_name}'",
                        decl.name
                    )));
                }
                (AttributeDefault::Fixed(fixed), Some(value)) => {
                    if value != fixed {
                        return Err(ParseError::validity(format!(
                            "attribute '{}' on element '{elem_name}' must have fixed value '{fixed}', found '{value}'",
                            decl.name
                        )));
                    }
                }
                _ => {}
            }
            if let Some(value) = actual {
                validate_attribute_value(
                    value,
                    &decl.attr_type,
                    &decl.name,
                    elem_name,
                    ids,
                    idrefs,
                    entity_refs,
                )?;
            }
        }
    }

    for child in &element.children {
        validate_attributes_recursive(child, dtd, ids, idrefs, entity_refs)?;
    }
    Ok(())
}

/// Validates one attribute value against its declared type.
fn validate_attribute_value(
    value: &str,
    attr_type: &AttributeType,
    attr_name: &str,
    elem_name: &str,
    ids: &mut HashSet<String>,
    idrefs: &mut Vec<String>,
    entity_refs: &mut Vec<String>,
) -> Result<(), ParseError> {
    let type_error = |detail: &str| {
        ParseError::validity(format!(
            "attribute '{attr_name}' on element '{elem_name}' has {detail} '{value}'"
        ))
    };
    match attr_type {
        AttributeType::CData => {}
        AttributeType::Id => {
            if !is_valid_name(value) {
                return Err(type_error("invalid ID value"));
            }
            if !ids.insert(value.to_string()) {
                return Err(ParseError::validity(format!(
                    "duplicate ID value '{value}' on attribute '{attr_name}' of element '{elem_name}'"
                )));
            }
        }
        AttributeType::IdRef => {
            if !is_valid_name(value) {
                return Err(type_error("invalid IDREF value"));
            }
            idrefs.push(value.to_string());
        }
        AttributeType::IdRefs => {
            let mut any = false;
            for token in value.split_whitespace() {
                any = true;
                if !is_valid_name(token) {
                    return Err(type_error("invalid IDREFS value"));
                }
                idrefs.push(token.to_string());
            }
            if !any {
                return Err(type_error("empty IDREFS value"));
            }
        }
        AttributeType::Entity => {
            if !is_valid_name(value) {
                return Err(type_error("invalid ENTITY value"));
            }
            entity_refs.push(value.to_string());
        }
        AttributeType::Entities => {
            let mut any = false;
            for token in value.split_whitespace() {
                any = true;
                if !is_valid_name(token) {
                    return Err(type_error("invalid ENTITIES value"));
                }
                entity_refs.push(token.to_string());
            }
            if !any {
                return Err(type_error("empty ENTITIES value"));
            }
        }
        AttributeType::NmToken => {
            if !is_valid_nmtoken(value) {
                return Err(type_error("invalid NMTOKEN value"));
            }
        }
        AttributeType::NmTokens => {
            let mut any = false;
            for token in value.split_whitespace() {
                any = true;
                if !is_valid_nmtoken(token) {
                    return Err(type_error("invalid NMTOKENS value"));
                }
            }
            if !any {
                return Err(type_error("empty NMTOKENS value"));
            }
        }
        AttributeType::Notation(allowed) | AttributeType::Enumeration(allowed) => {
            if !allowed.iter().any(|v| v == value) {
                return Err(type_error("a value outside the allowed set:"));
            }
        }
    }
    Ok(())
}
