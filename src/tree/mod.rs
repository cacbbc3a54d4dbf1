//! The document tree produced by a successful parse.
//!
//! A [`Document`] owns its root [`Element`] directly; elements own their
//! children. Character data and CDATA content are concatenated into each
//! element's `text`, child elements are kept in document order, and end
//! tags are not stored. The tree holds no external resources — it is a
//! plain value that can outlive the parser.

use std::collections::HashMap;
use std::fmt;

use crate::validation::dtd::DoctypeDeclaration;

/// The kind of a parsed tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// A start tag: `<name ...>`.
    Start,
    /// An end tag: `</name>`.
    End,
    /// An empty-element tag: `<name .../>`.
    Empty,
}

/// A parsed start, end, or empty-element tag.
///
/// Attribute names within one tag are pairwise distinct; the parser rejects
/// duplicates (XML 1.0 §3.1 WFC: Unique Att Spec).
#[derive(Debug, Clone)]
pub struct Tag {
    /// The tag name.
    pub name: String,
    /// Whether this is a start, end, or empty-element tag.
    pub kind: TagKind,
    /// Attribute values keyed by attribute name, after normalization and
    /// DTD default application.
    pub attributes: HashMap<String, String>,
}

impl Tag {
    pub(crate) fn new(name: String, kind: TagKind) -> Self {
        Self {
            name,
            kind,
            attributes: HashMap::new(),
        }
    }
}

/// A processing instruction: `<?target instruction?>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    /// The PI target name.
    pub target: String,
    /// Everything between the target and the closing `?>`, which may be
    /// empty.
    pub instruction: String,
}

/// A parsed element and its content.
#[derive(Debug, Clone)]
pub struct Element {
    /// The element's start (or empty-element) tag.
    pub tag: Tag,
    /// Concatenation of all character data and CDATA content, in document
    /// order. Comments are discarded; child element content is not
    /// included.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Processing instructions that appeared directly inside this element.
    pub processing_instructions: Vec<ProcessingInstruction>,
    /// `true` if the element had no content of any kind (no text, no
    /// children, no comments, no PIs).
    pub is_empty: bool,
    /// `true` if the element contained only child elements and whitespace:
    /// no non-whitespace text, CDATA, PI, comment, or
    /// character-reference-derived characters.
    pub children_only: bool,
}

impl Element {
    pub(crate) fn new(tag: Tag) -> Self {
        Self {
            tag,
            text: String::new(),
            children: Vec::new(),
            processing_instructions: Vec::new(),
            is_empty: true,
            children_only: true,
        }
    }

    /// The element's tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tag.name
    }

    /// Looks up an attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.tag.attributes.get(name).map(String::as_str)
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The declared XML version; `"1.0"` when no XML declaration was
    /// present.
    pub version: String,
    /// The declared encoding, lowercased; `"utf-8"` by default.
    pub encoding: String,
    /// The standalone declaration; `false` by default.
    pub standalone: bool,
    /// The document type declaration, when a DOCTYPE was present.
    pub doctype: Option<DoctypeDeclaration>,
    /// The single root element.
    pub root: Element,
    /// Processing instructions outside the root element (prolog and
    /// epilog), in document order.
    pub processing_instructions: Vec<ProcessingInstruction>,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "document (version {}, encoding {}, root <{}>)",
            self.version,
            self.encoding,
            self.root.name()
        )
    }
}
