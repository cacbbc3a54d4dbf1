//! # xmldtd
//!
//! A validating XML 1.0 parser with full DTD support. The parser consumes
//! a byte stream (in-memory string or file), resolves general and
//! parameter entities — internal and external — and produces a fully
//! resolved document tree plus the document type declaration. With a DTD
//! present it enforces validity: element content models, attribute types
//! and defaults, ID/IDREF integrity, and entity constraints.
//!
//! Input must be UTF-8; the parser handles well-formedness per the W3C
//! XML 1.0 (Fifth Edition) specification and fails fast with a located
//! [`ParseError`] on the first violation.
//!
//! ## Quick Start
//!
//! ```
//! let doc = xmldtd::parse_str("<root><child>Hello</child></root>").unwrap();
//! assert_eq!(doc.root.name(), "root");
//! assert_eq!(doc.root.children[0].text, "Hello");
//! ```
//!
//! Validation against a DTD runs automatically when a DOCTYPE is present:
//!
//! ```
//! let xml = "<!DOCTYPE r [<!ELEMENT r EMPTY>]><r>oops</r>";
//! assert!(xmldtd::parse_str(xml).is_err());
//! ```

mod chars;
pub mod error;
pub mod parser;
pub mod tree;
pub mod validation;

// Re-export primary types at the crate root for convenience.
pub use error::{ParseError, SourceLocation};
pub use parser::{
    parse_file, parse_file_with_options, parse_source, parse_str, parse_str_with_options,
    ParseOptions,
};
pub use tree::{Document, Element, ProcessingInstruction, Tag, TagKind};
