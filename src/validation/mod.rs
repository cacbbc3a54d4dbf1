//! Document validation against a DTD.
//!
//! This module holds the DTD data model (declarations collected from the
//! internal and external subsets) and the validator that runs as a final
//! pass over a parsed [`Document`](crate::tree::Document) when a DOCTYPE
//! was present.
//!
//! # Architecture
//!
//! - The `dtd` submodule defines the declaration types
//!   ([`DoctypeDeclaration`](dtd::DoctypeDeclaration),
//!   [`ElementDecl`](dtd::ElementDecl), [`AttributeDecl`](dtd::AttributeDecl),
//!   [`EntityDecl`](dtd::EntityDecl), [`NotationDecl`](dtd::NotationDecl))
//!   and the two validation passes: element structure (content models) and
//!   attribute structure (types, defaults, ID/IDREF/ENTITY integrity).
//! - Validation fails fast: the first violation aborts the pass and is
//!   surfaced as a [`ParseError`](crate::error::ParseError) with no source
//!   location (the pass runs over the finished tree).
//!
//! The element and attribute passes can be disabled independently through
//! [`ParseOptions`](crate::parser::ParseOptions).

pub mod dtd;
