//! XML 1.0 parser.
//!
//! A hand-rolled recursive descent parser conforming to the W3C XML 1.0
//! (Fifth Edition) specification. The parser builds a [`Document`] tree,
//! resolving general and parameter entities (internal and external) as it
//! goes, and validates the result against the DTD when one is present.
//!
//! The parser is hand-rolled (not combinator-based) because:
//! 1. Entity inclusion requires suspending one character stream inside
//!    another, which maps directly onto an explicit stack
//! 2. The DTD grammar changes what is recognized by context (parameter
//!    entities, conditional sections), needing fine-grained control
//! 3. Fail-fast error reporting wants exact source locations

pub(crate) mod entity;
pub(crate) mod input;
pub mod source;

mod dtd;
mod xml;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::error::ParseError;
use crate::tree::Document;
use crate::validation::dtd::validate_document;

use input::ParserInput;
use source::ByteSource;

/// A callback for opening external resources.
///
/// Given a resolved path — the system identifier of an external entity or
/// of the external DTD subset — the opener returns the byte source the
/// parser will read it from. Relative system identifiers are resolved
/// against the folder of the enclosing resource before the opener is
/// called; identifiers beginning with `http://` or `https://` (any case)
/// are passed through verbatim.
pub type EntityOpener = Arc<dyn Fn(&Path) -> std::io::Result<Box<dyn ByteSource>> + Send + Sync>;

/// The default opener: reads from the local filesystem.
pub(crate) fn default_opener() -> EntityOpener {
    Arc::new(|path: &Path| {
        let file = std::fs::File::open(path)?;
        Ok(Box::new(std::io::BufReader::new(file)) as Box<dyn ByteSource>)
    })
}

/// Parse options controlling validation and resource limits.
///
/// Use the builder pattern to configure options:
///
/// ```
/// use xmldtd::ParseOptions;
///
/// let opts = ParseOptions::default()
///     .validate_elements(false)
///     .max_depth(128);
/// ```
#[derive(Clone)]
pub struct ParseOptions {
    /// Run the element-structure validation pass when a DOCTYPE is
    /// present (default: true).
    pub validate_elements: bool,
    /// Run the attribute-structure validation pass when a DOCTYPE is
    /// present (default: true).
    pub validate_attributes: bool,
    /// Opener for external resources; the filesystem is used when unset.
    pub opener: Option<EntityOpener>,

    // -- Resource limits --
    /// Maximum element nesting depth (default: 256).
    pub max_depth: u32,
    /// Maximum number of entity inclusions per document (default: 10,000).
    pub max_entity_expansions: u32,
}

impl std::fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseOptions")
            .field("validate_elements", &self.validate_elements)
            .field("validate_attributes", &self.validate_attributes)
            .field("opener", &self.opener.as_ref().map(|_| "..."))
            .field("max_depth", &self.max_depth)
            .field("max_entity_expansions", &self.max_entity_expansions)
            .finish()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate_elements: true,
            validate_attributes: true,
            opener: None,
            max_depth: 256,
            max_entity_expansions: 10_000,
        }
    }
}

impl ParseOptions {
    /// Enables or disables the element-structure validation pass.
    #[must_use]
    pub fn validate_elements(mut self, yes: bool) -> Self {
        self.validate_elements = yes;
        self
    }

    /// Enables or disables the attribute-structure validation pass.
    #[must_use]
    pub fn validate_attributes(mut self, yes: bool) -> Self {
        self.validate_attributes = yes;
        self
    }

    /// Sets the opener used for external entities and the external
    /// subset.
    ///
    /// # Security
    ///
    /// Resolving external entities means the parser will open whatever
    /// resources the document names. Only parse trusted input with an
    /// opener, or restrict the paths the opener is willing to serve.
    #[must_use]
    pub fn opener(
        mut self,
        opener: impl Fn(&Path) -> std::io::Result<Box<dyn ByteSource>> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Some(Arc::new(opener));
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: u32) -> Self {
        self.max_depth = max;
        self
    }

    /// Sets the maximum number of entity inclusions.
    #[must_use]
    pub fn max_entity_expansions(mut self, max: u32) -> Self {
        self.max_entity_expansions = max;
        self
    }
}

/// Parses an XML string with default options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed, or not valid
/// against its DTD when one is present.
pub fn parse_str(input: &str) -> Result<Document, ParseError> {
    parse_str_with_options(input, &ParseOptions::default())
}

/// Parses an XML string with the given options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed, or not valid
/// against its DTD when the corresponding pass is enabled.
pub fn parse_str_with_options(input: &str, options: &ParseOptions) -> Result<Document, ParseError> {
    parse_with(Box::new(Cursor::new(input.as_bytes())), options, None)
}

/// Parses an XML document from an arbitrary byte source.
///
/// # Errors
///
/// Returns `ParseError` on malformed input or invalid documents.
pub fn parse_source(
    source: Box<dyn ByteSource>,
    options: &ParseOptions,
) -> Result<Document, ParseError> {
    parse_with(source, options, None)
}

/// Parses an XML file with default options. Relative system identifiers
/// within the document resolve against the file's folder.
///
/// # Errors
///
/// Returns `ParseError` if the file cannot be opened, is not well-formed,
/// or is invalid against its DTD.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Document, ParseError> {
    parse_file_with_options(path, &ParseOptions::default())
}

/// Parses an XML file with the given options.
///
/// # Errors
///
/// Returns `ParseError` if the file cannot be opened, is not well-formed,
/// or is invalid against its DTD when the corresponding pass is enabled.
pub fn parse_file_with_options(
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> Result<Document, ParseError> {
    let path = path.as_ref();
    let opener = options.opener.clone().unwrap_or_else(default_opener);
    let source = opener(path).map_err(|e| ParseError {
        message: format!("cannot open '{}': {e}", path.display()),
        location: None,
        resources: Vec::new(),
    })?;
    parse_with(source, options, Some(path))
}

fn parse_with<'a>(
    source: Box<dyn ByteSource + 'a>,
    options: &ParseOptions,
    document_path: Option<&Path>,
) -> Result<Document, ParseError> {
    let opener = options.opener.clone().unwrap_or_else(default_opener);
    let mut input = ParserInput::new(source, opener, document_path);
    input.set_max_depth(options.max_depth);
    input.set_max_entity_expansions(options.max_entity_expansions);
    let document = xml::XmlParser::new(input).parse()?;
    if options.validate_elements || options.validate_attributes {
        validate_document(
            &document,
            options.validate_elements,
            options.validate_attributes,
        )?;
    }
    Ok(document)
}
