//! XML 1.0 character classes.
//!
//! Membership predicates for the `Char`, `NameStartChar`, `NameChar`, and
//! `PubidChar` productions of XML 1.0 (Fifth Edition) — `[2]`, `[4]`,
//! `[4a]`, and `[13]` respectively. The classes are stored as sorted,
//! disjoint `(lo, hi)` ranges and membership is decided by binary search,
//! which keeps the non-ASCII ranges compact and cache-friendly.

use std::cmp::Ordering;

/// Decides membership in a sorted table of disjoint inclusive ranges.
fn in_table(c: char, table: &[(char, char)]) -> bool {
    table
        .binary_search_by(|&(lo, hi)| {
            if c < lo {
                Ordering::Greater
            } else if c > hi {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
        .is_ok()
}

/// ```text
/// [2] Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD]
///            | [#x10000-#x10FFFF]
/// ```
const CHAR_TABLE: &[(char, char)] = &[
    ('\u{9}', '\u{A}'),
    ('\u{D}', '\u{D}'),
    ('\u{20}', '\u{D7FF}'),
    ('\u{E000}', '\u{FFFD}'),
    ('\u{10000}', '\u{10FFFF}'),
];

/// ```text
/// [4] NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6]
///     | [#xD8-#xF6] | [#xF8-#x2FF] | [#x370-#x37D] | [#x37F-#x1FFF]
///     | [#x200C-#x200D] | [#x2070-#x218F] | [#x2C00-#x2FEF]
///     | [#x3001-#xD7FF] | [#xF900-#xFDCF] | [#xFDF0-#xFFFD]
///     | [#x10000-#xEFFFF]
/// ```
const NAME_START_CHAR_TABLE: &[(char, char)] = &[
    (':', ':'),
    ('A', 'Z'),
    ('_', '_'),
    ('a', 'z'),
    ('\u{C0}', '\u{D6}'),
    ('\u{D8}', '\u{F6}'),
    ('\u{F8}', '\u{2FF}'),
    ('\u{370}', '\u{37D}'),
    ('\u{37F}', '\u{1FFF}'),
    ('\u{200C}', '\u{200D}'),
    ('\u{2070}', '\u{218F}'),
    ('\u{2C00}', '\u{2FEF}'),
    ('\u{3001}', '\u{D7FF}'),
    ('\u{F900}', '\u{FDCF}'),
    ('\u{FDF0}', '\u{FFFD}'),
    ('\u{10000}', '\u{EFFFF}'),
];

/// ```text
/// [4a] NameChar ::= NameStartChar | "-" | "." | [0-9] | #xB7
///     | [#x0300-#x036F] | [#x203F-#x2040]
/// ```
const NAME_CHAR_TABLE: &[(char, char)] = &[
    ('-', '.'),
    ('0', ':'),
    ('A', 'Z'),
    ('_', '_'),
    ('a', 'z'),
    ('\u{B7}', '\u{B7}'),
    ('\u{C0}', '\u{D6}'),
    ('\u{D8}', '\u{F6}'),
    ('\u{F8}', '\u{37D}'),
    ('\u{37F}', '\u{1FFF}'),
    ('\u{200C}', '\u{200D}'),
    ('\u{203F}', '\u{2040}'),
    ('\u{2070}', '\u{218F}'),
    ('\u{2C00}', '\u{2FEF}'),
    ('\u{3001}', '\u{D7FF}'),
    ('\u{F900}', '\u{FDCF}'),
    ('\u{FDF0}', '\u{FFFD}'),
    ('\u{10000}', '\u{EFFFF}'),
];

/// ```text
/// [13] PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]
/// ```
const PUBID_CHAR_TABLE: &[(char, char)] = &[
    ('\u{A}', '\u{A}'),
    ('\u{D}', '\u{D}'),
    ('\u{20}', '\u{21}'),
    ('\u{23}', '\u{25}'),
    ('\u{27}', '\u{3B}'),
    ('=', '='),
    ('?', 'Z'),
    ('_', '_'),
    ('a', 'z'),
];

/// Returns `true` if `c` is a valid `Char` per XML 1.0 §2.2 `[2]`.
pub(crate) fn is_char(c: char) -> bool {
    in_table(c, CHAR_TABLE)
}

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    in_table(c, NAME_START_CHAR_TABLE)
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 `[4a]`.
pub(crate) fn is_name_char(c: char) -> bool {
    in_table(c, NAME_CHAR_TABLE)
}

/// Returns `true` if `c` is a valid `PubidChar` per XML 1.0 §2.3 `[13]`.
pub(crate) fn is_pubid_char(c: char) -> bool {
    in_table(c, PUBID_CHAR_TABLE)
}

/// Returns `true` if `c` is whitespace per XML 1.0 §2.3 `[3]`.
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Checks if a string is a valid XML `Name` (production `[5]`).
pub(crate) fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// Checks if a string is a valid `Nmtoken` (production `[7]`).
pub(crate) fn is_valid_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}
