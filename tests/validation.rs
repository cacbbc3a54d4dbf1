//! DTD validation: content models, attribute semantics, and ID/IDREF
//! integrity over the parsed tree.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use xmldtd::{parse_str, parse_str_with_options, ParseOptions};

#[test]
fn test_content_model_sequence() {
    let dtd = "<!DOCTYPE r [\n\
        <!ELEMENT r (a, b+, c?)>\n\
        <!ELEMENT a EMPTY><!ELEMENT b EMPTY><!ELEMENT c EMPTY>\n]>";
    assert!(parse_str(&format!("{dtd}<r><a/><b/><b/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><a/><b/><c/></r>")).is_ok());
    let err = parse_str(&format!("{dtd}<r><a/><c/></r>")).unwrap_err();
    assert!(err.message.contains("does not match"), "{}", err.message);
    assert!(err.to_string().starts_with("validation error"));
}

#[test]
fn test_content_model_choice_repetition() {
    let dtd = "<!DOCTYPE r [\n\
        <!ELEMENT r (head, (p | list+ | note)*, div2*)>\n\
        <!ELEMENT head EMPTY><!ELEMENT p EMPTY><!ELEMENT list EMPTY>\n\
        <!ELEMENT note EMPTY><!ELEMENT div2 EMPTY>\n]>";
    assert!(parse_str(&format!(
        "{dtd}<r><head/><list/><list/><note/><div2/><div2/></r>"
    ))
    .is_ok());
    assert!(parse_str(&format!("{dtd}<r><head/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><div2/></r>")).is_err());
}

#[test]
fn test_content_model_whitespace_allowed() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]>";
    let doc = parse_str(&format!("{dtd}<r>\n    <a/>\n</r>")).unwrap();
    assert!(doc.root.children_only);
}

#[test]
fn test_content_model_rejects_text() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]>";
    let err = parse_str(&format!("{dtd}<r>text<a/></r>")).unwrap_err();
    assert!(err.message.contains("character data"), "{}", err.message);
}

#[test]
fn test_content_model_rejects_comment() {
    // Comments clear the children-only flag, so element content with a
    // comment fails validation.
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]>";
    let err = parse_str(&format!("{dtd}<r><!--c--><a/></r>")).unwrap_err();
    assert!(err.message.contains("non-element content"), "{}", err.message);
}

#[test]
fn test_content_model_greedy_no_backtracking() {
    // The matcher is greedy: a* consumes the only <a/>, leaving the
    // trailing mandatory a unmatched.
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a*, a)><!ELEMENT a EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r><a/></r>")).is_err());
}

#[test]
fn test_content_model_failed_repetition_not_leaked() {
    // A failed final repetition of (a,b)+ must not swallow the dangling
    // <a/>; the document is invalid.
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a,b)+><!ELEMENT a EMPTY><!ELEMENT b EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r><a/><b/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><a/><b/><a/><b/></r>")).is_ok());
    let err = parse_str(&format!("{dtd}<r><a/><b/><a/></r>")).unwrap_err();
    assert!(err.message.contains("does not match"), "{}", err.message);
}

#[test]
fn test_content_model_choice_with_nullable_branch() {
    // (a?|b): the empty match of a? must not shadow the b branch.
    let dtd = "<!DOCTYPE r [<!ELEMENT r (a?|b)><!ELEMENT a EMPTY><!ELEMENT b EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r><b/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><a/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><b/><b/></r>")).is_err());
}

#[test]
fn test_content_model_no_progress_guard() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r ((x?)*)><!ELEMENT x EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><x/><x/></r>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r><x/>junk</r>")).is_err());
}

#[test]
fn test_empty_element_validation() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r/>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r></r>")).is_ok());
    let err = parse_str(&format!("{dtd}<r> </r>")).unwrap_err();
    assert!(err.message.contains("declared EMPTY"), "{}", err.message);
    assert!(parse_str(&format!("{dtd}<r>x</r>")).is_err());
}

#[test]
fn test_any_element_validation() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r ANY><!ELEMENT a EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r>text<a/>more</r>")).is_ok());
}

#[test]
fn test_mixed_content_validation() {
    let dtd = "<!DOCTYPE p [\n\
        <!ELEMENT p (#PCDATA|em|strong)*>\n\
        <!ELEMENT em ANY><!ELEMENT strong ANY><!ELEMENT other EMPTY>\n]>";
    assert!(parse_str(&format!("{dtd}<p>a<em>b</em>c<strong>d</strong></p>")).is_ok());
    let err = parse_str(&format!("{dtd}<p>a<other/></p>")).unwrap_err();
    assert!(err.message.contains("not allowed in mixed content"), "{}", err.message);
}

#[test]
fn test_undeclared_element() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r ANY>]>";
    let err = parse_str(&format!("{dtd}<r><mystery/></r>")).unwrap_err();
    assert!(err.message.contains("not declared"), "{}", err.message);
}

#[test]
fn test_root_name_must_match_doctype() {
    let err = parse_str("<!DOCTYPE a [<!ELEMENT a ANY><!ELEMENT b ANY>]><b/>").unwrap_err();
    assert!(err.message.contains("does not match DOCTYPE"), "{}", err.message);
}

#[test]
fn test_required_attribute() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA #REQUIRED>]>";
    assert!(parse_str(&format!("{dtd}<r a='1'/>")).is_ok());
    let err = parse_str(&format!("{dtd}<r/>")).unwrap_err();
    assert!(err.message.contains("required attribute"), "{}", err.message);
}

#[test]
fn test_fixed_attribute() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA #FIXED 'v'>]>";
    assert!(parse_str(&format!("{dtd}<r a='v'/>")).is_ok());
    let err = parse_str(&format!("{dtd}<r a='w'/>")).unwrap_err();
    assert!(err.message.contains("fixed value"), "{}", err.message);
    // The default is applied when absent.
    let doc = parse_str(&format!("{dtd}<r/>")).unwrap();
    assert_eq!(doc.root.attribute("a"), Some("v"));
}

#[test]
fn test_default_attribute_applied() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r kind NMTOKEN 'plain'>]>";
    let doc = parse_str(&format!("{dtd}<r/>")).unwrap();
    assert_eq!(doc.root.attribute("kind"), Some("plain"));
    let doc = parse_str(&format!("{dtd}<r kind='fancy'/>")).unwrap();
    assert_eq!(doc.root.attribute("kind"), Some("fancy"));
}

#[test]
fn test_undeclared_attribute() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a CDATA #IMPLIED>]>";
    let err = parse_str(&format!("{dtd}<r b='1'/>")).unwrap_err();
    assert!(err.message.contains("not declared"), "{}", err.message);
    // No attribute list at all: every attribute is undeclared.
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY>]>";
    assert!(parse_str(&format!("{dtd}<r b='1'/>")).is_err());
}

#[test]
fn test_id_idref_integrity() {
    let dtd = "<!DOCTYPE root [\n\
        <!ELEMENT root (x+)><!ELEMENT x EMPTY>\n\
        <!ATTLIST x id ID #REQUIRED ref IDREF #IMPLIED>\n]>";
    assert!(parse_str(&format!(
        "{dtd}<root><x id=\"p1\"/><x id=\"p2\" ref=\"p1\"/></root>"
    ))
    .is_ok());
    let err = parse_str(&format!(
        "{dtd}<root><x id=\"p1\"/><x id=\"p2\" ref=\"p3\"/></root>"
    ))
    .unwrap_err();
    assert!(err.message.contains("does not match any ID"), "{}", err.message);
}

#[test]
fn test_duplicate_id() {
    let dtd = "<!DOCTYPE root [\n\
        <!ELEMENT root (x+)><!ELEMENT x EMPTY>\n\
        <!ATTLIST x id ID #REQUIRED>\n]>";
    let err = parse_str(&format!("{dtd}<root><x id=\"p1\"/><x id=\"p1\"/></root>")).unwrap_err();
    assert!(err.message.contains("duplicate ID"), "{}", err.message);
}

#[test]
fn test_idrefs_tokens() {
    let dtd = "<!DOCTYPE root [\n\
        <!ELEMENT root (x+)><!ELEMENT x EMPTY>\n\
        <!ATTLIST x id ID #IMPLIED refs IDREFS #IMPLIED>\n]>";
    assert!(parse_str(&format!(
        "{dtd}<root><x id=\"a\"/><x id=\"b\"/><x refs=\"a b\"/></root>"
    ))
    .is_ok());
    assert!(parse_str(&format!(
        "{dtd}<root><x id=\"a\"/><x refs=\"a missing\"/></root>"
    ))
    .is_err());
}

#[test]
fn test_id_value_must_be_name() {
    let dtd = "<!DOCTYPE root [\n\
        <!ELEMENT root EMPTY>\n\
        <!ATTLIST root id ID #REQUIRED>\n]>";
    let err = parse_str(&format!("{dtd}<root id=\"1bad\"/>")).unwrap_err();
    assert!(err.message.contains("invalid ID value"), "{}", err.message);
}

#[test]
fn test_nmtoken_attribute_type() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r t NMTOKEN #IMPLIED u NMTOKENS #IMPLIED>]>";
    assert!(parse_str(&format!("{dtd}<r t='12-3' u='a b c'/>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r t='has space'/>")).is_err());
}

#[test]
fn test_enumeration_attribute() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r kind (alpha|beta) #IMPLIED>]>";
    assert!(parse_str(&format!("{dtd}<r kind='alpha'/>")).is_ok());
    let err = parse_str(&format!("{dtd}<r kind='gamma'/>")).unwrap_err();
    assert!(err.message.contains("allowed set"), "{}", err.message);
}

#[test]
fn test_notation_attribute() {
    let dtd = "<!DOCTYPE r [\n\
        <!ELEMENT r ANY>\n\
        <!NOTATION tex SYSTEM 'tex'><!NOTATION ps SYSTEM 'ps'>\n\
        <!ATTLIST r fmt NOTATION (tex|ps) #IMPLIED>\n]>";
    assert!(parse_str(&format!("{dtd}<r fmt='tex'/>")).is_ok());
    assert!(parse_str(&format!("{dtd}<r fmt='pdf'/>")).is_err());
}

#[test]
fn test_notation_attribute_must_be_declared() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r ANY><!ATTLIST r fmt NOTATION (missing) #IMPLIED>]>";
    let err = parse_str(&format!("{dtd}<r/>")).unwrap_err();
    assert!(err.message.contains("not declared"), "{}", err.message);
}

#[test]
fn test_notation_attribute_not_on_empty_element() {
    let dtd = "<!DOCTYPE r [\n\
        <!ELEMENT r EMPTY>\n\
        <!NOTATION n SYSTEM 'x'>\n\
        <!ATTLIST r fmt NOTATION (n) #IMPLIED>\n]>";
    let err = parse_str(&format!("{dtd}<r/>")).unwrap_err();
    assert!(err.message.contains("EMPTY element"), "{}", err.message);
}

#[test]
fn test_multiple_id_attributes_rejected() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a ID #IMPLIED b ID #IMPLIED>]>";
    let err = parse_str(&format!("{dtd}<r/>")).unwrap_err();
    assert!(err.message.contains("more than one ID"), "{}", err.message);
}

#[test]
fn test_id_attribute_presence_constraint() {
    let dtd = "<!DOCTYPE r [<!ELEMENT r EMPTY><!ATTLIST r a ID 'x'>]>";
    let err = parse_str(&format!("{dtd}<r/>")).unwrap_err();
    assert!(
        err.message.contains("#REQUIRED or #IMPLIED"),
        "{}",
        err.message
    );
}

#[test]
fn test_entity_attribute_names_unparsed_entity() {
    let dtd = "<!DOCTYPE r [\n\
        <!ELEMENT r EMPTY>\n\
        <!NOTATION gif SYSTEM 'viewer'>\n\
        <!ENTITY pic SYSTEM 'a.gif' NDATA gif>\n\
        <!ATTLIST r img ENTITY #IMPLIED>\n]>";
    assert!(parse_str(&format!("{dtd}<r img='pic'/>")).is_ok());
    let err = parse_str(&format!("{dtd}<r img='nope'/>")).unwrap_err();
    assert!(err.message.contains("unparsed entity"), "{}", err.message);
}

#[test]
fn test_validation_passes_can_be_disabled() {
    let xml = "<!DOCTYPE r [<!ELEMENT r EMPTY>]><r>content</r>";
    assert!(parse_str(xml).is_err());
    let opts = ParseOptions::default().validate_elements(false);
    assert!(parse_str_with_options(xml, &opts).is_ok());

    let xml = "<!DOCTYPE r [<!ELEMENT r ANY><!ATTLIST r a CDATA #REQUIRED>]><r/>";
    assert!(parse_str(xml).is_err());
    let opts = ParseOptions::default().validate_attributes(false);
    assert!(parse_str_with_options(xml, &opts).is_ok());
}

#[test]
fn test_standalone_whitespace_in_element_content() {
    let xml = "<?xml version='1.0' standalone='yes'?>\n\
        <!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]><r> <a/> </r>";
    let err = parse_str(xml).unwrap_err();
    assert!(err.message.contains("standalone"), "{}", err.message);

    let xml = "<?xml version='1.0' standalone='no'?>\n\
        <!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]><r> <a/> </r>";
    assert!(parse_str(xml).is_ok());
}

#[test]
fn test_no_validation_without_doctype() {
    // Without a DOCTYPE there is nothing to validate against.
    let doc = parse_str("<r a='1'><anything/></r>").unwrap();
    assert_eq!(doc.root.attribute("a"), Some("1"));
}
