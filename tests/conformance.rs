//! Conformance tests for the parser core: prolog handling, element
//! structure, references, CDATA, and the fail-fast error surface.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use xmldtd::{parse_str, parse_str_with_options, ParseOptions, TagKind};

fn no_validation() -> ParseOptions {
    ParseOptions::default()
        .validate_elements(false)
        .validate_attributes(false)
}

#[test]
fn test_minimum_document() {
    let doc = parse_str("<?xml version='1.0'?><a>Sanity Check</a>").unwrap();
    assert_eq!(doc.version, "1.0");
    assert_eq!(doc.encoding, "utf-8");
    assert!(!doc.standalone);
    assert_eq!(doc.root.name(), "a");
    assert_eq!(doc.root.text, "Sanity Check");
    assert!(doc.root.children.is_empty());
}

#[test]
fn test_processing_instructions_and_attributes() {
    let doc = parse_str("<?xml version=\"1.0\"?><?abc hi?><r a=\"1\" b='2'/>").unwrap();
    assert_eq!(doc.processing_instructions.len(), 1);
    assert_eq!(doc.processing_instructions[0].target, "abc");
    assert_eq!(doc.processing_instructions[0].instruction, "hi");
    assert_eq!(doc.root.attribute("a"), Some("1"));
    assert_eq!(doc.root.attribute("b"), Some("2"));
    assert_eq!(doc.root.tag.kind, TagKind::Empty);
}

#[test]
fn test_general_entity_expansion() {
    let doc = parse_str("<!DOCTYPE r [<!ENTITY e \"X&amp;Y\">]><r>&e;</r>").unwrap();
    assert_eq!(doc.root.text, "X&Y");
}

#[test]
fn test_cdata_and_comment_handling() {
    // Comments are stripped; CDATA content is appended verbatim.
    let doc = parse_str("<r>A<!--c--><![CDATA[B&C]]>D</r>").unwrap();
    assert_eq!(doc.root.text, "AB&CD");
}

#[test]
fn test_builtin_entities() {
    let doc = parse_str("<r>&amp;&lt;&gt;&apos;&quot;</r>").unwrap();
    assert_eq!(doc.root.text, "&<>'\"");
}

#[test]
fn test_character_references() {
    let doc = parse_str("<r>&#65;&#x42;&#x00043;</r>").unwrap();
    assert_eq!(doc.root.text, "ABC");
}

#[test]
fn test_character_reference_lt_is_not_markup() {
    let doc = parse_str("<r>&#60;not-a-tag&#62;</r>").unwrap();
    assert_eq!(doc.root.text, "<not-a-tag>");
}

#[test]
fn test_empty_input_fails() {
    let err = parse_str("").unwrap_err();
    assert!(err.message.contains("no root element"), "{}", err.message);
}

#[test]
fn test_empty_and_paired_tags() {
    assert!(parse_str("<a/>").is_ok());
    assert!(parse_str("<a></a>").is_ok());
    let err = parse_str("<a></b>").unwrap_err();
    assert!(err.message.contains("mismatched end tag"), "{}", err.message);
}

#[test]
fn test_only_one_doctype() {
    let err = parse_str("<!DOCTYPE a><!DOCTYPE a><a/>").unwrap_err();
    assert!(err.message.contains("only one DOCTYPE"), "{}", err.message);
}

#[test]
fn test_doctype_after_root() {
    let err = parse_str("<a/><!DOCTYPE a>").unwrap_err();
    assert!(
        err.message.contains("DOCTYPE declaration after the root element"),
        "{}",
        err.message
    );
}

#[test]
fn test_multiple_root_elements() {
    let err = parse_str("<a/><b/>").unwrap_err();
    assert!(err.message.contains("multiple root elements"), "{}", err.message);
}

#[test]
fn test_recursive_entity() {
    let err = parse_str("<!DOCTYPE r [<!ENTITY a \"&a;\">]><r>&a;</r>").unwrap_err();
    assert!(err.message.contains("recursive reference"), "{}", err.message);
}

#[test]
fn test_mutually_recursive_entities() {
    let xml = "<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]><r>&a;</r>";
    let err = parse_str(xml).unwrap_err();
    assert!(err.message.contains("recursive reference"), "{}", err.message);
}

#[test]
fn test_undeclared_entity() {
    let err = parse_str("<r>&nope;</r>").unwrap_err();
    assert!(err.message.contains("undeclared entity"), "{}", err.message);
}

#[test]
fn test_bare_ampersand() {
    assert!(parse_str("<r>a & b</r>").is_err());
}

#[test]
fn test_cdata_end_in_char_data() {
    let err = parse_str("<r>a]]>b</r>").unwrap_err();
    assert!(err.message.contains("']]>'"), "{}", err.message);
}

#[test]
fn test_bare_lt_in_content() {
    assert!(parse_str("<r>a < b</r>").is_err());
}

#[test]
fn test_xml_declaration_must_be_first() {
    let err = parse_str(" <?xml version='1.0'?><a/>").unwrap_err();
    assert!(err.message.contains("reserved"), "{}", err.message);
}

#[test]
fn test_xml_declaration_full() {
    let doc = parse_str(
        "<?xml    version = \"1.234\"  encoding=\"UtF-8\" standalone = 'yes' ?><r/>",
    )
    .unwrap();
    assert_eq!(doc.version, "1.234");
    assert_eq!(doc.encoding, "utf-8");
    assert!(doc.standalone);
}

#[test]
fn test_xml_declaration_version_required() {
    assert!(parse_str("<?xml encoding='utf-8'?><r/>").is_err());
}

#[test]
fn test_xml_declaration_bad_version() {
    assert!(parse_str("<?xml version='2.0'?><r/>").is_err());
    assert!(parse_str("<?xml version='1.'?><r/>").is_err());
}

#[test]
fn test_xml_declaration_rejects_other_encodings() {
    let err = parse_str("<?xml version='1.0' encoding='ISO-8859-1'?><r/>").unwrap_err();
    assert!(err.message.contains("unsupported encoding"), "{}", err.message);
}

#[test]
fn test_xml_declaration_attribute_order() {
    assert!(parse_str("<?xml encoding='utf-8' version='1.0'?><r/>").is_err());
    assert!(parse_str("<?xml version='1.0' standalone='yes' encoding='utf-8'?><r/>").is_err());
}

#[test]
fn test_pi_target_xml_reserved() {
    assert!(parse_str("<r><?xml-stylesheet x?></r>").is_err());
    assert!(parse_str("<a/><?xml version='1.0'?>").is_err());
}

#[test]
fn test_comment_double_hyphen_rejected() {
    let err = parse_str("<r><!-- a -- b --></r>").unwrap_err();
    assert!(err.message.contains("'--'"), "{}", err.message);
}

#[test]
fn test_whitespace_required_between_attributes() {
    let err = parse_str("<r a=\"1\"b=\"2\"/>").unwrap_err();
    assert!(err.message.contains("whitespace required"), "{}", err.message);
}

#[test]
fn test_duplicate_attribute() {
    let err = parse_str("<r a=\"1\" a=\"2\"/>").unwrap_err();
    assert!(err.message.contains("duplicate attribute"), "{}", err.message);
}

#[test]
fn test_attribute_value_forbids_lt() {
    assert!(parse_str("<r a=\"x<y\"/>").is_err());
}

#[test]
fn test_attribute_whitespace_normalization() {
    let doc = parse_str("<r a=\"a\tb\nc\"/>").unwrap();
    assert_eq!(doc.root.attribute("a"), Some("a b c"));
}

#[test]
fn test_attribute_char_ref_whitespace_preserved() {
    let doc = parse_str("<r a=\"x&#x9;y&#xA;z\"/>").unwrap();
    assert_eq!(doc.root.attribute("a"), Some("x\ty\nz"));
}

#[test]
fn test_crlf_normalization() {
    let doc = parse_str("<r>line1\r\nline2\rline3\nend</r>").unwrap();
    assert_eq!(doc.root.text, "line1\nline2\nline3\nend");
}

#[test]
fn test_error_location() {
    let err = parse_str("<a>\n  <b></c>\n</a>").unwrap_err();
    let location = err.location.unwrap();
    assert_eq!(location.line, 2);
    assert!(err.to_string().contains("parse error at 2:"));
}

#[test]
fn test_nested_elements_and_mixed_content() {
    let doc = parse_str("<p>Hello <b>world</b>!</p>").unwrap();
    assert_eq!(doc.root.text, "Hello !");
    assert_eq!(doc.root.children.len(), 1);
    assert_eq!(doc.root.children[0].name(), "b");
    assert_eq!(doc.root.children[0].text, "world");
    assert!(!doc.root.children_only);
    assert!(!doc.root.is_empty);
}

#[test]
fn test_element_flags() {
    let doc = parse_str("<r><a/><b></b></r>").unwrap();
    assert!(!doc.root.is_empty);
    assert!(doc.root.children_only);
    assert!(doc.root.children[0].is_empty);
    assert!(doc.root.children[1].is_empty);

    let doc = parse_str("<r>  <a/>  </r>").unwrap();
    assert!(doc.root.children_only, "whitespace keeps children_only");

    let doc = parse_str("<r><a/>x</r>").unwrap();
    assert!(!doc.root.children_only);
}

#[test]
fn test_entity_with_markup_in_content() {
    let xml = concat!(
        "<!DOCTYPE root [\n",
        "<!ENTITY example '<example a=\"b\" c = &#39;d&#x27;   /><!--Oh no-->'>\n",
        "<!ENTITY example2 '&example;<![CDATA[A]]>&example;B&example;C'>\n",
        "]><root>Extremely bad situation here!&example2;</root>"
    );
    let doc = parse_str_with_options(xml, &no_validation()).unwrap();
    assert_eq!(doc.root.text, "Extremely bad situation here!ABC");
    assert_eq!(doc.root.children.len(), 3);
    assert_eq!(doc.root.children[1].attribute("c"), Some("d"));
    assert_eq!(doc.root.children[1].tag.kind, TagKind::Empty);
}

#[test]
fn test_element_must_close_within_entity() {
    // The start tag comes from entity text, the end tag from the document.
    let xml = "<!DOCTYPE r [<!ENTITY open \"<a>\">]><r>&open;</a></r>";
    let err = parse_str_with_options(xml, &no_validation()).unwrap_err();
    assert!(err.message.contains("same entity"), "{}", err.message);
}

#[test]
fn test_entity_content_balanced_across_reference() {
    let xml = "<!DOCTYPE r [<!ENTITY pair \"<a>text</a>\">]><r>&pair;</r>";
    let doc = parse_str_with_options(xml, &no_validation()).unwrap();
    assert_eq!(doc.root.children.len(), 1);
    assert_eq!(doc.root.children[0].text, "text");
}

#[test]
fn test_reserved_element_names_rejected() {
    assert!(parse_str("<xmlfoo/>").is_err());
    assert!(parse_str("<r XmLa=\"1\"/>").is_err());
    // xml:space and xml:lang are exempt.
    let xml = "<!DOCTYPE r [<!ELEMENT r ANY>\n<!ATTLIST r xml:space (preserve) #IMPLIED xml:lang CDATA #IMPLIED>]>\n<r xml:space=\"preserve\" xml:lang=\"en\"/>";
    let doc = parse_str(xml).unwrap();
    assert_eq!(doc.root.attribute("xml:space"), Some("preserve"));
    assert_eq!(doc.root.attribute("xml:lang"), Some("en"));
}

#[test]
fn test_nesting_depth_limit() {
    let mut xml = String::new();
    for _ in 0..40 {
        xml.push_str("<d>");
    }
    xml.push_str("x");
    for _ in 0..40 {
        xml.push_str("</d>");
    }
    let opts = ParseOptions::default().max_depth(16);
    let err = parse_str_with_options(&xml, &opts).unwrap_err();
    assert!(err.message.contains("nesting depth"), "{}", err.message);
    assert!(parse_str(&xml).is_ok());
}

#[test]
fn test_invalid_utf8_input_rejected() {
    let source = Box::new(std::io::Cursor::new(b"<r>\x80</r>".to_vec()));
    let err = xmldtd::parse_source(source, &ParseOptions::default()).unwrap_err();
    assert!(err.message.contains("invalid UTF-8"), "{}", err.message);
}

#[test]
fn test_supplementary_plane_characters() {
    let doc = parse_str("<r>\u{1F600}</r>").unwrap();
    assert_eq!(doc.root.text, "\u{1F600}");
}

#[test]
fn test_reparse_is_stable() {
    let doc = parse_str("<r a=\"1\"><c>text</c><c/></r>").unwrap();
    let doc2 = parse_str("<r a=\"1\"><c>text</c><c/></r>").unwrap();
    assert_eq!(doc.root.children.len(), doc2.root.children.len());
    assert_eq!(doc.root.text, doc2.root.text);
    assert_eq!(doc.root.attribute("a"), doc2.root.attribute("a"));
}

#[test]
fn test_larger_document() {
    let xml = r#"<?xml version="1.0" encoding="utf-8"?>
        <!DOCTYPE activities [
            <!ENTITY morning 'Morning'><!ENTITY afternoon "Aftern&#111;&#111;n">
            <!ENTITY evening "Evening"><!ENTITY night "Night"><!ENTITY run "Run">
        ]>
        <activities count='4' userId="123456" settings="43&amp;54&amp;&amp;25">
            <activity id="8888" distance="5.44">&afternoon; <!-- -->&run;</activity>
            <activity id="1234" distance="6.46">&night;&#x020;&#0074;og</activity>
            <activity id="0000" distance="7.77">Wet &amp; Fun &run;&lt;</activity>
            <activity id="2323" distance="9.99">Dry<![CDATA[ & Boring Run<]]>></activity>
        </activities>
    "#;
    let doc = parse_str_with_options(xml, &no_validation()).unwrap();
    assert_eq!(doc.root.attribute("count"), Some("4"));
    assert_eq!(doc.root.attribute("settings"), Some("43&54&&25"));
    let activities = &doc.root.children;
    assert_eq!(activities.len(), 4);
    let expected = [
        ("8888", "5.44", "Afternoon Run"),
        ("1234", "6.46", "Night Jog"),
        ("0000", "7.77", "Wet & Fun Run<"),
        ("2323", "9.99", "Dry & Boring Run<>"),
    ];
    for (activity, (id, distance, text)) in activities.iter().zip(expected) {
        assert_eq!(activity.attribute("id"), Some(id));
        assert_eq!(activity.attribute("distance"), Some(distance));
        assert_eq!(activity.text, text);
    }
}
