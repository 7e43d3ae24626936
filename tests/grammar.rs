use simis::{Grammar, GrammarErrorKind, Operator, TokenResolver, TokenTable};

const HEADER: &str = r#"
    FILE = :shape .
    FILE_NAME = "Shape" .
    FILE_EXT = "s" .
    FILE_TYPE = "s" .
    FILE_TYPE_VER = "1" .
"#;

fn load(rules: &str) -> Result<Grammar, simis::GrammarError> {
    Grammar::load(&format!("{}{}", HEADER, rules))
}

#[test]
fn format_info() {
    let grammar = load("shape ==> :uint .").unwrap();
    let info = grammar.info();
    assert_eq!(info.name(), "Shape");
    assert_eq!(info.extension(), "s");
    assert_eq!(info.file_type(), 's');
    assert_eq!(info.version(), '1');
    assert_eq!(info.roots(), &[String::from("shape")]);
}

#[test]
fn definitions_and_productions_are_separate() {
    let grammar = load("vector = :float :float . shape ==> :vector .").unwrap();
    assert!(grammar.definition("vector").is_some());
    assert!(grammar.production("vector").is_none());
    assert!(grammar.is_production("SHAPE"));
    assert_eq!(grammar.productions().count(), 1);

    let body = grammar.production("shape").unwrap().body().clone();
    assert_eq!(
        grammar.expand(&body).unwrap(),
        Operator::and(Operator::reference("float"), Operator::reference("float"))
    );
}

#[test]
fn missing_file_name() {
    let text = r#"
        FILE = :shape .
        FILE_EXT = "s" .
        FILE_TYPE = "s" .
        FILE_TYPE_VER = "1" .
        shape ==> :uint .
    "#;
    let err = Grammar::load(text).unwrap_err();
    assert!(err.is_missing_pseudo_production());
    assert_eq!(err.kind(), &GrammarErrorKind::MissingPseudoProduction("FILE_NAME"));
}

#[test]
fn duplicate_production() {
    let err = load("shape ==> :uint . shape ==> :float .").unwrap_err();
    assert_eq!(err.kind(), &GrammarErrorKind::DuplicateSymbol(String::from("shape")));
    assert!(!err.is_missing_pseudo_production());
}

#[test]
fn unresolved_reference_reports_rule() {
    let rules = "shape ==> :point .";
    let err = load(rules).unwrap_err();
    assert_eq!(err.kind(), &GrammarErrorKind::UnresolvedReference(String::from("point")));
    assert_eq!(err.offset(), HEADER.len());
    assert!(err.context().contains("shape ==> :point"));
}

#[test]
fn malformed_rule() {
    let err = load("shape ==> :uint").unwrap_err();
    assert!(matches!(err.kind(), GrammarErrorKind::UnexpectedToken { .. }));
    assert!(!err.to_string().is_empty());
}

#[test]
fn token_table() {
    let text = "\
        // shapes\r\n\
        SID_DEFINE_FIRST_ID(0x0000)\r\n\
        SIDDEF(\"comment\")\r\n\
        SIDDEF(\"point\")\r\n\
        SID_DEFINE_FIRST_ID(0x0001)\r\n\
        SIDDEF(\"shape\")\r\n";
    let table = TokenTable::parse(text).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.resolve(0x0000_0001), Some("point"));
    assert_eq!(table.resolve(0x0001_0000), Some("shape"));
    assert_eq!(table.lookup("Shape"), Some(0x0001_0000));
    assert_eq!(table.lookup("missing"), None);
}

#[test]
fn token_table_requires_a_type() {
    let err = TokenTable::parse("SIDDEF(\"point\")\n").unwrap_err();
    assert!(matches!(err.kind(), GrammarErrorKind::InvalidTokenDefinition(_)));
}
