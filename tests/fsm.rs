use rstest::*;
use simis::{Cursor, SimisFormat};

fn format(body: &str) -> SimisFormat {
    let text = format!(
        r#"
        FILE = :p .
        FILE_NAME = "Test" .
        FILE_EXT = "t" .
        FILE_TYPE = "t" .
        FILE_TYPE_VER = "1" .
        pair = :foo :bar .
        either = :foo | :bar .
        foo ==> :uint .
        bar ==> :uint .
        baz ==> :uint .
        p ==> {} .
        "#,
        body
    );
    SimisFormat::from_grammar_text(&text).unwrap()
}

#[rstest]
#[case(":foo", "start -> foo -> finish")]
#[case("[:foo]", "start -> {foo -> finish, finish}")]
#[case(":foo :bar", "start -> foo -> bar -> finish")]
#[case(":foo | :bar", "start -> {foo -> finish, bar -> finish}")]
#[case("{:foo}", "start -> 1:foo -> {^1, finish}")]
#[case(":either :baz", "start -> {foo -> 1:baz -> finish, bar -> ^1}")]
#[case(":pair", "start -> foo -> bar -> finish")]
#[case(":uint,A \"x\"", "start -> uint,A -> \"x\" -> finish")]
fn production_renderings(#[case] body: &str, #[case] expected: &str) {
    let format = format(body);
    assert_eq!(format.fsm("p").unwrap().to_string(), expected);
    assert_eq!(format.fsm("P").unwrap().to_string(), expected);
}

#[test]
fn every_production_is_compiled() {
    let format = format(":foo");
    let names: Vec<_> = format.fsms().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["bar", "baz", "foo", "p"]);
}

#[test]
fn cursor_walks_a_repeat() {
    let format = format("{:foo} :bar");
    let mut cursor = Cursor::new(&format);
    cursor.move_to("p").unwrap();
    cursor.enter_block().unwrap();

    for _ in 0..3 {
        let mut next: Vec<_> = cursor.valid_next_references().into_iter().collect();
        next.sort();
        assert_eq!(next, vec![String::from("bar"), String::from("foo")]);
        cursor.move_to("foo").unwrap();
        cursor.enter_block().unwrap();
        cursor.move_to("uint").unwrap();
        cursor.leave_block().unwrap();
    }

    assert!(!cursor.can_end_block());
    cursor.move_to("bar").unwrap();
    cursor.enter_block().unwrap();
    cursor.move_to("uint").unwrap();
    cursor.leave_block().unwrap();
    assert!(cursor.can_end_block());
    cursor.leave_block().unwrap();
    assert!(cursor.is_complete());
}
