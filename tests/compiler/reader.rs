//! Integration tests for the reader
//!
//! Tests that source text becomes the forms the compiler expects.

use sable_compiler::{Parser, parse, parse_one};
use sable_foundation::{ErrorKind, Value};

#[test]
fn prefixes_expand_to_special_forms() {
    assert_eq!(parse_one("'x").unwrap().to_string(), "(quote x)");
    assert_eq!(
        parse_one("~(a ,b ,;c)").unwrap().to_string(),
        "(quasiquote (a (unquote b) (unquote (splice c))))"
    );
}

#[test]
fn delimiters_pick_the_data_type() {
    assert!(matches!(parse_one("(1)").unwrap(), Value::Tuple(t) if !t.bracket));
    assert!(matches!(parse_one("[1]").unwrap(), Value::Tuple(t) if t.bracket));
    assert_eq!(parse_one("@[1 (f)]").unwrap().to_string(), "@[1 (f)]");
    assert_eq!(parse_one("{:a (f)}").unwrap().to_string(), "{:a (f)}");
    assert_eq!(parse_one("@{:a 1}").unwrap().to_string(), "@{:a 1}");
    assert_eq!(parse_one("@\"buf\"").unwrap().to_string(), "@\"buf\"");
}

#[test]
fn numbers_and_literals() {
    let forms = parse("0x1F 1_000 -2.5e1 nil true false").unwrap();
    assert_eq!(
        forms,
        vec![
            Value::Int(31),
            Value::Int(1000),
            Value::Real(-25.0),
            Value::Nil,
            Value::Bool(true),
            Value::Bool(false),
        ]
    );
}

#[test]
fn forms_carry_spans() {
    let form = parse_one("\n  (f x)").unwrap();
    let span = form.as_tuple().unwrap().span.unwrap();
    assert_eq!((span.line, span.column), (2, 3));
}

#[test]
fn incremental_reading() {
    let mut parser = Parser::new("(def a 1) # one\n(def b 2)");
    assert!(parser.next_form().unwrap().is_some());
    assert!(parser.next_form().unwrap().is_some());
    assert!(parser.next_form().unwrap().is_none());
}

#[test]
fn unclosed_forms_are_parse_errors() {
    let err = parse("(+ 1\n  (f").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Parse { .. }));
}
