//! Integration tests for Error types
//!
//! Tests error construction, display, context, and verifier codes.

use sable_foundation::{Error, ErrorContext, ErrorKind, Span, VerifyError};

// =============================================================================
// Error Display
// =============================================================================

#[test]
fn error_display_by_kind() {
    assert_eq!(Error::compile("bad form").to_string(), "compile error: bad form");
    assert_eq!(Error::unknown_symbol("foo").to_string(), "unknown symbol foo");
    assert_eq!(Error::runtime("boom").to_string(), "runtime error: boom");
    assert_eq!(
        Error::type_mismatch("number", "string").to_string(),
        "type mismatch: expected number, got string"
    );
    assert_eq!(
        Error::arity_mismatch("at least 2", 1).to_string(),
        "arity mismatch: expected at least 2, got 1"
    );
    assert_eq!(
        Error::new(ErrorKind::DivisionByZero).to_string(),
        "division by zero"
    );
    assert_eq!(
        Error::new(ErrorKind::IndexOutOfBounds { index: 4, length: 2 }).to_string(),
        "index out of bounds: 4 (length 2)"
    );
}

#[test]
fn macro_errors_name_the_form() {
    let err = Error::new(ErrorKind::Macro {
        form: "defn".to_string(),
        message: "runtime error: nope".to_string(),
    });
    assert_eq!(err.to_string(), "(macro) defn: runtime error: nope");
}

#[test]
fn parse_errors_show_position() {
    let err = Error::new(ErrorKind::Parse {
        message: "unclosed (".to_string(),
        line: 3,
        column: 7,
        context: "(+ 1".to_string(),
    });
    assert_eq!(err.to_string(), "parse error at 3:7: unclosed (");
}

// =============================================================================
// Error Context
// =============================================================================

#[test]
fn position_comes_from_spans() {
    let err = Error::runtime("x").at(Span::new(10, 12, 4, 2));
    assert_eq!(err.position(), Some((4, 2)));
}

#[test]
fn later_spans_replace_the_position_but_keep_the_stack() {
    let context = ErrorContext::new().with_frame("inner");
    let err = Error::runtime("x")
        .with_context(context)
        .at(Span::new(0, 1, 9, 9));
    let context = err.context.unwrap();
    assert_eq!(context.stack, vec!["inner".to_string()]);
    assert_eq!(context.line, Some(9));
}

#[test]
fn context_display() {
    let context = ErrorContext::new()
        .with_source("main.sbl")
        .with_position(2, 5)
        .with_frame("f")
        .with_frame("thunk");
    assert_eq!(context.to_string(), "at main.sbl:2:5\n  in f\n  in thunk\n");
    assert_eq!(ErrorContext::new().with_position(1, 1).to_string(), "at 1:1");
}

// =============================================================================
// Verifier Errors
// =============================================================================

#[test]
fn structural_errors_are_flagged() {
    let err = Error::structural(VerifyError::MissingTerminator);
    assert!(err.is_structural());
    assert!(!Error::compile("x").is_structural());
    assert_eq!(
        err.to_string(),
        "invalid bytecode: function does not end in a terminator (code 9)"
    );
}

#[test]
fn verify_error_messages_carry_locations() {
    let err = VerifyError::RegisterOutOfRange { pc: 3, register: 12 };
    assert_eq!(err.to_string(), "register 12 out of range at 3 (code 4)");
    let err = VerifyError::JumpOutOfRange { pc: 0, target: -2 };
    assert_eq!(err.to_string(), "jump to -2 out of range at 0 (code 5)");
    assert_eq!(VerifyError::EnvOutOfRange { pc: None }.code(), 8);
}
