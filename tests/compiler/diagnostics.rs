//! Integration tests for compile diagnostics
//!
//! Tests compile errors, their positions, limits, and lints.

use sable_compiler::{Compiler, CompilerOptions, Environment, Lint, LintLevel, parse_one};
use sable_foundation::{Error, ErrorKind, FuncDef, Result, Value};
use sable_vm::{RunContext, core_environment};

fn compile_in(env: &mut Environment, source: &str) -> Result<FuncDef> {
    let form = parse_one(source)?;
    Compiler::new(env).compile(&form)
}

fn compile_err(source: &str) -> Error {
    compile_in(&mut core_environment(), source).expect_err("compile should fail")
}

fn compile_message(source: &str) -> String {
    match compile_err(source).kind {
        ErrorKind::Compile(message) => message,
        other => panic!("expected a compile error, got {other:?}"),
    }
}

fn lints_for(env: &mut Environment, source: &str) -> Vec<Lint> {
    let mut lints = Vec::new();
    let form = parse_one(source).unwrap();
    Compiler::new(env)
        .with_lint_sink(&mut lints)
        .compile(&form)
        .unwrap();
    lints
}

// =============================================================================
// Compile Errors
// =============================================================================

#[test]
fn unknown_symbols_point_at_their_form() {
    let err = compile_err("(do\n  (+ 1 nope))");
    assert!(matches!(err.kind, ErrorKind::UnknownSymbol(ref name) if name == "nope"));
    assert_eq!(err.position(), Some((2, 3)));
}

#[test]
fn special_form_shapes() {
    assert_eq!(compile_message("(if)"), "expected 2 or 3 arguments to if");
    assert_eq!(compile_message("(quote)"), "expected 1 argument to quote");
    assert_eq!(compile_message("(while)"), "expected at least 1 argument to while");
    assert_eq!(compile_message("(set 1 2)"), "expected symbol or tuple for l-value to set");
    assert_eq!(compile_message("(fn)"), "expected at least 1 argument to function literal");
    assert_eq!(compile_message("(fn [&opt] 1)"), "&opt cannot be last item in parameter list");
}

#[test]
fn constants_cannot_be_set() {
    assert_eq!(compile_message("(do (def x 1) (set x 2))"), "cannot set constant");
    assert_eq!(compile_message("(fn [x] (set x 2))"), "cannot set constant");
    assert_eq!(compile_message("(set + 2)"), "cannot set constant");
}

#[test]
fn unquote_and_splice_need_a_context() {
    assert_eq!(compile_message("(do ,x)"), "cannot use unquote here");
    assert!(compile_message("(do ;[1 2])").starts_with("splice can only be used"));
}

#[test]
fn break_takes_at_most_one_value() {
    assert_eq!(
        compile_message("(while true (break 1 2))"),
        "expected at most 1 argument to break"
    );
}

#[test]
fn break_at_top_level_returns_from_the_chunk() {
    let mut context = RunContext::new().unwrap();
    assert_eq!(
        context.eval_str("(break 5)").unwrap(),
        Value::Int(5)
    );
}

#[test]
fn nesting_limits() {
    let deep = format!("{}1{}", "(+ ".repeat(300), ")".repeat(300));
    assert!(matches!(compile_err(&deep).kind, ErrorKind::RecursionLimit(_)));

    let mut env = core_environment();
    let form = parse_one("~(a ~(b ~(c)))").unwrap();
    let err = Compiler::new(&mut env)
        .with_options(CompilerOptions::default().with_max_quasiquote_depth(2))
        .compile(&form)
        .unwrap_err();
    assert_eq!(err.to_string(), "compile error: quasiquote too deeply nested");
}

#[test]
fn errors_leave_the_environment_usable() {
    let mut env = core_environment();
    assert!(compile_in(&mut env, "(def broken (+ 1 missing))").is_err());
    assert!(compile_in(&mut env, "(def fine 1)").is_ok());
    assert!(env.get("fine").is_some());
}

// =============================================================================
// Macros
// =============================================================================

#[test]
fn runaway_macros_hit_the_expansion_limit() {
    let mut context = RunContext::new().unwrap();
    context
        .eval_str("(defmacro forever [] '(forever))")
        .unwrap();
    let err = context.eval_str("(forever)").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecursionLimit(_)));
}

#[test]
fn macros_without_an_evaluator_are_reported() {
    let mut context = RunContext::new().unwrap();
    context.eval_str("(defmacro one [] 1)").unwrap();
    let err = compile_in(context.env_mut(), "(one)").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Macro { ref form, .. } if form == "one"));
}

// =============================================================================
// Lints
// =============================================================================

#[test]
fn deprecated_bindings_warn() {
    let mut env = core_environment();
    compile_in(&mut env, "(def old :deprecated 1)").unwrap();
    let lints = lints_for(&mut env, "(+ old 1)");
    assert_eq!(lints.len(), 1);
    assert_eq!(lints[0].level, LintLevel::Normal);
    assert_eq!(lints[0].message, "old is deprecated");
}

#[test]
fn loops_compiled_twice_lint_once() {
    let mut env = core_environment();
    compile_in(&mut env, "(def old :deprecated 1)").unwrap();
    let source = "(fn [] (var i 0) (while (< i old) (def j i) (fn [] (+ j old)) (set i (+ i 1))))";
    let lints = lints_for(&mut env, source);
    assert_eq!(lints.len(), 2);
    assert!(lints.iter().all(|lint| lint.message == "old is deprecated"));
}

#[test]
fn arity_is_checked_against_known_functions() {
    let mut context = RunContext::new().unwrap();
    context.eval_str("(defn pair [a b] [a b])").unwrap();
    let lints = lints_for(context.env_mut(), "(pair 1)");
    assert_eq!(lints.len(), 1);
    assert_eq!(lints[0].level, LintLevel::Relaxed);
    assert!(lints[0].message.contains("expects at least 2 arguments"));
}

#[test]
fn constant_conditions_flag_dead_branches() {
    let mut env = core_environment();
    let lints = lints_for(&mut env, "(if true 1 (+ 2 3))");
    assert_eq!(lints.len(), 1);
    assert_eq!(lints[0].level, LintLevel::Strict);
    assert!(lints[0].message.starts_with("dead code"));
}

#[test]
fn dead_branches_are_still_checked() {
    let err = compile_err("(if false (undefined-fn) 1)");
    assert!(matches!(err.kind, ErrorKind::UnknownSymbol(_)));
}
