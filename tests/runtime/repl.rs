//! REPL tests
//!
//! Drives the REPL with a scripted editor in place of a terminal.

use std::collections::VecDeque;

use sable_compiler::CompilerOptions;
use sable_foundation::{Opcode, Result, Value};
use sable_runtime::{LineEditor, ReadResult, Repl, input_is_complete};
use sable_vm::RunContext;

#[derive(Default)]
struct ScriptedEditor {
    lines: VecDeque<ReadResult>,
    history: Vec<String>,
}

impl ScriptedEditor {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| ReadResult::Line((*l).to_string())).collect(),
            history: Vec::new(),
        }
    }
}

impl LineEditor for ScriptedEditor {
    fn read_line(&mut self, _prompt: &str) -> Result<ReadResult> {
        Ok(self.lines.pop_front().unwrap_or(ReadResult::Eof))
    }

    fn read_continuation(&mut self, prompt: &str) -> Result<ReadResult> {
        self.read_line(prompt)
    }

    fn add_history(&mut self, line: &str) {
        self.history.push(line.to_string());
    }

    fn set_keywords(&mut self, _keywords: Vec<String>) {}
}

fn scripted(lines: &[&str]) -> Repl<ScriptedEditor> {
    Repl::with_editor(ScriptedEditor::new(lines))
        .unwrap()
        .without_banner()
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn a_session_builds_on_earlier_lines() {
    let mut repl = scripted(&[
        "(defn square [x] (* x x))",
        "(var total 0)",
        "(set total (+ (square 3)",
        "             (square 4)))",
    ]);
    repl.run().unwrap();
    assert_eq!(repl.context().env().get("total"), Some(Value::Int(25)));
}

#[test]
fn interrupts_discard_partial_input() {
    let mut editor = ScriptedEditor::new(&["(def a"]);
    editor.lines.push_back(ReadResult::Interrupted);
    editor.lines.push_back(ReadResult::Line("(def b 2)".to_string()));
    let mut repl = Repl::with_editor(editor).unwrap().without_banner();
    repl.run().unwrap();
    assert!(repl.context().env().get("a").is_none());
    assert_eq!(repl.context().env().get("b"), Some(Value::Int(2)));
}

#[test]
fn eof_inside_a_form_is_an_error() {
    let mut repl = scripted(&["(def a", "  (+ 1"]);
    assert!(repl.run().is_err());
}

#[test]
fn several_forms_on_one_line_return_the_last() {
    let mut repl = scripted(&[]);
    assert_eq!(repl.eval("(def a 1) (def b 2) (+ a b)").unwrap(), Value::Int(3));
}

#[test]
fn completeness_ignores_brackets_in_strings_and_comments() {
    assert!(input_is_complete("(print \"(\")"));
    assert!(input_is_complete("(+ 1 2) # (unclosed"));
    assert!(!input_is_complete("(do [1 2"));
}

// =============================================================================
// Listings
// =============================================================================

#[test]
fn listings_follow_the_context_options() {
    let context = RunContext::new()
        .unwrap()
        .with_options(CompilerOptions::unoptimized());
    let mut repl = Repl::with_context(ScriptedEditor::default(), context).without_banner();
    let listings = repl.listings("(defn inc [x] (+ x 1))").unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(
        listings[0].instructions.last().map(|i| i.opcode()),
        Some(Opcode::Return)
    );
    assert_eq!(repl.eval("(inc 41)").unwrap(), Value::Int(42));
}
