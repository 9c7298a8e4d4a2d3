//! The main REPL implementation.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use sable_compiler::{Listing, Parser, SPECIAL_FORMS, disassemble};
use sable_foundation::{Error, ErrorKind, Result, Value};
use sable_vm::RunContext;

use crate::editor::{LineEditor, ReadResult, RustylineEditor, input_is_complete};

/// The interactive REPL.
pub struct Repl<E: LineEditor = RustylineEditor> {
    /// The line editor for input.
    editor: E,

    /// Environment, VM, and compiler options.
    context: RunContext,

    /// Whether to show the welcome banner.
    show_banner: bool,

    /// Whether to print the listing of each compiled form.
    disasm: bool,

    /// Primary prompt.
    prompt: String,

    /// Continuation prompt (for multi-line input).
    continuation_prompt: String,
}

impl Repl<RustylineEditor> {
    /// Creates a new REPL with the default rustyline editor.
    ///
    /// # Errors
    ///
    /// Returns an error if the editor fails to initialize or the prelude
    /// fails to load.
    pub fn new() -> Result<Self> {
        let editor = RustylineEditor::new()?;
        Self::with_editor(editor)
    }
}

impl<E: LineEditor> Repl<E> {
    /// Creates a new REPL with the given editor and a fresh context.
    ///
    /// # Errors
    ///
    /// Returns an error if the prelude fails to load.
    pub fn with_editor(editor: E) -> Result<Self> {
        Ok(Self::with_context(editor, RunContext::new()?))
    }

    /// Creates a new REPL over an existing context.
    pub fn with_context(editor: E, context: RunContext) -> Self {
        let mut repl = Self {
            editor,
            context,
            show_banner: true,
            disasm: false,
            prompt: "sable> ".to_string(),
            continuation_prompt: "  ... ".to_string(),
        };
        repl.refresh_completions();
        repl
    }

    /// Disables the welcome banner.
    #[must_use]
    pub const fn without_banner(mut self) -> Self {
        self.show_banner = false;
        self
    }

    /// Prints the listing of every compiled form before running it.
    #[must_use]
    pub const fn with_disasm(mut self, disasm: bool) -> Self {
        self.disasm = disasm;
        self
    }

    /// Sets the primary prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Returns the run context.
    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.context
    }

    /// Returns the run context for changing in place.
    pub fn context_mut(&mut self) -> &mut RunContext {
        &mut self.context
    }

    /// Runs the REPL loop.
    ///
    /// # Errors
    ///
    /// Returns an error if reading input fails fatally.
    pub fn run(&mut self) -> Result<()> {
        if self.show_banner {
            self.print_banner();
        }

        while self.read_eval_print()? {}

        println!("\nGoodbye!");
        Ok(())
    }

    /// Executes one read-eval-print iteration.
    ///
    /// Returns `Ok(true)` to continue, `Ok(false)` to exit. Evaluation errors
    /// are printed, not returned.
    fn read_eval_print(&mut self) -> Result<bool> {
        let Some(input) = self.read_input()? else {
            return Ok(false);
        };

        if input.trim().is_empty() {
            return Ok(true);
        }

        self.editor.add_history(&input);

        match self.eval(&input) {
            Ok(value) => println!("{}", Self::format_value(&value)),
            Err(e) => Self::print_error(&e),
        }
        self.refresh_completions();

        Ok(true)
    }

    /// Reads a potentially multi-line input.
    fn read_input(&mut self) -> Result<Option<String>> {
        let mut input = String::new();
        let mut first_line = true;

        loop {
            let read = if first_line {
                self.editor.read_line(&self.prompt)?
            } else {
                self.editor.read_continuation(&self.continuation_prompt)?
            };

            match read {
                ReadResult::Line(line) => {
                    if !first_line {
                        input.push('\n');
                    }
                    input.push_str(&line);
                    if input_is_complete(&input) {
                        return Ok(Some(input));
                    }
                    first_line = false;
                }
                ReadResult::Interrupted => {
                    if !first_line {
                        println!("\nInput cancelled.");
                    }
                    return Ok(Some(String::new()));
                }
                ReadResult::Eof if first_line => return Ok(None),
                ReadResult::Eof => {
                    return Err(Error::new(ErrorKind::Internal(
                        "unexpected EOF in multi-line input".to_string(),
                    )));
                }
            }
        }
    }

    /// Evaluates every form in `input` and returns the last value.
    ///
    /// # Errors
    ///
    /// Stops at the first parse, compile, or runtime error.
    pub fn eval(&mut self, input: &str) -> Result<Value> {
        let mut parser = Parser::new(input);
        let mut result = Value::Nil;
        while let Some(form) = parser.next_form()? {
            let def = self.context.compile(&form)?;
            self.print_lints();
            if self.disasm {
                print!("{}", disassemble(&def)?);
            }
            result = self.context.run(def)?;
        }
        Ok(result)
    }

    /// Compiles and runs every form in `input`, returning their listings.
    ///
    /// # Errors
    ///
    /// Stops at the first parse, compile, or runtime error.
    pub fn listings(&mut self, input: &str) -> Result<Vec<Listing>> {
        let mut parser = Parser::new(input);
        let mut listings = Vec::new();
        while let Some(form) = parser.next_form()? {
            let def = self.context.compile(&form)?;
            listings.push(disassemble(&def)?);
            self.context.run(def)?;
        }
        Ok(listings)
    }

    /// Evaluates a file, naming it as the source of every compiled record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or evaluated.
    pub fn eval_file(&mut self, path: &Path) -> Result<Value> {
        let source = fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorKind::Internal(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        })?;

        let previous = self.context.options().source_name.clone();
        self.context.options_mut().source_name = Some(path.display().to_string());
        let result = self.eval(&source);
        self.context.options_mut().source_name = previous;
        log::debug!("evaluated {}", path.display());
        result
    }

    /// Offers special forms and every bound name for completion.
    fn refresh_completions(&mut self) {
        let mut names: Vec<String> = SPECIAL_FORMS.iter().map(ToString::to_string).collect();
        names.extend(self.context.env().names().into_iter().map(str::to_string));
        self.editor.set_keywords(names);
    }

    fn print_lints(&mut self) {
        for lint in self.context.take_lints() {
            eprintln!("\x1b[33mwarning: {lint}\x1b[0m");
        }
    }

    fn format_value(value: &Value) -> String {
        format!("\x1b[1m{value}\x1b[0m")
    }

    fn print_error(error: &Error) {
        eprintln!("\x1b[31mError: {error}\x1b[0m");
        if let Some(context) = &error.context {
            eprint!("\x1b[2m{context}\x1b[0m");
            if context.stack.is_empty() {
                eprintln!();
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn print_banner(&self) {
        println!("\x1b[1;36mSable v{}\x1b[0m", env!("CARGO_PKG_VERSION"));
        println!("Type expressions to evaluate. Use Ctrl+D to exit.\n");
        let _ = io::stdout().flush();
    }
}
