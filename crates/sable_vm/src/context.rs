//! Read, compile, and run loop over one environment.

use std::rc::Rc;

use sable_compiler::{Compiler, CompilerOptions, Environment, Lint, Parser};
use sable_foundation::{FuncDef, Result, Value};

use crate::prelude::{PRELUDE, core_environment};
use crate::vm::Vm;

/// An environment and the VM that runs code compiled against it.
///
/// The VM doubles as the compiler's evaluator, so macros defined by earlier
/// forms expand later ones.
pub struct RunContext {
    env: Environment,
    vm: Vm,
    options: CompilerOptions,
    lints: Vec<Lint>,
}

impl RunContext {
    /// Creates a context with the natives and the prelude macros.
    ///
    /// # Errors
    ///
    /// Returns an error if the prelude fails to load.
    pub fn new() -> Result<Self> {
        let mut context = Self::bare();
        context.options.source_name = Some("prelude".to_string());
        context.eval_str(PRELUDE)?;
        context.options.source_name = None;
        Ok(context)
    }

    /// Creates a context with the natives only.
    #[must_use]
    pub fn bare() -> Self {
        Self::with_environment(core_environment())
    }

    /// Creates a context over an existing environment.
    #[must_use]
    pub fn with_environment(env: Environment) -> Self {
        Self {
            env,
            vm: Vm::new(),
            options: CompilerOptions::default(),
            lints: Vec::new(),
        }
    }

    /// Replaces the compiler options.
    #[must_use]
    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the VM.
    #[must_use]
    pub fn with_vm(mut self, vm: Vm) -> Self {
        self.vm = vm;
        self
    }

    /// Returns the compiler options.
    #[must_use]
    pub const fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Returns the options for changing in place.
    pub fn options_mut(&mut self) -> &mut CompilerOptions {
        &mut self.options
    }

    /// Returns the environment.
    #[must_use]
    pub const fn env(&self) -> &Environment {
        &self.env
    }

    /// Returns the environment for changing in place.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Compiles one form, expanding macros with this context's VM.
    ///
    /// # Errors
    ///
    /// Returns the first compile error.
    pub fn compile(&mut self, form: &Value) -> Result<FuncDef> {
        Compiler::new(&mut self.env)
            .with_evaluator(&mut self.vm)
            .with_lint_sink(&mut self.lints)
            .with_options(self.options.clone())
            .compile(form)
    }

    /// Compiles and runs one form.
    ///
    /// # Errors
    ///
    /// Returns the first compile or runtime error.
    pub fn eval(&mut self, form: &Value) -> Result<Value> {
        let def = self.compile(form)?;
        self.run(def)
    }

    /// Runs a compiled top-level record.
    ///
    /// # Errors
    ///
    /// Returns a structural error for an invalid record, or whatever the
    /// code raised.
    pub fn run(&mut self, def: FuncDef) -> Result<Value> {
        self.vm.run(Rc::new(def))
    }

    /// Reads every form in `source` and evaluates them in order. Returns the
    /// value of the last form, or nil when there are none.
    ///
    /// # Errors
    ///
    /// Stops at the first parse, compile, or runtime error.
    pub fn eval_str(&mut self, source: &str) -> Result<Value> {
        let mut parser = Parser::new(source);
        let mut last = Value::Nil;
        while let Some(form) = parser.next_form()? {
            last = self.eval(&form)?;
        }
        Ok(last)
    }

    /// Calls a function value.
    ///
    /// # Errors
    ///
    /// Returns whatever the call raised.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        self.vm.invoke(callee, args)
    }

    /// Removes and returns the lints collected so far.
    pub fn take_lints(&mut self) -> Vec<Lint> {
        std::mem::take(&mut self.lints)
    }
}
