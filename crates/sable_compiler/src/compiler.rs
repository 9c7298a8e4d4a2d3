//! The compiler driver.
//!
//! [`Compiler`] turns one form into a [`FuncDef`] that evaluates it. Each
//! form is macroexpanded, dispatched to a special form, a call, or a data
//! constructor, and its result is described by a [`Slot`]. Form options
//! carry the caller's intent down: tail position, discarded result, or a
//! preferred destination.

use sable_foundation::{Error, ErrorKind, FuncDef, Instr, Opcode, Result, Span, Tuple, Value};

use crate::config::CompilerOptions;
use crate::env::{Binding, Environment};
use crate::lint::{Lint, LintLevel};
use crate::scope::{FuncHeader, Scope, ScopeFlags};
use crate::slot::{FormFlags, FormOptions, Slot, SlotFlags};
use crate::specials::Special;

/// Runs code on the compiler's behalf: macro expanders and the
/// missing-symbol handler.
pub trait Evaluator {
    /// Calls `callee` with `args`.
    ///
    /// # Errors
    ///
    /// Returns whatever error the call raised.
    fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value>;
}

/// Outcome of one macroexpansion step.
enum Expansion {
    Done,
    Special(Special),
    Expanded(Value),
}

/// Compiles forms against an environment.
pub struct Compiler<'a> {
    pub(crate) env: &'a mut Environment,
    evaluator: Option<&'a mut dyn Evaluator>,
    lints: Option<&'a mut Vec<Lint>>,
    pub(crate) options: CompilerOptions,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) buffer: Vec<Instr>,
    pub(crate) map: Vec<Span>,
    pub(crate) current_span: Span,
    /// Top-level definitions published during this compilation whose values
    /// are not yet stored.
    pub(crate) pending_defs: Vec<String>,
    depth: usize,
    /// Stack position when the current top-level form started compiling.
    stack_base: usize,
    failed: bool,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler with default options, no evaluator and no lint sink.
    #[must_use]
    pub fn new(env: &'a mut Environment) -> Self {
        Self {
            env,
            evaluator: None,
            lints: None,
            options: CompilerOptions::default(),
            scopes: Vec::new(),
            buffer: Vec::new(),
            map: Vec::new(),
            current_span: Span::default(),
            pending_defs: Vec::new(),
            depth: 0,
            stack_base: 0,
            failed: false,
        }
    }

    /// Attaches the evaluator used for macros.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: &'a mut dyn Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Collects lints into `sink` instead of logging them.
    #[must_use]
    pub fn with_lint_sink(mut self, sink: &'a mut Vec<Lint>) -> Self {
        self.lints = Some(sink);
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &CompilerOptions {
        &self.options
    }

    fn reset(&mut self) {
        self.scopes.clear();
        self.buffer.clear();
        self.map.clear();
        self.pending_defs.clear();
        self.current_span = Span::default();
        self.depth = 0;
        self.stack_base = stack_position();
        self.failed = false;
    }

    /// Compiles `form` into a zero-argument function that evaluates it.
    ///
    /// # Errors
    ///
    /// Returns the first compile error. Errors carry the position of the
    /// innermost tuple being compiled when it is known.
    pub fn compile(&mut self, form: &Value) -> Result<FuncDef> {
        self.reset();
        self.push_scope(ScopeFlags::FUNCTION | ScopeFlags::TOP, "top");
        let result = self
            .compile_value(form, FormOptions::tail())
            .and_then(|_| {
                self.pop_function(FuncHeader {
                    name: Some("thunk".to_string()),
                    ..FuncHeader::default()
                })
            });
        self.reset();
        result
    }

    /// Compiles one form.
    pub(crate) fn compile_value(&mut self, form: &Value, opts: FormOptions) -> Result<Slot> {
        if self.failed {
            return Ok(Slot::nil());
        }
        let stack_used = self.stack_base.abs_diff(stack_position());
        if self.depth >= self.options.max_recursion || stack_used > self.options.max_stack_bytes {
            return Err(self.fail(Error::new(ErrorKind::RecursionLimit(
                "recursed too deeply".into(),
            ))));
        }
        self.depth += 1;
        let saved_span = self.current_span;
        let result = self.compile_form(form, &opts);
        self.depth -= 1;
        let result = result.map_err(|error| self.fail(error));
        self.current_span = saved_span;
        result
    }

    /// Records the first error and pins it to the innermost known position.
    fn fail(&mut self, error: Error) -> Error {
        self.failed = true;
        if error.position().is_none() {
            error.at(self.current_span)
        } else {
            error
        }
    }

    fn compile_form(&mut self, form: &Value, opts: &FormOptions) -> Result<Slot> {
        let (form, special) = self.expand(form)?;
        let mut slot = match (&form, special) {
            (Value::Tuple(tuple), Some(special)) => {
                let args: Vec<Value> = tuple.iter().skip(1).cloned().collect();
                self.compile_special(special, &args, opts)?
            }
            (Value::Tuple(tuple), _) if !tuple.is_empty() && !tuple.bracket => {
                let mut slot = self.compile_call_form(tuple, opts)?;
                slot.flags.remove(SlotFlags::SPLICED);
                slot
            }
            (Value::Symbol(name), _) => self.resolve(name)?,
            _ => self.compile_data(&form, opts)?,
        };

        if opts.is_tail() {
            slot = self.return_slot(slot)?;
        }
        if let Some(hint) = opts.hint() {
            if !slot.flags.contains(SlotFlags::RETURNED) && !hint.same_location(&slot) {
                let hint = hint.clone();
                self.copy(&hint, &slot)?;
                self.free_slot(&slot);
                slot = hint;
            }
        }
        Ok(slot)
    }

    /// Macroexpands `form` until it is no longer a macro call, reporting the
    /// special form it names, if any.
    #[inline(never)]
    fn expand(&mut self, form: &Value) -> Result<(Value, Option<Special>)> {
        let mut form = form.clone();
        let mut expansions = 0;
        loop {
            match self.macroexpand_once(&form)? {
                Expansion::Done => return Ok((form, None)),
                Expansion::Special(special) => return Ok((form, Some(special))),
                Expansion::Expanded(next) => {
                    expansions += 1;
                    if expansions > self.options.max_macro_expansions {
                        return Err(Error::new(ErrorKind::RecursionLimit(
                            "recursed too deeply in macro expansion".into(),
                        )));
                    }
                    form = next;
                }
            }
        }
    }

    /// Compiles a literal or data constructor.
    #[inline(never)]
    fn compile_data(&mut self, form: &Value, opts: &FormOptions) -> Result<Slot> {
        match form {
            Value::Tuple(tuple) if tuple.bracket && !tuple.is_empty() => {
                let slots = self.to_slots(tuple.iter())?;
                self.maker(opts, slots, Opcode::MakeBracketTuple)
            }
            Value::Array(items) => {
                let items = items.borrow().clone();
                let slots = self.to_slots(items.iter())?;
                self.maker(opts, slots, Opcode::MakeArray)
            }
            Value::Struct(_) | Value::Table(_) => {
                let op = if matches!(form, Value::Table(_)) {
                    Opcode::MakeTable
                } else {
                    Opcode::MakeStruct
                };
                let slots = self.to_slots_kv(form)?;
                self.maker(opts, slots, op)
            }
            Value::Buffer(text) => {
                let text = Value::from(text.borrow().as_str());
                let slots = self.to_slots(std::iter::once(&text))?;
                self.maker(opts, slots, Opcode::MakeBuffer)
            }
            _ => Ok(Slot::constant(form.clone())),
        }
    }

    fn macroexpand_once(&mut self, form: &Value) -> Result<Expansion> {
        let Value::Tuple(tuple) = form else {
            return Ok(Expansion::Done);
        };
        if tuple.is_empty() {
            return Ok(Expansion::Done);
        }
        if let Some(span) = tuple.span {
            self.current_span = span;
        }
        if tuple.bracket {
            return Ok(Expansion::Done);
        }
        let Some(name) = tuple.get(0).and_then(Value::as_symbol) else {
            return Ok(Expansion::Done);
        };
        if let Some(special) = Special::from_name(name) {
            return Ok(Expansion::Special(special));
        }
        if self.is_local(name) {
            return Ok(Expansion::Done);
        }
        let expander = match self.env.resolve(name) {
            Binding::Macro(expander) => expander,
            Binding::DynamicMacro(Value::Array(cell)) => {
                cell.borrow().first().cloned().unwrap_or(Value::Nil)
            }
            _ => return Ok(Expansion::Done),
        };
        if !matches!(expander, Value::Function(_) | Value::Native(_)) {
            return Ok(Expansion::Done);
        }
        log::trace!("expanding macro {name}");
        let name = name.to_string();
        let args: Vec<Value> = tuple.iter().skip(1).cloned().collect();
        self.evaluate(&expander, &args, &name).map(Expansion::Expanded)
    }

    /// Runs `callee` through the evaluator. Failures become macro errors
    /// naming `what`.
    pub(crate) fn evaluate(&mut self, callee: &Value, args: &[Value], what: &str) -> Result<Value> {
        let Some(evaluator) = self.evaluator.as_deref_mut() else {
            return Err(Error::new(ErrorKind::Macro {
                form: what.to_string(),
                message: "no evaluator attached".to_string(),
            }));
        };
        evaluator.call(callee, args).map_err(|error| {
            Error::new(ErrorKind::Macro {
                form: what.to_string(),
                message: error.to_string(),
            })
        })
    }

    /// Reports an advisory at the current position.
    pub(crate) fn lint(&mut self, level: LintLevel, message: String) {
        let lint = Lint::new(level, self.current_span, message);
        match self.lints.as_deref_mut() {
            Some(sink) => sink.push(lint),
            None => log::warn!("{lint}"),
        }
    }

    /// Number of lints collected so far.
    pub(crate) fn lint_mark(&self) -> usize {
        self.lints.as_deref().map_or(0, Vec::len)
    }

    /// Drops lints collected after `mark`, for code that is compiled again.
    pub(crate) fn discard_lints(&mut self, mark: usize) {
        if let Some(sink) = self.lints.as_deref_mut() {
            sink.truncate(mark);
        }
    }

    /// Compiles each value with splicing allowed.
    pub(crate) fn to_slots<'v>(&mut self, items: impl Iterator<Item = &'v Value>) -> Result<Vec<Slot>> {
        let opts = FormOptions::value().with_flags(FormFlags::ACCEPT_SPLICE);
        items
            .map(|item| self.compile_value(item, opts.clone()))
            .collect()
    }

    /// Compiles a dictionary's keys and values, alternating.
    fn to_slots_kv(&mut self, dictionary: &Value) -> Result<Vec<Slot>> {
        let opts = FormOptions::value().with_flags(FormFlags::ACCEPT_SPLICE);
        let mut slots = Vec::new();
        for (key, value) in dictionary.dictionary_pairs().unwrap_or_default() {
            slots.push(self.compile_value(&key, opts.clone())?);
            slots.push(self.compile_value(&value, opts.clone())?);
        }
        Ok(slots)
    }

    /// Pushes argument slots using the widest push instructions available.
    /// Returns the number of non-spliced values and whether any splice
    /// was pushed.
    pub(crate) fn push_slots(&mut self, slots: &[Slot]) -> Result<(usize, bool)> {
        let spliced = |s: &Slot| s.flags.contains(SlotFlags::SPLICED);
        let mut count = 0;
        let mut has_splice = false;
        let mut i = 0;
        while i < slots.len() {
            let rest = &slots[i..];
            if spliced(&rest[0]) {
                self.emit_s(Opcode::PushArray, &rest[0], false)?;
                has_splice = true;
                i += 1;
            } else if rest.len() == 1 || spliced(&rest[1]) {
                self.emit_s(Opcode::Push, &rest[0], false)?;
                count += 1;
                i += 1;
            } else if rest.len() == 2 || spliced(&rest[2]) {
                self.emit_ss(Opcode::Push2, &rest[0], &rest[1], false)?;
                count += 2;
                i += 2;
            } else {
                self.emit_sss(Opcode::Push3, &rest[0], &rest[1], &rest[2], false)?;
                count += 3;
                i += 3;
            }
        }
        Ok((count, has_splice))
    }

    /// Builds a data structure from slots, folding constant immutable ones.
    pub(crate) fn maker(&mut self, opts: &FormOptions, slots: Vec<Slot>, op: Opcode) -> Result<Slot> {
        let foldable = slots
            .iter()
            .all(|s| s.is_constant() && !s.flags.contains(SlotFlags::SPLICED));
        if foldable {
            let values = slots.iter().map(|s| s.constant.clone());
            let folded = match op {
                Opcode::MakeTuple => Some(Value::tuple(values)),
                Opcode::MakeBracketTuple => Some(Value::bracket_tuple(values)),
                Opcode::MakeStruct => {
                    let values: Vec<Value> = values.collect();
                    Some(Value::struct_from(
                        values.chunks(2).map(|kv| (kv[0].clone(), kv.get(1).cloned().unwrap_or(Value::Nil))),
                    ))
                }
                _ => None,
            };
            if let Some(folded) = folded {
                return Ok(Slot::constant(folded));
            }
        }
        self.push_slots(&slots)?;
        self.free_slots(&slots);
        let target = self.target(opts)?;
        self.emit_s(op, &target, true)?;
        Ok(target)
    }

    /// Returns the hinted destination when it is a near local register,
    /// otherwise a fresh register.
    pub(crate) fn target(&mut self, opts: &FormOptions) -> Result<Slot> {
        match opts.hint() {
            Some(hint) if hint.local_register().is_some_and(|r| r <= 0xFF) => Ok(hint.clone()),
            _ => self.far_slot(),
        }
    }

    /// Emits a return of `slot` unless one was already emitted.
    pub(crate) fn return_slot(&mut self, slot: Slot) -> Result<Slot> {
        if slot.flags.contains(SlotFlags::RETURNED) {
            return Ok(slot);
        }
        if slot.is_constant() && slot.constant.is_nil() {
            self.emit(Instr::None(Opcode::ReturnNil));
        } else {
            self.emit_s(Opcode::Return, &slot, false)?;
        }
        Ok(slot.with_flags(SlotFlags::RETURNED))
    }

    /// Frees `slots` except any that share `keep`'s location.
    pub(crate) fn free_slots_except(&mut self, slots: &[Slot], keep: &Slot) {
        for slot in slots {
            if !slot.same_location(keep) {
                self.free_slot(slot);
            }
        }
    }

    fn compile_call_form(&mut self, form: &Tuple, opts: &FormOptions) -> Result<Slot> {
        let head = self.compile_value(&form.items[0], FormOptions::value())?;
        let args = self.to_slots(form.iter().skip(1))?;
        let result = self.compile_call(opts, args, &head)?;
        if !head.same_location(&result) {
            self.free_slot(&head);
        }
        Ok(result)
    }

    /// Compiles a call of `callee` with already-compiled arguments.
    fn compile_call(&mut self, opts: &FormOptions, args: Vec<Slot>, callee: &Slot) -> Result<Slot> {
        let spliced = args.iter().any(|s| s.flags.contains(SlotFlags::SPLICED));
        if let (false, Value::Native(native)) = (spliced, &callee.constant) {
            if let (true, Some(intrinsic)) = (callee.is_constant(), native.intrinsic) {
                if let Some(result) = self.compile_intrinsic(intrinsic, opts, &args)? {
                    self.free_slots_except(&args, &result);
                    return Ok(result);
                }
            }
        }

        let (count, has_splice) = self.push_slots(&args)?;
        self.check_call_arity(callee, count, has_splice);
        let result = self.emit_call(opts, callee)?;
        self.free_slots(&args);
        Ok(result)
    }

    /// Emits the call of `callee` with the arguments already pushed: a
    /// tail call in tail position inside a function, a call otherwise.
    pub(crate) fn emit_call(&mut self, opts: &FormOptions, callee: &Slot) -> Result<Slot> {
        if opts.is_tail() && !self.function_scope().flags.contains(ScopeFlags::TOP) {
            self.emit_s(Opcode::Tailcall, callee, false)?;
            return Ok(Slot::nil().with_flags(SlotFlags::RETURNED));
        }
        let target = self.target(opts)?;
        self.emit_ss(Opcode::Call, &target, callee, true)?;
        Ok(target)
    }

    fn check_call_arity(&mut self, callee: &Slot, count: usize, has_splice: bool) {
        let Value::Function(closure) = &callee.constant else {
            return;
        };
        if !callee.is_constant() {
            return;
        }
        let def = &closure.def;
        let name = def.display_name().to_string();
        let plural = |n: u32| if n == 1 { "" } else { "s" };
        let count32 = u32::try_from(count).unwrap_or(u32::MAX);
        if count32 > def.max_arity {
            let at_least = if has_splice { "at least " } else { "" };
            self.lint(
                LintLevel::Relaxed,
                format!(
                    "{name} expects at most {} argument{}, got {at_least}{count}",
                    def.max_arity,
                    plural(def.max_arity)
                ),
            );
        } else if !has_splice && count32 < def.min_arity {
            self.lint(
                LintLevel::Relaxed,
                format!(
                    "{name} expects at least {} argument{}, got {count}",
                    def.min_arity,
                    plural(def.min_arity)
                ),
            );
        }
    }
}

/// Address of a local in a fresh frame, for measuring stack growth.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(std::ptr::addr_of!(marker)) as usize
}

/// Compiles `form` against `env` with default options and no evaluator.
///
/// # Errors
///
/// Returns the first compile error.
pub fn compile(form: &Value, env: &mut Environment) -> Result<FuncDef> {
    Compiler::new(env).compile(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;

    fn code(source: &str) -> Vec<Instr> {
        let mut env = Environment::new();
        let def = compile(&parse_one(source).unwrap(), &mut env).unwrap();
        def.bytecode
            .iter()
            .map(|w| Instr::decode(*w).unwrap())
            .collect()
    }

    #[test]
    fn constant_forms_return_directly() {
        assert_eq!(code("nil"), vec![Instr::None(Opcode::ReturnNil)]);
        assert_eq!(
            code("7"),
            vec![
                Instr::SI(Opcode::LoadInteger, 0, 7),
                Instr::S(Opcode::Return, 0)
            ]
        );
    }

    #[test]
    fn constant_tuples_and_structs_fold() {
        let mut env = Environment::new();
        let def = compile(&parse_one("[1 2 {:a 3}]").unwrap(), &mut env).unwrap();
        assert_eq!(def.constants.len(), 1);
        assert_eq!(def.constants[0].to_string(), "[1 2 {:a 3}]");
    }

    #[test]
    fn arrays_are_built_fresh() {
        let ops: Vec<Opcode> = code("@[1 2]").iter().map(|i| i.opcode()).collect();
        assert!(ops.contains(&Opcode::MakeArray));
    }

    #[test]
    fn unknown_symbol_reports_position() {
        let mut env = Environment::new();
        let form = parse_one("(do\n  (foo 1))").unwrap();
        let err = compile(&form, &mut env).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownSymbol(ref s) if s == "foo"));
        assert_eq!(err.position(), Some((2, 3)));
    }

    #[test]
    fn recursion_limit() {
        let mut env = Environment::new();
        let source = format!("{}1{}", "(do ".repeat(40), ")".repeat(40));
        let form = parse_one(&source).unwrap();
        let options = CompilerOptions::default().with_max_recursion(16);
        let err = Compiler::new(&mut env)
            .with_options(options)
            .compile(&form)
            .unwrap_err();
        assert_eq!(err.to_string(), "recursed too deeply");
    }

    #[test]
    fn stack_budget_stops_deep_nesting() {
        let mut env = Environment::new();
        let source = format!("{}1{}", "(do ".repeat(200), ")".repeat(200));
        let form = parse_one(&source).unwrap();
        let options = CompilerOptions::default()
            .with_max_recursion(usize::MAX)
            .with_max_stack_bytes(16 * 1024);
        let err = Compiler::new(&mut env)
            .with_options(options)
            .compile(&form)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecursionLimit(_)));
    }

    #[test]
    fn deep_nesting_never_exhausts_the_host_stack() {
        let handle = std::thread::spawn(|| {
            let mut env = Environment::new();
            let source = format!("{}1{}", "(do ".repeat(250), ")".repeat(250));
            let form = parse_one(&source).unwrap();
            match compile(&form, &mut env) {
                Ok(_) => true,
                Err(err) => matches!(err.kind, ErrorKind::RecursionLimit(_)),
            }
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn compiler_is_reusable_after_an_error() {
        let mut env = Environment::new();
        let mut compiler = Compiler::new(&mut env);
        assert!(compiler.compile(&parse_one("(nope)").unwrap()).is_err());
        assert!(compiler.compile(&parse_one("1").unwrap()).is_ok());
    }
}
