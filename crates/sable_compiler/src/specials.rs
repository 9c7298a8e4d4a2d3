//! Special forms.
//!
//! Special forms are recognized by the head symbol of a parenthesized tuple
//! before any macro lookup, and they cannot be shadowed. Everything else in
//! the language is built from these thirteen plus function calls.

use sable_foundation::{Error, FuncFlags, Instr, Intrinsic, Opcode, Result, Value};

use crate::compiler::Compiler;
use crate::destructure::BindingSpec;
use crate::env::{Binding, EntryMeta};
use crate::regalloc::Temp;
use crate::scope::{FuncHeader, ScopeFlags};
use crate::slot::{FormFlags, FormOptions, Slot, SlotFlags};

/// Names of every special form.
pub const SPECIAL_FORMS: [&str; 13] = [
    "break",
    "def",
    "do",
    "fn",
    "if",
    "quasiquote",
    "quote",
    "set",
    "splice",
    "unquote",
    "upscope",
    "var",
    "while",
];

/// A special form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Special {
    Break,
    Def,
    Do,
    Fn,
    If,
    Quasiquote,
    Quote,
    Set,
    Splice,
    Unquote,
    Upscope,
    Var,
    While,
}

impl Special {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "break" => Self::Break,
            "def" => Self::Def,
            "do" => Self::Do,
            "fn" => Self::Fn,
            "if" => Self::If,
            "quasiquote" => Self::Quasiquote,
            "quote" => Self::Quote,
            "set" => Self::Set,
            "splice" => Self::Splice,
            "unquote" => Self::Unquote,
            "upscope" => Self::Upscope,
            "var" => Self::Var,
            "while" => Self::While,
            _ => return None,
        })
    }
}

/// The jump that skips a conditional body, chosen by the condition's shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Skip {
    IfFalsy,
    IfNil,
    IfNotNil,
}

impl Skip {
    const fn opcode(self) -> Opcode {
        match self {
            Self::IfFalsy => Opcode::JumpIfNot,
            Self::IfNil => Opcode::JumpIfNil,
            Self::IfNotNil => Opcode::JumpIfNotNil,
        }
    }

    const fn inverse(self) -> Opcode {
        match self {
            Self::IfFalsy => Opcode::JumpIf,
            Self::IfNil => Opcode::JumpIfNotNil,
            Self::IfNotNil => Opcode::JumpIfNil,
        }
    }

    /// Whether a constant condition value would take the skip.
    const fn skips(self, value: &Value) -> bool {
        match self {
            Self::IfFalsy => !value.is_truthy(),
            Self::IfNil => value.is_nil(),
            Self::IfNotNil => !value.is_nil(),
        }
    }
}

impl Compiler<'_> {
    pub(crate) fn compile_special(
        &mut self,
        special: Special,
        args: &[Value],
        opts: &FormOptions,
    ) -> Result<Slot> {
        match special {
            Special::Break => self.compile_break(args),
            Special::Def => self.compile_def(args, opts, false),
            Special::Do => self.compile_do(args, opts),
            Special::Fn => self.compile_fn(args, opts),
            Special::If => self.compile_if(args, opts),
            Special::Quasiquote => self.compile_quasiquote(args, opts),
            Special::Quote => match args {
                [form] => Ok(Slot::constant(form.clone())),
                _ => Err(Error::compile("expected 1 argument to quote")),
            },
            Special::Set => self.compile_set(args),
            Special::Splice => self.compile_splice(args, opts),
            Special::Unquote => Err(Error::compile("cannot use unquote here")),
            Special::Upscope => self.compile_body(args, opts),
            Special::Var => self.compile_def(args, opts, true),
            Special::While => self.compile_while(args),
        }
    }

    /// Compiles a sequence of forms, all but the last for effect.
    fn compile_body(&mut self, forms: &[Value], opts: &FormOptions) -> Result<Slot> {
        let mut result = Slot::nil();
        for (i, form) in forms.iter().enumerate() {
            if i + 1 < forms.len() {
                let slot = self.compile_value(form, FormOptions::drop())?;
                self.free_slot(&slot);
            } else {
                result = self.compile_value(form, opts.clone())?;
            }
        }
        Ok(result)
    }

    fn compile_do(&mut self, forms: &[Value], opts: &FormOptions) -> Result<Slot> {
        self.push_scope(ScopeFlags::empty(), "do");
        let result = self.compile_body(forms, opts)?;
        self.pop_scope_keepslot(&result);
        Ok(result)
    }

    fn compile_splice(&mut self, args: &[Value], opts: &FormOptions) -> Result<Slot> {
        if !opts.flags.contains(FormFlags::ACCEPT_SPLICE) {
            return Err(Error::compile(
                "splice can only be used in function parameters and data constructors, it has no effect here",
            ));
        }
        let [form] = args else {
            return Err(Error::compile("expected 1 argument to splice"));
        };
        let slot = self.compile_value(form, opts.clone())?;
        Ok(slot.with_flags(SlotFlags::SPLICED))
    }

    fn compile_quasiquote(&mut self, args: &[Value], opts: &FormOptions) -> Result<Slot> {
        let [form] = args else {
            return Err(Error::compile("expected 1 argument to quasiquote"));
        };
        let depth = self.options.max_quasiquote_depth;
        self.quasiquote(form, &opts.subform(), depth, 0)
    }

    fn quasiquote(&mut self, form: &Value, opts: &FormOptions, depth: usize, level: usize) -> Result<Slot> {
        if depth == 0 {
            return Err(Error::compile("quasiquote too deeply nested"));
        }
        let inner = FormOptions::value();
        match form {
            Value::Tuple(tuple) => {
                let mut level = level;
                if tuple.len() > 1 {
                    match tuple.get(0).and_then(Value::as_symbol) {
                        Some("unquote") if level == 0 => {
                            let opts = FormOptions::value().with_flags(FormFlags::ACCEPT_SPLICE);
                            return self.compile_value(&tuple.items[1], opts);
                        }
                        Some("unquote") => level -= 1,
                        Some("quasiquote") => level += 1,
                        _ => {}
                    }
                }
                let mut slots = Vec::with_capacity(tuple.len());
                for item in tuple.iter() {
                    slots.push(self.quasiquote(item, &inner, depth - 1, level)?);
                }
                let op = if tuple.bracket {
                    Opcode::MakeBracketTuple
                } else {
                    Opcode::MakeTuple
                };
                self.maker(opts, slots, op)
            }
            Value::Array(items) => {
                let items = items.borrow().clone();
                let mut slots = Vec::with_capacity(items.len());
                for item in &items {
                    slots.push(self.quasiquote(item, &inner, depth - 1, level)?);
                }
                self.maker(opts, slots, Opcode::MakeArray)
            }
            Value::Struct(_) | Value::Table(_) => {
                let mut slots = Vec::new();
                for (key, value) in form.dictionary_pairs().unwrap_or_default() {
                    let mut key = self.quasiquote(&key, &inner, depth - 1, level)?;
                    let mut value = self.quasiquote(&value, &inner, depth - 1, level)?;
                    key.flags.remove(SlotFlags::SPLICED);
                    value.flags.remove(SlotFlags::SPLICED);
                    slots.push(key);
                    slots.push(value);
                }
                let op = if matches!(form, Value::Table(_)) {
                    Opcode::MakeTable
                } else {
                    Opcode::MakeStruct
                };
                self.maker(opts, slots, op)
            }
            _ => Ok(Slot::constant(form.clone())),
        }
    }

    /// Recognizes `(= nil x)` and `(not= nil x)`, in either argument order,
    /// when `=` and `not=` are the built-in comparisons.
    fn nil_test(&self, cond: &Value) -> Option<(Value, Skip)> {
        let tuple = cond.as_tuple().filter(|t| t.len() == 3 && !t.bracket)?;
        let head = tuple.get(0)?.as_symbol()?;
        if self.is_local(head) {
            return None;
        }
        let skip = match self.env.resolve(head) {
            Binding::Def(Value::Native(native)) => match native.intrinsic? {
                Intrinsic::Equals => Skip::IfNotNil,
                Intrinsic::NotEquals => Skip::IfNil,
                _ => return None,
            },
            _ => return None,
        };
        match (tuple.get(1)?, tuple.get(2)?) {
            (Value::Nil, subject) | (subject, Value::Nil) => Some((subject.clone(), skip)),
            _ => None,
        }
    }

    fn compile_condition(&mut self, cond: &Value) -> Result<(Slot, Skip)> {
        let (subject, skip) = self
            .nil_test(cond)
            .unwrap_or_else(|| (cond.clone(), Skip::IfFalsy));
        let slot = self.compile_value(&subject, FormOptions::value())?;
        Ok((slot, skip))
    }

    fn compile_if(&mut self, args: &[Value], opts: &FormOptions) -> Result<Slot> {
        if !(2..=3).contains(&args.len()) {
            return Err(Error::compile("expected 2 or 3 arguments to if"));
        }
        let tail = opts.is_tail();
        let drop = opts.is_drop();
        let mut truthy = args[1].clone();
        let mut falsy = args.get(2).cloned().unwrap_or(Value::Nil);

        let target = if tail || drop {
            Slot::nil()
        } else {
            self.target(opts)?
        };
        let body_opts = if tail || drop {
            FormOptions {
                flags: opts.flags & (FormFlags::TAIL | FormFlags::DROP),
                hint: None,
            }
        } else {
            FormOptions::hinted(target.clone())
        };

        self.push_scope(ScopeFlags::empty(), "if");
        let (cond, skip) = self.compile_condition(&args[0])?;

        if cond.is_constant() {
            if skip.skips(&cond.constant) {
                std::mem::swap(&mut truthy, &mut falsy);
            }
            self.push_scope(ScopeFlags::empty(), "if-true");
            let taken = self.compile_value(&truthy, body_opts)?;
            self.pop_scope();
            if !falsy.is_nil() {
                self.throwaway(&falsy)?;
            }
            self.pop_scope();
            return Ok(if tail { taken } else { target });
        }

        let skip_label = self.emit_sl(skip.opcode(), &cond)?;

        self.push_scope(ScopeFlags::empty(), "if-true");
        self.compile_value(&truthy, body_opts.clone())?;
        self.pop_scope();

        let done_label = (!tail && !(drop && falsy.is_nil())).then(|| self.emit_jump());

        let else_start = self.pc();
        self.push_scope(ScopeFlags::empty(), "if-false");
        self.compile_value(&falsy, body_opts)?;
        self.pop_scope();

        self.pop_scope();

        let done = self.pc();
        self.patch_jump(skip_label, else_start)?;
        if let Some(label) = done_label {
            self.patch_jump(label, done)?;
        }
        Ok(if tail {
            target.with_flags(SlotFlags::RETURNED)
        } else {
            target
        })
    }

    fn compile_while(&mut self, args: &[Value]) -> Result<Slot> {
        let Some((cond_form, body)) = args.split_first() else {
            return Err(Error::compile("expected at least 1 argument to while"));
        };
        let top = self.pc();
        let defs_start = self.function_scope().defs.len();
        let lint_mark = self.lint_mark();
        self.push_scope(ScopeFlags::WHILE, "while");

        let (cond, skip) = self.compile_condition(cond_form)?;
        let infinite = if cond.is_constant() {
            if skip.skips(&cond.constant) {
                self.pop_scope();
                return Ok(Slot::nil());
            }
            true
        } else {
            false
        };
        let exit_label = if infinite {
            None
        } else {
            Some(self.emit_sl(skip.opcode(), &cond)?)
        };

        for form in body {
            let slot = self.compile_value(form, FormOptions::drop())?;
            self.free_slot(&slot);
        }

        if self.scope().flags.contains(ScopeFlags::CLOSURE) {
            self.scope_mut().flags |= ScopeFlags::UNUSED;
            self.pop_scope();
            self.buffer.truncate(top);
            self.map.truncate(top);
            let function = self.function_scope_index();
            self.scopes[function].defs.truncate(defs_start);
            self.discard_lints(lint_mark);
            log::debug!("loop body creates a closure; compiling it as a function");
            return self.compile_while_function(cond_form, body);
        }

        self.emit_jump_to(top)?;
        let done = self.pc();
        if let Some(label) = exit_label {
            self.patch_jump(label, done)?;
        }
        for pc in top..done {
            if self.buffer[pc] == Instr::L(Opcode::Jump, crate::emit::BREAK_TAG) {
                self.patch_jump(pc, done)?;
            }
        }
        self.pop_scope();
        Ok(Slot::nil())
    }

    /// Compiles a loop as a self-tail-calling function so every iteration
    /// gets fresh bindings for closures to capture.
    fn compile_while_function(&mut self, cond_form: &Value, body: &[Value]) -> Result<Slot> {
        self.push_scope(ScopeFlags::FUNCTION | ScopeFlags::WHILE, "while-function");
        let (cond, skip) = self.compile_condition(cond_form)?;
        if !cond.is_constant() {
            let label = self.emit_sl(skip.inverse(), &cond)?;
            self.patch_jump(label, label + 2)?;
            self.emit(Instr::None(Opcode::ReturnNil));
        }
        for form in body {
            let slot = self.compile_value(form, FormOptions::drop())?;
            self.free_slot(&slot);
        }
        let this = self.scope_mut().ra.alloc_temp(Temp::T0);
        self.emit_s(Opcode::LoadSelf, &Slot::register(this), true)?;
        self.emit_s(Opcode::Tailcall, &Slot::register(this), false)?;
        self.scope_mut().ra.free_temp(this, Temp::T0);

        let def = self.pop_function(FuncHeader {
            name: Some("_while".to_string()),
            ..FuncHeader::default()
        })?;
        let index = self.add_def(def)?;
        let closure = Slot::register(self.scope_mut().ra.alloc_temp(Temp::T0));
        self.emit_sd(Opcode::Closure, &closure, index)?;
        self.emit_ss(Opcode::Call, &closure, &closure, true)?;
        if let Some(register) = closure.local_register() {
            self.scope_mut().ra.free_temp(register, Temp::T0);
        }
        self.scope_mut().flags |= ScopeFlags::CLOSURE;
        Ok(Slot::nil())
    }

    fn compile_break(&mut self, args: &[Value]) -> Result<Slot> {
        if args.len() > 1 {
            return Err(Error::compile("expected at most 1 argument to break"));
        }
        let flags = self
            .scopes
            .iter()
            .rev()
            .map(|s| s.flags)
            .find(|f| f.intersects(ScopeFlags::FUNCTION | ScopeFlags::WHILE))
            .ok_or_else(|| Error::compile("break must occur in while loop or closure"))?;

        if flags.contains(ScopeFlags::FUNCTION) {
            if let (false, Some(value)) = (flags.contains(ScopeFlags::WHILE), args.first()) {
                let slot = self.compile_value(value, FormOptions::tail())?;
                return Ok(slot.with_flags(SlotFlags::RETURNED));
            }
            if let Some(value) = args.first() {
                self.compile_value(value, FormOptions::drop())?;
            }
            self.emit(Instr::None(Opcode::ReturnNil));
            return Ok(Slot::nil().with_flags(SlotFlags::RETURNED));
        }

        if let Some(value) = args.first() {
            let slot = self.compile_value(value, FormOptions::drop())?;
            self.free_slot(&slot);
        }
        self.emit_break();
        Ok(Slot::nil())
    }

    fn compile_set(&mut self, args: &[Value]) -> Result<Slot> {
        let [place, value] = args else {
            return Err(Error::compile("expected 2 arguments to set"));
        };
        if let Some(place) = place.as_tuple().filter(|t| t.len() == 2) {
            let ds = self.compile_value(&place.items[0], FormOptions::value())?;
            let key = self.compile_value(&place.items[1], FormOptions::value())?;
            let value = self.compile_value(value, FormOptions::value())?;
            self.emit_sss(Opcode::Put, &ds, &key, &value, false)?;
            self.free_slot(&key);
            self.free_slot(&ds);
            return Ok(value);
        }
        let Some(name) = place.as_symbol() else {
            return Err(Error::compile("expected symbol or tuple for l-value to set"));
        };
        let dest = self.resolve(name)?;
        if !dest.flags.contains(SlotFlags::MUTABLE) {
            return Err(Error::compile("cannot set constant"));
        }
        let slot = self.compile_value(value, FormOptions::hinted(dest.clone()))?;
        self.copy(&dest, &slot)?;
        Ok(slot)
    }

    /// Reads binding metadata between the name and the value of a `def` or
    /// `var`.
    fn binding_meta(&self, pattern: &Value, attrs: &[Value]) -> Result<EntryMeta> {
        let mut meta = EntryMeta::default();
        for attr in attrs {
            match attr {
                Value::Keyword(flag) => meta.add_flag(flag),
                Value::String(doc) => meta.doc = Some(doc.to_string()),
                Value::Struct(_) => meta.merge_pairs(attr.dictionary_pairs().unwrap_or_default()),
                Value::Tuple(_) => {
                    return Err(Error::compile(
                        "unexpected form - did you intend to use defn?",
                    ));
                }
                other => {
                    let name = pattern
                        .as_symbol()
                        .map_or_else(|| "<multiple bindings>".to_string(), str::to_string);
                    return Err(Error::compile(format!(
                        "cannot add metadata {other} to binding {name}"
                    )));
                }
            }
        }
        Ok(meta)
    }

    fn compile_def(&mut self, args: &[Value], opts: &FormOptions, mutable: bool) -> Result<Slot> {
        let Some((value_form, rest)) = args.split_last().filter(|(_, rest)| !rest.is_empty()) else {
            return Err(Error::compile("expected at least 2 arguments"));
        };
        let pattern = &rest[0];
        let spec = BindingSpec {
            meta: self.binding_meta(pattern, &rest[1..])?,
            mutable,
        };

        if opts.is_drop() && self.destructure_literal(pattern, value_form, &spec)? {
            return Ok(Slot::nil());
        }

        let value = self.compile_value(value_form, FormOptions::value())?;
        if let Some(name) = pattern.as_symbol() {
            let (bound, _) = self.bind_leaf(name, &value, &spec)?;
            return Ok(bound);
        }
        if self.destructure(pattern, &value, &spec)? {
            self.free_slot(&value);
            return Ok(Slot::nil());
        }
        Ok(value)
    }

    fn compile_fn(&mut self, args: &[Value], opts: &FormOptions) -> Result<Slot> {
        self.scope_mut().flags |= ScopeFlags::CLOSURE;
        if args.is_empty() {
            return Err(Error::compile("expected at least 1 argument to function literal"));
        }
        let (name, self_name, params_at) = match &args[0] {
            Value::Symbol(name) => (Some(name.to_string()), Some(name.clone()), 1),
            Value::Keyword(name) => (Some(name.to_string()), None, 1),
            _ => (None, None, 0),
        };
        let Some(params) = args.get(params_at).and_then(Value::as_tuple) else {
            return Err(Error::compile("expected function parameters"));
        };
        let params: Vec<Value> = params.iter().cloned().collect();
        let body = &args[params_at + 1..];

        self.push_scope(ScopeFlags::FUNCTION, "function");

        let count = params.len();
        let mut arity = count;
        let mut min_arity = None;
        let mut flags = FuncFlags::empty();
        let mut allow_extra = false;
        let mut seen_rest = false;
        let mut named: Option<(Slot, Vec<(Value, Value)>)> = None;
        let mut patterns = Vec::new();

        for (i, param) in params.iter().enumerate() {
            if let Some((_, names)) = named.as_mut() {
                arity -= 1;
                let Some(sym) = param.as_symbol() else {
                    return Err(Error::compile("only named arguments can follow &named"));
                };
                names.push((Value::keyword(sym), param.clone()));
                continue;
            }
            match param.as_symbol() {
                Some("&") => {
                    if seen_rest {
                        return Err(Error::compile("& in unexpected location"));
                    } else if i + 1 == count {
                        allow_extra = true;
                        arity -= 1;
                    } else if i + 2 == count {
                        flags |= FuncFlags::VARARG;
                        arity -= 2;
                    } else {
                        return Err(Error::compile("& in unexpected location"));
                    }
                    seen_rest = true;
                }
                Some("&opt") => {
                    if min_arity.is_some() {
                        return Err(Error::compile("only one &opt allowed"));
                    } else if i + 1 == count {
                        return Err(Error::compile("&opt cannot be last item in parameter list"));
                    }
                    min_arity = Some(i);
                    arity -= 1;
                }
                Some("&keys") => {
                    if seen_rest || i + 2 != count {
                        return Err(Error::compile("&keys in unexpected location"));
                    }
                    flags |= FuncFlags::VARARG | FuncFlags::STRUCTARG;
                    arity -= 2;
                    seen_rest = true;
                }
                Some("&named") => {
                    if seen_rest {
                        return Err(Error::compile("&named in unexpected location"));
                    }
                    flags |= FuncFlags::VARARG | FuncFlags::STRUCTARG;
                    arity -= 1;
                    seen_rest = true;
                    named = Some((self.far_slot()?, Vec::new()));
                }
                Some(sym) => {
                    let slot = self.far_slot()?;
                    self.name_slot(sym, slot);
                }
                None => patterns.push((param.clone(), self.far_slot()?)),
            }
        }

        let local = BindingSpec::default();
        for (pattern, slot) in &patterns {
            if self.destructure(pattern, slot, &local)? {
                self.free_slot(slot);
            }
        }
        if let Some((slot, names)) = named {
            let pattern = Value::struct_from(names);
            if self.destructure(&pattern, &slot, &local)? {
                self.free_slot(&slot);
            }
        }

        if let Some(self_name) = self_name {
            let shadowed = self.scope().syms.iter().any(|s| s.name == self_name);
            if !shadowed {
                let slot = self.far_slot()?;
                self.emit_s(Opcode::LoadSelf, &slot, true)?;
                self.name_slot(&self_name, slot);
            }
        }

        if body.is_empty() {
            self.emit(Instr::None(Opcode::ReturnNil));
        }
        for (i, form) in body.iter().enumerate() {
            let opts = if i + 1 == body.len() {
                FormOptions::tail()
            } else {
                FormOptions::drop()
            };
            let slot = self.compile_value(form, opts)?;
            self.free_slot(&slot);
        }

        let to_u32 = |n: usize| u32::try_from(n).map_err(|_| Error::compile("too many parameters"));
        let arity = to_u32(arity)?;
        let header = FuncHeader {
            name,
            arity,
            min_arity: min_arity.map_or(Ok(arity), to_u32)?,
            max_arity: if allow_extra || flags.contains(FuncFlags::VARARG) {
                u32::MAX
            } else {
                arity
            },
            flags,
        };
        let def = self.pop_function(header)?;
        let index = self.add_def(def)?;
        let target = self.target(opts)?;
        self.emit_sd(Opcode::Closure, &target, index)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_names_round_trip() {
        for name in SPECIAL_FORMS {
            assert!(Special::from_name(name).is_some(), "{name}");
        }
        assert_eq!(Special::from_name("defn"), None);
    }

    #[test]
    fn skip_on_constants() {
        assert!(Skip::IfFalsy.skips(&Value::Bool(false)));
        assert!(!Skip::IfFalsy.skips(&Value::Int(0)));
        assert!(Skip::IfNotNil.skips(&Value::Int(0)));
        assert!(Skip::IfNil.skips(&Value::Nil));
        assert_eq!(Skip::IfNil.inverse(), Opcode::JumpIfNotNil);
    }
}
