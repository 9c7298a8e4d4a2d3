//! The lexical scope stack.
//!
//! Scopes live in a `Vec` owned by the compiler: the innermost scope is the
//! last element and a scope's parent is the element before it. Popping a
//! scope copies whatever must outlive it (named bindings for debugging, live
//! captured registers) into its parent, so nothing ever points at a popped
//! scope.

use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;
use sable_foundation::{
    Capture, Error, ErrorKind, FuncDef, FuncFlags, Result, SymbolInfo, Value,
};

use crate::compiler::Compiler;
use crate::env::Binding;
use crate::lint::LintLevel;
use crate::regalloc::RegAlloc;
use crate::slot::{Slot, SlotFlags};
use crate::{optimize, verify};

bitflags! {
    /// Properties of a scope.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ScopeFlags: u32 {
        /// Function boundary: owns a frame, constants and nested records.
        const FUNCTION = 1 << 0;
        /// Loop body.
        const WHILE = 1 << 1;
        /// Top-level scope: definitions are published globally.
        const TOP = 1 << 2;
        /// Dead code compiled only for its errors.
        const UNUSED = 1 << 3;
        /// A closure was created in this scope.
        const CLOSURE = 1 << 4;
        /// The function's frame is captured by a nested closure.
        const ENV = 1 << 5;
    }
}

/// A name bound in a scope.
#[derive(Clone, Debug)]
pub(crate) struct SymbolEntry {
    pub name: Arc<str>,
    pub slot: Slot,
    pub birth: usize,
    pub death: Option<usize>,
    /// Still lexically reachable by name.
    pub visible: bool,
    /// Captured by a nested closure; its register must stay reserved.
    pub keep: bool,
}

/// One lexical level.
#[derive(Debug)]
pub(crate) struct Scope {
    pub name: &'static str,
    pub flags: ScopeFlags,
    pub syms: Vec<SymbolEntry>,
    pub consts: Vec<Value>,
    pub defs: Vec<Rc<FuncDef>>,
    pub envs: Vec<Capture>,
    pub ra: RegAlloc,
    /// Registers of this function captured by nested closures.
    pub ua: RegAlloc,
    pub bytecode_start: usize,
}

/// Signature details of a function being closed.
#[derive(Clone, Debug, Default)]
pub(crate) struct FuncHeader {
    pub name: Option<String>,
    pub arity: u32,
    pub min_arity: u32,
    pub max_arity: u32,
    pub flags: FuncFlags,
}

impl Compiler<'_> {
    /// Opens a scope. Block scopes share their function's frame, so they
    /// start from a copy of the parent's allocator.
    pub(crate) fn push_scope(&mut self, flags: ScopeFlags, name: &'static str) {
        let ra = match self.scopes.last() {
            Some(parent) if !flags.contains(ScopeFlags::FUNCTION) => parent.ra.clone(),
            _ => RegAlloc::new(),
        };
        self.scopes.push(Scope {
            name,
            flags,
            syms: Vec::new(),
            consts: Vec::new(),
            defs: Vec::new(),
            envs: Vec::new(),
            ra,
            ua: RegAlloc::new(),
            bytecode_start: self.buffer.len(),
        });
    }

    /// Closes the innermost scope.
    pub(crate) fn pop_scope(&mut self) {
        let Some(old) = self.scopes.pop() else {
            return;
        };
        log::trace!("closed {} scope", old.name);
        let pc = self.buffer.len();
        let Some(parent) = self.scopes.last_mut() else {
            return;
        };
        if old
            .flags
            .intersects(ScopeFlags::FUNCTION | ScopeFlags::UNUSED)
        {
            return;
        }
        if old.flags.contains(ScopeFlags::CLOSURE) {
            parent.flags |= ScopeFlags::CLOSURE;
        }
        if let Some(max) = old.ra.max() {
            parent.ra.raise_max(max);
        }
        for mut sym in old.syms {
            sym.visible = false;
            sym.death.get_or_insert(pc);
            if sym.keep {
                if let Some(register) = sym.slot.local_register() {
                    parent.ra.touch(register);
                }
            }
            parent.syms.push(sym);
        }
    }

    /// Closes the innermost scope but keeps `slot`'s register live in the
    /// parent, for blocks whose value outlives them.
    pub(crate) fn pop_scope_keepslot(&mut self, slot: &Slot) {
        self.pop_scope();
        if let (Some(register), Some(scope)) = (slot.local_register(), self.scopes.last_mut()) {
            scope.ra.touch(register);
        }
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub(crate) fn function_scope_index(&self) -> usize {
        self.scopes
            .iter()
            .rposition(|s| s.flags.contains(ScopeFlags::FUNCTION))
            .unwrap_or(0)
    }

    /// Returns the innermost function scope.
    pub(crate) fn function_scope(&self) -> &Scope {
        &self.scopes[self.function_scope_index()]
    }

    /// Binds `name` to `slot` in the innermost scope.
    pub(crate) fn name_slot(&mut self, name: &str, slot: Slot) {
        let birth = self.buffer.len();
        self.scope_mut().syms.push(SymbolEntry {
            name: name.into(),
            slot: slot.with_flags(SlotFlags::NAMED),
            birth,
            death: None,
            visible: true,
            keep: false,
        });
    }

    /// Returns true if `name` is lexically bound in any enclosing scope.
    pub(crate) fn is_local(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.syms.iter().any(|s| s.visible && &*s.name == name))
    }

    /// Resolves a symbol to a slot, capturing it through enclosing
    /// functions if needed, or falling back to the environment.
    pub(crate) fn resolve(&mut self, name: &str) -> Result<Slot> {
        let mut unused = false;
        let mut crossed_function = false;
        let mut found = None;
        for (scope_index, scope) in self.scopes.iter().enumerate().rev() {
            if scope.flags.contains(ScopeFlags::UNUSED) {
                unused = true;
            }
            if let Some(sym_index) = scope
                .syms
                .iter()
                .rposition(|s| s.visible && &*s.name == name)
            {
                found = Some((scope_index, sym_index));
                break;
            }
            if scope.flags.contains(ScopeFlags::FUNCTION) {
                crossed_function = true;
            }
        }

        let Some((scope_index, sym_index)) = found else {
            return self.resolve_global(name);
        };

        let mut slot = self.scopes[scope_index].syms[sym_index].slot.clone();
        if slot.is_constant() || slot.is_reference() {
            return Ok(slot);
        }
        if unused || !crossed_function {
            slot.env_index = -1;
            return Ok(slot);
        }

        self.scopes[scope_index].syms[sym_index].keep = true;
        let owner = self.scopes[..=scope_index]
            .iter()
            .rposition(|s| s.flags.contains(ScopeFlags::FUNCTION))
            .ok_or_else(|| Error::new(ErrorKind::Internal("binding outside any function".into())))?;
        let register = u32::try_from(slot.index)
            .map_err(|_| Error::new(ErrorKind::Internal("captured slot has no register".into())))?;
        if register > 0xFF {
            return Err(Error::compile(format!(
                "cannot capture {name}: register {register} is out of upvalue range"
            )));
        }
        self.scopes[owner].flags |= ScopeFlags::ENV;
        self.scopes[owner].ua.touch(register);

        let mut capture = Capture::Frame;
        let mut env_index = None;
        for scope in &mut self.scopes[owner + 1..] {
            if !scope.flags.contains(ScopeFlags::FUNCTION) {
                continue;
            }
            let index = match scope.envs.iter().position(|c| *c == capture) {
                Some(index) => index,
                None => {
                    scope.envs.push(capture);
                    scope.envs.len() - 1
                }
            };
            let index = u16::try_from(index)
                .map_err(|_| Error::compile("too many captured environments"))?;
            capture = Capture::Upvalue(index);
            env_index = Some(index);
        }
        slot.env_index = env_index.map_or(-1, i32::from);
        Ok(slot)
    }

    fn resolve_global(&mut self, name: &str) -> Result<Slot> {
        if let Some(entry) = self.env.entry(name) {
            if entry.meta.deprecated {
                self.lint(LintLevel::Normal, format!("{name} is deprecated"));
            }
        }
        match self.env.resolve(name) {
            Binding::Def(value) | Binding::Macro(value) => {
                if self.pending_defs.iter().any(|n| n == name) {
                    if let Some(entry) = self.env.entry(name) {
                        let mut slot = Slot::reference(entry.cell.clone());
                        slot.flags.remove(SlotFlags::MUTABLE);
                        return Ok(slot);
                    }
                }
                Ok(Slot::constant(value))
            }
            Binding::Var(cell) | Binding::DynamicMacro(cell) => Ok(Slot::reference(cell)),
            Binding::None => self.resolve_missing(name),
        }
    }

    fn resolve_missing(&mut self, name: &str) -> Result<Slot> {
        let Some(handler) = self.env.missing_symbol().cloned() else {
            return Err(Error::unknown_symbol(name));
        };
        let value = self.evaluate(&handler, &[Value::symbol(name)], name)?;
        if value.is_nil() {
            return Err(Error::unknown_symbol(name));
        }
        self.env.def(name, value.clone());
        Ok(Slot::constant(value))
    }

    /// Adds a constant to the current function's pool, reusing an equal one.
    pub(crate) fn add_constant(&mut self, value: Value) -> Result<u16> {
        let index = self.function_scope_index();
        let consts = &mut self.scopes[index].consts;
        let position = match consts.iter().position(|c| *c == value) {
            Some(position) => position,
            None => {
                consts.push(value);
                consts.len() - 1
            }
        };
        u16::try_from(position).map_err(|_| Error::compile("too many constants"))
    }

    /// Adds a nested function record to the current function.
    pub(crate) fn add_def(&mut self, def: FuncDef) -> Result<u16> {
        let index = self.function_scope_index();
        let defs = &mut self.scopes[index].defs;
        defs.push(Rc::new(def));
        u16::try_from(defs.len() - 1).map_err(|_| Error::compile("too many closures"))
    }

    /// Closes the innermost function scope into a function record.
    pub(crate) fn pop_function(&mut self, header: FuncHeader) -> Result<FuncDef> {
        let scope = self.scope();
        debug_assert!(scope.flags.contains(ScopeFlags::FUNCTION));
        let start = scope.bytecode_start;
        let len = self.buffer.len() - start;
        let vararg = u32::from(header.flags.contains(FuncFlags::VARARG));
        let slot_count = scope
            .ra
            .max()
            .map_or(0, |max| max + 1)
            .max(header.arity + vararg);

        let mut closure_bitset = scope.ua.live_bits();
        closure_bitset.truncate(slot_count.div_ceil(32) as usize);

        let mut symbol_map: Vec<SymbolInfo> = scope
            .syms
            .iter()
            .filter_map(|sym| {
                let register = sym.slot.local_register()?;
                let clamp = |pc: usize| u32::try_from(pc.saturating_sub(start).min(len)).unwrap_or(u32::MAX);
                Some(SymbolInfo {
                    name: sym.name.clone(),
                    birth: clamp(sym.birth),
                    death: clamp(sym.death.unwrap_or(self.buffer.len())),
                    register,
                })
            })
            .collect();

        let mut flags = header.flags;
        if scope.flags.contains(ScopeFlags::ENV) {
            flags |= FuncFlags::NEEDS_ENV;
        }

        let mut code = self.buffer.split_off(start);
        let mut source_map = self.map.split_off(start.min(self.map.len()));
        let scope = self.scopes.pop().ok_or_else(|| {
            Error::new(ErrorKind::Internal("no function scope to close".into()))
        })?;
        // Code under an unused scope is discarded, and its captures were
        // never wired up.
        let discarded = self
            .scopes
            .iter()
            .any(|s| s.flags.contains(ScopeFlags::UNUSED));

        if self.options.optimize && !discarded {
            optimize::eliminate_dead_stores(&mut code, &closure_bitset);
            optimize::remove_noops(&mut code, &mut source_map, &mut symbol_map);
        }

        let def = FuncDef {
            name: header.name,
            source: self.options.source_name.clone(),
            arity: header.arity,
            min_arity: header.min_arity,
            max_arity: header.max_arity,
            flags,
            slot_count,
            bytecode: code.iter().map(|i| i.encode()).collect(),
            constants: scope.consts,
            environments: scope.envs,
            defs: scope.defs,
            source_map,
            symbol_map,
            closure_bitset,
        };

        log::debug!(
            "closed function {} ({} instructions, {} slots)",
            def.display_name(),
            def.bytecode.len(),
            def.slot_count
        );

        if self.options.verify && !discarded {
            if let Err(error) = verify::verify(&def) {
                log::error!("rejected function {}: {error}", def.display_name());
                return Err(Error::structural(error));
            }
        }
        Ok(def)
    }

    /// Compiles `form` for its errors only, then discards the code.
    pub(crate) fn throwaway(&mut self, form: &Value) -> Result<()> {
        let buffer_start = self.buffer.len();
        let function = self.function_scope_index();
        let defs_start = self.scopes[function].defs.len();
        self.push_scope(ScopeFlags::UNUSED, "unused");
        let result = self.compile_value(form, crate::slot::FormOptions::drop());
        self.pop_scope();
        self.buffer.truncate(buffer_start);
        self.map.truncate(buffer_start);
        self.scopes[function].defs.truncate(defs_start);
        result?;
        self.lint(
            LintLevel::Strict,
            format!("dead code, consider removing {form}"),
        );
        Ok(())
    }

    /// Frees a slot's register unless it is named, constant, or captured.
    pub(crate) fn free_slot(&mut self, slot: &Slot) {
        if slot
            .flags
            .intersects(SlotFlags::CONSTANT | SlotFlags::REFERENCE | SlotFlags::NAMED)
            || slot.is_upvalue()
        {
            return;
        }
        if let Ok(register) = u32::try_from(slot.index) {
            self.scope_mut().ra.free(register);
        }
    }

    /// Frees several slots.
    pub(crate) fn free_slots(&mut self, slots: &[Slot]) {
        for slot in slots {
            self.free_slot(slot);
        }
    }

    /// Allocates a register anywhere in the frame.
    pub(crate) fn far_slot(&mut self) -> Result<Slot> {
        self.scope_mut()
            .ra
            .alloc()
            .map(Slot::register)
            .ok_or_else(|| Error::compile("ran out of registers"))
    }
}
