//! Binding names: single symbols and destructuring patterns.

use sable_foundation::{Error, Opcode, Result, Value};

use crate::compiler::Compiler;
use crate::env::{Entry, EntryKind, EntryMeta};
use crate::scope::ScopeFlags;
use crate::slot::{FormOptions, Slot, SlotFlags};

/// How names introduced by one `def`, `var` or parameter list are bound.
#[derive(Clone, Debug, Default)]
pub(crate) struct BindingSpec {
    /// Metadata for top-level bindings; ignored for locals.
    pub meta: EntryMeta,
    /// Bound with `var`.
    pub mutable: bool,
}

impl Compiler<'_> {
    /// Binds `name` to `value`. Returns the bound slot and whether `value`'s
    /// register was adopted by the binding, in which case the caller must
    /// not free it.
    pub(crate) fn bind_leaf(&mut self, name: &str, value: &Slot, spec: &BindingSpec) -> Result<(Slot, bool)> {
        if self.scope().flags.contains(ScopeFlags::TOP) {
            let kind = if spec.mutable { EntryKind::Var } else { EntryKind::Def };
            let entry = Entry::new(kind, Value::Nil).with_meta(spec.meta.clone());
            let cell = entry.cell.clone();
            self.env.insert(name, entry);
            if !spec.mutable {
                self.pending_defs.push(name.to_string());
            }
            self.emit_ssu(Opcode::PutIndex, &Slot::constant(cell), value, 0, false)?;
            return Ok((value.clone(), false));
        }

        let mutable = if spec.mutable {
            SlotFlags::MUTABLE
        } else {
            SlotFlags::empty()
        };
        if value.is_constant() && !spec.mutable {
            self.name_slot(name, value.clone());
            return Ok((value.clone().with_flags(SlotFlags::NAMED), false));
        }
        if value.local_register().is_some() {
            let named = value.flags.contains(SlotFlags::NAMED);
            if named && !spec.mutable && !value.flags.contains(SlotFlags::MUTABLE) {
                self.name_slot(name, value.clone());
                return Ok((value.clone(), true));
            }
            if !named {
                let slot = value.clone().with_flags(mutable);
                self.name_slot(name, slot.clone());
                return Ok((slot.with_flags(SlotFlags::NAMED), true));
            }
        }
        let slot = self.far_slot()?.with_flags(mutable);
        self.copy(&slot, value)?;
        self.name_slot(name, slot.clone());
        Ok((slot.with_flags(SlotFlags::NAMED), false))
    }

    /// Binds every name in `pattern` to the matching part of `right`.
    /// Returns true when `right` may be freed by the caller.
    pub(crate) fn destructure(&mut self, pattern: &Value, right: &Slot, spec: &BindingSpec) -> Result<bool> {
        match pattern {
            Value::Symbol(name) => {
                let (_, adopted) = self.bind_leaf(name, right, spec)?;
                Ok(!adopted)
            }
            Value::Tuple(_) | Value::Array(_) => {
                let items = pattern.indexed_items().unwrap_or_default();
                for (i, sub) in items.iter().enumerate() {
                    if sub.is_symbol("&") {
                        let rest = match &items[i + 1..] {
                            [rest @ Value::Symbol(_)] => rest,
                            [] | [_] => {
                                return Err(Error::compile(
                                    "expected symbol following '& in destructuring pattern",
                                ));
                            }
                            _ => {
                                return Err(Error::compile(
                                    "expected a single symbol follow '& in destructuring pattern",
                                ));
                            }
                        };
                        self.destructure_rest(i, rest, right, spec)?;
                        return Ok(true);
                    }
                    let element = self.far_slot()?;
                    match u8::try_from(i) {
                        Ok(index) => self.emit_ssu(Opcode::GetIndex, &element, right, index, true)?,
                        Err(_) => {
                            let index = i64::try_from(i).map_err(|_| Error::compile("pattern is too long"))?;
                            let key = Slot::constant(Value::Int(index));
                            self.emit_sss(Opcode::In, &element, right, &key, true)?
                        }
                    };
                    if self.destructure(sub, &element, spec)? {
                        self.free_slot(&element);
                    }
                }
                Ok(true)
            }
            Value::Struct(_) | Value::Table(_) => {
                for (key, sub) in pattern.dictionary_pairs().unwrap_or_default() {
                    let element = self.far_slot()?;
                    self.emit_sss(Opcode::In, &element, right, &Slot::constant(key), true)?;
                    if self.destructure(&sub, &element, spec)? {
                        self.free_slot(&element);
                    }
                }
                Ok(true)
            }
            other => Err(Error::compile(format!(
                "unexpected type in destruction, got {other}"
            ))),
        }
    }

    /// Collects `right[start..]` into a tuple bound to `name`.
    fn destructure_rest(&mut self, start: usize, name: &Value, right: &Slot, spec: &BindingSpec) -> Result<()> {
        let start = i16::try_from(start).map_err(|_| Error::compile("pattern is too long"))?;
        let index = self.far_slot()?;
        let item = self.far_slot()?;
        let length = self.far_slot()?;

        self.emit_si(Opcode::LoadInteger, &index, start, true)?;
        self.emit_ss(Opcode::Length, &length, right, true)?;
        let top = self.pc();
        self.emit_sss(Opcode::LessThan, &item, &index, &length, true)?;
        let exit = self.emit_sl(Opcode::JumpIfNot, &item)?;
        self.emit_sss(Opcode::Get, &item, right, &index, true)?;
        self.emit_s(Opcode::Push, &item, false)?;
        self.emit_ssi(Opcode::AddImmediate, &index, &index, 1, true)?;
        self.emit_jump_to(top)?;
        let done = self.pc();
        self.patch_jump(exit, done)?;
        self.emit_s(Opcode::MakeTuple, &item, true)?;

        self.free_slot(&index);
        self.free_slot(&length);
        if self.destructure(name, &item, spec)? {
            self.free_slot(&item);
        }
        Ok(())
    }

    /// Binds `(def [a b] [x y])` element by element without building the
    /// sequence. Only applies when the result is discarded, the pattern has
    /// no rest marker, and both sides have the same length. Returns false
    /// when the shapes do not match.
    pub(crate) fn destructure_literal(&mut self, pattern: &Value, value: &Value, spec: &BindingSpec) -> Result<bool> {
        let patterns = match pattern {
            Value::Tuple(_) | Value::Array(_) => pattern.indexed_items().unwrap_or_default(),
            _ => return Ok(false),
        };
        let values = match value {
            Value::Array(_) => value.indexed_items().unwrap_or_default(),
            Value::Tuple(tuple) if tuple.bracket => value.indexed_items().unwrap_or_default(),
            _ => return Ok(false),
        };
        if patterns.len() != values.len() || patterns.iter().any(|p| p.is_symbol("&")) {
            return Ok(false);
        }

        let mut slots = Vec::with_capacity(values.len());
        for value in &values {
            slots.push(self.compile_value(value, FormOptions::value())?);
        }
        for (pattern, slot) in patterns.iter().zip(&slots) {
            if self.destructure(pattern, slot, spec)? {
                self.free_slot(slot);
            }
        }
        Ok(true)
    }
}
