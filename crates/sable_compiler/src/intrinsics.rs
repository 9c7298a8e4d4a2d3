//! Inline code for calls to built-in functions.
//!
//! When the callee of a call is a known native with an intrinsic tag and no
//! argument is spliced, the call compiles to dedicated instructions instead
//! of a `call`. Each generator may decline by returning `None`, in which case
//! an ordinary call is emitted.

use sable_foundation::{Intrinsic, Opcode, Result, Value};

use crate::compiler::Compiler;
use crate::slot::{FormOptions, Slot};

/// Arithmetic folding shape for one operator.
struct Reduction {
    op: Opcode,
    immediate: Option<Opcode>,
    /// Result with no arguments.
    identity: i64,
    /// Left operand for the one-argument form, when it differs from the
    /// identity behavior.
    unary_left: Option<i64>,
}

const ADD: Reduction = Reduction {
    op: Opcode::Add,
    immediate: Some(Opcode::AddImmediate),
    identity: 0,
    unary_left: None,
};

const SUBTRACT: Reduction = Reduction {
    op: Opcode::Subtract,
    immediate: Some(Opcode::SubtractImmediate),
    identity: 0,
    unary_left: Some(0),
};

const MULTIPLY: Reduction = Reduction {
    op: Opcode::Multiply,
    immediate: Some(Opcode::MultiplyImmediate),
    identity: 1,
    unary_left: None,
};

const DIVIDE: Reduction = Reduction {
    op: Opcode::Divide,
    immediate: Some(Opcode::DivideImmediate),
    identity: 1,
    unary_left: Some(1),
};

/// Returns the value as a signed 8-bit immediate if it is a small integer.
fn small_immediate(slot: &Slot) -> Option<i8> {
    if !slot.is_constant() {
        return None;
    }
    slot.constant.as_int().and_then(|n| i8::try_from(n).ok())
}

impl Compiler<'_> {
    pub(crate) fn compile_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        opts: &FormOptions,
        args: &[Slot],
    ) -> Result<Option<Slot>> {
        match (intrinsic, args) {
            (Intrinsic::Add, _) => self.reduce(&ADD, opts, args).map(Some),
            (Intrinsic::Subtract, _) => self.reduce(&SUBTRACT, opts, args).map(Some),
            (Intrinsic::Multiply, _) => self.reduce(&MULTIPLY, opts, args).map(Some),
            (Intrinsic::Divide, _) => self.reduce(&DIVIDE, opts, args).map(Some),
            (Intrinsic::Modulo, [left, right]) => self.binary(Opcode::Modulo, opts, args, left, right).map(Some),
            (Intrinsic::LessThan, _) => self.compare(Opcode::LessThan, false, opts, args).map(Some),
            (Intrinsic::GreaterThan, _) => self.compare(Opcode::GreaterThan, false, opts, args).map(Some),
            (Intrinsic::LessThanEqual, _) => self.compare(Opcode::LessThanEqual, false, opts, args).map(Some),
            (Intrinsic::GreaterThanEqual, _) => {
                self.compare(Opcode::GreaterThanEqual, false, opts, args).map(Some)
            }
            (Intrinsic::Equals, _) => self.compare(Opcode::Equals, false, opts, args).map(Some),
            (Intrinsic::NotEquals, _) => self.compare(Opcode::NotEquals, true, opts, args).map(Some),
            (Intrinsic::Get, [ds, key]) => self.binary(Opcode::Get, opts, args, ds, key).map(Some),
            (Intrinsic::In, [ds, key]) => self.binary(Opcode::In, opts, args, ds, key).map(Some),
            (Intrinsic::Put, [ds, key, value]) => {
                self.emit_sss(Opcode::Put, ds, key, value, false)?;
                Ok(Some(ds.clone()))
            }
            (Intrinsic::Length, [value]) => {
                let target = self.intrinsic_target(opts, args)?;
                self.emit_ss(Opcode::Length, &target, value, true)?;
                Ok(Some(target))
            }
            (Intrinsic::Error, [value]) => {
                self.emit_s(Opcode::Error, value, false)?;
                Ok(Some(Slot::nil()))
            }
            (Intrinsic::Apply, [callee, middle @ .., last]) => {
                self.push_slots(middle)?;
                self.emit_s(Opcode::PushArray, last, false)?;
                self.emit_call(opts, callee).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// The destination for an inline result. The hint is skipped when it
    /// shares a location with an argument, since multi-instruction
    /// sequences would overwrite that argument before reading it.
    fn intrinsic_target(&mut self, opts: &FormOptions, args: &[Slot]) -> Result<Slot> {
        match opts.hint() {
            Some(hint) if args.iter().any(|a| a.same_location(hint)) => self.far_slot(),
            _ => self.target(opts),
        }
    }

    fn binary(&mut self, op: Opcode, opts: &FormOptions, args: &[Slot], left: &Slot, right: &Slot) -> Result<Slot> {
        let target = self.intrinsic_target(opts, args)?;
        self.emit_sss(op, &target, left, right, true)?;
        Ok(target)
    }

    /// Folds a variadic arithmetic operator left to right.
    fn reduce(&mut self, reduction: &Reduction, opts: &FormOptions, args: &[Slot]) -> Result<Slot> {
        match args {
            [] => return Ok(Slot::constant(Value::Int(reduction.identity))),
            [only] => {
                let Some(left) = reduction.unary_left else {
                    return Ok(only.clone());
                };
                let left = Slot::constant(Value::Int(left));
                return self.binary(reduction.op, opts, args, &left, only);
            }
            _ => {}
        }
        let target = self.intrinsic_target(opts, args)?;
        let mut left = args[0].clone();
        for right in &args[1..] {
            match (reduction.immediate, small_immediate(right)) {
                (Some(op), Some(immediate)) => self.emit_ssi(op, &target, &left, immediate, true)?,
                _ => self.emit_sss(reduction.op, &target, &left, right, true)?,
            };
            left = target.clone();
        }
        Ok(target)
    }

    /// Chains a comparison over adjacent pairs, short-circuiting on the
    /// first pair that fails. `not=` short-circuits on the first pair that
    /// succeeds instead.
    fn compare(&mut self, op: Opcode, invert: bool, opts: &FormOptions, args: &[Slot]) -> Result<Slot> {
        if args.len() < 2 {
            return Ok(Slot::constant(Value::Bool(!invert)));
        }
        let target = self.intrinsic_target(opts, args)?;
        let exit = if invert { Opcode::JumpIf } else { Opcode::JumpIfNot };
        let mut labels = Vec::new();
        for (i, pair) in args.windows(2).enumerate() {
            self.emit_sss(op, &target, &pair[0], &pair[1], true)?;
            if i + 2 < args.len() {
                labels.push(self.emit_sl(exit, &target)?);
            }
        }
        let done = self.pc();
        for label in labels {
            self.patch_jump(label, done)?;
        }
        Ok(target)
    }
}
