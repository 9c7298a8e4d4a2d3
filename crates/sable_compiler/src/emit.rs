//! Instruction emission.
//!
//! Slots can be constants, reference cells, upvalues or registers of any
//! width, but most instructions only take near (8-bit) registers. The helpers
//! here stage operands through tagged temporaries: a source operand is loaded
//! before the instruction, a destination operand is written back after it,
//! and temporaries are released in reverse order.

use sable_foundation::instr::MAX_LONG_JUMP;
use sable_foundation::{Error, ErrorKind, Instr, Opcode, Result, Value};

use crate::compiler::Compiler;
use crate::regalloc::Temp;
use crate::slot::Slot;

/// Displacement marking an unpatched `break` jump.
pub(crate) const BREAK_TAG: i32 = MAX_LONG_JUMP;

fn near(register: u32) -> Result<u8> {
    u8::try_from(register).map_err(|_| {
        Error::new(ErrorKind::Internal(format!(
            "register {register} used as a near operand"
        )))
    })
}

fn far(register: u32) -> Result<u16> {
    u16::try_from(register).map_err(|_| Error::compile("ran out of registers"))
}

fn env_operands(slot: &Slot) -> Result<(u8, u8)> {
    let env = u8::try_from(slot.env_index).map_err(|_| Error::compile("too many captured environments"))?;
    let index = u8::try_from(slot.index).map_err(|_| {
        Error::new(ErrorKind::Internal(format!(
            "upvalue register {} out of range",
            slot.index
        )))
    })?;
    Ok((env, index))
}

impl Compiler<'_> {
    /// Index of the next instruction.
    pub(crate) fn pc(&self) -> usize {
        self.buffer.len()
    }

    /// Appends an instruction tagged with the current source span.
    pub(crate) fn emit(&mut self, instr: Instr) -> usize {
        let label = self.buffer.len();
        self.buffer.push(instr);
        self.map.push(self.current_span);
        label
    }

    /// Points the jump at `label` to `target`.
    pub(crate) fn patch_jump(&mut self, label: usize, target: usize) -> Result<()> {
        let displacement = i32::try_from(target as i64 - label as i64)
            .map_err(|_| Error::compile("jump is too far"))?;
        let patched = self.buffer[label]
            .with_displacement(displacement)
            .ok_or_else(|| Error::compile("jump is too far"))?;
        self.buffer[label] = patched;
        Ok(())
    }

    /// Emits an unconditional jump to a known earlier label.
    pub(crate) fn emit_jump_to(&mut self, target: usize) -> Result<usize> {
        let label = self.emit(Instr::L(Opcode::Jump, 0));
        self.patch_jump(label, target)?;
        Ok(label)
    }

    /// Emits an unconditional jump to be patched later.
    pub(crate) fn emit_jump(&mut self) -> usize {
        self.emit(Instr::L(Opcode::Jump, 0))
    }

    /// Emits a placeholder jump for `break`.
    pub(crate) fn emit_break(&mut self) -> usize {
        self.emit(Instr::L(Opcode::Jump, BREAK_TAG))
    }

    /// Loads a constant into a near register, using the short forms for
    /// nil, booleans and small integers.
    pub(crate) fn load_constant(&mut self, value: &Value, register: u32) -> Result<()> {
        let register = near(register)?;
        let instr = match value {
            Value::Nil => Instr::S(Opcode::LoadNil, register.into()),
            Value::Bool(true) => Instr::S(Opcode::LoadTrue, register.into()),
            Value::Bool(false) => Instr::S(Opcode::LoadFalse, register.into()),
            Value::Int(i) if i16::try_from(*i).is_ok() => {
                let small = i16::try_from(*i).map_err(|_| Error::compile("integer out of range"))?;
                Instr::SI(Opcode::LoadInteger, register, small)
            }
            other => {
                let index = self.add_constant(other.clone())?;
                Instr::SC(Opcode::LoadConstant, register, index)
            }
        };
        self.emit(instr);
        Ok(())
    }

    /// Loads any slot into a near register.
    fn move_near(&mut self, dest: u32, src: &Slot) -> Result<()> {
        if src.is_constant() || src.is_reference() {
            self.load_constant(&src.constant, dest)?;
            if src.is_reference() {
                let d = near(dest)?;
                self.emit(Instr::SSU(Opcode::GetIndex, d, d, 0));
            }
        } else if src.is_upvalue() {
            let (env, index) = env_operands(src)?;
            self.emit(Instr::SES(Opcode::LoadUpvalue, near(dest)?, env, index));
        } else if src.index != i32::try_from(dest).unwrap_or(-1) {
            let from = u32::try_from(src.index)
                .map_err(|_| Error::new(ErrorKind::Internal("bad source slot".into())))?;
            self.emit(Instr::SS(Opcode::MoveNear, near(dest)?, far(from)?));
        }
        Ok(())
    }

    /// Stores a near register into any writable slot.
    fn move_back(&mut self, dest: &Slot, src: u32) -> Result<()> {
        if dest.is_constant() {
            return Err(Error::compile("cannot write to constant"));
        }
        if dest.is_reference() {
            let cell = self.scope_mut().ra.alloc_temp(Temp::T5);
            let result = self.load_constant(&dest.constant, cell);
            if result.is_ok() {
                self.emit(Instr::SSU(Opcode::PutIndex, near(cell)?, near(src)?, 0));
            }
            self.scope_mut().ra.free_temp(cell, Temp::T5);
            result?;
        } else if dest.is_upvalue() {
            let (env, index) = env_operands(dest)?;
            self.emit(Instr::SES(Opcode::SetUpvalue, near(src)?, env, index));
        } else if dest.index != i32::try_from(src).unwrap_or(-1) {
            let to = u32::try_from(dest.index)
                .map_err(|_| Error::new(ErrorKind::Internal("bad destination slot".into())))?;
            self.emit(Instr::SS(Opcode::MoveFar, near(src)?, far(to)?));
        }
        Ok(())
    }

    /// Copies `src` into `dest`.
    pub(crate) fn copy(&mut self, dest: &Slot, src: &Slot) -> Result<()> {
        if dest.is_constant() {
            return Err(Error::compile("cannot write to constant"));
        }
        if dest.same_location(src) {
            return Ok(());
        }
        if let Some(d) = dest.local_register().filter(|r| *r <= 0xFF) {
            return self.move_near(d, src);
        }
        if let Some(s) = src.local_register().filter(|r| *r <= 0xFF) {
            return self.move_back(dest, s);
        }
        let staging = self.scope_mut().ra.alloc_temp(Temp::T3);
        let result = self
            .move_near(staging, src)
            .and_then(|()| self.move_back(dest, staging));
        self.scope_mut().ra.free_temp(staging, Temp::T3);
        result
    }

    /// Returns a register holding `slot`'s value, loading it into the
    /// temporary `tag` when it is not already in a suitable register.
    fn read_operand(&mut self, slot: &Slot, tag: Temp, wide: bool) -> Result<u32> {
        if let Some(register) = slot.local_register() {
            if wide || register <= 0xFF {
                return Ok(register);
            }
        }
        let register = self.scope_mut().ra.alloc_temp(tag);
        if let Err(error) = self.move_near(register, slot) {
            self.scope_mut().ra.free_temp(register, tag);
            return Err(error);
        }
        Ok(register)
    }

    /// Returns a register an instruction can write `slot`'s new value into.
    fn write_operand(&mut self, slot: &Slot, tag: Temp, wide: bool) -> u32 {
        match slot.local_register() {
            Some(register) if wide || register <= 0xFF => register,
            _ => self.scope_mut().ra.alloc_temp(tag),
        }
    }

    fn operand(&mut self, slot: &Slot, tag: Temp, wide: bool, write: bool) -> Result<u32> {
        if write {
            Ok(self.write_operand(slot, tag, wide))
        } else {
            self.read_operand(slot, tag, wide)
        }
    }

    /// Releases an operand register, writing it back first if needed.
    fn release_operand(&mut self, slot: &Slot, register: u32, tag: Temp, write: bool) -> Result<()> {
        if slot.local_register() == Some(register) {
            return Ok(());
        }
        let result = if write {
            self.move_back(slot, register)
        } else {
            Ok(())
        };
        self.scope_mut().ra.free_temp(register, tag);
        result
    }

    /// One wide register operand.
    pub(crate) fn emit_s(&mut self, op: Opcode, slot: &Slot, write: bool) -> Result<usize> {
        let a = self.operand(slot, Temp::T0, true, write)?;
        let label = self.emit(Instr::S(op, a));
        self.release_operand(slot, a, Temp::T0, write)?;
        Ok(label)
    }

    /// Conditional jump on `slot`, displacement patched later.
    pub(crate) fn emit_sl(&mut self, op: Opcode, slot: &Slot) -> Result<usize> {
        let a = self.read_operand(slot, Temp::T0, false)?;
        let label = self.emit(Instr::SL(op, near(a)?, 0));
        self.release_operand(slot, a, Temp::T0, false)?;
        Ok(label)
    }

    /// Near register and a 16-bit immediate.
    pub(crate) fn emit_si(&mut self, op: Opcode, slot: &Slot, immediate: i16, write: bool) -> Result<usize> {
        let a = self.operand(slot, Temp::T0, false, write)?;
        let label = self.emit(Instr::SI(op, near(a)?, immediate));
        self.release_operand(slot, a, Temp::T0, write)?;
        Ok(label)
    }

    /// Near register and a nested function index.
    pub(crate) fn emit_sd(&mut self, op: Opcode, slot: &Slot, index: u16) -> Result<usize> {
        let a = self.write_operand(slot, Temp::T0, false);
        let label = self.emit(Instr::SD(op, near(a)?, index));
        self.release_operand(slot, a, Temp::T0, true)?;
        Ok(label)
    }

    /// Near register and far register.
    pub(crate) fn emit_ss(&mut self, op: Opcode, s1: &Slot, s2: &Slot, write: bool) -> Result<usize> {
        let a = self.operand(s1, Temp::T0, false, write)?;
        let b = self.read_operand(s2, Temp::T1, true)?;
        let label = self.emit(Instr::SS(op, near(a)?, far(b)?));
        self.release_operand(s2, b, Temp::T1, false)?;
        self.release_operand(s1, a, Temp::T0, write)?;
        Ok(label)
    }

    /// Two near registers and a signed immediate.
    pub(crate) fn emit_ssi(
        &mut self,
        op: Opcode,
        s1: &Slot,
        s2: &Slot,
        immediate: i8,
        write: bool,
    ) -> Result<usize> {
        let a = self.operand(s1, Temp::T0, false, write)?;
        let b = self.read_operand(s2, Temp::T1, false)?;
        let label = self.emit(Instr::SSI(op, near(a)?, near(b)?, immediate));
        self.release_operand(s2, b, Temp::T1, false)?;
        self.release_operand(s1, a, Temp::T0, write)?;
        Ok(label)
    }

    /// Two near registers and an unsigned immediate.
    pub(crate) fn emit_ssu(
        &mut self,
        op: Opcode,
        s1: &Slot,
        s2: &Slot,
        immediate: u8,
        write: bool,
    ) -> Result<usize> {
        let a = self.operand(s1, Temp::T0, false, write)?;
        let b = self.read_operand(s2, Temp::T1, false)?;
        let label = self.emit(Instr::SSU(op, near(a)?, near(b)?, immediate));
        self.release_operand(s2, b, Temp::T1, false)?;
        self.release_operand(s1, a, Temp::T0, write)?;
        Ok(label)
    }

    /// Three near registers.
    pub(crate) fn emit_sss(
        &mut self,
        op: Opcode,
        s1: &Slot,
        s2: &Slot,
        s3: &Slot,
        write: bool,
    ) -> Result<usize> {
        let a = self.operand(s1, Temp::T0, false, write)?;
        let b = self.read_operand(s2, Temp::T1, false)?;
        let c = self.read_operand(s3, Temp::T2, false)?;
        let label = self.emit(Instr::SSS(op, near(a)?, near(b)?, near(c)?));
        self.release_operand(s3, c, Temp::T2, false)?;
        self.release_operand(s2, b, Temp::T1, false)?;
        self.release_operand(s1, a, Temp::T0, write)?;
        Ok(label)
    }
}
