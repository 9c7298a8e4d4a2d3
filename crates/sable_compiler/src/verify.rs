//! Structural verification of function records.
//!
//! The VM trusts verified records: every register operand is inside the
//! frame, every jump lands on an instruction, every constant, nested record
//! and environment index exists, and control cannot run off the end.

use sable_foundation::{Capture, FuncDef, Instr, VerifyError};

/// Checks one function record. Nested records are checked when they are
/// closed, so only their capture lists are inspected here.
///
/// # Errors
///
/// Returns the first structural problem found.
pub fn verify(def: &FuncDef) -> Result<(), VerifyError> {
    if def.bytecode.is_empty() {
        return Err(VerifyError::EmptyBytecode);
    }
    let vararg = u32::from(def.is_variadic());
    let arity_ok = def.min_arity <= def.arity
        && def.arity.checked_add(vararg).is_some_and(|n| n <= def.slot_count)
        && (def.max_arity == u32::MAX || def.max_arity == def.arity);
    if !arity_ok {
        return Err(VerifyError::BadArity);
    }

    let len = def.bytecode.len();
    let mut last = None;
    for (pc, word) in def.bytecode.iter().enumerate() {
        let instr = Instr::decode(*word).map_err(|_| VerifyError::BadInstruction { pc })?;
        check_instruction(def, pc, len, instr)?;
        last = Some(instr);
    }
    if !last.is_some_and(|instr| instr.opcode().is_terminator()) {
        return Err(VerifyError::MissingTerminator);
    }

    for child in &def.defs {
        for capture in &child.environments {
            if let Capture::Upvalue(index) = capture {
                if usize::from(*index) >= def.environments.len() {
                    return Err(VerifyError::EnvOutOfRange { pc: None });
                }
            }
        }
    }
    Ok(())
}

fn check_instruction(def: &FuncDef, pc: usize, len: usize, instr: Instr) -> Result<(), VerifyError> {
    let register = |r: u32| {
        if r < def.slot_count {
            Ok(())
        } else {
            Err(VerifyError::RegisterOutOfRange { pc, register: r })
        }
    };
    let jump = |displacement: i32| {
        let target = pc as i64 + i64::from(displacement);
        if (0..len as i64).contains(&target) {
            Ok(())
        } else {
            Err(VerifyError::JumpOutOfRange { pc, target })
        }
    };

    match instr {
        Instr::None(_) => Ok(()),
        Instr::S(_, a) => register(a),
        Instr::L(_, d) => jump(d),
        Instr::SL(_, a, d) => {
            register(a.into())?;
            jump(d.into())
        }
        Instr::SI(_, a, _) => register(a.into()),
        Instr::SC(_, a, index) => {
            register(a.into())?;
            if usize::from(index) < def.constants.len() {
                Ok(())
            } else {
                Err(VerifyError::ConstantOutOfRange { pc })
            }
        }
        Instr::SD(_, a, index) => {
            register(a.into())?;
            if usize::from(index) < def.defs.len() {
                Ok(())
            } else {
                Err(VerifyError::DefOutOfRange { pc })
            }
        }
        Instr::SES(_, a, env, _) => {
            register(a.into())?;
            if usize::from(env) < def.environments.len() {
                Ok(())
            } else {
                Err(VerifyError::EnvOutOfRange { pc: Some(pc) })
            }
        }
        Instr::SS(_, a, b) => {
            register(a.into())?;
            register(b.into())
        }
        Instr::SSS(_, a, b, c) => {
            register(a.into())?;
            register(b.into())?;
            register(c.into())
        }
        Instr::SSI(_, a, b, _) | Instr::SSU(_, a, b, _) => {
            register(a.into())?;
            register(b.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use sable_foundation::{FuncFlags, Opcode, Value};

    use super::*;

    fn record(code: &[Instr]) -> FuncDef {
        FuncDef {
            slot_count: 2,
            bytecode: code.iter().map(|i| i.encode()).collect(),
            ..FuncDef::default()
        }
    }

    fn code_of(error: Result<(), VerifyError>) -> u32 {
        error.unwrap_err().code()
    }

    #[test]
    fn well_formed_record_passes() {
        let def = record(&[
            Instr::SL(Opcode::JumpIfNot, 0, 2),
            Instr::S(Opcode::Return, 1),
            Instr::None(Opcode::ReturnNil),
        ]);
        assert_eq!(verify(&def), Ok(()));
    }

    #[test]
    fn empty_bytecode() {
        assert_eq!(verify(&FuncDef::default()), Err(VerifyError::EmptyBytecode));
    }

    #[test]
    fn arity_bookkeeping() {
        let mut def = record(&[Instr::None(Opcode::ReturnNil)]);
        def.arity = 2;
        def.flags = FuncFlags::VARARG;
        def.max_arity = u32::MAX;
        assert_eq!(code_of(verify(&def)), 2);

        let mut def = record(&[Instr::None(Opcode::ReturnNil)]);
        def.arity = 1;
        def.min_arity = 2;
        def.max_arity = 1;
        assert_eq!(code_of(verify(&def)), 2);

        let mut def = record(&[Instr::None(Opcode::ReturnNil)]);
        def.arity = 1;
        def.min_arity = 0;
        def.max_arity = 1;
        assert_eq!(verify(&def), Ok(()));
    }

    #[test]
    fn undecodable_word() {
        let mut def = record(&[Instr::None(Opcode::ReturnNil)]);
        def.bytecode.insert(0, 0xFF);
        assert_eq!(verify(&def), Err(VerifyError::BadInstruction { pc: 0 }));
    }

    #[test]
    fn operands_in_range() {
        let cases = [
            (Instr::S(Opcode::Return, 2), 4),
            (Instr::L(Opcode::Jump, 5), 5),
            (Instr::L(Opcode::Jump, -1), 5),
            (Instr::SD(Opcode::Closure, 0, 0), 6),
            (Instr::SC(Opcode::LoadConstant, 0, 1), 7),
            (Instr::SES(Opcode::LoadUpvalue, 0, 0, 0), 8),
        ];
        for (instr, code) in cases {
            let mut def = record(&[instr, Instr::None(Opcode::ReturnNil)]);
            def.constants = vec![Value::Int(1)];
            assert_eq!(code_of(verify(&def)), code, "{instr}");
        }
    }

    #[test]
    fn missing_terminator() {
        let def = record(&[Instr::S(Opcode::LoadNil, 0)]);
        assert_eq!(verify(&def), Err(VerifyError::MissingTerminator));
    }

    #[test]
    fn nested_captures_must_exist() {
        let child = FuncDef {
            environments: vec![Capture::Upvalue(0)],
            ..record(&[Instr::None(Opcode::ReturnNil)])
        };
        let mut def = record(&[Instr::SD(Opcode::Closure, 0, 0), Instr::None(Opcode::ReturnNil)]);
        def.defs.push(Rc::new(child));
        assert_eq!(verify(&def), Err(VerifyError::EnvOutOfRange { pc: None }));
        def.environments.push(Capture::Frame);
        assert_eq!(verify(&def), Ok(()));
    }
}
