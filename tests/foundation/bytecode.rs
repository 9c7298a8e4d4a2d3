//! Integration tests for the bytecode model
//!
//! Tests opcode shapes, instruction words, and function record bookkeeping.

use std::collections::HashSet;

use sable_foundation::{FuncDef, FuncFlags, Instr, Opcode, Shape};

// =============================================================================
// Opcodes
// =============================================================================

#[test]
fn mnemonics_are_unique() {
    let names: HashSet<_> = Opcode::ALL.iter().map(|op| op.mnemonic()).collect();
    assert_eq!(names.len(), Opcode::ALL.len());
}

#[test]
fn shapes_match_operand_roles() {
    assert_eq!(Opcode::ReturnNil.shape(), Shape::None);
    assert_eq!(Opcode::Jump.shape(), Shape::L);
    assert_eq!(Opcode::JumpIfNot.shape(), Shape::SL);
    assert_eq!(Opcode::LoadConstant.shape(), Shape::SC);
    assert_eq!(Opcode::Closure.shape(), Shape::SD);
    assert_eq!(Opcode::LoadUpvalue.shape(), Shape::SES);
    assert_eq!(Opcode::AddImmediate.shape(), Shape::SSI);
    assert_eq!(Opcode::GetIndex.shape(), Shape::SSU);
    assert_eq!(Opcode::Put.shape(), Shape::SSS);
}

#[test]
fn only_jumps_have_displacements() {
    for &op in Opcode::ALL {
        let instr = match op.shape() {
            Shape::L => Instr::L(op, 3),
            Shape::SL => Instr::SL(op, 0, 3),
            _ => continue,
        };
        assert!(op.is_jump());
        assert_eq!(instr.displacement(), Some(3));
    }
    assert_eq!(Instr::S(Opcode::Return, 0).displacement(), None);
}

// =============================================================================
// Instruction Words
// =============================================================================

#[test]
fn one_instruction_per_shape_round_trips() {
    let samples = [
        Instr::None(Opcode::ReturnNil),
        Instr::S(Opcode::Push, 0x00AB_CDEF),
        Instr::L(Opcode::Jump, -0x7F_FFFF),
        Instr::SS(Opcode::MoveFar, 255, 0xFFFF),
        Instr::SL(Opcode::JumpIfNil, 1, i16::MIN),
        Instr::SI(Opcode::LoadInteger, 2, -1),
        Instr::SD(Opcode::Closure, 3, 9),
        Instr::SC(Opcode::LoadConstant, 4, 300),
        Instr::SSS(Opcode::Put, 5, 6, 7),
        Instr::SSI(Opcode::SubtractImmediate, 8, 9, i8::MIN),
        Instr::SSU(Opcode::PutIndex, 10, 11, 255),
        Instr::SES(Opcode::SetUpvalue, 12, 1, 40),
    ];
    for instr in samples {
        assert_eq!(Instr::decode(instr.encode()), Ok(instr), "{instr}");
    }
}

#[test]
fn long_jumps_refuse_oversized_displacements() {
    let jump = Instr::L(Opcode::Jump, 0);
    assert!(jump.with_displacement(0x7F_FFFF).is_some());
    assert!(jump.with_displacement(0x80_0000).is_none());
    let branch = Instr::SL(Opcode::JumpIf, 0, 0);
    assert!(branch.with_displacement(40_000).is_none());
}

#[test]
fn listing_text() {
    assert_eq!(Instr::SSI(Opcode::AddImmediate, 1, 0, -2).to_string(), "add-immediate $1 $0 -2");
    assert_eq!(Instr::SES(Opcode::LoadUpvalue, 0, 1, 3).to_string(), "load-upvalue $0 env1[3]");
    assert_eq!(Instr::L(Opcode::Jump, 4).to_string(), "jump +4");
}

// =============================================================================
// Function Records
// =============================================================================

#[test]
fn optional_parameters_widen_the_window() {
    let def = FuncDef {
        arity: 3,
        min_arity: 1,
        max_arity: 3,
        ..FuncDef::default()
    };
    assert!(!def.accepts(0));
    assert!(def.accepts(1));
    assert!(def.accepts(3));
    assert!(!def.accepts(4));
    assert!(!def.is_variadic());
}

#[test]
fn rest_parameters_are_unbounded() {
    let def = FuncDef {
        name: Some("f".to_string()),
        arity: 1,
        min_arity: 1,
        max_arity: u32::MAX,
        flags: FuncFlags::STRUCTARG,
        ..FuncDef::default()
    };
    assert!(def.accepts(1_000));
    assert!(def.is_variadic());
    assert_eq!(def.display_name(), "f");
    assert_eq!(FuncDef::default().display_name(), "_");
}
