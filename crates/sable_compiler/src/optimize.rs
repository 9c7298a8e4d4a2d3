//! Post-processing of a closed function's instructions.
//!
//! Two passes run before encoding: dead-store elimination turns pure writes
//! to never-read registers into no-ops, and no-op removal compacts the code
//! while re-targeting jumps and the debug maps.

use sable_foundation::{Instr, Opcode, Span, SymbolInfo};

use crate::emit::BREAK_TAG;
use crate::regalloc::RegAlloc;

/// Calls `read` with every register `instr` reads.
fn for_each_read(instr: Instr, mut read: impl FnMut(u32)) {
    use Opcode as Op;
    match instr {
        Instr::None(_) | Instr::L(..) | Instr::SI(..) | Instr::SC(..) | Instr::SD(..) => {}
        Instr::S(op, a) => {
            if matches!(op, Op::Error | Op::Return | Op::Push | Op::PushArray | Op::Tailcall) {
                read(a);
            }
        }
        Instr::SL(_, a, _) => read(a.into()),
        Instr::SES(op, a, _, _) => {
            if op == Op::SetUpvalue {
                read(a.into());
            }
        }
        Instr::SS(op, a, b) => match op {
            Op::MoveFar | Op::Push2 => {
                read(a.into());
                if op == Op::Push2 {
                    read(b.into());
                }
            }
            _ => read(b.into()),
        },
        Instr::SSS(op, a, b, c) => {
            if matches!(op, Op::Push3 | Op::Put) {
                read(a.into());
            }
            read(b.into());
            read(c.into());
        }
        Instr::SSI(_, _, b, _) => read(b.into()),
        Instr::SSU(op, a, b, _) => {
            if op == Op::PutIndex {
                read(a.into());
            }
            read(b.into());
        }
    }
}

/// Returns the destination of an instruction whose only effect is writing
/// that register.
fn pure_write(instr: Instr) -> Option<u32> {
    use Opcode as Op;
    match instr {
        Instr::S(Op::LoadNil | Op::LoadTrue | Op::LoadFalse | Op::LoadSelf, a) => Some(a),
        Instr::SI(Op::LoadInteger, a, _)
        | Instr::SC(Op::LoadConstant, a, _)
        | Instr::SD(Op::Closure, a, _)
        | Instr::SES(Op::LoadUpvalue, a, _, _)
        | Instr::SS(Op::MoveNear, a, _) => Some(a.into()),
        Instr::SS(Op::MoveFar, _, b) => Some(b.into()),
        _ => None,
    }
}

/// Replaces writes to registers that are never read, and never captured by
/// a nested closure, with no-ops. Repeats until nothing changes, since
/// removing one store can make its source dead.
pub(crate) fn eliminate_dead_stores(code: &mut [Instr], closure_bitset: &[u32]) {
    loop {
        let mut live = RegAlloc::new();
        for (word, bits) in (0u32..).zip(closure_bitset) {
            for bit in 0..32 {
                if bits & (1 << bit) != 0 {
                    live.touch(word * 32 + bit);
                }
            }
        }
        for instr in code.iter() {
            for_each_read(*instr, |register| live.touch(register));
        }

        let mut changed = false;
        for instr in code.iter_mut() {
            if let Some(dest) = pure_write(*instr) {
                if !live.check(dest) {
                    *instr = Instr::None(Opcode::Noop);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Deletes no-ops, re-targeting jumps and remapping source spans and
/// symbol lifetimes to the compacted positions.
pub(crate) fn remove_noops(code: &mut Vec<Instr>, spans: &mut Vec<Span>, symbols: &mut [SymbolInfo]) {
    let is_noop = |instr: &Instr| *instr == Instr::None(Opcode::Noop);
    if !code.iter().any(is_noop) {
        return;
    }

    let mut new_pc = Vec::with_capacity(code.len() + 1);
    let mut next = 0usize;
    for instr in code.iter() {
        new_pc.push(next);
        if !is_noop(instr) {
            next += 1;
        }
    }
    new_pc.push(next);

    let mut compacted = Vec::with_capacity(next);
    let mut compacted_spans = Vec::with_capacity(next);
    for (pc, instr) in code.iter().enumerate() {
        if is_noop(instr) {
            continue;
        }
        let here = compacted.len();
        let instr = match instr.displacement() {
            Some(displacement) if displacement != BREAK_TAG => {
                let target = usize::try_from(pc as i64 + i64::from(displacement))
                    .ok()
                    .and_then(|t| new_pc.get(t).copied());
                target
                    .and_then(|t| i32::try_from(t as i64 - here as i64).ok())
                    .and_then(|d| instr.with_displacement(d))
                    .unwrap_or(*instr)
            }
            _ => *instr,
        };
        compacted.push(instr);
        if let Some(span) = spans.get(pc) {
            compacted_spans.push(*span);
        }
    }

    let remap = |pc: u32| {
        let index = (pc as usize).min(new_pc.len() - 1);
        u32::try_from(new_pc[index]).unwrap_or(u32::MAX)
    };
    for symbol in symbols.iter_mut() {
        symbol.birth = remap(symbol.birth);
        symbol.death = remap(symbol.death);
    }

    *code = compacted;
    *spans = compacted_spans;
}
