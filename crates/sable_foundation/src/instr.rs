//! Decoded instructions and their 32-bit word encoding.
//!
//! The compiler works on [`Instr`] values and only encodes them when a
//! function record is finished. Field positions are fixed: the opcode sits in
//! bits 0..8, and the operands follow at bit 8, bit 16 and bit 24.

use std::fmt;

use thiserror::Error;

use crate::opcode::{Opcode, Shape};

/// Largest displacement a 24-bit jump can hold.
pub const MAX_LONG_JUMP: i32 = (1 << 23) - 1;

/// A decoded instruction. The variant always matches the opcode's [`Shape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// No operands.
    None(Opcode),
    /// One 24-bit operand.
    S(Opcode, u32),
    /// Signed 24-bit displacement.
    L(Opcode, i32),
    /// Near register, far register.
    SS(Opcode, u8, u16),
    /// Near register, signed 16-bit displacement.
    SL(Opcode, u8, i16),
    /// Near register, signed 16-bit immediate.
    SI(Opcode, u8, i16),
    /// Near register, nested function index.
    SD(Opcode, u8, u16),
    /// Near register, constant index.
    SC(Opcode, u8, u16),
    /// Three near registers.
    SSS(Opcode, u8, u8, u8),
    /// Two near registers and a signed immediate.
    SSI(Opcode, u8, u8, i8),
    /// Two near registers and an unsigned immediate.
    SSU(Opcode, u8, u8, u8),
    /// Near register, environment, register in that environment.
    SES(Opcode, u8, u8, u8),
}

/// Failure to decode a bytecode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The low byte is not an opcode.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// Bits the opcode's shape does not use are set.
    #[error("nonzero padding in {0:#010x}")]
    Padding(u32),
}

impl Instr {
    /// Returns the opcode.
    #[must_use]
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::None(op)
            | Self::S(op, _)
            | Self::L(op, _)
            | Self::SS(op, _, _)
            | Self::SL(op, _, _)
            | Self::SI(op, _, _)
            | Self::SD(op, _, _)
            | Self::SC(op, _, _)
            | Self::SSS(op, _, _, _)
            | Self::SSI(op, _, _, _)
            | Self::SSU(op, _, _, _)
            | Self::SES(op, _, _, _) => op,
        }
    }

    /// Returns the jump displacement, if this is a jump.
    #[must_use]
    pub const fn displacement(self) -> Option<i32> {
        match self {
            Self::L(_, d) => Some(d),
            Self::SL(_, _, d) => Some(d as i32),
            _ => None,
        }
    }

    /// Returns this jump with a new displacement, or `None` if it does not fit.
    #[must_use]
    pub fn with_displacement(self, displacement: i32) -> Option<Self> {
        match self {
            Self::L(op, _) if displacement.abs() <= MAX_LONG_JUMP => {
                Some(Self::L(op, displacement))
            }
            Self::SL(op, a, _) => i16::try_from(displacement)
                .ok()
                .map(|d| Self::SL(op, a, d)),
            _ => None,
        }
    }

    /// Encodes this instruction as a bytecode word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn encode(self) -> u32 {
        let op = self.opcode() as u32;
        let rest = match self {
            Self::None(_) => 0,
            Self::S(_, a) => a & 0x00FF_FFFF,
            Self::L(_, d) => (d as u32) & 0x00FF_FFFF,
            Self::SS(_, a, b) | Self::SD(_, a, b) | Self::SC(_, a, b) => {
                (a as u32) | ((b as u32) << 8)
            }
            Self::SL(_, a, d) | Self::SI(_, a, d) => (a as u32) | (((d as u16) as u32) << 8),
            Self::SSS(_, a, b, c) | Self::SSU(_, a, b, c) | Self::SES(_, a, b, c) => {
                (a as u32) | ((b as u32) << 8) | ((c as u32) << 16)
            }
            Self::SSI(_, a, b, c) => (a as u32) | ((b as u32) << 8) | (((c as u8) as u32) << 16),
        };
        op | (rest << 8)
    }

    /// Decodes a bytecode word.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown opcodes and for words with stray bits in
    /// fields their shape does not use.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn decode(word: u32) -> Result<Self, DecodeError> {
        let byte = (word & 0xFF) as u8;
        let Some(op) = Opcode::from_u8(byte) else {
            return Err(DecodeError::UnknownOpcode(byte));
        };
        let a = (word >> 8) as u8;
        let b = (word >> 16) as u8;
        let c = (word >> 24) as u8;
        let wide = (word >> 16) as u16;
        Ok(match op.shape() {
            Shape::None => {
                if word >> 8 != 0 {
                    return Err(DecodeError::Padding(word));
                }
                Self::None(op)
            }
            Shape::S => Self::S(op, word >> 8),
            Shape::L => Self::L(op, (word as i32) >> 8),
            Shape::SS => Self::SS(op, a, wide),
            Shape::SL => Self::SL(op, a, wide as i16),
            Shape::SI => Self::SI(op, a, wide as i16),
            Shape::SD => Self::SD(op, a, wide),
            Shape::SC => Self::SC(op, a, wide),
            Shape::SSS => Self::SSS(op, a, b, c),
            Shape::SSI => Self::SSI(op, a, b, c as i8),
            Shape::SSU => Self::SSU(op, a, b, c),
            Shape::SES => Self::SES(op, a, b, c),
        })
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().mnemonic();
        match *self {
            Self::None(_) => write!(f, "{name}"),
            Self::S(_, a) => write!(f, "{name} ${a}"),
            Self::L(_, d) => write!(f, "{name} {d:+}"),
            Self::SS(_, a, b) => write!(f, "{name} ${a} ${b}"),
            Self::SL(_, a, d) => write!(f, "{name} ${a} {d:+}"),
            Self::SI(_, a, i) => write!(f, "{name} ${a} {i}"),
            Self::SD(_, a, d) => write!(f, "{name} ${a} def{d}"),
            Self::SC(_, a, k) => write!(f, "{name} ${a} const{k}"),
            Self::SSS(_, a, b, c) => write!(f, "{name} ${a} ${b} ${c}"),
            Self::SSI(_, a, b, i) => write!(f, "{name} ${a} ${b} {i}"),
            Self::SSU(_, a, b, u) => write!(f, "{name} ${a} ${b} {u}"),
            Self::SES(_, a, e, i) => write!(f, "{name} ${a} env{e}[{i}]"),
        }
    }
}
