//! Compiled function records.

use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;

use crate::span::Span;
use crate::value::Value;

bitflags! {
    /// Properties of a compiled function.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FuncFlags: u32 {
        /// Extra arguments are collected into a tuple.
        const VARARG = 1 << 0;
        /// Extra arguments are collected into a struct (`&keys`).
        const STRUCTARG = 1 << 1;
        /// Closures created by this function capture its frame.
        const NEEDS_ENV = 1 << 2;
    }
}

/// Where a nested function's environment comes from when its closure is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capture {
    /// The frame of the function creating the closure.
    Frame,
    /// One of the creating function's own captured environments.
    Upvalue(u16),
}

/// Debug record for a named local.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Local name.
    pub name: Arc<str>,
    /// First instruction where the binding is live.
    pub birth: u32,
    /// Instruction after the last one where the binding is live.
    pub death: u32,
    /// Register holding the binding.
    pub register: u32,
}

/// An immutable compiled function.
#[derive(Clone, Debug, Default)]
pub struct FuncDef {
    /// Name, if the function was named.
    pub name: Option<String>,
    /// Source name (file or chunk).
    pub source: Option<String>,
    /// Number of fixed parameters.
    pub arity: u32,
    /// Fewest arguments accepted.
    pub min_arity: u32,
    /// Most arguments accepted; `u32::MAX` when unbounded.
    pub max_arity: u32,
    /// Function properties.
    pub flags: FuncFlags,
    /// Registers the frame needs.
    pub slot_count: u32,
    /// Encoded instructions.
    pub bytecode: Vec<u32>,
    /// Constant table.
    pub constants: Vec<Value>,
    /// Capture list, one entry per environment the function reads.
    pub environments: Vec<Capture>,
    /// Nested function records.
    pub defs: Vec<Rc<FuncDef>>,
    /// Source span per instruction.
    pub source_map: Vec<Span>,
    /// Named locals for debugging.
    pub symbol_map: Vec<SymbolInfo>,
    /// Bitset of registers captured by nested closures.
    pub closure_bitset: Vec<u32>,
}

impl FuncDef {
    /// Returns true if extra arguments are collected.
    #[must_use]
    pub const fn is_variadic(&self) -> bool {
        self.flags.intersects(FuncFlags::VARARG.union(FuncFlags::STRUCTARG))
    }

    /// Returns true if `register` is captured by a nested closure.
    #[must_use]
    pub fn is_captured(&self, register: u32) -> bool {
        let word = (register / 32) as usize;
        self.closure_bitset
            .get(word)
            .is_some_and(|bits| bits & (1 << (register % 32)) != 0)
    }

    /// Returns true if `count` arguments satisfy this function's arity.
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        count >= self.min_arity && count <= self.max_arity
    }

    /// Returns the name for messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_bitset_lookup() {
        let def = FuncDef {
            closure_bitset: vec![0b100, 1],
            ..FuncDef::default()
        };
        assert!(def.is_captured(2));
        assert!(def.is_captured(32));
        assert!(!def.is_captured(3));
        assert!(!def.is_captured(1000));
    }

    #[test]
    fn arity_window() {
        let def = FuncDef {
            arity: 2,
            min_arity: 1,
            max_arity: 2,
            ..FuncDef::default()
        };
        assert!(!def.accepts(0));
        assert!(def.accepts(1));
        assert!(def.accepts(2));
        assert!(!def.accepts(3));

        let variadic = FuncDef {
            max_arity: u32::MAX,
            flags: FuncFlags::VARARG,
            ..FuncDef::default()
        };
        assert!(variadic.is_variadic());
        assert!(variadic.accepts(100));
    }
}
