//! Sable - a small Lisp with a register-based bytecode compiler
//!
//! This crate re-exports all layers of the Sable system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: sable_runtime    - REPL and CLI
//! Layer 2: sable_vm         - Reference VM, natives, prelude, evaluation context
//! Layer 1: sable_compiler   - Reader, compiler, optimizer, verifier, disassembler
//! Layer 0: sable_foundation - Values, errors, opcodes, function records
//! ```

pub use sable_compiler as compiler;
pub use sable_foundation as foundation;
pub use sable_runtime as runtime;
pub use sable_vm as vm;
