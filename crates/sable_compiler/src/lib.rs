//! Reader, environment, and bytecode compiler for Sable.
//!
//! This crate provides:
//! - [`Lexer`] and [`Parser`] - Reading source text into [`Value`](sable_foundation::Value) forms
//! - [`Environment`] - Global bindings with metadata
//! - [`Compiler`] - Register-allocating compiler from forms to [`FuncDef`](sable_foundation::FuncDef)
//! - [`verify`] - Structural checks the VM relies on
//! - [`disassemble`] - Human-readable listings

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod compiler;
pub mod config;
mod destructure;
pub mod disasm;
mod emit;
pub mod env;
mod intrinsics;
pub mod lexer;
pub mod lint;
mod optimize;
pub mod parser;
pub mod regalloc;
mod scope;
pub mod slot;
mod specials;
pub mod token;
pub mod verify;

pub use compiler::{Compiler, Evaluator, compile};
pub use config::CompilerOptions;
pub use disasm::{Listing, disassemble};
pub use env::{Binding, Entry, EntryKind, EntryMeta, Environment};
pub use lexer::Lexer;
pub use lint::{Lint, LintLevel};
pub use parser::{Parser, parse, parse_one};
pub use regalloc::{RegAlloc, Temp};
pub use slot::{FormFlags, FormOptions, Slot, SlotFlags};
pub use specials::SPECIAL_FORMS;
pub use token::{Token, TokenKind};
pub use verify::verify;
