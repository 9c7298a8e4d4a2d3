//! REPL and command-line interface for Sable.
//!
//! This crate provides:
//! - [`Repl`] - Interactive read-eval-print loop over a [`RunContext`](sable_vm::RunContext)
//! - [`LineEditor`] - The line editing seam, with a rustyline implementation
//! - The `sable` binary, which runs files or starts the REPL

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod editor;
pub mod highlight;
pub mod repl;

pub use editor::{LineEditor, ReadResult, RustylineEditor, input_is_complete};
pub use highlight::SableHighlighter;
pub use repl::Repl;
