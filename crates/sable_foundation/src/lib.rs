//! Core values, errors, and the bytecode model for Sable.
//!
//! This crate provides:
//! - [`Value`] - Data and syntax trees share one representation
//! - [`Span`] - Source locations attached to tuples and errors
//! - [`Error`] - Rich error types with context
//! - [`Opcode`] and [`Instr`] - The instruction set and its word encoding
//! - [`FuncDef`] - A compiled, immutable function record

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod funcdef;
pub mod instr;
pub mod opcode;
pub mod span;
pub mod value;

pub use error::{Error, ErrorContext, ErrorKind, VerifyError};
pub use funcdef::{Capture, FuncDef, FuncFlags, SymbolInfo};
pub use instr::{DecodeError, Instr};
pub use opcode::{Opcode, Shape};
pub use span::Span;
pub use value::{Closure, Frame, Intrinsic, NativeFn, Tuple, Value};

/// Result type alias using the Sable error type.
pub type Result<T> = std::result::Result<T, Error>;
