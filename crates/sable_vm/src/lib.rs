//! Reference virtual machine for Sable.
//!
//! This crate provides:
//! - [`Vm`] - Runs compiled function records and serves as the compiler's evaluator
//! - [`RunContext`] - An environment plus a VM: read, compile, run
//! - [`core_environment`] and [`PRELUDE`] - Native functions and the standard macros

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod prelude;
pub mod vm;

pub use context::RunContext;
pub use prelude::{PRELUDE, core_environment};
pub use vm::{DEFAULT_MAX_DEPTH, Vm, eval};
