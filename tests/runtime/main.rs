//! End-to-end tests for Sable
//!
//! Tests whole programs through the VM and the REPL front end.

mod programs;
mod repl;
