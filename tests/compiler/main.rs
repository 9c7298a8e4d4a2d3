//! Integration tests for Layer 1: Compiler
//!
//! Tests the reader, the shape of compiled function records, and compile
//! diagnostics.

mod diagnostics;
mod reader;
mod records;
