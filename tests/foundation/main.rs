//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, Error, and the bytecode model.

mod bytecode;
mod errors;
mod values;
