//! Error types for Sable.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! Compile errors, host failures surfaced through macros, runtime faults,
//! and structural verifier failures all travel through the one [`Error`] type;
//! [`ErrorKind`] keeps them apart for matching.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// The main error type for Sable operations.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches a source position, keeping any context already present.
    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        if !span.is_known() {
            return self;
        }
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_position(span.line as usize, span.column as usize));
        self
    }

    /// Creates a user compile error.
    #[must_use]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile(message.into()))
    }

    /// Creates an unknown symbol error.
    #[must_use]
    pub fn unknown_symbol(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownSymbol(name.into()))
    }

    /// Creates a runtime error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime(message.into()))
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates an arity mismatch error.
    #[must_use]
    pub fn arity_mismatch(expected: impl Into<String>, actual: usize) -> Self {
        Self::new(ErrorKind::ArityMismatch {
            expected: expected.into(),
            actual,
        })
    }

    /// Creates a structural (verifier) error.
    #[must_use]
    pub fn structural(error: VerifyError) -> Self {
        Self::new(ErrorKind::Structural(error))
    }

    /// Returns the source line and column, if known.
    #[must_use]
    pub fn position(&self) -> Option<(usize, usize)> {
        let context = self.context.as_ref()?;
        Some((context.line?, context.column?))
    }

    /// Returns true if this error reports invalid bytecode rather than bad input.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self.kind, ErrorKind::Structural(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// Reader error.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
        /// Line number (1-indexed).
        line: u32,
        /// Column number (1-indexed).
        column: u32,
        /// The source line where the error occurred.
        context: String,
    },

    /// User compile error (bad special-form shape, write to constant, ...).
    #[error("compile error: {0}")]
    Compile(String),

    /// Symbol not bound locally or globally.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// A macro or other host callback failed while compiling.
    #[error("(macro) {form}: {message}")]
    Macro {
        /// The form whose expansion failed.
        form: String,
        /// The host error message.
        message: String,
    },

    /// Compilation nested deeper than the configured limit.
    #[error("{0}")]
    RecursionLimit(String),

    /// The verifier rejected a function record; a compiler defect.
    #[error("invalid bytecode: {0}")]
    Structural(VerifyError),

    /// Error raised while running bytecode.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Operand of the wrong type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type encountered.
        actual: String,
    },

    /// Wrong number of arguments to a function.
    #[error("arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        /// Description of expected arity.
        expected: String,
        /// Actual number of arguments.
        actual: usize,
    },

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Index out of bounds.
    #[error("index out of bounds: {index} (length {length})")]
    IndexOutOfBounds {
        /// The index that was accessed.
        index: i64,
        /// The actual length of the collection.
        length: usize,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons the verifier rejects a function record.
///
/// Each variant has a stable numeric [`code`](VerifyError::code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The record has no instructions.
    EmptyBytecode,
    /// Arity bookkeeping is inconsistent.
    BadArity,
    /// A word does not decode to a known instruction.
    BadInstruction {
        /// Instruction index.
        pc: usize,
    },
    /// A register operand is at or past the slot count.
    RegisterOutOfRange {
        /// Instruction index.
        pc: usize,
        /// Offending register.
        register: u32,
    },
    /// A jump lands outside the bytecode.
    JumpOutOfRange {
        /// Instruction index.
        pc: usize,
        /// Computed target.
        target: i64,
    },
    /// A closure instruction names a missing nested record.
    DefOutOfRange {
        /// Instruction index.
        pc: usize,
    },
    /// A constant index is past the constant table.
    ConstantOutOfRange {
        /// Instruction index.
        pc: usize,
    },
    /// An upvalue instruction or capture names a missing environment.
    EnvOutOfRange {
        /// Instruction index, or `None` for a nested record's capture list.
        pc: Option<usize>,
    },
    /// The last instruction could fall off the end of the function.
    MissingTerminator,
}

impl VerifyError {
    /// Returns the numeric code for this failure.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::EmptyBytecode => 1,
            Self::BadArity => 2,
            Self::BadInstruction { .. } => 3,
            Self::RegisterOutOfRange { .. } => 4,
            Self::JumpOutOfRange { .. } => 5,
            Self::DefOutOfRange { .. } => 6,
            Self::ConstantOutOfRange { .. } => 7,
            Self::EnvOutOfRange { .. } => 8,
            Self::MissingTerminator => 9,
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBytecode => write!(f, "empty bytecode"),
            Self::BadArity => write!(f, "inconsistent arity"),
            Self::BadInstruction { pc } => write!(f, "bad instruction at {pc}"),
            Self::RegisterOutOfRange { pc, register } => {
                write!(f, "register {register} out of range at {pc}")
            }
            Self::JumpOutOfRange { pc, target } => {
                write!(f, "jump to {target} out of range at {pc}")
            }
            Self::DefOutOfRange { pc } => write!(f, "function definition out of range at {pc}"),
            Self::ConstantOutOfRange { pc } => write!(f, "constant out of range at {pc}"),
            Self::EnvOutOfRange { pc: Some(pc) } => write!(f, "environment out of range at {pc}"),
            Self::EnvOutOfRange { pc: None } => write!(f, "capture names a missing environment"),
            Self::MissingTerminator => write!(f, "function does not end in a terminator"),
        }?;
        write!(f, " (code {})", self.code())
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Source file or chunk name.
    pub source: Option<String>,
    /// Line number in source.
    pub line: Option<usize>,
    /// Column number in source.
    pub column: Option<usize>,
    /// Stack trace of function calls.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source location.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the line and column.
    #[must_use]
    pub fn with_position(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.line, self.column) {
            (Some(source), Some(line), Some(col)) => write!(f, "at {source}:{line}:{col}")?,
            (Some(source), _, _) => write!(f, "at {source}")?,
            (None, Some(line), Some(col)) => write!(f, "at {line}:{col}")?,
            _ => {}
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
