//! Compiler advisories.
//!
//! Lints never stop compilation. They go to a caller-supplied sink; with no
//! sink attached they are logged at `warn` level instead.

use std::fmt;

use sable_foundation::Span;

/// How serious a lint is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LintLevel {
    /// Almost certainly a bug; reported even under relaxed settings.
    Relaxed,
    /// Likely mistakes.
    Normal,
    /// Pedantic advice, reported only under strict settings.
    Strict,
}

impl fmt::Display for LintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relaxed => write!(f, "relaxed"),
            Self::Normal => write!(f, "normal"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// One advisory message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lint {
    /// Severity.
    pub level: LintLevel,
    /// Where the advisory applies.
    pub span: Span,
    /// Human-readable text.
    pub message: String,
}

impl Lint {
    /// Creates a lint.
    #[must_use]
    pub fn new(level: LintLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            level,
            span,
            message: message.into(),
        }
    }
}

impl fmt::Display for Lint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.span, self.level, self.message)
    }
}
