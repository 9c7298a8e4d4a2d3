//! Configuration for the compiler.

/// Limits and pass switches for one compilation.
#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Deepest nesting of forms before "recursed too deeply".
    pub max_recursion: usize,

    /// Host stack the compiler may use for one top-level form before
    /// "recursed too deeply", whatever the nesting count.
    pub max_stack_bytes: usize,

    /// Macro expansions allowed per form.
    pub max_macro_expansions: usize,

    /// Deepest nesting of `quasiquote` structure.
    pub max_quasiquote_depth: usize,

    /// Run the verifier on every closed function record.
    pub verify: bool,

    /// Run dead-store elimination and no-op compaction.
    pub optimize: bool,

    /// Source name recorded in function records and errors.
    pub source_name: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_recursion: 256,
            max_stack_bytes: 1024 * 1024,
            max_macro_expansions: 200,
            max_quasiquote_depth: 256,
            verify: true,
            optimize: true,
            source_name: None,
        }
    }
}

impl CompilerOptions {
    /// Options that keep bytecode exactly as emitted, for inspecting the
    /// code generators.
    #[must_use]
    pub fn unoptimized() -> Self {
        Self {
            optimize: false,
            ..Self::default()
        }
    }

    /// Options for untrusted input: tighter nesting and expansion limits.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_recursion: 64,
            max_stack_bytes: 256 * 1024,
            max_macro_expansions: 32,
            max_quasiquote_depth: 32,
            ..Self::default()
        }
    }

    /// Builder method to set the recursion limit.
    #[must_use]
    pub fn with_max_recursion(mut self, depth: usize) -> Self {
        self.max_recursion = depth;
        self
    }

    /// Builder method to set the host stack budget.
    #[must_use]
    pub fn with_max_stack_bytes(mut self, bytes: usize) -> Self {
        self.max_stack_bytes = bytes;
        self
    }

    /// Builder method to set the macro expansion limit.
    #[must_use]
    pub fn with_max_macro_expansions(mut self, count: usize) -> Self {
        self.max_macro_expansions = count;
        self
    }

    /// Builder method to set the quasiquote depth limit.
    #[must_use]
    pub fn with_max_quasiquote_depth(mut self, depth: usize) -> Self {
        self.max_quasiquote_depth = depth;
        self
    }

    /// Builder method to enable/disable verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Builder method to enable/disable the post-processor.
    #[must_use]
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Builder method to set the source name.
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}
