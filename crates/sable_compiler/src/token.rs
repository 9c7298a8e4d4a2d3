//! Token types for the Sable reader.
//!
//! Tokens are the output of the lexer and input to the parser.

use sable_foundation::Span;

/// A token from lexical analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The type and value of this token.
    pub kind: TokenKind,
    /// Source location of this token.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the text this token covers in the given source.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }

    /// Returns true if this token opens a delimited form.
    #[must_use]
    pub const fn is_open_delimiter(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::AtParen
                | TokenKind::AtBracket
                | TokenKind::AtBrace
        )
    }

    /// Returns true if this token is a closing delimiter.
    #[must_use]
    pub const fn is_close_delimiter(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

/// Token types for the Sable reader.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Delimiters
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `@(` array
    AtParen,
    /// `@[` array
    AtBracket,
    /// `@{` table
    AtBrace,

    // Literals
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Integer literal like `42`, `-17` or `0xff`
    Int(i64),
    /// Real literal like `3.5` or `1e-3`
    Real(f64),
    /// String literal like `"hello"`
    String(String),
    /// Buffer literal like `@"hello"`
    Buffer(String),
    /// Symbol like `foo` or `&opt`
    Symbol(String),
    /// Keyword like `:foo`, stored without the colon
    Keyword(String),

    // Reader prefixes
    /// `'` for quote
    Quote,
    /// `~` for quasiquote
    Quasiquote,
    /// `,` for unquote
    Unquote,
    /// `;` for splice
    Splice,

    // Meta
    /// Comment text (including `#`)
    Comment(String),
    /// End of input
    Eof,
    /// Lexer error
    Error(String),
}

impl TokenKind {
    /// Returns true if this token kind should be ignored during parsing.
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        matches!(self, Self::Comment(_))
    }

    /// Returns the special form a reader prefix expands to.
    #[must_use]
    pub const fn prefix_form(&self) -> Option<&'static str> {
        match self {
            Self::Quote => Some("quote"),
            Self::Quasiquote => Some("quasiquote"),
            Self::Unquote => Some("unquote"),
            Self::Splice => Some("splice"),
            _ => None,
        }
    }

    /// Returns a human-readable name for this token kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::AtParen => "'@('",
            Self::AtBracket => "'@['",
            Self::AtBrace => "'@{'",
            Self::Nil => "nil",
            Self::True => "true",
            Self::False => "false",
            Self::Int(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Buffer(_) => "buffer",
            Self::Symbol(_) => "symbol",
            Self::Keyword(_) => "keyword",
            Self::Quote => "quote",
            Self::Quasiquote => "quasiquote",
            Self::Unquote => "unquote",
            Self::Splice => "splice",
            Self::Comment(_) => "comment",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }
}
