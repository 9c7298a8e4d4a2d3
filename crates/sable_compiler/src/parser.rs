//! Reader for Sable source.
//!
//! The parser turns a token stream into [`Value`] forms. Code is data, so
//! there is no separate syntax tree: calls are tuples, `[...]` is a bracket
//! tuple, and every tuple remembers the span it was read from.

use sable_foundation::{Error, ErrorKind, Result, Span, Tuple, Value};

use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Parser for Sable source code.
pub struct Parser<'src> {
    /// The lexer providing tokens.
    lexer: Lexer<'src>,
    /// Current token (lookahead).
    current: Token,
    /// Source text (for error messages).
    source: &'src str,
}

impl<'src> Parser<'src> {
    /// Creates a new parser for the given source.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            source,
        }
    }

    /// Parses a single form from the source.
    ///
    /// # Errors
    /// Returns an error if the source cannot be parsed.
    pub fn parse(&mut self) -> Result<Value> {
        self.skip_trivia();
        self.parse_form()
    }

    /// Parses the next form, or returns `None` at end of input.
    ///
    /// # Errors
    /// Returns an error if the source cannot be parsed.
    pub fn next_form(&mut self) -> Result<Option<Value>> {
        self.skip_trivia();
        if self.current.kind == TokenKind::Eof {
            return Ok(None);
        }
        self.parse_form().map(Some)
    }

    /// Parses all forms from the source.
    ///
    /// # Errors
    /// Returns an error if the source cannot be parsed.
    pub fn parse_all(&mut self) -> Result<Vec<Value>> {
        let mut forms = Vec::new();
        while let Some(form) = self.next_form()? {
            forms.push(form);
        }
        Ok(forms)
    }

    fn parse_form(&mut self) -> Result<Value> {
        self.skip_trivia();

        let value = match &self.current.kind {
            TokenKind::Nil => Value::Nil,
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            TokenKind::Int(n) => Value::Int(*n),
            TokenKind::Real(n) => Value::Real(*n),
            TokenKind::String(s) => Value::from(s.as_str()),
            TokenKind::Buffer(s) => Value::buffer(s.as_str()),
            TokenKind::Symbol(name) => Value::symbol(name),
            TokenKind::Keyword(name) => Value::keyword(name),
            TokenKind::LParen => return self.parse_tuple(TokenKind::RParen, false),
            TokenKind::LBracket => return self.parse_tuple(TokenKind::RBracket, true),
            TokenKind::LBrace => return self.parse_struct(),
            TokenKind::AtParen => return self.parse_array(TokenKind::RParen),
            TokenKind::AtBracket => return self.parse_array(TokenKind::RBracket),
            TokenKind::AtBrace => return self.parse_table(),
            kind @ (TokenKind::Quote
            | TokenKind::Quasiquote
            | TokenKind::Unquote
            | TokenKind::Splice) => {
                let name = kind.prefix_form().unwrap_or("quote");
                return self.parse_prefixed(name);
            }
            TokenKind::Eof => return Err(self.error("unexpected end of input")),
            TokenKind::Error(msg) => return Err(self.error(msg)),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                return Err(self.error(&format!("unexpected {}", self.current.kind.name())));
            }
            TokenKind::Comment(_) => {
                self.advance();
                return self.parse_form();
            }
        };
        self.advance();
        Ok(value)
    }

    /// Parses the elements up to a closing delimiter, returning them and the
    /// span of the whole form.
    fn parse_sequence(&mut self, close: &TokenKind, what: &str) -> Result<(Vec<Value>, Span)> {
        let start_span = self.current.span;
        self.advance(); // consume opener

        let mut elements = Vec::new();
        self.skip_trivia();

        while &self.current.kind != close {
            if self.current.kind == TokenKind::Eof {
                return Err(self.error_at(start_span, &format!("unterminated {what}")));
            }
            if self.current.is_close_delimiter() {
                return Err(self.error(&format!(
                    "expected {}, found {}",
                    close.name(),
                    self.current.kind.name()
                )));
            }
            elements.push(self.parse_form()?);
            self.skip_trivia();
        }

        let end_span = self.current.span;
        self.advance(); // consume closer
        Ok((elements, start_span.to(end_span)))
    }

    fn parse_tuple(&mut self, close: TokenKind, bracket: bool) -> Result<Value> {
        let (items, span) = self.parse_sequence(&close, "tuple")?;
        let tuple = if bracket {
            Tuple::bracket(items)
        } else {
            Tuple::new(items)
        };
        Ok(Value::Tuple(tuple.with_span(span)))
    }

    fn parse_array(&mut self, close: TokenKind) -> Result<Value> {
        let (items, _) = self.parse_sequence(&close, "array")?;
        Ok(Value::array(items))
    }

    fn parse_struct(&mut self) -> Result<Value> {
        let pairs = self.parse_pairs("struct")?;
        Ok(Value::Struct(pairs.into_iter().collect()))
    }

    fn parse_table(&mut self) -> Result<Value> {
        let pairs = self.parse_pairs("table")?;
        Ok(Value::table_from(pairs))
    }

    fn parse_pairs(&mut self, what: &str) -> Result<Vec<(Value, Value)>> {
        let start_span = self.current.span;
        let (items, _) = self.parse_sequence(&TokenKind::RBrace, what)?;
        if items.len() % 2 != 0 {
            return Err(self.error_at(
                start_span,
                &format!("{what} must have an even number of elements"),
            ));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    /// Parses a reader prefix: `'x` becomes `(quote x)`, and so on.
    fn parse_prefixed(&mut self, form: &str) -> Result<Value> {
        let start_span = self.current.span;
        self.advance(); // consume prefix

        self.skip_trivia();
        if self.current.kind == TokenKind::Eof {
            return Err(self.error_at(start_span, &format!("expected form after {form}")));
        }

        let inner = self.parse_form()?;
        let span = Span {
            end: self.last_end(),
            ..start_span
        };

        Ok(Value::Tuple(
            Tuple::new([Value::symbol(form), inner]).with_span(span),
        ))
    }

    /// Byte offset just past the most recently consumed token.
    fn last_end(&self) -> usize {
        let consumed = &self.source[..self.current.span.start];
        consumed.trim_end().len()
    }

    fn skip_trivia(&mut self) {
        while self.current.kind.is_trivia() {
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn error(&self, message: &str) -> Error {
        self.error_at(self.current.span, message)
    }

    fn error_at(&self, span: Span, message: &str) -> Error {
        Error::new(ErrorKind::Parse {
            message: message.to_string(),
            line: span.line,
            column: span.column,
            context: self.context_at(span),
        })
    }

    /// Gets the source line containing a span, for error messages.
    fn context_at(&self, span: Span) -> String {
        let line_start = self.source[..span.start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = self.source[span.start..]
            .find('\n')
            .map_or(self.source.len(), |i| span.start + i);

        self.source[line_start..line_end].to_string()
    }
}

/// Parses source code into forms.
///
/// # Errors
/// Returns an error if the source cannot be parsed.
pub fn parse(source: &str) -> Result<Vec<Value>> {
    Parser::new(source).parse_all()
}

/// Parses a single form from source.
///
/// # Errors
/// Returns an error if the source cannot be parsed.
pub fn parse_one(source: &str) -> Result<Value> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one_test(source: &str) -> Value {
        parse_one(source).expect("parse failed")
    }

    #[test]
    fn parse_atoms() {
        assert_eq!(parse_one_test("nil"), Value::Nil);
        assert_eq!(parse_one_test("true"), Value::Bool(true));
        assert_eq!(parse_one_test("-17"), Value::Int(-17));
        assert_eq!(parse_one_test("2.5"), Value::Real(2.5));
        assert_eq!(parse_one_test("\"hi\""), Value::from("hi"));
        assert_eq!(parse_one_test("foo"), Value::symbol("foo"));
        assert_eq!(parse_one_test(":foo"), Value::keyword("foo"));
    }

    #[test]
    fn parse_call_tuple_has_span() {
        let form = parse_one_test("  (+ 1 2)");
        let tuple = form.as_tuple().unwrap();
        assert!(!tuple.bracket);
        assert_eq!(tuple.len(), 3);
        let span = tuple.span.unwrap();
        assert_eq!((span.start, span.end, span.column), (2, 9, 3));
    }

    #[test]
    fn parse_bracket_tuple() {
        let form = parse_one_test("[1 2]");
        assert_eq!(form, Value::bracket_tuple([Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn parse_struct_and_table() {
        let form = parse_one_test("{:a 1 :b 2}");
        assert!(matches!(&form, Value::Struct(m) if m.len() == 2));
        let form = parse_one_test("@{:a 1}");
        assert!(matches!(&form, Value::Table(t) if t.borrow().len() == 1));
        assert!(parse_one("{:a}").is_err());
    }

    #[test]
    fn parse_arrays_and_buffers() {
        let form = parse_one_test("@[1 2 3]");
        assert_eq!(form.indexed_items().map(|v| v.len()), Some(3));
        let form = parse_one_test("@(1)");
        assert!(matches!(form, Value::Array(_)));
        assert_eq!(parse_one_test("@\"x\"").to_text(), "x");
    }

    #[test]
    fn parse_prefixes() {
        assert_eq!(
            parse_one_test("'x"),
            Value::tuple([Value::symbol("quote"), Value::symbol("x")])
        );
        assert_eq!(
            parse_one_test("~(a ,b ;c)"),
            Value::tuple([
                Value::symbol("quasiquote"),
                Value::tuple([
                    Value::symbol("a"),
                    Value::tuple([Value::symbol("unquote"), Value::symbol("b")]),
                    Value::tuple([Value::symbol("splice"), Value::symbol("c")]),
                ]),
            ])
        );
    }

    #[test]
    fn parse_all_skips_comments() {
        let forms = parse("1 # one\n2 # two").unwrap();
        assert_eq!(forms, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn parse_errors_have_positions() {
        let err = parse_one("(1 2").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Parse { line: 1, column: 1, .. }));
        let err = parse_one("(1 ]").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Parse { .. }));
        assert!(parse_one(")").is_err());
        assert!(parse_one("").is_err());
    }
}
