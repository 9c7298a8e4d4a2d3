//! Lexer for the Sable reader.
//!
//! The lexer converts source text into a stream of tokens.

use sable_foundation::Span;

use crate::token::{Token, TokenKind};

/// Lexer for Sable source code.
pub struct Lexer<'src> {
    /// Source text being tokenized.
    source: &'src str,
    /// Remaining source text.
    rest: &'src str,
    /// Current byte offset in source.
    position: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    column: u32,
}

impl<'src> Lexer<'src> {
    /// Creates a new lexer for the given source.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            rest: source,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let Some(c) = self.peek_char() else {
            return Token::new(
                TokenKind::Eof,
                Span::new(start, start, start_line, start_column),
            );
        };

        let kind = match c {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '\'' => self.single(TokenKind::Quote),
            '~' => self.single(TokenKind::Quasiquote),
            ',' => self.single(TokenKind::Unquote),
            ';' => self.single(TokenKind::Splice),
            '#' => self.scan_comment(),
            '@' => self.scan_at(),
            ':' => self.scan_keyword(),
            '"' => match self.scan_string() {
                Ok(text) => TokenKind::String(text),
                Err(kind) => kind,
            },
            c if c.is_ascii_digit() => self.scan_number(),
            '-' | '+' if self.peek_char_n(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.scan_number()
            }
            c if is_symbol_start(c) => self.scan_symbol(),
            c => {
                self.advance();
                TokenKind::Error(format!("unexpected character: {c}"))
            }
        };

        Token::new(
            kind,
            Span::new(start, self.position, start_line, start_column),
        )
    }

    /// Tokenizes all source and returns a vector of tokens.
    ///
    /// Comments are included in the output.
    #[must_use]
    pub fn tokenize_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn peek_char(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn peek_char_n(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            let len = c.len_utf8();
            self.rest = &self.rest[len..];
            self.position += len;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Scans a comment starting with `#`.
    fn scan_comment(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        TokenKind::Comment(text)
    }

    /// Scans the mutable-literal prefixes `@(`, `@[`, `@{` and `@"`.
    fn scan_at(&mut self) -> TokenKind {
        self.advance(); // consume '@'
        match self.peek_char() {
            Some('(') => self.single(TokenKind::AtParen),
            Some('[') => self.single(TokenKind::AtBracket),
            Some('{') => self.single(TokenKind::AtBrace),
            Some('"') => match self.scan_string() {
                Ok(text) => TokenKind::Buffer(text),
                Err(kind) => kind,
            },
            Some(c) => TokenKind::Error(format!("unexpected character after @: {c}")),
            None => TokenKind::Error("unexpected end of input after @".into()),
        }
    }

    /// Scans a keyword starting with `:`.
    fn scan_keyword(&mut self) -> TokenKind {
        self.advance(); // consume ':'
        let name = self.scan_symbol_text();
        if name.is_empty() {
            TokenKind::Error("expected keyword name after ':'".into())
        } else {
            TokenKind::Keyword(name)
        }
    }

    /// Scans the body of a string literal, opening quote included.
    fn scan_string(&mut self) -> Result<String, TokenKind> {
        self.advance(); // consume opening '"'
        let mut text = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    self.advance();
                    return Ok(text);
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek_char() {
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('0') => '\0',
                        Some('e') => '\u{1b}',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(c) => {
                            return Err(TokenKind::Error(format!(
                                "invalid escape sequence: \\{c}"
                            )));
                        }
                        None => {
                            return Err(TokenKind::Error(
                                "unexpected end of input in string escape".into(),
                            ));
                        }
                    };
                    self.advance();
                    text.push(escaped);
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
                None => return Err(TokenKind::Error("unterminated string literal".into())),
            }
        }
    }

    /// Scans a number: decimal or hex integers, reals with optional exponent.
    /// Underscores may separate digits.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;
        if matches!(self.peek_char(), Some('-' | '+')) {
            self.advance();
        }
        while let Some(c) = self.peek_char() {
            let exponent_sign = matches!(c, '-' | '+')
                && matches!(self.source[..self.position].chars().last(), Some('e' | 'E'))
                && !self.source[start..self.position].contains(['x', 'X']);
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                self.advance();
            } else {
                break;
            }
        }
        parse_number(&self.source[start..self.position])
    }

    fn scan_symbol(&mut self) -> TokenKind {
        let name = self.scan_symbol_text();
        match name.as_str() {
            "nil" => TokenKind::Nil,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Symbol(name),
        }
    }

    fn scan_symbol_text(&mut self) -> String {
        let start = self.position;
        while self.peek_char().is_some_and(is_symbol_char) {
            self.advance();
        }
        self.source[start..self.position].to_string()
    }
}

fn parse_number(text: &str) -> TokenKind {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, digits) = match cleaned.as_bytes().first() {
        Some(b'-') => (true, &cleaned[1..]),
        Some(b'+') => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        return match i64::from_str_radix(hex, 16) {
            Ok(n) if negative => TokenKind::Int(-n),
            Ok(n) => TokenKind::Int(n),
            Err(e) => TokenKind::Error(format!("invalid hex integer {text}: {e}")),
        };
    }
    if digits.contains(['.', 'e', 'E']) {
        match cleaned.parse::<f64>() {
            Ok(n) => TokenKind::Real(n),
            Err(e) => TokenKind::Error(format!("invalid real {text}: {e}")),
        }
    } else {
        match cleaned.parse::<i64>() {
            Ok(n) => TokenKind::Int(n),
            Err(e) => TokenKind::Error(format!("invalid integer {text}: {e}")),
        }
    }
}

/// Returns true if `c` can start a symbol.
fn is_symbol_start(c: char) -> bool {
    c.is_alphabetic()
        || matches!(
            c,
            '_' | '+' | '-' | '*' | '/' | '!' | '?' | '<' | '>' | '=' | '&' | '%' | '$' | '^' | '|'
                | '.'
        )
}

/// Returns true if `c` can appear in a symbol (not at start).
fn is_symbol_char(c: char) -> bool {
    is_symbol_start(c) || c.is_ascii_digit() || c == ':' || c == '@'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize_all(source)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
        assert_eq!(lex(" \n\t"), vec![TokenKind::Eof]);
    }

    #[test]
    fn lex_delimiters() {
        assert_eq!(
            lex("()[]{}@(@[@{"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::AtParen,
                TokenKind::AtBracket,
                TokenKind::AtBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_prefixes() {
        assert_eq!(
            lex("'a ~b ,c ;d"),
            vec![
                TokenKind::Quote,
                TokenKind::Symbol("a".into()),
                TokenKind::Quasiquote,
                TokenKind::Symbol("b".into()),
                TokenKind::Unquote,
                TokenKind::Symbol("c".into()),
                TokenKind::Splice,
                TokenKind::Symbol("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(lex("42"), vec![TokenKind::Int(42), TokenKind::Eof]);
        assert_eq!(lex("-17"), vec![TokenKind::Int(-17), TokenKind::Eof]);
        assert_eq!(lex("1_000"), vec![TokenKind::Int(1000), TokenKind::Eof]);
        assert_eq!(lex("0xff"), vec![TokenKind::Int(255), TokenKind::Eof]);
        assert_eq!(lex("-0x10"), vec![TokenKind::Int(-16), TokenKind::Eof]);
        assert_eq!(lex("2.5"), vec![TokenKind::Real(2.5), TokenKind::Eof]);
        assert_eq!(lex("1e3"), vec![TokenKind::Real(1000.0), TokenKind::Eof]);
        assert_eq!(lex("1.5e-1"), vec![TokenKind::Real(0.15), TokenKind::Eof]);
        assert!(matches!(lex("12abc")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_symbols_and_keywords() {
        assert_eq!(
            lex("&opt + - not= :doc"),
            vec![
                TokenKind::Symbol("&opt".into()),
                TokenKind::Symbol("+".into()),
                TokenKind::Symbol("-".into()),
                TokenKind::Symbol("not=".into()),
                TokenKind::Keyword("doc".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(lex("nil true false")[..3], [TokenKind::Nil, TokenKind::True, TokenKind::False]);
    }

    #[test]
    fn lex_strings_and_buffers() {
        assert_eq!(
            lex(r#""a\nb" @"buf""#),
            vec![
                TokenKind::String("a\nb".into()),
                TokenKind::Buffer("buf".into()),
                TokenKind::Eof,
            ]
        );
        assert!(matches!(lex("\"open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_comments() {
        assert_eq!(
            lex("1 # trailing\n2"),
            vec![
                TokenKind::Int(1),
                TokenKind::Comment("# trailing".into()),
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_spans() {
        let tokens = Lexer::tokenize_all("(a\n  b)");
        assert_eq!(tokens[2].span.line, 2);
        assert_eq!(tokens[2].span.column, 3);
    }
}
