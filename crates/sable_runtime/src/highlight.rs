//! Syntax highlighting for the REPL.

use std::borrow::Cow;

const RESET: &str = "\x1b[0m";

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || "-_/!?*+<>=%&.$^".contains(c)
}

fn word_color(word: &str) -> &'static str {
    match word {
        "def" | "var" | "fn" | "if" | "do" | "while" | "set" | "break" | "quote"
        | "quasiquote" | "unquote" | "splice" | "upscope" => "\x1b[32m",
        "defn" | "defmacro" | "let" | "when" | "unless" => "\x1b[1;32m",
        "true" | "false" | "nil" => "\x1b[34m",
        _ if word.ends_with('?') => "\x1b[33m",
        _ => "",
    }
}

/// Highlighter for Sable source.
#[derive(Default)]
pub struct SableHighlighter;

impl SableHighlighter {
    /// Creates a new highlighter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Highlight a line of input.
    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut chars = line.chars().peekable();
        let mut in_string = false;

        while let Some(c) = chars.next() {
            match c {
                '\\' if in_string => {
                    result.push(c);
                    if let Some(next) = chars.next() {
                        result.push(next);
                    }
                }
                '"' if in_string => {
                    result.push(c);
                    result.push_str(RESET);
                    in_string = false;
                }
                _ if in_string => result.push(c),
                '"' => {
                    result.push_str("\x1b[33m");
                    result.push(c);
                    in_string = true;
                }
                '#' => {
                    result.push_str("\x1b[2;3m");
                    result.push(c);
                    result.extend(chars.by_ref());
                    result.push_str(RESET);
                }
                ':' => {
                    result.push_str("\x1b[36m");
                    result.push(c);
                    while let Some(next) = chars.next_if(|&n| is_symbol_char(n)) {
                        result.push(next);
                    }
                    result.push_str(RESET);
                }
                c if c.is_ascii_digit() => {
                    result.push_str("\x1b[35m");
                    result.push(c);
                    while let Some(next) =
                        chars.next_if(|&n| n.is_ascii_alphanumeric() || n == '.' || n == '_')
                    {
                        result.push(next);
                    }
                    result.push_str(RESET);
                }
                '(' | ')' | '[' | ']' | '{' | '}' | '@' => {
                    result.push_str("\x1b[1m");
                    result.push(c);
                    result.push_str(RESET);
                }
                '\'' | '~' | ',' | ';' => {
                    result.push_str("\x1b[31m");
                    result.push(c);
                    result.push_str(RESET);
                }
                c if is_symbol_char(c) => {
                    let mut word = String::from(c);
                    while let Some(next) = chars.next_if(|&n| is_symbol_char(n)) {
                        word.push(next);
                    }
                    let color = word_color(&word);
                    if color.is_empty() {
                        result.push_str(&word);
                    } else {
                        result.push_str(color);
                        result.push_str(&word);
                        result.push_str(RESET);
                    }
                }
                _ => result.push(c),
            }
        }

        if in_string {
            result.push_str(RESET);
        }

        Cow::Owned(result)
    }
}
