//! Tokenizer for scene scripts.
//!
//! Produces Python-style logical lines: `Newline` ends a statement, `Indent`
//! and `Dedent` bracket blocks, and newlines inside brackets are ignored.

use super::{ScriptError, MAX_NESTING};

/// Reserved words with statement or operator meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Import,
    From,
    As,
    For,
    In,
    If,
    Elif,
    Else,
    Pass,
    And,
    Or,
    Not,
    True,
    False,
    None,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "import" => Self::Import,
            "from" => Self::From,
            "as" => Self::As,
            "for" => Self::For,
            "in" => Self::In,
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "pass" => Self::Pass,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "True" => Self::True,
            "False" => Self::False,
            "None" => Self::None,
            _ => return None,
        })
    }
}

/// Python keywords the script language does not support.
pub const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "def", "class", "while", "return", "lambda", "with", "try", "except", "finally", "raise",
    "del", "global", "nonlocal", "yield", "async", "await", "is", "break", "continue", "assert",
];

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Keyword(Keyword),
    Punct(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

// Longest first so that `**` wins over `*`.
const PUNCTUATION: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "(", ")", "[", "]", "{", "}", ",",
    ":", ".", ";", "=", "+", "-", "*", "/", "%", "<", ">",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    indents: Vec<usize>,
    depth: usize,
    tokens: Vec<Token>,
}

/// Split source text into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        indents: vec![0],
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.line, self.column, message)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn last_is_line_end(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
        )
    }

    fn run(&mut self) -> Result<(), ScriptError> {
        let mut at_line_start = true;
        while self.peek().is_some() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                self.handle_indentation()?;
            }
            let Some(c) = self.peek() else { break };
            let (line, column) = (self.line, self.column);
            match c {
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        if !self.last_is_line_end() {
                            self.push(TokenKind::Newline, line, column);
                        }
                        at_line_start = true;
                    }
                },
                ' ' | '\t' | '\r' => {
                    self.bump();
                },
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                },
                '\'' | '"' => {
                    let text = self.string()?;
                    self.push(TokenKind::Str(text), line, column);
                },
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    let kind = self.number()?;
                    self.push(kind, line, column);
                },
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.identifier();
                    if matches!(self.peek(), Some('\'' | '"')) {
                        return Err(ScriptError::syntax(
                            line,
                            column,
                            format!("string prefix '{word}' is not supported"),
                        ));
                    }
                    let kind = match Keyword::lookup(&word) {
                        Some(keyword) => TokenKind::Keyword(keyword),
                        None => TokenKind::Name(word),
                    };
                    self.push(kind, line, column);
                },
                _ => {
                    let punct = self.punctuation()?;
                    match punct {
                        "(" | "[" | "{" => {
                            self.depth += 1;
                            if self.depth > MAX_NESTING {
                                let message = "too many nested parentheses";
                                return Err(ScriptError::syntax(line, column, message));
                            }
                        },
                        ")" | "]" | "}" => {
                            let unmatched = || {
                                ScriptError::syntax(line, column, format!("unmatched '{punct}'"))
                            };
                            self.depth = self.depth.checked_sub(1).ok_or_else(unmatched)?;
                        },
                        _ => {},
                    }
                    self.push(TokenKind::Punct(punct), line, column);
                },
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of input: unclosed bracket"));
        }
        let (line, column) = (self.line, self.column);
        if !self.last_is_line_end() {
            self.push(TokenKind::Newline, line, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, line, column);
        }
        self.push(TokenKind::Eof, line, column);
        Ok(())
    }

    /// Measure leading whitespace and emit `Indent`/`Dedent` as needed.
    /// Blank and comment-only lines leave the indent stack alone.
    fn handle_indentation(&mut self) -> Result<(), ScriptError> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\r' | '\x0c' => {},
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            None | Some('\n') | Some('#') => return Ok(()),
            _ => {},
        }

        let (line, column) = (self.line, self.column);
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, line, column);
        } else {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.push(TokenKind::Dedent, line, column);
            }
            if width != self.indents.last().copied().unwrap_or(0) {
                return Err(ScriptError::syntax(
                    line,
                    column,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn identifier(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self) -> Result<TokenKind, ScriptError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {},
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                },
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                    continue;
                },
                _ => break,
            }
            self.bump();
        }
        let invalid =
            || ScriptError::syntax(line, column, format!("invalid number literal '{text}'"));
        if self.peek().is_some_and(|c| c.is_alphabetic()) {
            return Err(invalid());
        }
        if is_float {
            text.parse::<f64>().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn string(&mut self) -> Result<String, ScriptError> {
        let (line, column) = (self.line, self.column);
        let quote = self.bump().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(ScriptError::syntax(line, column, "unterminated string literal"));
            };
            match c {
                c if c == quote && !triple => return Ok(out),
                c if c == quote && self.peek() == Some(quote) && self.peek_at(1) == Some(quote) => {
                    self.bump();
                    self.bump();
                    return Ok(out);
                },
                '\n' if !triple => {
                    return Err(ScriptError::syntax(line, column, "unterminated string literal"));
                },
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        let message = "unterminated string literal";
                        return Err(ScriptError::syntax(line, column, message));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => {},
                        other => {
                            out.push('\\');
                            out.push(other);
                        },
                    }
                },
                c => out.push(c),
            }
        }
    }

    fn punctuation(&mut self) -> Result<&'static str, ScriptError> {
        for candidate in PUNCTUATION {
            let matches = candidate
                .chars()
                .enumerate()
                .all(|(i, expected)| self.peek_at(i) == Some(expected));
            if matches {
                for _ in 0..candidate.len() {
                    self.bump();
                }
                return Ok(candidate);
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.error(format!("unexpected character '{c}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_statement() {
        assert_eq!(
            kinds("x = 1.5\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Punct("="),
                TokenKind::Float(1.5),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_produces_blocks() {
        let tokens = kinds("for i in range(3):\n    pass\n\n# done\nx = 1");
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!((indents, dedents), (1, 1));
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("f(1,\n  2)\n");
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a\'b' "c\n""#)[..2],
            [TokenKind::Str("a'b".into()), TokenKind::Str("c\n".into())]
        );
        assert_eq!(kinds("'''x\ny'''")[0], TokenKind::Str("x\ny".into()));
    }

    #[test]
    fn errors_carry_positions() {
        let err = tokenize("x = (1,\n").unwrap_err();
        assert!(err.to_string().contains("unclosed bracket"));
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.to_string(), "line 1, column 5: unterminated string literal");
        let err = tokenize("if x:\n    a\n  b\n").unwrap_err();
        assert!(err.to_string().contains("unindent"));
        assert!(tokenize("x = f'hi'").is_err());
        assert!(tokenize("x = 1 $ 2").is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1_000 .5 2e3")[..3],
            [TokenKind::Int(1000), TokenKind::Float(0.5), TokenKind::Float(2000.0)]
        );
        assert!(tokenize("12abc").is_err());
    }
}
