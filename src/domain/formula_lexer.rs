//! Formula tokenizer.
//!
//! Turns formula text into a flat token stream so the parser never has to
//! re-scan substrings or count parenthesis depth. `{...}` comments are
//! skipped. Identifiers may contain any alphabetic character, so formulas
//! written with Chinese variable names (`选股 := ...`) tokenize as-is.

use crate::domain::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// `AND`, case-insensitive.
    And,
    /// `OR`, case-insensitive.
    Or,
    Assign,
    Semicolon,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Ge,
    Le,
    Ne,
    Gt,
    Lt,
    Eq,
}

/// A token plus the byte offset where it starts, for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '{' {
            // Comment: skip to the closing brace.
            chars.next();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(ParseError {
                    message: "unterminated comment".into(),
                    position: pos,
                });
            }
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut end = pos;
            let mut has_dot = false;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_ascii_digit() || (c == '.' && !has_dot) {
                    has_dot |= c == '.';
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &input[pos..end];
            let value: f64 = text.parse().map_err(|_| ParseError {
                message: format!("invalid number: {text}"),
                position: pos,
            })?;
            tokens.push(Spanned {
                token: Token::Number(value),
                position: pos,
            });
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut end = pos;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &input[pos..end];
            let token = match word.to_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        let token = match ch {
            ':' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        Token::Assign
                    }
                    _ => {
                        return Err(ParseError {
                            message: "expected '=' after ':'".into(),
                            position: pos,
                        });
                    }
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        Token::Ne
                    }
                    _ => {
                        return Err(ParseError {
                            message: "expected '=' after '!'".into(),
                            position: pos,
                        });
                    }
                }
            }
            '=' => {
                chars.next();
                Token::Eq
            }
            ';' => {
                chars.next();
                Token::Semicolon
            }
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '+' => {
                chars.next();
                Token::Plus
            }
            '-' => {
                chars.next();
                Token::Minus
            }
            '*' => {
                chars.next();
                Token::Star
            }
            '/' => {
                chars.next();
                Token::Slash
            }
            other => {
                return Err(ParseError {
                    message: format!("unexpected character '{other}'"),
                    position: pos,
                });
            }
        };
        tokens.push(Spanned {
            token,
            position: pos,
        });
    }

    Ok(tokens)
}
