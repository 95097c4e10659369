//! Formula parser.
//!
//! Recursive-descent over the token stream from
//! [`crate::domain::formula_lexer`]. Precedence, low to high: OR, AND,
//! comparison, additive, multiplicative, unary minus, primary. Additive and
//! multiplicative chains associate left, so `a-b-c` parses as `(a-b)-c`.
//!
//! Function names are resolved to [`Func`] here; an unknown call name is a
//! reference error at compile time rather than a mid-run failure.

use crate::domain::error::{FormulaError, ParseError};
use crate::domain::formula::{BinOp, Expr, Func, Stmt};
use crate::domain::formula_lexer::{tokenize, Spanned, Token};

/// Parse a full formula: statements separated by `;`, empty statements
/// skipped. An empty formula is a syntax error.
pub fn parse_program(input: &str) -> Result<Vec<Stmt>, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        input_len: input.len(),
    };

    let mut stmts = Vec::new();
    loop {
        while parser.consume(&Token::Semicolon) {}
        if parser.at_end() {
            break;
        }
        stmts.push(parser.parse_stmt()?);
        if !parser.at_end() && !parser.consume(&Token::Semicolon) {
            return Err(parser.unexpected("';' or end of formula").into());
        }
    }

    if stmts.is_empty() {
        return Err(ParseError {
            message: "empty formula".into(),
            position: 0,
        }
        .into());
    }
    Ok(stmts)
}

/// Parse a single expression, requiring all input to be consumed.
pub fn parse_expr(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        input_len: input.len(),
    };
    let expr = parser.parse_or()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression").into());
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    input_len: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.input_len)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_string(),
        };
        ParseError {
            message: format!("expected {expected}, found {found}"),
            position: self.position(),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.consume(&token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, FormulaError> {
        // NAME := expr, otherwise a bare expression.
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (
            self.peek(),
            self.tokens.get(self.pos + 1).map(|s| &s.token),
        ) {
            let name = name.clone();
            self.pos += 2;
            let expr = self.parse_or()?;
            return Ok(Stmt::Assign { name, expr });
        }
        Ok(Stmt::Expr(self.parse_or()?))
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        while self.consume(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_comparison()?;
        while self.consume(&Token::And) {
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if self.consume(&Token::Minus) {
            let inner = self.parse_unary()?;
            // Fold negative literals so `-5` is a plain number.
            if let Expr::Number(n) = inner {
                return Ok(Expr::Number(-n));
            }
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                if self.consume(&Token::LParen) {
                    let func = Func::from_name(&name.to_uppercase())
                        .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                    let args = self.parse_args()?;
                    Ok(Expr::Call { func, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            _ => Err(self.unexpected("a number, identifier, or '('").into()),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.consume(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.consume(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen, "',' or ')'")?;
            return Ok(args);
        }
    }
}
