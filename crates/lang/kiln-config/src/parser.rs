//! Recursive descent parser for config files.
//!
//! Produces a flat list of [`Statement`]s from a token stream. Conditional
//! blocks are tracked on a stack owned by the parser; each assignment is
//! tagged with a copy of the stack as it stood when the assignment was read.

use std::path::PathBuf;

use crate::ast::{CompareOp, Expr, Literal, Statement};
use crate::error::ConfigError;
use crate::lexer::{Span, Token, TokenKind};
use crate::subst;

/// Parser state: a cursor over the token stream plus the open conditions.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    /// Conditions of the enclosing `if`/`else` blocks, outermost first.
    conditions: Vec<Expr>,
    group: String,
}

impl Parser {
    /// Create a new parser from a token stream.
    pub fn new(tokens: Vec<Token>, file: PathBuf) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
            conditions: Vec::new(),
            group: String::new(),
        }
    }

    /// Parse the entire token stream.
    pub fn parse(&mut self) -> Result<Vec<Statement>, ConfigError> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            self.parse_statement(&mut statements)?;
        }
        Ok(statements)
    }

    fn parse_statement(&mut self, out: &mut Vec<Statement>) -> Result<(), ConfigError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.unexpected_end());
        };
        match tok.kind {
            TokenKind::Group(name) => {
                if !self.conditions.is_empty() {
                    return Err(ConfigError::NestedGroup { span: tok.span });
                }
                self.advance();
                self.group.clone_from(&name);
                out.push(Statement::Group { name, span: tok.span });
                Ok(())
            }
            TokenKind::Ident(key) => {
                self.advance();
                self.parse_assignment(key, tok.span, out)
            }
            TokenKind::If => self.parse_if(out),
            other => Err(ConfigError::UnexpectedToken {
                span: tok.span,
                found: other.to_string(),
            }),
        }
    }

    /// Parse `= value` after a key.
    fn parse_assignment(
        &mut self,
        key: String,
        span: Span,
        out: &mut Vec<Statement>,
    ) -> Result<(), ConfigError> {
        self.expect(&TokenKind::Assign)?;
        let tok = self.next_token()?;
        let value = match tok.kind {
            TokenKind::Value(v) | TokenKind::String(v) => v,
            other => {
                return Err(ConfigError::UnexpectedToken {
                    span: tok.span,
                    found: other.to_string(),
                });
            }
        };
        if subst::is_unterminated(&value) {
            return Err(ConfigError::UnterminatedSubstitution { span: tok.span, value });
        }

        out.push(Statement::Assignment {
            group: self.group.clone(),
            key,
            value,
            conditions: self.conditions.clone(),
            span,
        });
        Ok(())
    }

    /// Parse `if (expr) { ... }` with an optional `else` chain.
    fn parse_if(&mut self, out: &mut Vec<Statement>) -> Result<(), ConfigError> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;

        self.conditions.push(condition.clone());
        self.parse_block(out)?;
        self.conditions.pop();

        if self.peek_kind() != Some(&TokenKind::Else) {
            return Ok(());
        }
        self.advance();

        self.conditions.push(Expr::Not(Box::new(condition)));
        let result = if self.peek_kind() == Some(&TokenKind::If) {
            self.parse_if(out)
        } else {
            self.parse_block(out)
        };
        self.conditions.pop();
        result
    }

    /// Parse `{ statement* }`.
    fn parse_block(&mut self, out: &mut Vec<Statement>) -> Result<(), ConfigError> {
        self.expect(&TokenKind::LBrace)?;
        loop {
            match self.peek_kind() {
                None => return Err(self.unexpected_end()),
                Some(TokenKind::RBrace) => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => self.parse_statement(out)?,
            }
        }
    }

    /// `and` / `or`: same tier, left-associative.
    fn parse_expr(&mut self) -> Result<Expr, ConfigError> {
        let mut left = self.parse_comparison()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::And) => {
                    self.advance();
                    let right = self.parse_comparison()?;
                    left = Expr::And(Box::new(left), Box::new(right));
                }
                Some(TokenKind::Or) => {
                    self.advance();
                    let right = self.parse_comparison()?;
                    left = Expr::Or(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConfigError> {
        let left = self.parse_unary()?;
        let Some(op) = self.peek_compare_op() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_unary()?;

        if self.peek_compare_op().is_some() {
            let span = self.peek().map_or_else(|| self.end_span(), |t| t.span.clone());
            return Err(ConfigError::ChainedComparison { span });
        }
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expr, ConfigError> {
        if self.peek_kind() == Some(&TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_factor()
    }

    fn parse_factor(&mut self) -> Result<Expr, ConfigError> {
        let tok = self.next_token()?;
        match tok.kind {
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::Ident(name) => Ok(Expr::Literal(Literal::Reference(name))),
            TokenKind::String(s) => {
                if subst::is_unterminated(&s) {
                    return Err(ConfigError::UnterminatedSubstitution { span: tok.span, value: s });
                }
                Ok(Expr::Literal(Literal::Str(s)))
            }
            other => Err(ConfigError::UnexpectedToken {
                span: tok.span,
                found: other.to_string(),
            }),
        }
    }

    // --- Helpers ---

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_compare_op(&self) -> Option<CompareOp> {
        match self.peek_kind()? {
            TokenKind::Less => Some(CompareOp::Less),
            TokenKind::LessEqual => Some(CompareOp::LessEqual),
            TokenKind::Greater => Some(CompareOp::Greater),
            TokenKind::GreaterEqual => Some(CompareOp::GreaterEqual),
            TokenKind::Equal => Some(CompareOp::Equal),
            TokenKind::NotEqual => Some(CompareOp::NotEqual),
            _ => None,
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token, ConfigError> {
        let tok = self.peek().cloned().ok_or_else(|| self.unexpected_end())?;
        self.advance();
        Ok(tok)
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<(), ConfigError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(expected) {
            Ok(())
        } else {
            Err(ConfigError::UnexpectedToken {
                span: tok.span,
                found: tok.kind.to_string(),
            })
        }
    }

    /// Location just past the last token.
    fn end_span(&self) -> Span {
        self.tokens.last().map_or_else(
            || Span { file: self.file.clone(), line: 1, col: 1 },
            |t| t.span.clone(),
        )
    }

    fn unexpected_end(&self) -> ConfigError {
        ConfigError::UnexpectedEnd { span: self.end_span() }
    }
}
