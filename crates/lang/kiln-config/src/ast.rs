//! AST types for the config language.
//!
//! The parser flattens `if`/`else` blocks away: every assignment carries the
//! conjunction of conditions that were open when it was declared.

use std::fmt;

use crate::lexer::Span;

/// A condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A reference or quoted string.
    Literal(Literal),
    /// Logical negation.
    Not(Box<Expr>),
    /// Both sides truthy.
    And(Box<Expr>, Box<Expr>),
    /// Either side truthy.
    Or(Box<Expr>, Box<Expr>),
    /// Binary comparison of two operands.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// Parenthesized sub-expression. Kept so diagnostics can print the
    /// condition the way it was written.
    Paren(Box<Expr>),
}

/// A leaf of a condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Bare identifier, resolved as `group.key` or `key`. Falls back to its
    /// own text when no such key exists.
    Reference(String),
    /// Quoted string. `$(...)` references inside it are substituted.
    Str(String),
}

/// Comparison operator. Ordering operators compare numbers; `==` and `!=`
/// compare text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
}

/// One statement, with conditional blocks already flattened.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `[name]`: subsequent assignments belong to this group.
    Group {
        /// Group name, brackets stripped.
        name: String,
        /// Location of the marker.
        span: Span,
    },
    /// `key = value` under the conditions open at this point.
    Assignment {
        /// Enclosing group; empty for the global group.
        group: String,
        /// Key name.
        key: String,
        /// Unresolved text, `$(...)` references intact.
        value: String,
        /// Every condition must hold for the value to be active.
        conditions: Vec<Expr>,
        /// Location of the key.
        span: Span,
    },
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Literal::Reference(name)) => f.write_str(name),
            Expr::Literal(Literal::Str(s)) => write!(f, "\"{s}\""),
            Expr::Not(inner) => write!(f, "not {inner}"),
            Expr::And(l, r) => write!(f, "{l} and {r}"),
            Expr::Or(l, r) => write!(f, "{l} or {r}"),
            Expr::Compare(op, l, r) => write!(f, "{l} {op} {r}"),
            Expr::Paren(inner) => write!(f, "({inner})"),
        }
    }
}
