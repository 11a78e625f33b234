//! Condition expression evaluation.

use std::borrow::Cow;

use crate::ast::{CompareOp, Expr, Literal};

/// Intermediate result of evaluating a sub-expression.
///
/// Logical operators produce booleans; literals produce text. Either form
/// converts to the other on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Result of a logical operator or comparison.
    Bool(bool),
    /// Text of a literal.
    Text(String),
}

impl Operand {
    /// Truthiness.
    ///
    /// Text is false when it is empty or whitespace, spells `false`, `no` or
    /// `off` in any case, or parses as a number equal to zero. Anything else
    /// is true.
    #[allow(clippy::float_cmp)]
    pub fn to_bool(&self) -> bool {
        match self {
            Operand::Bool(b) => *b,
            Operand::Text(s) => {
                let s = s.trim();
                if s.is_empty()
                    || s.eq_ignore_ascii_case("false")
                    || s.eq_ignore_ascii_case("no")
                    || s.eq_ignore_ascii_case("off")
                {
                    return false;
                }
                !matches!(s.parse::<f64>(), Ok(n) if n == 0.0)
            }
        }
    }

    /// Numeric interpretation. Non-numeric text and NaN read as `0.0`.
    pub fn to_float(&self) -> f64 {
        match self {
            Operand::Bool(b) => f64::from(u8::from(*b)),
            Operand::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if !n.is_nan() => n,
                _ => 0.0,
            },
        }
    }

    /// Text interpretation. Booleans read as `true` / `false`.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Operand::Bool(true) => Cow::Borrowed("true"),
            Operand::Bool(false) => Cow::Borrowed("false"),
            Operand::Text(s) => Cow::Borrowed(s),
        }
    }
}

/// Supplies the text of literals during evaluation.
pub trait Scope {
    /// Resolve a literal to its text.
    fn literal(&mut self, literal: &Literal) -> String;
}

/// Evaluate a condition to a boolean.
pub fn evaluate(expr: &Expr, scope: &mut impl Scope) -> bool {
    eval(expr, scope).to_bool()
}

fn eval(expr: &Expr, scope: &mut impl Scope) -> Operand {
    match expr {
        Expr::Literal(lit) => Operand::Text(scope.literal(lit)),
        Expr::Paren(inner) => eval(inner, scope),
        Expr::Not(inner) => Operand::Bool(!eval(inner, scope).to_bool()),
        Expr::And(l, r) => Operand::Bool(eval(l, scope).to_bool() && eval(r, scope).to_bool()),
        Expr::Or(l, r) => Operand::Bool(eval(l, scope).to_bool() || eval(r, scope).to_bool()),
        Expr::Compare(op, l, r) => {
            let l = eval(l, scope);
            let r = eval(r, scope);
            Operand::Bool(compare(*op, &l, &r))
        }
    }
}

fn compare(op: CompareOp, l: &Operand, r: &Operand) -> bool {
    match op {
        CompareOp::Equal => l.as_text() == r.as_text(),
        CompareOp::NotEqual => l.as_text() != r.as_text(),
        CompareOp::Less => l.to_float() < r.to_float(),
        CompareOp::LessEqual => l.to_float() <= r.to_float(),
        CompareOp::Greater => l.to_float() > r.to_float(),
        CompareOp::GreaterEqual => l.to_float() >= r.to_float(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::ast::Statement;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    /// Resolves references from a fixed map, falling back to the name.
    struct MapScope(HashMap<&'static str, &'static str>);

    impl Scope for MapScope {
        fn literal(&mut self, literal: &Literal) -> String {
            match literal {
                Literal::Reference(name) => {
                    self.0.get(name.as_str()).map_or_else(|| name.clone(), |v| (*v).to_string())
                }
                Literal::Str(s) => s.clone(),
            }
        }
    }

    fn eval_src(cond: &str, vars: &[(&'static str, &'static str)]) -> bool {
        let src = format!("if ({cond}) {{ X = \"1\" }}");
        let tokens = tokenize(&src, PathBuf::from("test")).unwrap();
        let stmts = Parser::new(tokens, PathBuf::from("test")).parse().unwrap();
        let Statement::Assignment { conditions, .. } = &stmts[0] else {
            panic!("expected assignment");
        };
        let mut scope = MapScope(vars.iter().copied().collect());
        evaluate(&conditions[0], &mut scope)
    }

    #[test]
    fn not_true_is_false() {
        assert!(!eval_src("not true", &[]));
        assert!(eval_src("not false", &[]));
        assert!(eval_src("!0", &[]));
    }

    #[test]
    fn string_equality() {
        assert!(eval_src("\"a\" == \"a\"", &[]));
        assert!(!eval_src("\"a\" != \"a\"", &[]));
    }

    #[test]
    fn numeric_and_textual_comparisons_differ() {
        assert!(!eval_src("\"2\" > \"10\"", &[]));
        assert!(eval_src("\"2\" < \"10\"", &[]));
        assert!(eval_src("\"2\" != \"10\"", &[]));
        // Equality is textual, not numeric.
        assert!(!eval_src("\"2.0\" == \"2\"", &[]));
        assert!(eval_src("\"2.0\" >= \"2\"", &[]));
    }

    #[test]
    fn references_resolve_through_scope() {
        let vars = [("Platform", "x64"), ("Target.Configuration", "Debug")];
        assert!(eval_src("Platform == \"x64\"", &vars));
        assert!(eval_src("Target.Configuration == Debug and not (Platform == x86)", &vars));
        assert!(!eval_src("Platform == \"x86\" or Target.Configuration != Debug", &vars));
    }

    #[test]
    fn and_or_are_left_to_right() {
        // (true or false) and false
        assert!(!eval_src("true or false and false", &[]));
        // (false and true) or true
        assert!(eval_src("false and true or true", &[]));
    }

    #[test]
    fn truthiness_rules() {
        for falsy in ["", "  ", "false", "FALSE", "no", "Off", "0", "0.0", "-0"] {
            assert!(!Operand::Text(falsy.into()).to_bool(), "{falsy:?} should be false");
        }
        for truthy in ["1", "yes", "x64", "0x", "true", "nan"] {
            assert!(Operand::Text(truthy.into()).to_bool(), "{truthy:?} should be true");
        }
    }

    #[test]
    fn non_numeric_text_compares_as_zero() {
        assert_eq!(Operand::Text("abc".into()).to_float(), 0.0);
        assert_eq!(Operand::Text("NaN".into()).to_float(), 0.0);
        assert_eq!(Operand::Text(" 2.5 ".into()).to_float(), 2.5);
        assert_eq!(Operand::Bool(true).to_float(), 1.0);
    }
}
