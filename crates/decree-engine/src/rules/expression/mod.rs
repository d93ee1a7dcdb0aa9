//! Arithmetic/boolean expressions used by score conditions and formulas.
//!
//! Expressions are parsed into an [`Expr`] tree and evaluated over a flat name→number
//! [`EvalContext`]. Booleans are numbers: comparisons yield `1` or `0`, and any non-zero value is
//! true.

mod parser;

use std::collections::{BTreeMap, BTreeSet};

pub use parser::{parse, MAX_EXPRESSION_BYTES, MAX_NESTING};

/// Parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("expression exceeds {max_bytes} bytes ({actual_bytes})")]
    TooLong {
        max_bytes: usize,
        actual_bytes: usize,
    },
    #[error("nesting exceeds depth {max_depth} at {position}")]
    NestingTooDeep { max_depth: usize, position: usize },
    #[error("unexpected character `{ch}` at {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("unexpected `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        position: usize,
    },
    #[error("unexpected end of expression at {position}")]
    UnexpectedEnd { position: usize },
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber { raw: String, position: usize },
    #[error("unknown variable `{name}` at {position}")]
    UnknownVariable { name: String, position: usize },
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable {
        name: String,
        position: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, context: &EvalContext) -> Result<f64, ExpressionError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Variable { name, position } => {
                context
                    .get(name)
                    .ok_or_else(|| ExpressionError::UnknownVariable {
                        name: name.clone(),
                        position: *position,
                    })
            }
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(context)?;
                Ok(match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Not => truth(!is_truthy(value)),
                })
            }
            Expr::Binary { op, left, right } => {
                let lhs = left.evaluate(context)?;
                match op {
                    BinaryOp::And if !is_truthy(lhs) => return Ok(0.0),
                    BinaryOp::Or if is_truthy(lhs) => return Ok(1.0),
                    _ => {}
                }
                let rhs = right.evaluate(context)?;
                Ok(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            return Err(ExpressionError::DivisionByZero);
                        }
                        lhs / rhs
                    }
                    BinaryOp::Lt => truth(lhs < rhs),
                    BinaryOp::Gt => truth(lhs > rhs),
                    BinaryOp::Le => truth(lhs <= rhs),
                    BinaryOp::Ge => truth(lhs >= rhs),
                    BinaryOp::Eq => truth(lhs == rhs),
                    BinaryOp::Ne => truth(lhs != rhs),
                    BinaryOp::And | BinaryOp::Or => truth(is_truthy(rhs)),
                })
            }
        }
    }

    pub fn evaluate_bool(&self, context: &EvalContext) -> Result<bool, ExpressionError> {
        self.evaluate(context).map(is_truthy)
    }

    /// First variable, in source order, missing from `bound`.
    pub fn first_unbound(&self, bound: &BTreeSet<String>) -> Option<ExpressionError> {
        match self {
            Expr::Number(_) => None,
            Expr::Variable { name, position } if !bound.contains(name) => {
                Some(ExpressionError::UnknownVariable {
                    name: name.clone(),
                    position: *position,
                })
            }
            Expr::Variable { .. } => None,
            Expr::Unary { operand, .. } => operand.first_unbound(bound),
            Expr::Binary { left, right, .. } => left
                .first_unbound(bound)
                .or_else(|| right.first_unbound(bound)),
        }
    }
}

fn is_truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

fn truth(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Named numeric bindings visible to an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    bindings: BTreeMap<String, f64>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.bindings.get(name).copied()
    }
}

/// Reduce a name to the identifier alphabet `[A-Za-z0-9_]`.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, f64)]) -> EvalContext {
        let mut context = EvalContext::new();
        for (name, value) in pairs {
            context.set(*name, *value);
        }
        context
    }

    fn eval(input: &str, pairs: &[(&str, f64)]) -> Result<f64, ExpressionError> {
        parse(input).expect("parses").evaluate(&context(pairs))
    }

    #[test]
    fn evaluates_arithmetic_over_context() {
        assert_eq!(eval("baseScore * 1000", &[("baseScore", 2.0)]), Ok(2000.0));
        assert_eq!(eval("(a + b) / 2 - -1", &[("a", 3.0), ("b", 5.0)]), Ok(5.0));
    }

    #[test]
    fn comparisons_and_logic_yield_truth_values() {
        let ctx = [("years", 12.0), ("rank", 2.0)];
        assert_eq!(eval("years >= 10 && rank == 2", &ctx), Ok(1.0));
        assert_eq!(eval("years < 10 || rank != 2", &ctx), Ok(0.0));
        assert_eq!(eval("!(years > 5)", &ctx), Ok(0.0));
    }

    #[test]
    fn logic_short_circuits_unknown_names() {
        assert_eq!(eval("0 && missing", &[]), Ok(0.0));
        assert_eq!(eval("1 || missing", &[]), Ok(1.0));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        match eval("salary * 2", &[]) {
            Err(ExpressionError::UnknownVariable { name, position }) => {
                assert_eq!(name, "salary");
                assert_eq!(position, 0);
            }
            other => panic!("expected unknown variable, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("a / (b - b)", &[("a", 1.0), ("b", 4.0)]),
            Err(ExpressionError::DivisionByZero)
        );
    }

    #[test]
    fn reports_first_unbound_name_in_source_order() {
        let expr = parse("var_12 * rate + bonus > 3").expect("parses");
        let bound: BTreeSet<String> = ["var_12".to_string()].into_iter().collect();
        assert_eq!(
            expr.first_unbound(&bound),
            Some(ExpressionError::UnknownVariable {
                name: "rate".into(),
                position: 9,
            })
        );

        let bound: BTreeSet<String> = ["var_12", "rate", "bonus"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(expr.first_unbound(&bound), None);
    }

    #[test]
    fn normalizes_identifiers() {
        assert_eq!(normalize_identifier("base score-2"), "basescore2");
        assert_eq!(normalize_identifier("پایه"), "");
    }
}
