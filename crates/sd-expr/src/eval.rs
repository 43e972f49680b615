//! Tree-walking evaluation against a [`Scope`].

use crate::ast::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::error::EvalError;
use crate::functions::power;
use std::collections::{BTreeMap, HashMap};

/// Read-only view of the quantities a formula can see.
pub trait Scope {
    /// Value of a directly referenced name.
    fn value(&self, name: &str) -> Option<f64>;

    /// Value of a keyed lookup, `name['key']`.
    fn keyed_value(&self, name: &str, key: &str) -> Option<f64>;
}

impl Scope for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }

    fn keyed_value(&self, _name: &str, _key: &str) -> Option<f64> {
        None
    }
}

impl Scope for BTreeMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }

    fn keyed_value(&self, _name: &str, _key: &str) -> Option<f64> {
        None
    }
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Evaluate `expr`. Intermediate non-finite values are allowed; the caller
/// decides whether the final result must be finite.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Name(name) => scope
            .value(name)
            .ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Keyed { name, key } => {
            scope
                .keyed_value(name, key)
                .ok_or_else(|| EvalError::UnknownKey {
                    name: name.clone(),
                    key: key.clone(),
                })
        }
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, scope)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Pos => v,
                UnaryOp::Not => flag(!truthy(v)),
            })
        }
        Expr::Binary { op, left, right } => {
            let a = evaluate(left, scope)?;
            let b = evaluate(right, scope)?;
            binary(*op, a, b)
        }
        Expr::Compare { first, rest } => {
            let mut lhs = evaluate(first, scope)?;
            for (op, e) in rest {
                let rhs = evaluate(e, scope)?;
                if !compare(*op, lhs, rhs) {
                    return Ok(0.0);
                }
                lhs = rhs;
            }
            Ok(1.0)
        }
        Expr::Logical { op, left, right } => {
            let a = evaluate(left, scope)?;
            match (op, truthy(a)) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(a),
                _ => evaluate(right, scope),
            }
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if truthy(evaluate(condition, scope)?) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            function.apply(&values)
        }
    }
}

fn binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(a / b)
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok((a / b).floor())
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            // result takes the sign of the divisor
            let r = a % b;
            Ok(if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            })
        }
        BinaryOp::Pow => power(a, b, "**"),
    }
}

fn compare(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
    }
}
