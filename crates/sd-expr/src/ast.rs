//! Syntax tree of a parsed formula.

use crate::functions::Function;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Direct lookup of a stock, auxiliary, flow or `time`.
    Name(String),
    /// Keyed lookup, `NAME['value']`, used for parameters.
    Keyed { name: String, key: String },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison `a < b <= c`, true when every adjacent pair holds.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    /// Short-circuiting `and` / `or` returning one of its operands.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `then if condition else otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

/// A quantity lookup appearing in a formula.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    Name(String),
    Keyed { name: String, key: String },
}

impl Reference {
    /// The quantity name regardless of lookup style.
    pub fn name(&self) -> &str {
        match self {
            Reference::Name(name) | Reference::Keyed { name, .. } => name,
        }
    }
}

impl Expr {
    /// Collect every quantity lookup in this expression into `out`.
    pub fn collect_references(&self, out: &mut BTreeSet<Reference>) {
        match self {
            Expr::Number(_) => {}
            Expr::Name(name) => {
                out.insert(Reference::Name(name.clone()));
            }
            Expr::Keyed { name, key } => {
                out.insert(Reference::Keyed {
                    name: name.clone(),
                    key: key.clone(),
                });
            }
            Expr::Unary { operand, .. } => operand.collect_references(out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_references(out);
                for (_, e) in rest {
                    e.collect_references(out);
                }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_references(out);
                then.collect_references(out);
                otherwise.collect_references(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}
