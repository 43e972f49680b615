#![deny(warnings)]

//! Restricted formula language for stock-and-flow models.
//!
//! Formulas are small arithmetic expressions over quantity names, keyed
//! parameter lookups (`PRICE['value']`) and an allow-list of math functions.
//! They are parsed once into an [`Expr`] tree and evaluated against a [`Scope`]
//! on every simulation step. Nothing outside the allow-list is callable and there
//! is no attribute access, so a formula cannot reach anything but the scope.

pub mod ast;
mod error;
mod eval;
pub mod functions;
pub mod lexer;
mod parser;

pub use ast::{Expr, Reference};
pub use error::{EvalError, ParseError, ParseErrorKind};
pub use eval::{evaluate, Scope};
pub use functions::Function;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Name that formulas use for the current simulated time.
pub const TIME: &str = "time";

/// The key under which parameters expose their scalar, `NAME['value']`.
pub const VALUE_KEY: &str = "value";

/// A parsed formula together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse formula text.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Every quantity lookup in the formula, deduplicated and sorted.
    pub fn references(&self) -> BTreeSet<Reference> {
        let mut out = BTreeSet::new();
        self.expr.collect_references(&mut out);
        out
    }

    /// Names referenced in any lookup style.
    pub fn referenced_names(&self) -> BTreeSet<String> {
        self.references()
            .into_iter()
            .map(|r| match r {
                Reference::Name(name) | Reference::Keyed { name, .. } => name,
            })
            .collect()
    }

    /// Evaluate against `scope`; the result must be a finite number.
    pub fn evaluate(&self, scope: &dyn Scope) -> Result<f64, EvalError> {
        let value = evaluate(&self.expr, scope)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite)
        }
    }
}

impl FromStr for Formula {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether `name` can be used as a quantity name inside formulas.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    head_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !lexer::KEYWORDS.contains(&name)
}
