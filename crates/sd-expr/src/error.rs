use std::ops::Range;
use thiserror::Error;

/// Category of parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Characters that do not form any token.
    InvalidToken,
    /// A token appeared where the grammar does not allow it.
    UnexpectedToken,
    /// The formula ended before the expression was complete.
    UnexpectedEof,
    /// A call to a function outside the allow-list.
    UnknownFunction,
    /// Well-formed tokens arranged in an unsupported construct (wrong arity,
    /// attribute access, subscripts on non-names).
    InvalidSyntax,
}

/// Formula parse error with the byte span it refers to.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (at byte {})", .span.start)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Range<usize>,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }
}

/// Failure while evaluating a parsed formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The scope has no quantity with this name.
    #[error("unknown name `{0}`")]
    UnknownName(String),
    /// Keyed lookup the scope cannot answer, e.g. `STOCK['value']` or `PARAM['unit']`.
    #[error("invalid lookup `{name}['{key}']`")]
    UnknownKey { name: String, key: String },
    #[error("division by zero")]
    DivisionByZero,
    /// Argument outside the domain of a math function, or a result that is not a real number.
    #[error("math domain error in `{function}` for argument {argument}")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    #[error("`{function}` cannot take {given} argument(s)")]
    ArgumentCount {
        function: &'static str,
        given: usize,
    },
    #[error("formula produced a non-finite result")]
    NonFinite,
}
