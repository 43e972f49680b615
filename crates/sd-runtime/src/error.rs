use sd_core::{QuantityKind, ValidationError};
use sd_expr::EvalError;
use thiserror::Error;

/// Failure to prepare or run a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Auxiliaries whose formulas depend on each other, sorted by name.
    #[error("circular dependency among auxiliaries: {}", .members.join(", "))]
    CircularDependency { members: Vec<String> },
    /// An auxiliary or flow formula reads a flow.
    #[error("{kind} `{quantity}` references flow `{name}`; flows may only be read by stocks")]
    InvalidReference {
        quantity: String,
        kind: QuantityKind,
        name: String,
    },
    #[error("unknown name `{name}` in formula of `{quantity}` ({formula}) at time {time}")]
    UnknownName {
        quantity: String,
        formula: String,
        name: String,
        time: f64,
    },
    #[error("evaluating `{quantity}` = {formula} failed at time {time}: {reason}")]
    FormulaEvaluation {
        quantity: String,
        formula: String,
        time: f64,
        reason: EvalError,
    },
    /// A parameter map that does not cover exactly the declared parameters.
    #[error(
        "parameter set does not match the model (missing: [{}], undeclared: [{}])",
        .missing.join(", "),
        .undeclared.join(", ")
    )]
    ParameterMismatch {
        missing: Vec<String>,
        undeclared: Vec<String>,
    },
    #[error("scenario `{scenario}` is invalid: {reason}")]
    InvalidScenario { scenario: String, reason: String },
}
