//! Structural validation of a [`ModelDescription`].
//!
//! Checks run in a fixed order and the first failing group is reported:
//! time settings, names, numeric values, connections, formula syntax,
//! formula references, then the model-wide usage rules.

use crate::model::{ModelDescription, QuantityKind, MAX_STEPS};
use sd_expr::{is_identifier, Formula, ParseError, Reference, TIME, VALUE_KEY};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Rejection of a model description before any simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The description text is not a well-formed model document.
    #[error("malformed model description: {0}")]
    Malformed(String),
    #[error("invalid simulation settings: {0}")]
    InvalidSettings(String),
    #[error("`{0}` is not a valid quantity name")]
    InvalidName(String),
    #[error("`{0}` is reserved for the simulation clock")]
    ReservedName(String),
    #[error("name `{0}` is defined more than once")]
    DuplicateName(String),
    #[error("stock `{stock}` has initial value {value}; it must be finite and >= 0")]
    InvalidInitialValue { stock: String, value: f64 },
    #[error("parameter `{0}` has a non-finite value")]
    NonFiniteParameter(String),
    #[error("flow connection names unknown flow `{0}`")]
    UnknownConnectionFlow(String),
    #[error("flow connection names unknown stock `{0}`")]
    UnknownConnectionStock(String),
    #[error("formula of `{quantity}` does not parse: {error}")]
    FormulaSyntax { quantity: String, error: ParseError },
    /// A formula names something that is neither a quantity, a parameter nor `time`.
    #[error("formula of `{quantity}` references unknown name `{name}`")]
    UnknownName { quantity: String, name: String },
    #[error("formula of `{quantity}` uses `{name}['{key}']`; keyed lookup is only valid as PARAMETER['value']")]
    InvalidKeyedAccess {
        quantity: String,
        name: String,
        key: String,
    },
    #[error("formula of `{quantity}` reads parameter `{name}` by bare name; use {name}['value']")]
    BareParameterRead { quantity: String, name: String },
    #[error("stocks without any connected flow: {}", .0.join(", "))]
    StockWithoutFlow(Vec<String>),
    #[error("auxiliaries not used by any other auxiliary or flow: {}", .0.join(", "))]
    UnusedAuxiliary(Vec<String>),
    #[error("parameters not used by any auxiliary or flow: {}", .0.join(", "))]
    UnusedParameter(Vec<String>),
}

/// A description that passed [`validate_model`], with every formula compiled.
///
/// Cheap to clone; the description and formulas are shared.
#[derive(Debug, Clone)]
pub struct ValidatedModel {
    inner: Arc<Compiled>,
}

#[derive(Debug)]
struct Compiled {
    description: ModelDescription,
    auxiliaries: Vec<Formula>,
    flows: Vec<Formula>,
    kinds: BTreeMap<String, QuantityKind>,
}

impl ValidatedModel {
    pub fn description(&self) -> &ModelDescription {
        &self.inner.description
    }

    /// Compiled auxiliary formulas, aligned with `description().auxiliaries`.
    pub fn auxiliary_formulas(&self) -> &[Formula] {
        &self.inner.auxiliaries
    }

    /// Compiled flow formulas, aligned with `description().flows`.
    pub fn flow_formulas(&self) -> &[Formula] {
        &self.inner.flows
    }

    pub fn kind_of(&self, name: &str) -> Option<QuantityKind> {
        self.inner.kinds.get(name).copied()
    }
}

fn validate_settings(m: &ModelDescription) -> Result<(), ValidationError> {
    let s = &m.simulation_settings;
    if !s.dt.value.is_finite() || s.dt.value <= 0.0 {
        return Err(ValidationError::InvalidSettings(format!(
            "dt must be finite and > 0, got {}",
            s.dt.value
        )));
    }
    if !s.end_time.value.is_finite() || s.end_time.value < 0.0 {
        return Err(ValidationError::InvalidSettings(format!(
            "end_time must be finite and >= 0, got {}",
            s.end_time.value
        )));
    }
    // 0.5 bounds every configurable step tolerance
    if s.step_count(0.5).is_none() {
        return Err(ValidationError::InvalidSettings(format!(
            "end_time {} with dt {} needs more than {MAX_STEPS} steps",
            s.end_time.value, s.dt.value
        )));
    }
    Ok(())
}

fn collect_names(m: &ModelDescription) -> Result<BTreeMap<String, QuantityKind>, ValidationError> {
    let declared = m
        .stocks
        .iter()
        .map(|s| (&s.name, QuantityKind::Stock))
        .chain(m.auxiliaries.iter().map(|a| (&a.name, QuantityKind::Auxiliary)))
        .chain(m.flows.iter().map(|f| (&f.name, QuantityKind::Flow)))
        .chain(m.parameters.keys().map(|k| (k, QuantityKind::Parameter)));

    let mut kinds = BTreeMap::new();
    for (name, kind) in declared {
        if name == TIME {
            return Err(ValidationError::ReservedName(name.clone()));
        }
        if !is_identifier(name) {
            return Err(ValidationError::InvalidName(name.clone()));
        }
        if kinds.insert(name.clone(), kind).is_some() {
            return Err(ValidationError::DuplicateName(name.clone()));
        }
    }
    Ok(kinds)
}

fn validate_values(m: &ModelDescription) -> Result<(), ValidationError> {
    for s in &m.stocks {
        if !s.initial_value.is_finite() || s.initial_value < 0.0 {
            return Err(ValidationError::InvalidInitialValue {
                stock: s.name.clone(),
                value: s.initial_value,
            });
        }
    }
    for (name, p) in &m.parameters {
        if !p.value.is_finite() {
            return Err(ValidationError::NonFiniteParameter(name.clone()));
        }
    }
    Ok(())
}

fn validate_connections(
    m: &ModelDescription,
    kinds: &BTreeMap<String, QuantityKind>,
) -> Result<(), ValidationError> {
    for c in &m.flow_connections {
        if kinds.get(&c.flow) != Some(&QuantityKind::Flow) {
            return Err(ValidationError::UnknownConnectionFlow(c.flow.clone()));
        }
        if kinds.get(&c.stock) != Some(&QuantityKind::Stock) {
            return Err(ValidationError::UnknownConnectionStock(c.stock.clone()));
        }
    }
    Ok(())
}

fn compile(quantity: &str, source: &str) -> Result<Formula, ValidationError> {
    Formula::parse(source).map_err(|error| ValidationError::FormulaSyntax {
        quantity: quantity.to_string(),
        error,
    })
}

fn validate_references(
    quantity: &str,
    formula: &Formula,
    kinds: &BTreeMap<String, QuantityKind>,
) -> Result<(), ValidationError> {
    for reference in formula.references() {
        match reference {
            Reference::Name(name) => match kinds.get(&name) {
                None if name != TIME => {
                    return Err(ValidationError::UnknownName {
                        quantity: quantity.to_string(),
                        name,
                    })
                }
                Some(QuantityKind::Parameter) => {
                    return Err(ValidationError::BareParameterRead {
                        quantity: quantity.to_string(),
                        name,
                    })
                }
                _ => {}
            },
            Reference::Keyed { name, key } => match kinds.get(&name) {
                None if name != TIME => {
                    return Err(ValidationError::UnknownName {
                        quantity: quantity.to_string(),
                        name,
                    })
                }
                Some(QuantityKind::Parameter) if key == VALUE_KEY => {}
                _ => {
                    return Err(ValidationError::InvalidKeyedAccess {
                        quantity: quantity.to_string(),
                        name,
                        key,
                    })
                }
            },
        }
    }
    Ok(())
}

/// Validate `model` and compile its formulas.
pub fn validate_model(model: &ModelDescription) -> Result<ValidatedModel, ValidationError> {
    validate_settings(model)?;
    let kinds = collect_names(model)?;
    validate_values(model)?;
    validate_connections(model, &kinds)?;

    let auxiliaries = model
        .auxiliaries
        .iter()
        .map(|a| compile(&a.name, &a.formula))
        .collect::<Result<Vec<_>, _>>()?;
    let flows = model
        .flows
        .iter()
        .map(|f| compile(&f.name, &f.formula))
        .collect::<Result<Vec<_>, _>>()?;

    let (aux_formulas, flow_formulas) = (&auxiliaries, &flows);
    let named_formulas = move || {
        model
            .auxiliaries
            .iter()
            .map(|a| a.name.as_str())
            .zip(aux_formulas.iter())
            .chain(
                model
                    .flows
                    .iter()
                    .map(|f| f.name.as_str())
                    .zip(flow_formulas.iter()),
            )
    };
    for (quantity, formula) in named_formulas() {
        validate_references(quantity, formula, &kinds)?;
    }

    let unconnected: Vec<String> = model
        .stocks
        .iter()
        .filter(|s| model.connections_of(&s.name).next().is_none())
        .map(|s| s.name.clone())
        .collect();
    if !unconnected.is_empty() {
        return Err(ValidationError::StockWithoutFlow(unconnected));
    }

    // name -> quantities whose formulas mention it
    let mut used_by: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for (quantity, formula) in named_formulas() {
        for name in formula.referenced_names() {
            used_by.entry(name).or_default().insert(quantity);
        }
    }
    let used_elsewhere = |name: &str| {
        used_by
            .get(name)
            .map_or(false, |users| users.iter().any(|u| *u != name))
    };

    let unused_aux: Vec<String> = model
        .auxiliaries
        .iter()
        .filter(|a| !used_elsewhere(&a.name))
        .map(|a| a.name.clone())
        .collect();
    if !unused_aux.is_empty() {
        return Err(ValidationError::UnusedAuxiliary(unused_aux));
    }

    let unused_params: Vec<String> = model
        .parameters
        .keys()
        .filter(|p| !used_by.contains_key(p.as_str()))
        .cloned()
        .collect();
    if !unused_params.is_empty() {
        return Err(ValidationError::UnusedParameter(unused_params));
    }

    for f in &model.flows {
        if !model.flow_connections.iter().any(|c| c.flow == f.name) {
            tracing::warn!(flow = %f.name, "flow is not connected to any stock");
        }
    }
    tracing::debug!(
        stocks = model.stocks.len(),
        auxiliaries = model.auxiliaries.len(),
        flows = model.flows.len(),
        parameters = model.parameters.len(),
        "model validated"
    );

    Ok(ValidatedModel {
        inner: Arc::new(Compiled {
            description: model.clone(),
            auxiliaries,
            flows,
            kinds,
        }),
    })
}
