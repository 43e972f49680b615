//! Fixed-step forward-Euler integration of a validated model.

use crate::error::SimError;
use crate::registry::QuantityRegistry;
use crate::resolver::{resolve, EvaluationPlan};
use sd_core::{
    validate_model, ModelDescription, QuantityKind, RunConfig, ValidatedModel, ValidationError,
    MAX_STEPS,
};
use sd_expr::{EvalError, Formula};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata for one output column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: QuantityKind,
    pub unit: String,
    pub description: String,
}

/// A value and its unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub value: f64,
    pub unit: String,
}

/// Values of every stock, auxiliary and flow at one step, aligned with
/// [`SimulationOutput::columns`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: usize,
    pub time: f64,
    pub values: Vec<f64>,
}

/// Time series produced by one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Stocks, then auxiliaries, then flows, each in declaration order.
    pub columns: Vec<Column>,
    pub snapshots: Vec<Snapshot>,
    /// Parameter values the run used.
    pub parameters: BTreeMap<String, ParameterValue>,
    pub time_unit: String,
    pub dt: f64,
}

impl SimulationOutput {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Every recorded value of `name`, one per snapshot.
    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.column_index(name)?;
        Some(self.snapshots.iter().map(|s| s.values[i]).collect())
    }

    pub fn value_at(&self, step: usize, name: &str) -> Option<f64> {
        let i = self.column_index(name)?;
        self.snapshots.get(step).map(|s| s.values[i])
    }

    pub fn times(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.time).collect()
    }

    fn stocks_at(&self, snapshot: Option<&Snapshot>) -> BTreeMap<String, f64> {
        let Some(snapshot) = snapshot else {
            return BTreeMap::new();
        };
        self.columns
            .iter()
            .zip(&snapshot.values)
            .filter(|(c, _)| c.kind == QuantityKind::Stock)
            .map(|(c, v)| (c.name.clone(), *v))
            .collect()
    }

    pub fn initial_stocks(&self) -> BTreeMap<String, f64> {
        self.stocks_at(self.snapshots.first())
    }

    pub fn final_stocks(&self) -> BTreeMap<String, f64> {
        self.stocks_at(self.snapshots.last())
    }
}

/// A validated model with its resolved plan, ready to run any number of times.
#[derive(Debug, Clone)]
pub struct Simulation {
    model: ValidatedModel,
    plan: Arc<EvaluationPlan>,
    config: RunConfig,
}

impl Simulation {
    pub fn new(model: ValidatedModel, config: RunConfig) -> Result<Self, SimError> {
        let plan = Arc::new(resolve(&model)?);
        Ok(Self {
            model,
            plan,
            config,
        })
    }

    /// Validate `description` and prepare it for running.
    pub fn from_description(
        description: &ModelDescription,
        config: RunConfig,
    ) -> Result<Self, SimError> {
        Self::new(validate_model(description)?, config)
    }

    pub fn model(&self) -> &ValidatedModel {
        &self.model
    }

    pub fn plan(&self) -> &EvaluationPlan {
        &self.plan
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Number of integration steps; a run records one more snapshot than this.
    pub fn step_count(&self) -> Result<usize, SimError> {
        let settings = &self.model.description().simulation_settings;
        settings
            .step_count(self.config.step_tolerance)
            .ok_or_else(|| {
                ValidationError::InvalidSettings(format!(
                    "end_time {} with dt {} needs more than {MAX_STEPS} steps",
                    settings.end_time.value, settings.dt.value
                ))
                .into()
            })
    }

    /// Parameter values declared by the model.
    pub fn base_parameters(&self) -> BTreeMap<String, f64> {
        self.model
            .description()
            .parameters
            .iter()
            .map(|(k, p)| (k.clone(), p.value))
            .collect()
    }

    /// Run with the model's own parameter values.
    pub fn run(&self) -> Result<SimulationOutput, SimError> {
        self.run_with_parameters(&self.base_parameters())
    }

    /// Run with `parameters` in place of the declared values. The map must
    /// hold a finite value for every declared parameter and nothing else.
    pub fn run_with_parameters(
        &self,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<SimulationOutput, SimError> {
        let desc = self.model.description();
        self.check_parameters(parameters)?;
        let settings = &desc.simulation_settings;
        let dt = settings.dt.value;
        let steps = self.step_count()?;
        info!(steps, dt, unit = %settings.dt.unit, "simulation started");

        let mut registry = QuantityRegistry::new(desc, parameters);
        let mut stocks: Vec<f64> = desc.stocks.iter().map(|s| s.initial_value).collect();
        let mut auxiliaries = vec![0.0; desc.auxiliaries.len()];
        let mut flows = vec![0.0; desc.flows.len()];
        let mut snapshots = Vec::with_capacity(steps + 1);

        for step in 0..=steps {
            let time = settings.time_at(step);
            registry.set_time(time);

            for &i in self.plan.auxiliary_order() {
                let name = &desc.auxiliaries[i].name;
                let value = evaluate(name, &self.model.auxiliary_formulas()[i], &registry, time)?;
                registry.set(name, value);
                auxiliaries[i] = value;
            }

            for (i, flow) in desc.flows.iter().enumerate() {
                let raw = evaluate(&flow.name, &self.model.flow_formulas()[i], &registry, time)?;
                if raw < 0.0 {
                    debug!(flow = %flow.name, raw, time, "negative flow clamped to zero");
                }
                let value = raw.max(0.0);
                registry.set(&flow.name, value);
                flows[i] = value;
            }

            let mut values = Vec::with_capacity(stocks.len() + auxiliaries.len() + flows.len());
            values.extend_from_slice(&stocks);
            values.extend_from_slice(&auxiliaries);
            values.extend_from_slice(&flows);
            snapshots.push(Snapshot { step, time, values });

            if step < steps {
                for (i, stock) in desc.stocks.iter().enumerate() {
                    let net: f64 = self
                        .plan
                        .stock_links(i)
                        .iter()
                        .map(|(flow, sign)| sign * flows[*flow])
                        .sum();
                    let next = stocks[i] + net * dt;
                    if next < 0.0 {
                        debug!(stock = %stock.name, next, time, "stock clamped to zero");
                    }
                    stocks[i] = next.max(0.0);
                    registry.set(&stock.name, stocks[i]);
                }
            }
        }

        debug!(snapshots = snapshots.len(), "simulation finished");
        Ok(self.output(parameters, snapshots))
    }

    fn check_parameters(&self, parameters: &BTreeMap<String, f64>) -> Result<(), SimError> {
        let declared = &self.model.description().parameters;
        let missing: Vec<String> = declared
            .keys()
            .filter(|k| !parameters.contains_key(*k))
            .cloned()
            .collect();
        let undeclared: Vec<String> = parameters
            .keys()
            .filter(|k| !declared.contains_key(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !undeclared.is_empty() {
            return Err(SimError::ParameterMismatch {
                missing,
                undeclared,
            });
        }
        if let Some((name, _)) = parameters.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ValidationError::NonFiniteParameter(name.clone()).into());
        }
        Ok(())
    }

    fn output(
        &self,
        parameters: &BTreeMap<String, f64>,
        snapshots: Vec<Snapshot>,
    ) -> SimulationOutput {
        let desc = self.model.description();
        let column = |name: &str, kind, unit: &str, description: &str| Column {
            name: name.to_string(),
            kind,
            unit: unit.to_string(),
            description: description.to_string(),
        };
        let columns = desc
            .stocks
            .iter()
            .map(|s| column(&s.name, QuantityKind::Stock, &s.unit, &s.description))
            .chain(
                desc.auxiliaries
                    .iter()
                    .map(|a| column(&a.name, QuantityKind::Auxiliary, &a.unit, &a.description)),
            )
            .chain(
                desc.flows
                    .iter()
                    .map(|f| column(&f.name, QuantityKind::Flow, &f.unit, &f.description)),
            )
            .collect();
        let parameters = parameters
            .iter()
            .map(|(name, value)| {
                let unit = desc
                    .parameters
                    .get(name)
                    .map(|p| p.unit.clone())
                    .unwrap_or_default();
                (
                    name.clone(),
                    ParameterValue {
                        value: *value,
                        unit,
                    },
                )
            })
            .collect();
        SimulationOutput {
            columns,
            snapshots,
            parameters,
            time_unit: desc.simulation_settings.dt.unit.clone(),
            dt: desc.simulation_settings.dt.value,
        }
    }
}

fn evaluate(
    quantity: &str,
    formula: &Formula,
    registry: &QuantityRegistry,
    time: f64,
) -> Result<f64, SimError> {
    formula.evaluate(registry).map_err(|reason| {
        warn!(%quantity, formula = formula.source(), time, %reason, "formula evaluation failed");
        match reason {
            EvalError::UnknownName(name) => SimError::UnknownName {
                quantity: quantity.to_string(),
                formula: formula.source().to_string(),
                name,
                time,
            },
            reason => SimError::FormulaEvaluation {
                quantity: quantity.to_string(),
                formula: formula.source().to_string(),
                time,
                reason,
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sd_core::{
        Auxiliary, Direction, Flow, FlowConnection, Parameter, SimulationSettings, Stock,
        TimeSetting,
    };

    /// Water pours from `Upper` into `Lower` at `RATE * Upper`, and `Lower` leaks at a constant.
    fn cascade(rate: f64, leak: &str, end: f64, dt: f64) -> ModelDescription {
        let stock = |name: &str, v: f64| Stock {
            name: name.into(),
            initial_value: v,
            unit: "l".into(),
            description: String::new(),
        };
        let flow = |name: &str, formula: &str| Flow {
            name: name.into(),
            formula: formula.into(),
            unit: "l/s".into(),
            description: String::new(),
        };
        ModelDescription {
            problem_description: None,
            stocks: vec![stock("Upper", 100.0), stock("Lower", 0.0)],
            parameters: BTreeMap::from([(
                "RATE".to_string(),
                Parameter {
                    value: rate,
                    unit: "1/s".into(),
                    description: String::new(),
                },
            )]),
            auxiliaries: vec![Auxiliary {
                name: "Pour".into(),
                formula: "Upper * RATE['value']".into(),
                unit: "l/s".into(),
                description: String::new(),
            }],
            flows: vec![flow("Transfer", "Pour"), flow("Leak", leak)],
            flow_connections: vec![
                FlowConnection::new("Transfer", "Upper", Direction::Outflow),
                FlowConnection::new("Transfer", "Lower", Direction::Inflow),
                FlowConnection::new("Leak", "Lower", Direction::Outflow),
            ],
            simulation_settings: SimulationSettings {
                end_time: TimeSetting {
                    value: end,
                    unit: "s".into(),
                },
                dt: TimeSetting {
                    value: dt,
                    unit: "s".into(),
                },
            },
        }
    }

    fn run(desc: &ModelDescription) -> Result<SimulationOutput, SimError> {
        Simulation::from_description(desc, RunConfig::default())?.run()
    }

    #[test]
    fn euler_steps_use_start_of_step_values() {
        let out = run(&cascade(0.5, "0", 2.0, 1.0)).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.series("Upper").unwrap(), vec![100.0, 50.0, 25.0]);
        assert_eq!(out.series("Lower").unwrap(), vec![0.0, 50.0, 75.0]);
        assert_eq!(out.series("Pour").unwrap(), vec![50.0, 25.0, 12.5]);
        assert_eq!(out.times(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn negative_flows_and_stocks_clamp_to_zero() {
        let out = run(&cascade(0.1, "-5 if time < 1 else 40", 3.0, 1.0)).unwrap();
        assert_eq!(out.value_at(0, "Leak"), Some(0.0));
        assert_eq!(out.value_at(1, "Lower"), Some(10.0));
        assert_eq!(out.value_at(2, "Lower"), Some(0.0));
        for s in &out.snapshots {
            assert!(s.values.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn runtime_failures_name_quantity_and_time() {
        let err = run(&cascade(0.5, "1 / (time - 2)", 5.0, 1.0)).unwrap_err();
        assert_eq!(
            err,
            SimError::FormulaEvaluation {
                quantity: "Leak".into(),
                formula: "1 / (time - 2)".into(),
                time: 2.0,
                reason: EvalError::DivisionByZero,
            }
        );
    }

    #[test]
    fn overriding_parameters_does_not_touch_the_model() {
        let sim = Simulation::from_description(&cascade(0.5, "0", 1.0, 1.0), RunConfig::default())
            .unwrap();
        let fast = sim
            .run_with_parameters(&BTreeMap::from([("RATE".to_string(), 1.0)]))
            .unwrap();
        assert_eq!(fast.value_at(1, "Upper"), Some(0.0));
        assert_eq!(fast.parameters["RATE"].value, 1.0);
        assert_eq!(fast.parameters["RATE"].unit, "1/s");
        let base = sim.run().unwrap();
        assert_eq!(base.value_at(1, "Upper"), Some(50.0));
    }

    #[test]
    fn parameter_maps_must_match_the_declared_set() {
        let sim = Simulation::from_description(&cascade(0.5, "0", 1.0, 1.0), RunConfig::default())
            .unwrap();
        let err = sim
            .run_with_parameters(&BTreeMap::from([("NOT_A_PARAM".to_string(), 1.0)]))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::ParameterMismatch {
                missing: vec!["RATE".into()],
                undeclared: vec!["NOT_A_PARAM".into()],
            }
        );
        assert!(matches!(
            sim.run_with_parameters(&BTreeMap::new()),
            Err(SimError::ParameterMismatch { .. })
        ));
        assert_eq!(
            sim.run_with_parameters(&BTreeMap::from([("RATE".to_string(), f64::NAN)])),
            Err(SimError::Validation(ValidationError::NonFiniteParameter(
                "RATE".into()
            )))
        );
    }

    #[test]
    fn step_limit_is_checked_at_run_time() {
        let sim = Simulation::from_description(&cascade(0.5, "0", 10.0, 1.0), RunConfig::default())
            .unwrap();
        assert_eq!(sim.step_count(), Ok(10));
        let past_limit = Simulation::new(
            sim.model().clone(),
            RunConfig {
                step_tolerance: f64::INFINITY,
                ..RunConfig::default()
            },
        )
        .unwrap();
        assert!(matches!(
            past_limit.run(),
            Err(SimError::Validation(ValidationError::InvalidSettings(_)))
        ));
    }

    #[test]
    fn output_helpers() {
        let out = run(&cascade(0.5, "0", 2.0, 1.0)).unwrap();
        assert_eq!(out.columns.len(), 5);
        assert_eq!(out.column("Pour").unwrap().kind, QuantityKind::Auxiliary);
        assert_eq!(out.initial_stocks()["Upper"], 100.0);
        assert_eq!(out.final_stocks()["Lower"], 75.0);
        assert_eq!(out.time_unit, "s");
        assert!(out.series("Nope").is_none());
        let json = serde_json::to_string(&out).unwrap();
        let back: SimulationOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }

    proptest! {
        #[test]
        fn stocks_never_negative(rate in 0.0f64..3.0, leak in 0.0f64..500.0, dt in 0.1f64..2.0) {
            let out = run(&cascade(rate, &format!("{leak}"), 20.0, dt)).unwrap();
            let upper = out.column_index("Upper").unwrap();
            let lower = out.column_index("Lower").unwrap();
            for s in &out.snapshots {
                prop_assert!(s.values[upper] >= 0.0);
                prop_assert!(s.values[lower] >= 0.0);
            }
        }

        #[test]
        fn reruns_are_bit_identical(rate in 0.0f64..1.0) {
            let sim = Simulation::from_description(&cascade(rate, "1", 30.0, 0.5), RunConfig::default()).unwrap();
            prop_assert_eq!(sim.run().unwrap(), sim.run().unwrap());
        }
    }
}
