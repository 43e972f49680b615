//! Parameter-variation scenarios and the runner that executes them.

use crate::engine::{Simulation, SimulationOutput};
use crate::error::SimError;
use rayon::prelude::*;
use sd_core::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Replacement value for one parameter. The unit must match the model's.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverride {
    pub value: f64,
    pub unit: String,
}

/// A named set of parameter values to run the model with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_description: String,
    /// Parameters not listed keep the model's values.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterOverride>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioList {
    Bare(Vec<Scenario>),
    Wrapped { variations: Vec<Scenario> },
}

impl Scenario {
    /// A scenario that changes nothing.
    pub fn base(description: impl Into<String>) -> Self {
        Self {
            scenario_description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        self.parameters.insert(
            name.into(),
            ParameterOverride {
                value,
                unit: unit.into(),
            },
        );
        self
    }

    /// Parse a JSON list of scenarios, bare or as `{"variations": [...]}`.
    pub fn list_from_json_str(s: &str) -> Result<Vec<Scenario>, SimError> {
        let list: ScenarioList = serde_json::from_str(s)
            .map_err(|e| SimError::Validation(ValidationError::Malformed(e.to_string())))?;
        Ok(match list {
            ScenarioList::Bare(v) => v,
            ScenarioList::Wrapped { variations } => variations,
        })
    }

    /// The full parameter set this scenario runs with.
    pub fn parameter_values(
        &self,
        simulation: &Simulation,
    ) -> Result<BTreeMap<String, f64>, SimError> {
        let declared = &simulation.model().description().parameters;
        let mut values = simulation.base_parameters();
        for (name, o) in &self.parameters {
            let invalid = |reason: String| SimError::InvalidScenario {
                scenario: self.scenario_description.clone(),
                reason,
            };
            let Some(param) = declared.get(name) else {
                return Err(invalid(format!("unknown parameter `{name}`")));
            };
            if o.unit != param.unit {
                return Err(invalid(format!(
                    "parameter `{name}` has unit `{}`, scenario gives `{}`",
                    param.unit, o.unit
                )));
            }
            if !o.value.is_finite() {
                return Err(invalid(format!("parameter `{name}` value is not finite")));
            }
            values.insert(name.clone(), o.value);
        }
        Ok(values)
    }
}

/// Result of one scenario; a failure does not affect the others.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario_description: String,
    pub result: Result<SimulationOutput, SimError>,
}

impl ScenarioOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one model under many parameter sets.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    simulation: Simulation,
}

impl ScenarioRunner {
    pub fn new(simulation: Simulation) -> Self {
        Self { simulation }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The base case followed by `variations`, one outcome each in that order.
    pub fn run(&self, variations: &[Scenario]) -> Vec<ScenarioOutcome> {
        let base = Scenario::base(self.simulation.config().base_scenario_name.clone());
        let all: Vec<Scenario> = std::iter::once(base)
            .chain(variations.iter().cloned())
            .collect();
        self.run_scenarios(&all)
    }

    /// Exactly `scenarios`, in order, without adding a base case.
    pub fn run_scenarios(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        info!(
            scenarios = scenarios.len(),
            parallel = self.simulation.config().parallel,
            "running scenarios"
        );
        let outcomes: Vec<ScenarioOutcome> = if self.simulation.config().parallel {
            scenarios.par_iter().map(|s| self.run_one(s)).collect()
        } else {
            scenarios.iter().map(|s| self.run_one(s)).collect()
        };
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "some scenarios failed");
        }
        outcomes
    }

    fn run_one(&self, scenario: &Scenario) -> ScenarioOutcome {
        let result = scenario
            .parameter_values(&self.simulation)
            .and_then(|values| self.simulation.run_with_parameters(&values));
        if let Err(e) = &result {
            warn!(scenario = %scenario.scenario_description, error = %e, "scenario failed");
        }
        ScenarioOutcome {
            scenario_description: scenario.scenario_description.clone(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{ModelDescription, RunConfig};

    const DECAY: &str = r#"{
        "stocks": [{"name": "Mass", "initial_value": 80.0, "unit": "kg"}],
        "parameters": {"HALF": {"value": 0.5, "unit": "1/day"}},
        "flows": [{"name": "Decay", "formula": "Mass * HALF['value']", "unit": "kg/day"}],
        "flow_connections": [["Decay", "Mass", "outflow"]],
        "simulation_settings": {"end_time": {"value": 3, "unit": "days"}, "dt": {"value": 1, "unit": "days"}}
    }"#;

    fn runner(parallel: bool) -> ScenarioRunner {
        let desc = ModelDescription::from_json_str(DECAY).unwrap();
        let config = RunConfig {
            parallel,
            ..RunConfig::default()
        };
        ScenarioRunner::new(Simulation::from_description(&desc, config).unwrap())
    }

    #[test]
    fn parses_bare_and_wrapped_lists() {
        let bare = r#"[{"scenario_description": "Slow", "parameters": {"HALF": {"value": 0.1, "unit": "1/day"}}}]"#;
        let wrapped = format!(r#"{{"variations": {bare}}}"#);
        let a = Scenario::list_from_json_str(bare).unwrap();
        let b = Scenario::list_from_json_str(&wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].parameters["HALF"].value, 0.1);
        assert!(Scenario::list_from_json_str("{\"oops\": 1}").is_err());
    }

    #[test]
    fn overrides_must_state_their_unit() {
        let unitless = r#"[{"scenario_description": "Slow", "parameters": {"HALF": {"value": 0.1}}}]"#;
        assert!(matches!(
            Scenario::list_from_json_str(unitless),
            Err(SimError::Validation(ValidationError::Malformed(_)))
        ));
    }

    #[test]
    fn base_case_comes_first() {
        let out = runner(false).run(&[Scenario::base("Fast").with_parameter("HALF", 1.0, "1/day")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].scenario_description, "Base Case Scenario");
        assert_eq!(
            out[0].result.as_ref().unwrap().final_stocks()["Mass"],
            10.0
        );
        assert_eq!(out[1].result.as_ref().unwrap().final_stocks()["Mass"], 0.0);
    }

    #[test]
    fn bad_scenarios_fail_alone() {
        let out = runner(true).run(&[
            Scenario::base("Unknown").with_parameter("NOPE", 1.0, "1/day"),
            Scenario::base("Units").with_parameter("HALF", 0.2, "1/year"),
            Scenario::base("Fine").with_parameter("HALF", 0.25, "1/day"),
        ]);
        assert!(out[0].is_ok());
        assert!(matches!(
            out[1].result,
            Err(SimError::InvalidScenario { .. })
        ));
        assert!(matches!(
            out[2].result,
            Err(SimError::InvalidScenario { .. })
        ));
        assert!(out[3].is_ok());
    }

    #[test]
    fn parallel_matches_sequential() {
        let variations: Vec<Scenario> = (1..=8)
            .map(|i| Scenario::base(format!("v{i}")).with_parameter("HALF", i as f64 / 10.0, "1/day"))
            .collect();
        assert_eq!(runner(true).run(&variations), runner(false).run(&variations));
    }
}
