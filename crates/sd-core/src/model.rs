//! Serializable model description records.

use crate::validate::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a named quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityKind {
    Stock,
    Auxiliary,
    Flow,
    Parameter,
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuantityKind::Stock => "stock",
            QuantityKind::Auxiliary => "auxiliary",
            QuantityKind::Flow => "flow",
            QuantityKind::Parameter => "parameter",
        })
    }
}

/// An accumulating quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub name: String,
    /// Value at time 0 (finite, >= 0).
    pub initial_value: f64,
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

/// A constant input, addressed in formulas as `NAME['value']`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

/// A memoryless quantity recomputed every step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Auxiliary {
    pub name: String,
    pub formula: String,
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

/// A rate moving material into or out of stocks; unit is stock unit per time unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub formula: String,
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

/// Whether a flow adds to or drains a stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    /// +1 for inflows, -1 for outflows.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Inflow => 1.0,
            Direction::Outflow => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Inflow => "inflow",
            Direction::Outflow => "outflow",
        })
    }
}

/// Link between a flow and a stock, written as `[flow, stock, direction]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(String, String, Direction)",
    into = "(String, String, Direction)"
)]
pub struct FlowConnection {
    pub flow: String,
    pub stock: String,
    pub direction: Direction,
}

impl FlowConnection {
    pub fn new(flow: impl Into<String>, stock: impl Into<String>, direction: Direction) -> Self {
        Self {
            flow: flow.into(),
            stock: stock.into(),
            direction,
        }
    }
}

impl From<(String, String, Direction)> for FlowConnection {
    fn from((flow, stock, direction): (String, String, Direction)) -> Self {
        Self {
            flow,
            stock,
            direction,
        }
    }
}

impl From<FlowConnection> for (String, String, Direction) {
    fn from(c: FlowConnection) -> Self {
        (c.flow, c.stock, c.direction)
    }
}

/// A value with its unit, e.g. `{ "value": 365, "unit": "days" }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSetting {
    pub value: f64,
    pub unit: String,
}

/// Horizon and step size of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub end_time: TimeSetting,
    pub dt: TimeSetting,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            end_time: TimeSetting {
                value: 100.0,
                unit: "days".to_string(),
            },
            dt: TimeSetting {
                value: 1.0,
                unit: "days".to_string(),
            },
        }
    }
}

/// Longest run, in integration steps, a model may request.
pub const MAX_STEPS: usize = 10_000_000;

impl SimulationSettings {
    /// Number of integration steps; the run records `step_count + 1` snapshots.
    ///
    /// `tolerance` absorbs float noise in `end_time / dt` so exact multiples
    /// are not lost to rounding; the last snapshot never lies past `end_time`.
    /// `None` when the count is not finite or exceeds [`MAX_STEPS`].
    pub fn step_count(&self, tolerance: f64) -> Option<usize> {
        let steps = (self.end_time.value / self.dt.value + tolerance).floor();
        if steps.is_finite() && (0.0..=MAX_STEPS as f64).contains(&steps) {
            Some(steps as usize)
        } else {
            None
        }
    }

    /// Simulated time of step `k`.
    pub fn time_at(&self, step: usize) -> f64 {
        step as f64 * self.dt.value
    }
}

/// Declarative description of a stock-and-flow model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_description: Option<String>,
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub auxiliaries: Vec<Auxiliary>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub flow_connections: Vec<FlowConnection>,
    #[serde(default)]
    pub simulation_settings: SimulationSettings,
}

impl ModelDescription {
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(s).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ValidationError> {
        serde_yaml::from_str(s).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Kind of `name`, if the model defines it.
    pub fn kind_of(&self, name: &str) -> Option<QuantityKind> {
        if self.stocks.iter().any(|s| s.name == name) {
            Some(QuantityKind::Stock)
        } else if self.auxiliaries.iter().any(|a| a.name == name) {
            Some(QuantityKind::Auxiliary)
        } else if self.flows.iter().any(|f| f.name == name) {
            Some(QuantityKind::Flow)
        } else if self.parameters.contains_key(name) {
            Some(QuantityKind::Parameter)
        } else {
            None
        }
    }

    /// Unit of any named quantity.
    pub fn unit_of(&self, name: &str) -> Option<&str> {
        self.stocks
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.unit.as_str())
            .or_else(|| {
                self.auxiliaries
                    .iter()
                    .find(|a| a.name == name)
                    .map(|a| a.unit.as_str())
            })
            .or_else(|| {
                self.flows
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| f.unit.as_str())
            })
            .or_else(|| self.parameters.get(name).map(|p| p.unit.as_str()))
    }

    /// Connections that attach to `stock`.
    pub fn connections_of<'a>(
        &'a self,
        stock: &'a str,
    ) -> impl Iterator<Item = &'a FlowConnection> + 'a {
        self.flow_connections.iter().filter(move |c| c.stock == stock)
    }
}
