#![deny(warnings)]

//! Reporting helpers over simulation results.
//!
//! - [`summarize`] reduces a run to the deterministic facts a downstream
//!   summarizer needs: parameters, start and end stock levels, duration, and
//!   per-quantity ranges and trends.
//! - [`diagram::model_diagram`] renders a model as a Mermaid flowchart.

pub mod diagram;

use sd_core::QuantityKind;
use sd_runtime::{ScenarioOutcome, SimulationOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced by report helpers.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A number with its unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measured {
    pub value: f64,
    pub unit: String,
}

/// Direction of change between the first and last snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "increased")]
    Increased,
    #[serde(rename = "decreased")]
    Decreased,
    #[serde(rename = "remained stable")]
    RemainedStable,
}

impl Trend {
    pub fn between(first: f64, last: f64) -> Self {
        if first < last {
            Trend::Increased
        } else if first > last {
            Trend::Decreased
        } else {
            Trend::RemainedStable
        }
    }
}

/// Range and trend of one stock, auxiliary or flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: QuantityKind,
    pub min: Measured,
    pub max: Measured,
    pub trend: Trend,
}

/// Deterministic facts about one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub problem_statement: String,
    /// Set instead of the statistics when the run recorded nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub model_parameters: BTreeMap<String, Measured>,
    #[serde(default)]
    pub initial_stock_state: BTreeMap<String, Measured>,
    #[serde(default)]
    pub final_stock_state: BTreeMap<String, Measured>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_duration: Option<Measured>,
    #[serde(default)]
    pub columns: Vec<ColumnSummary>,
}

impl AnalysisPayload {
    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Summarize `output` for the question in `problem_statement`.
pub fn summarize(problem_statement: &str, output: &SimulationOutput) -> AnalysisPayload {
    if output.is_empty() {
        tracing::warn!("summarizing an empty simulation output");
        return AnalysisPayload {
            problem_statement: problem_statement.to_string(),
            message: Some("Simulation output contained no snapshots.".to_string()),
            model_parameters: BTreeMap::new(),
            initial_stock_state: BTreeMap::new(),
            final_stock_state: BTreeMap::new(),
            simulation_duration: None,
            columns: Vec::new(),
        };
    }

    let unit_of = |name: &str| {
        output
            .column(name)
            .map(|c| c.unit.clone())
            .unwrap_or_default()
    };
    let with_units = |stocks: BTreeMap<String, f64>| -> BTreeMap<String, Measured> {
        stocks
            .into_iter()
            .map(|(name, value)| {
                let unit = unit_of(&name);
                (name, Measured { value, unit })
            })
            .collect()
    };

    let columns = output
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let series = output.snapshots.iter().map(|s| s.values[i]);
            let min = series.clone().fold(f64::INFINITY, f64::min);
            let max = series.fold(f64::NEG_INFINITY, f64::max);
            let first = output.snapshots[0].values[i];
            let last = output.snapshots[output.len() - 1].values[i];
            let measured = |value| Measured {
                value,
                unit: c.unit.clone(),
            };
            ColumnSummary {
                name: c.name.clone(),
                kind: c.kind,
                min: measured(min),
                max: measured(max),
                trend: Trend::between(first, last),
            }
        })
        .collect();

    let duration = output.snapshots.last().map_or(0.0, |s| s.time);
    AnalysisPayload {
        problem_statement: problem_statement.to_string(),
        message: None,
        model_parameters: output
            .parameters
            .iter()
            .map(|(name, p)| {
                (
                    name.clone(),
                    Measured {
                        value: p.value,
                        unit: p.unit.clone(),
                    },
                )
            })
            .collect(),
        initial_stock_state: with_units(output.initial_stocks()),
        final_stock_state: with_units(output.final_stocks()),
        simulation_duration: Some(Measured {
            value: duration,
            unit: output.time_unit.clone(),
        }),
        columns,
    }
}

/// Per-scenario report: a payload for successful runs, the error text otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summarize every scenario outcome, keeping their order.
pub fn summarize_outcomes(
    problem_statement: &str,
    outcomes: &[ScenarioOutcome],
) -> Vec<ScenarioReport> {
    outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(output) => ScenarioReport {
                scenario_description: o.scenario_description.clone(),
                analysis: Some(summarize(problem_statement, output)),
                error: None,
            },
            Err(e) => ScenarioReport {
                scenario_description: o.scenario_description.clone(),
                analysis: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}
