//! Run configuration shared by the engine and the scenario runner.

use crate::validate::ValidationError;
use serde::{Deserialize, Serialize};

/// Knobs that do not belong to a model description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run scenarios on the rayon pool instead of one after another.
    pub parallel: bool,
    /// Slack added to `end_time / dt` before flooring to a step count.
    pub step_tolerance: f64,
    /// Label of the unmodified model in scenario results.
    pub base_scenario_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            step_tolerance: 1e-9,
            base_scenario_name: "Base Case Scenario".to_string(),
        }
    }
}

impl RunConfig {
    /// Parse from YAML (and therefore also JSON). Missing keys keep their defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self, ValidationError> {
        let cfg: RunConfig =
            serde_yaml::from_str(s).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if !cfg.step_tolerance.is_finite() || !(0.0..0.5).contains(&cfg.step_tolerance) {
            return Err(ValidationError::InvalidSettings(format!(
                "step_tolerance must lie in [0, 0.5), got {}",
                cfg.step_tolerance
            )));
        }
        Ok(cfg)
    }
}
