//! Current values of every quantity during one run.

use sd_core::ModelDescription;
use sd_expr::{Scope, TIME, VALUE_KEY};
use std::collections::{BTreeMap, HashMap};

/// Name-to-value store that formulas are evaluated against.
///
/// Anyone may read; only the integration loop writes.
#[derive(Debug, Clone)]
pub struct QuantityRegistry {
    values: HashMap<String, f64>,
    parameters: HashMap<String, f64>,
    time: f64,
}

impl QuantityRegistry {
    /// Stocks at their initial values; auxiliaries and flows appear once evaluated.
    pub(crate) fn new(model: &ModelDescription, parameters: &BTreeMap<String, f64>) -> Self {
        let values = model
            .stocks
            .iter()
            .map(|s| (s.name.clone(), s.initial_value))
            .collect();
        let parameters = parameters
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Self {
            values,
            parameters,
            time: 0.0,
        }
    }

    /// Value of a stock, auxiliary or flow.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub(crate) fn set(&mut self, name: &str, value: f64) {
        match self.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(name.to_string(), value);
            }
        }
    }

    pub(crate) fn set_time(&mut self, time: f64) {
        self.time = time;
    }
}

impl Scope for QuantityRegistry {
    fn value(&self, name: &str) -> Option<f64> {
        if name == TIME {
            return Some(self.time);
        }
        self.get(name)
    }

    fn keyed_value(&self, name: &str, key: &str) -> Option<f64> {
        if key == VALUE_KEY {
            self.parameter(name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_core::{SimulationSettings, Stock};

    fn registry() -> QuantityRegistry {
        let model = ModelDescription {
            problem_description: None,
            stocks: vec![Stock {
                name: "Tank".into(),
                initial_value: 5.0,
                unit: "l".into(),
                description: String::new(),
            }],
            parameters: Default::default(),
            auxiliaries: vec![],
            flows: vec![],
            flow_connections: vec![],
            simulation_settings: SimulationSettings::default(),
        };
        QuantityRegistry::new(&model, &BTreeMap::from([("RATE".to_string(), 0.25)]))
    }

    #[test]
    fn scope_lookups() {
        let mut r = registry();
        r.set_time(4.0);
        r.set("Level", 2.0);
        assert_eq!(r.value("Tank"), Some(5.0));
        assert_eq!(r.value("Level"), Some(2.0));
        assert_eq!(r.value("time"), Some(4.0));
        // parameters answer only the keyed lookup
        assert_eq!(r.value("RATE"), None);
        assert_eq!(r.keyed_value("RATE", "value"), Some(0.25));
        assert_eq!(r.keyed_value("RATE", "unit"), None);
        assert_eq!(r.keyed_value("Tank", "value"), None);
        assert_eq!(r.value("Missing"), None);
    }

    #[test]
    fn writes_overwrite() {
        let mut r = registry();
        r.set("Tank", 1.5);
        assert_eq!(r.get("Tank"), Some(1.5));
    }
}
