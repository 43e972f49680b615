#![deny(warnings)]

//! Simulation runtime for stock-and-flow models.
//!
//! [`Simulation`] resolves the auxiliary evaluation order of a validated model
//! once and integrates it with forward Euler on every [`Simulation::run`].
//! [`ScenarioRunner`] fans a model out over parameter variations.

mod engine;
mod error;
pub mod registry;
pub mod resolver;
mod scenario;

pub use engine::{Column, ParameterValue, Simulation, SimulationOutput, Snapshot};
pub use error::SimError;
pub use registry::QuantityRegistry;
pub use resolver::{resolve, DependencyGraph, EvaluationPlan};
pub use scenario::{ParameterOverride, Scenario, ScenarioOutcome, ScenarioRunner};
