#![deny(warnings)]

//! Model description types and structural validation for stock-and-flow models.
//!
//! A [`ModelDescription`] is the serializable document: stocks, parameters,
//! auxiliaries, flows, the connections between flows and stocks, and the time
//! settings. [`validate_model`] checks it and compiles every formula into a
//! [`ValidatedModel`] that the runtime can simulate.

pub mod config;
pub mod model;
pub mod validate;

pub use config::RunConfig;
pub use model::{
    Auxiliary, Direction, Flow, FlowConnection, ModelDescription, Parameter, QuantityKind,
    SimulationSettings, Stock, TimeSetting, MAX_STEPS,
};
pub use validate::{validate_model, ValidatedModel, ValidationError};
