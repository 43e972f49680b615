use proptest::prelude::*;
use sd_core::{ModelDescription, RunConfig, ValidationError};
use sd_runtime::{Scenario, ScenarioRunner, SimError, Simulation};

/// One stock filled by a flow reading auxiliaries `a` and `b`.
fn model(a: &str, b: &str, end: f64, dt: f64) -> ModelDescription {
    let yaml = format!(
        r#"
stocks:
  - {{name: Pool, initial_value: 1.0, unit: units}}
parameters:
  GROWTH: {{value: 0.05, unit: 1/day}}
auxiliaries:
  - {{name: A, formula: "{a}", unit: units/day}}
  - {{name: B, formula: "{b}", unit: units/day}}
flows:
  - {{name: Inflow, formula: "A + B", unit: units/day}}
flow_connections:
  - [Inflow, Pool, inflow]
simulation_settings:
  end_time: {{value: {end}, unit: days}}
  dt: {{value: {dt}, unit: days}}
"#
    );
    ModelDescription::from_yaml_str(&yaml).unwrap()
}

fn simulate(desc: &ModelDescription) -> Result<sd_runtime::SimulationOutput, SimError> {
    Simulation::from_description(desc, RunConfig::default())?.run()
}

#[test]
fn snapshot_counts() {
    let out = simulate(&model("Pool * GROWTH['value']", "0 * A", 365.0, 1.0)).unwrap();
    assert_eq!(out.len(), 366);
    let out = simulate(&model("Pool * GROWTH['value']", "0 * A", 10.0, 0.5)).unwrap();
    assert_eq!(out.len(), 21);
    assert_eq!(out.times().last().copied(), Some(10.0));
    // the horizon is never overshot
    let out = simulate(&model("Pool * GROWTH['value']", "0 * A", 10.0, 3.0)).unwrap();
    assert_eq!(out.times(), vec![0.0, 3.0, 6.0, 9.0]);
}

#[test]
fn mutual_auxiliaries_are_a_cycle() {
    let err = simulate(&model("B + GROWTH['value']", "A * 2", 5.0, 1.0)).unwrap_err();
    assert_eq!(
        err,
        SimError::CircularDependency {
            members: vec!["A".into(), "B".into()]
        }
    );
}

#[test]
fn undefined_name_fails_before_any_step() {
    let err = simulate(&model("Pool * GROWTH['value'] * Foo", "0 * A", 5.0, 1.0)).unwrap_err();
    match err {
        SimError::Validation(ValidationError::UnknownName { quantity, name }) => {
            assert_eq!(quantity, "A");
            assert_eq!(name, "Foo");
        }
        other => panic!("expected unknown-name error, got {other:?}"),
    }
}

#[test]
fn time_is_visible_to_formulas() {
    let out = simulate(&model("GROWTH['value'] * time", "0 * A", 4.0, 1.0)).unwrap();
    assert_eq!(
        out.series("A").unwrap(),
        vec![0.0, 0.05, 0.1, 0.15000000000000002, 0.2]
    );
}

#[test]
fn domain_errors_carry_context() {
    let err = simulate(&model("sqrt(GROWTH['value'] - time)", "0 * A", 4.0, 1.0)).unwrap_err();
    match err {
        SimError::FormulaEvaluation {
            quantity, time, ..
        } => {
            assert_eq!(quantity, "A");
            assert_eq!(time, 1.0);
        }
        other => panic!("expected evaluation error, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn scenario_results_do_not_depend_on_order(
        growths in proptest::collection::vec(0.0f64..0.2, 1..6)
    ) {
        let desc = model("Pool * GROWTH['value']", "0 * A", 30.0, 1.0);
        let variations: Vec<Scenario> = growths
            .iter()
            .enumerate()
            .map(|(i, g)| Scenario::base(format!("g{i}")).with_parameter("GROWTH", *g, "1/day"))
            .collect();
        let mut reversed = variations.clone();
        reversed.reverse();

        let parallel = ScenarioRunner::new(
            Simulation::from_description(&desc, RunConfig::default()).unwrap(),
        );
        let sequential = ScenarioRunner::new(
            Simulation::from_description(
                &desc,
                RunConfig { parallel: false, ..RunConfig::default() },
            )
            .unwrap(),
        );

        let forward = parallel.run_scenarios(&variations);
        let mut backward = sequential.run_scenarios(&reversed);
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }
}
