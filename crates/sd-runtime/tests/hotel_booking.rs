use anyhow::Result;
use sd_core::{ModelDescription, RunConfig};
use sd_runtime::{Scenario, ScenarioRunner, Simulation};

const HOTEL: &str = include_str!("fixtures/hotel_booking.json");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("sd_runtime=debug")
        .try_init();
}

fn simulation() -> Result<Simulation> {
    init_tracing();
    let desc = ModelDescription::from_json_str(HOTEL)?;
    Ok(Simulation::from_description(&desc, RunConfig::default())?)
}

#[test]
fn auxiliaries_are_ordered_by_dependency() -> Result<()> {
    let sim = simulation()?;
    assert_eq!(
        sim.plan().ordered_auxiliaries(sim.model()),
        vec!["HotelBookingRate", "EffectiveHotelPrice", "BookingSpendRate"]
    );
    Ok(())
}

#[test]
fn first_step_matches_hand_calculation() -> Result<()> {
    let out = simulation()?.run()?;
    assert_eq!(out.len(), 366);
    assert_eq!(out.value_at(0, "CustomerCapital"), Some(1000.0));

    let price = out.value_at(0, "EffectiveHotelPrice").unwrap();
    assert!((price - 90.0).abs() < 1e-12);

    let rate = out.value_at(0, "HotelBookingRate").unwrap();
    let spent = out.value_at(0, "CapitalSpentOnBooking").unwrap();
    assert!((spent - rate * price).abs() < 1e-12);
    assert!((spent - 180.0).abs() < 1e-9);

    let dt = out.dt;
    let expected = (1000.0 - spent * dt).max(0.0);
    assert_eq!(out.value_at(1, "CustomerCapital"), Some(expected));
    Ok(())
}

#[test]
fn money_is_conserved_and_stocks_stay_nonnegative() -> Result<()> {
    let out = simulation()?.run()?;
    let capital = out.series("CustomerCapital").unwrap();
    let revenue = out.series("HotelRevenue").unwrap();
    for (c, r) in capital.iter().zip(&revenue) {
        assert!(*c >= 0.0 && *r >= 0.0);
        assert!((c + r - 1000.0).abs() < 1e-6);
    }
    assert!(capital.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(out.times().last().copied(), Some(365.0));
    Ok(())
}

#[test]
fn discount_scenarios_run_in_isolation() -> Result<()> {
    let sim = simulation()?;
    let baseline = sim.run()?;
    let runner = ScenarioRunner::new(sim);
    let outcomes = runner.run(&[
        Scenario::base("No Discount").with_parameter("DISCOUNT_RATE", 0.0, "dimensionless"),
        Scenario::base("Deep Discount").with_parameter("DISCOUNT_RATE", 0.5, "dimensionless"),
    ]);
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].result.as_ref().unwrap(), &baseline);

    let price = |i: usize| {
        outcomes[i]
            .result
            .as_ref()
            .unwrap()
            .value_at(0, "EffectiveHotelPrice")
            .unwrap()
    };
    assert!((price(1) - 100.0).abs() < 1e-12);
    assert!((price(2) - 50.0).abs() < 1e-12);

    // the runner never mutates the model it was built from
    assert_eq!(runner.simulation().run()?, baseline);
    Ok(())
}

#[test]
fn output_serializes_to_json() -> Result<()> {
    let out = simulation()?.run()?;
    let value = serde_json::to_value(&out)?;
    assert_eq!(value["time_unit"], "days");
    assert_eq!(value["snapshots"].as_array().map(Vec::len), Some(366));
    assert_eq!(value["parameters"]["HOTEL_CAPACITY"]["unit"], "bookings/day");
    Ok(())
}
