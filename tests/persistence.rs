//! Integration tests for export/import of the persisted-state envelope.
use wattcity::grid::{Coord, ZoneType};
use wattcity::save::SaveData;
use wattcity::scenario::Scenario;
use wattcity::simulation::CitySim;
use wattcity::units::Money;
use wattcity::weather::WeatherKind;

fn build_session() -> CitySim {
    let mut sim = CitySim::new(Scenario::default(), 7);

    sim.set_zone(Coord::new(3, 0), Some(ZoneType::Residential));
    sim.set_zone(Coord::new(3, 1), Some(ZoneType::Residential));
    sim.set_zone(Coord::new(4, 0), Some(ZoneType::Commercial));
    sim.set_zone(Coord::new(5, 0), Some(ZoneType::Industrial));

    sim.place_installation(Coord::new(3, 0), "solar");
    sim.place_installation(Coord::new(0, 5), "hydro");
    sim.place_installation(Coord::new(5, 0), "biomass");

    sim.force_weather(WeatherKind::Rainy);
    sim.advance_weather();
    sim.apply_monthly_income();
    sim.ledger_mut().add_funds(Money(5_000.0), "State grant");

    sim
}

/// Exporting then importing reproduces identical aggregate query results.
#[test]
fn test_round_trip_preserves_aggregates() {
    let sim = build_session();
    let json = sim.export().to_json().unwrap();

    // Import into a session that looks nothing like the original
    let mut restored = CitySim::new(Scenario::default(), 99);
    restored.set_zone(Coord::new(6, 6), Some(ZoneType::Industrial));
    restored.import(SaveData::from_json(&json).unwrap()).unwrap();

    assert_eq!(restored.weather().current(), sim.weather().current());
    assert_eq!(
        restored.weather().history().collect::<Vec<_>>(),
        sim.weather().history().collect::<Vec<_>>()
    );

    let weather = sim.weather().current();
    assert_eq!(
        restored.catalog().total_output(weather),
        sim.catalog().total_output(weather)
    );
    assert_eq!(restored.catalog().total_cost(), sim.catalog().total_cost());
    assert_eq!(
        restored.catalog().energy_mix(),
        sim.catalog().energy_mix()
    );

    assert_eq!(
        restored.ledger().current_budget(),
        sim.ledger().current_budget()
    );
    assert_eq!(restored.ledger().total_spent(), sim.ledger().total_spent());
    assert_eq!(
        restored.ledger().monthly_income(),
        sim.ledger().monthly_income()
    );

    let original = sim.report();
    let round_tripped = restored.report();
    assert_eq!(round_tripped.production, original.production);
    assert_eq!(round_tripped.demand, original.demand);
    assert_eq!(round_tripped.monthly_income, original.monthly_income);
    assert_eq!(round_tripped.zones, original.zones);

    assert_eq!(restored.score(), sim.score());
}

/// A second export of an imported session yields the identical envelope.
#[test]
fn test_export_is_stable() {
    let sim = build_session();
    let first = sim.export();

    let mut restored = CitySim::new(Scenario::default(), 1);
    restored.import(first.clone()).unwrap();

    assert_eq!(restored.export(), first);
}

/// Corrupt envelopes are a hard failure and leave the session unchanged.
#[test]
fn test_corrupt_envelope_rejected() {
    let mut sim = build_session();
    let budget_before = sim.ledger().current_budget();

    assert!(SaveData::from_json("{not json").is_err());

    let mut data = sim.export();
    data.catalog.insert("antimatter".into(), 1);
    assert!(sim.import(data).is_err());

    // Unknown source rejected before anything was overwritten
    assert_eq!(sim.ledger().current_budget(), budget_before);
    assert_eq!(sim.catalog().count("solar"), 1);
}
