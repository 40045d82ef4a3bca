//! Fixtures for tests

use crate::budget::BudgetLedger;
use crate::catalog::EnergyCatalog;
use crate::grid::ZoneGrid;
use crate::scenario::Scenario;
use crate::simulation::CitySim;
use crate::units::Money;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn catalog() -> EnergyCatalog {
    EnergyCatalog::standard()
}

#[fixture]
pub fn grid() -> ZoneGrid {
    ZoneGrid::with_standard_terrain(8, 10)
}

#[fixture]
pub fn ledger() -> BudgetLedger {
    BudgetLedger::new(Money(150_000.0))
}

#[fixture]
pub fn sim() -> CitySim {
    CitySim::new(Scenario::default(), 42)
}
