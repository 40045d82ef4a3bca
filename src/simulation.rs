//! The top-level simulation facade.
//!
//! [`CitySim`] owns the five core components and wires them together with
//! explicit dependency injection; nothing reaches for shared global state.
//! Placing or removing an installation touches the grid, the catalog and the
//! ledger in one all-or-nothing operation, so callers can never leave the
//! three out of sync.
use crate::allocation::{CityReport, PowerContext};
use crate::budget::BudgetLedger;
use crate::catalog::EnergyCatalog;
use crate::grid::{Coord, Placement, ZoneGrid, ZoneType};
use crate::save::{GridState, SaveData, WeatherSnapshot};
use crate::scenario::Scenario;
use crate::score::{ScoreBreakdown, ScoreInputs, compute_score};
use crate::units::Money;
use crate::weather::{WeatherChange, WeatherKind, WeatherProcess};
use anyhow::Result;
use itertools::Itertools;
use log::info;
use strum::IntoEnumIterator;

/// Outcome of a placement transaction
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlaceOutcome {
    /// The installation was purchased and placed
    Placed {
        /// The amount debited from the budget
        cost: Money,
    },
    /// The placement was rejected by the grid rules; nothing changed
    Rejected(&'static str),
    /// The city cannot afford the installation; nothing changed
    InsufficientFunds {
        /// How much more money is needed
        shortfall: Money,
    },
}

/// A complete simulation session
pub struct CitySim {
    scenario: Scenario,
    catalog: EnergyCatalog,
    weather: WeatherProcess,
    grid: ZoneGrid,
    ledger: BudgetLedger,
}

impl CitySim {
    /// Create a session from the given scenario, with a seeded weather process.
    pub fn new(scenario: Scenario, seed: u64) -> Self {
        let grid = ZoneGrid::with_standard_terrain(scenario.rows, scenario.cols);
        let ledger = BudgetLedger::new(scenario.initial_budget);
        let weather = WeatherProcess::new(seed, scenario.weather_time_scale);

        Self {
            scenario,
            catalog: EnergyCatalog::standard(),
            weather,
            grid,
            ledger,
        }
    }

    /// The energy catalog.
    pub fn catalog(&self) -> &EnergyCatalog {
        &self.catalog
    }

    /// The weather process.
    pub fn weather(&self) -> &WeatherProcess {
        &self.weather
    }

    /// Mutable access to the weather process (observer registration, timer control).
    pub fn weather_mut(&mut self) -> &mut WeatherProcess {
        &mut self.weather
    }

    /// The city grid.
    pub fn grid(&self) -> &ZoneGrid {
        &self.grid
    }

    /// The budget ledger.
    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    /// Mutable access to the budget ledger (observer registration, grants).
    pub fn ledger_mut(&mut self) -> &mut BudgetLedger {
        &mut self.ledger
    }

    /// Assign, reassign or clear a cell's zone designation.
    pub fn set_zone(&mut self, coord: Coord, zone: Option<ZoneType>) -> bool {
        self.grid.set_zone(coord, zone)
    }

    /// Purchase and place one installation at `coord`, atomically.
    ///
    /// Either all three mutations happen (ledger debit, catalog count, grid
    /// attach) or none do.
    pub fn place_installation(&mut self, coord: Coord, source_id: &str) -> PlaceOutcome {
        if let Placement::Invalid(reason) = self.grid.validate_placement(coord, source_id) {
            return PlaceOutcome::Rejected(reason);
        }

        let Some(source) = self.catalog.get(source_id) else {
            return PlaceOutcome::Rejected("unknown energy source");
        };
        let cost = source.base_cost;

        if !self.ledger.purchase(&self.catalog, source_id, 1) {
            return PlaceOutcome::InsufficientFunds {
                shortfall: cost - self.ledger.current_budget(),
            };
        }

        // Validation above guarantees these cannot fail
        self.catalog.add_installation(source_id);
        self.grid.add_source(coord, source_id.into());

        info!("Placed {source_id} at {coord} for ${}", cost.value());
        PlaceOutcome::Placed { cost }
    }

    /// Sell and remove the installation at `coord`, atomically.
    ///
    /// Returns false (and changes nothing) when the cell has no installation.
    pub fn remove_installation(&mut self, coord: Coord) -> bool {
        let Some(source_id) = self.grid.remove_source(coord) else {
            return false;
        };

        let refund = self.ledger.sell(&self.catalog, &source_id.0, 1);
        self.catalog.remove_installation(&source_id.0);

        info!("Sold {source_id} at {coord} for ${}", refund.value());
        true
    }

    /// Start the weather timer.
    pub fn start_weather(&mut self) {
        self.weather.start();
    }

    /// Stop the weather timer.
    pub fn stop_weather(&mut self) {
        self.weather.stop();
    }

    /// Fire the pending weather transition if due.
    pub fn poll_weather(&mut self) -> Option<WeatherChange> {
        self.weather.poll()
    }

    /// Perform one weather transition immediately.
    pub fn advance_weather(&mut self) -> WeatherChange {
        self.weather.advance()
    }

    /// Force the weather into a specific state (teaching/testing override).
    pub fn force_weather(&mut self, kind: WeatherKind) -> WeatherChange {
        self.weather.force_change(kind)
    }

    /// Compute the full city report under the current weather.
    ///
    /// Pure query: no state is mutated.
    pub fn report(&self) -> CityReport {
        CityReport::compute(
            &self.grid,
            &PowerContext::Live {
                catalog: &self.catalog,
                weather: self.weather.current(),
            },
        )
    }

    /// Credit this month's income to the budget and return it.
    pub fn apply_monthly_income(&mut self) -> Money {
        let income = self.report().monthly_income;
        self.ledger.apply_monthly_income(income);
        income
    }

    /// Compute the sustainability score breakdown.
    ///
    /// Pure query: no state is mutated.
    pub fn score(&self) -> ScoreBreakdown {
        let report = self.report();

        compute_score(&ScoreInputs {
            city_efficiency: report.efficiency,
            carbon_reduction: self.catalog.total_carbon_reduction(),
            distinct_sources: self.catalog.distinct_sources_in_use(),
            advanced_installations: self.catalog.advanced_installations(),
            fully_powered_zone_types: report.fully_powered_zone_types(),
            total_zone_types: ZoneType::iter().count(),
        })
    }

    /// Restore the initial budget, clear all installations and re-stamp the grid.
    ///
    /// The weather process keeps running; weather is an environmental input,
    /// not part of the player's progress.
    pub fn reset_all(&mut self) {
        self.grid = ZoneGrid::with_standard_terrain(self.scenario.rows, self.scenario.cols);
        self.catalog.reset_counts();
        self.ledger.reset();
        info!("Simulation reset to initial state");
    }

    /// Capture the session as a persisted-state envelope.
    pub fn export(&self) -> SaveData {
        SaveData {
            version: crate::save::SAVE_VERSION.into(),
            catalog: self.catalog.export_counts(),
            grid: GridState::capture(&self.grid),
            weather: WeatherSnapshot {
                current: self.weather.current(),
                history: self.weather.history().collect_vec(),
            },
            budget: self.ledger.export(),
        }
    }

    /// Overwrite the session from a persisted-state envelope.
    ///
    /// Fails (leaving the session unchanged) on corrupt data; the version
    /// gate has already run during envelope parsing.
    pub fn import(&mut self, data: SaveData) -> Result<()> {
        // Validate both fallible restorations before mutating anything
        let grid = data.grid.restore()?;
        self.catalog.restore_counts(&data.catalog)?;

        self.grid = grid;
        self.weather
            .restore_state(data.weather.current, &data.weather.history);
        self.ledger.restore(data.budget);

        info!("Loaded saved state (version {})", data.version);
        Ok(())
    }
}
