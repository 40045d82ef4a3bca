//! The command line interface for the simulation.
use crate::grid::{CellTag, Coord, ZoneType};
use crate::log;
use crate::scenario::Scenario;
use crate::score::achievements;
use crate::settings::Settings;
use crate::simulation::{CitySim, PlaceOutcome};
use ::log::info;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

/// Days per in-game month: monthly income is credited on this cadence.
const DAYS_PER_MONTH: u32 = 30;

/// The command line interface for the simulation.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Commands,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a headless simulation session.
    Run {
        /// Path to a scenario file (built-in defaults if omitted).
        scenario: Option<PathBuf>,
        /// Number of in-game days to simulate.
        #[arg(long, default_value_t = 90)]
        days: u32,
        /// Seed for the weather process.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Validate a scenario file.
    Validate {
        /// Path to the scenario file.
        scenario: PathBuf,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run {
                scenario,
                days,
                seed,
            } => handle_run_command(scenario.as_deref(), days, seed),
            Self::Validate { scenario } => handle_validate_command(&scenario),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    Cli::parse().command.execute()
}

/// Handle the `run` command.
pub fn handle_run_command(scenario_path: Option<&Path>, days: u32, seed: u64) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings.")?;
    log::init(settings.log_level.as_deref(), None).context("Failed to initialise logging.")?;

    let scenario = load_scenario(scenario_path)?;
    let mut sim = CitySim::new(scenario, seed);
    info!(
        "Starting session: {}x{} grid, ${} budget, seed {seed}",
        sim.grid().rows(),
        sim.grid().cols(),
        sim.ledger().current_budget().value()
    );

    build_starter_city(&mut sim);

    for day in 1..=days {
        let change = sim.advance_weather();
        info!(
            "Day {day}: {} ({})",
            change.current.description(),
            sim.weather()
                .forecast()
                .iter()
                .map(|entry| format!("{:.0}%", entry.confidence * 100.0))
                .join(" ")
        );

        if day % DAYS_PER_MONTH == 0 {
            let income = sim.apply_monthly_income();
            info!(
                "Month end: income ${}, budget ${}",
                income.value(),
                sim.ledger().current_budget().value()
            );
            expand_city(&mut sim);
        }
    }

    print_summary(&sim);
    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(scenario_path: &Path) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings.")?;
    log::init(settings.log_level.as_deref(), None).context("Failed to initialise logging.")?;

    Scenario::from_path(scenario_path).context("Failed to validate scenario.")?;
    info!("Scenario validation successful!");

    Ok(())
}

fn load_scenario(scenario_path: Option<&Path>) -> Result<Scenario> {
    match scenario_path {
        Some(path) => Scenario::from_path(path).context("Failed to load scenario."),
        None => Ok(Scenario::default()),
    }
}

/// Zone a starter neighbourhood and give each zone its best affordable source.
fn build_starter_city(sim: &mut CitySim) {
    let free_cells = free_coords(sim);
    let mut cells = free_cells.into_iter();

    for zone in ZoneType::iter() {
        for coord in cells.by_ref().take(3) {
            sim.set_zone(coord, Some(zone));
        }
    }

    expand_city(sim);
}

/// Place the top affordable recommendation for each zone type, if any.
fn expand_city(sim: &mut CitySim) {
    for zone in ZoneType::iter() {
        let budget = sim.ledger().current_budget();
        let weather = sim.weather().current();
        let Some(recommendation) = sim
            .catalog()
            .recommendations(weather, budget, zone)
            .into_iter()
            .next()
        else {
            continue;
        };

        let target = sim
            .grid()
            .cells()
            .filter(|(_, cell)| {
                cell.tag == CellTag::Zoned(zone) && cell.installation.is_none()
            })
            .map(|(coord, _)| coord)
            .sorted_by_key(|coord| (coord.row, coord.col))
            .next();

        if let Some(coord) = target {
            match sim.place_installation(coord, &recommendation.id.0) {
                PlaceOutcome::Placed { cost } => {
                    info!(
                        "Expanded {} with {} (${})",
                        zone.name(),
                        recommendation.id,
                        cost.value()
                    );
                }
                PlaceOutcome::Rejected(reason) => {
                    info!("Skipped {} in {}: {reason}", recommendation.id, zone.name());
                }
                PlaceOutcome::InsufficientFunds { shortfall } => {
                    info!(
                        "Cannot afford {} for {} (short ${})",
                        recommendation.id,
                        zone.name(),
                        shortfall.value()
                    );
                }
            }
        }
    }
}

/// Unoccupied, in-bounds coordinates in row-major order.
fn free_coords(sim: &CitySim) -> Vec<Coord> {
    let grid = sim.grid();
    (0..grid.rows())
        .cartesian_product(0..grid.cols())
        .map(|(row, col)| Coord::new(row, col))
        .filter(|&coord| grid.cell(coord).is_none())
        .collect()
}

/// Log the final report, energy mix and score.
fn print_summary(sim: &CitySim) {
    let report = sim.report();
    info!(
        "Final report: {:.0} kW produced / {:.0} kW demanded ({:.0}% efficiency)",
        report.production.value(),
        report.demand.value(),
        report.efficiency
    );

    for stats in &report.zones {
        let name = match stats.tag {
            CellTag::Zoned(zone) => zone.name(),
            CellTag::Terrain(terrain) => terrain.name(),
        };
        info!(
            "  {name}: {} cells, {:.0}% powered, income ${}",
            stats.cell_count,
            stats.efficiency,
            stats.income.value()
        );
    }

    for (id, entry) in sim.catalog().energy_mix() {
        info!(
            "  Mix: {id} x{} = {:.0} kW ({:.1}%)",
            entry.count,
            entry.output.value(),
            entry.percentage
        );
    }

    let score = sim.score();
    info!(
        "Sustainability score: {:.0}/100 (grade {})",
        score.total(),
        score.grade()
    );
    for achievement in achievements(&score) {
        info!("  Achievement unlocked: {achievement}");
    }
}
