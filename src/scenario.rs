//! Scenario parameters for a simulation session.
//!
//! A scenario file is optional TOML; every field has a default, so a partial
//! file (or none at all) yields the standard 8×10 city.
use crate::input::read_toml;
use crate::units::Money;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::path::Path;

fn default_rows() -> u32 {
    8
}

fn default_cols() -> u32 {
    10
}

fn default_initial_budget() -> Money {
    Money(150_000.0)
}

fn default_weather_time_scale() -> f64 {
    1.0
}

/// Parameters controlling a simulation session
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Scenario {
    /// Number of grid rows
    #[serde(default = "default_rows")]
    pub rows: u32,
    /// Number of grid columns
    #[serde(default = "default_cols")]
    pub cols: u32,
    /// Funds the city starts with
    #[serde(default = "default_initial_budget")]
    pub initial_budget: Money,
    /// Multiplier applied to mean weather-state durations (>1 slows the weather)
    #[serde(default = "default_weather_time_scale")]
    pub weather_time_scale: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            initial_budget: default_initial_budget(),
            weather_time_scale: default_weather_time_scale(),
        }
    }
}

impl Scenario {
    /// Read and validate a scenario from the specified TOML file.
    pub fn from_path(file_path: &Path) -> Result<Scenario> {
        let scenario: Scenario = read_toml(file_path)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.rows > 0 && self.cols > 0,
            "Grid dimensions must be positive ({}x{} given)",
            self.rows,
            self.cols
        );
        ensure!(
            self.initial_budget >= Money(0.0),
            "Initial budget may not be negative"
        );
        ensure!(
            self.weather_time_scale > 0.0,
            "Weather time scale must be positive"
        );

        Ok(())
    }
}
