//! The persisted-state envelope exchanged with external storage.
//!
//! The envelope carries a semantic version string. Loading rejects envelopes
//! whose major version differs from the supported one, or whose minor
//! version is newer; rejection is a hard error and the external loader is
//! expected to fall back to a backup or to initial defaults.
use crate::budget::BudgetState;
use crate::catalog::SourceID;
use crate::grid::{Cell, CellTag, ZoneGrid};
use crate::weather::WeatherKind;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Version string written into new envelopes.
pub const SAVE_VERSION: &str = "1.0";

/// Major version this build can load.
const SUPPORTED_MAJOR: u32 = 1;

/// Newest minor version this build can load.
const SUPPORTED_MINOR: u32 = 0;

/// One occupied cell in the save envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    /// Row index
    pub row: u32,
    /// Column index
    pub col: u32,
    /// Zone or terrain designation
    pub tag: CellTag,
    /// Installation sited on the cell, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceID>,
}

/// Grid state in the save envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    /// Number of rows
    pub rows: u32,
    /// Number of columns
    pub cols: u32,
    /// Occupied cells, in row-major order
    pub cells: Vec<CellState>,
}

impl GridState {
    /// Capture the grid for the envelope.
    pub fn capture(grid: &ZoneGrid) -> Self {
        let cells = grid
            .cells()
            .map(|(coord, cell)| CellState {
                row: coord.row,
                col: coord.col,
                tag: cell.tag,
                source: cell.installation.clone(),
            })
            .sorted_by_key(|cell| (cell.row, cell.col))
            .collect();

        Self {
            rows: grid.rows(),
            cols: grid.cols(),
            cells,
        }
    }

    /// Rebuild a grid from the envelope.
    pub fn restore(&self) -> Result<ZoneGrid> {
        let mut grid = ZoneGrid::new(self.rows, self.cols);
        for cell in &self.cells {
            ensure!(
                cell.row < self.rows && cell.col < self.cols,
                "Cell ({}, {}) lies outside the {}x{} grid",
                cell.row,
                cell.col,
                self.rows,
                self.cols
            );
            grid.restore_cell(
                crate::grid::Coord::new(cell.row, cell.col),
                Cell {
                    tag: cell.tag,
                    installation: cell.source.clone(),
                },
            )?;
        }

        Ok(grid)
    }
}

/// Weather state in the save envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// The current weather state
    pub current: WeatherKind,
    /// Recent transition history, oldest first
    pub history: Vec<WeatherKind>,
}

/// The top-level persisted-state envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Semantic version of the envelope format ("major.minor")
    pub version: String,
    /// Installation count per energy source
    pub catalog: IndexMap<SourceID, u32>,
    /// Grid dimensions and occupied cells
    pub grid: GridState,
    /// Weather process state
    pub weather: WeatherSnapshot,
    /// Budget ledger state
    pub budget: BudgetState,
}

impl SaveData {
    /// Serialize the envelope to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Could not serialize saved state")
    }

    /// Parse and version-check an envelope from JSON.
    pub fn from_json(json: &str) -> Result<SaveData> {
        let data: SaveData =
            serde_json::from_str(json).context("Invalid saved state")?;
        check_version(&data.version)?;
        Ok(data)
    }
}

/// Reject versions this build cannot interpret.
fn check_version(version: &str) -> Result<()> {
    let (major, minor) = parse_version(version)
        .with_context(|| format!("Invalid save version '{version}'"))?;

    ensure!(
        major == SUPPORTED_MAJOR,
        "Unsupported save version {version} (supported: {SUPPORTED_MAJOR}.x)"
    );
    ensure!(
        minor <= SUPPORTED_MINOR,
        "Save version {version} is newer than supported \
         ({SUPPORTED_MAJOR}.{SUPPORTED_MINOR})"
    );

    Ok(())
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split('.').collect_tuple()?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
