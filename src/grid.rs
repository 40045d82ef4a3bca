//! The city grid: zoned cells, fixed terrain features and installations.
use crate::catalog::SourceID;
use crate::units::{Dimensionless, Money, Power};
use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::collections::HashMap;
use std::fmt::Display;
use strum::EnumIter;

/// A cell position on the grid
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Coord {
    /// Row index, from the top
    pub row: u32,
    /// Column index, from the left
    pub col: u32,
}

impl Coord {
    /// Create a coordinate.
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// A player-assignable zone designation
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    EnumIter,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum ZoneType {
    /// Housing: modest demand and income
    #[string = "residential"]
    Residential,
    /// Shops and offices: medium demand and income
    #[string = "commercial"]
    Commercial,
    /// Factories: heavy demand, highest income
    #[string = "industrial"]
    Industrial,
}

impl ZoneType {
    /// Power demand of one cell of this zone type.
    pub fn demand_per_cell(self) -> Power {
        match self {
            ZoneType::Residential => Power(50.0),
            ZoneType::Commercial => Power(80.0),
            ZoneType::Industrial => Power(120.0),
        }
    }

    /// Income one fully powered cell of this zone type generates per month.
    pub fn income_per_cell(self) -> Money {
        match self {
            ZoneType::Residential => Money(60.0),
            ZoneType::Commercial => Money(100.0),
            ZoneType::Industrial => Money(150.0),
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            ZoneType::Residential => "Residential",
            ZoneType::Commercial => "Commercial",
            ZoneType::Industrial => "Industrial",
        }
    }

    /// Source IDs that may not be placed in this zone type.
    fn exclusions(self) -> &'static [&'static str] {
        match self {
            ZoneType::Residential => &["hydro", "biomass"],
            ZoneType::Commercial => &["hydro"],
            ZoneType::Industrial => &[],
        }
    }
}

/// A fixed terrain feature, stamped at grid generation and never editable
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    EnumIter,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum TerrainType {
    /// Dense woodland: boosts biomass, shades solar
    #[string = "forest"]
    Forest,
    /// High ground: boosts wind and geothermal
    #[string = "mountain"]
    Mountain,
    /// Open coastline: boosts wind and solar
    #[string = "beach"]
    Beach,
    /// Flowing water: boosts hydro
    #[string = "river"]
    River,
}

impl TerrainType {
    /// Output multiplier for an installation of `source_id` sited on this terrain.
    ///
    /// Unlisted combinations are neutral (1.0).
    pub fn output_bonus(self, source_id: &str) -> Dimensionless {
        let value = match (self, source_id) {
            (TerrainType::Forest, "biomass") => 1.3,
            (TerrainType::Forest, "solar") => 0.8,
            (TerrainType::Mountain, "wind") => 1.4,
            (TerrainType::Mountain, "geothermal") => 1.2,
            (TerrainType::Beach, "wind") => 1.3,
            (TerrainType::Beach, "solar") => 1.2,
            (TerrainType::River, "hydro") => 1.5,
            _ => 1.0,
        };
        Dimensionless(value)
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            TerrainType::Forest => "Forest",
            TerrainType::Mountain => "Mountain",
            TerrainType::Beach => "Beach",
            TerrainType::River => "River",
        }
    }
}

/// The designation of an occupied cell
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellTag {
    /// Player-assigned zone
    Zoned(ZoneType),
    /// Fixed terrain feature
    Terrain(TerrainType),
}

/// An occupied grid cell
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// The cell's zone or terrain designation
    pub tag: CellTag,
    /// The installation sited on the cell, if any
    pub installation: Option<SourceID>,
}

/// Outcome of a placement validation
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Placement {
    /// The installation may be placed
    Valid,
    /// The installation may not be placed, with a user-facing reason
    Invalid(&'static str),
}

impl Placement {
    /// Whether the placement is allowed.
    pub fn is_valid(self) -> bool {
        matches!(self, Placement::Valid)
    }

    /// The rejection reason, if any.
    pub fn reason(self) -> Option<&'static str> {
        match self {
            Placement::Valid => None,
            Placement::Invalid(reason) => Some(reason),
        }
    }
}

/// Terrain layout stamped onto the standard 8×10 map before play begins.
///
/// Coordinates outside a smaller grid are simply skipped.
const STANDARD_TERRAIN: &[(u32, u32, TerrainType)] = &[
    // Forest block, top-left
    (0, 0, TerrainType::Forest),
    (0, 1, TerrainType::Forest),
    (0, 2, TerrainType::Forest),
    (1, 0, TerrainType::Forest),
    (1, 1, TerrainType::Forest),
    (1, 2, TerrainType::Forest),
    // Mountain block, top-right
    (0, 8, TerrainType::Mountain),
    (0, 9, TerrainType::Mountain),
    (1, 8, TerrainType::Mountain),
    (1, 9, TerrainType::Mountain),
    // River running north-south
    (0, 5, TerrainType::River),
    (1, 5, TerrainType::River),
    (2, 5, TerrainType::River),
    (3, 5, TerrainType::River),
    (4, 5, TerrainType::River),
    (5, 5, TerrainType::River),
    (6, 5, TerrainType::River),
    (7, 5, TerrainType::River),
    // Beach along the southern edge
    (7, 0, TerrainType::Beach),
    (7, 1, TerrainType::Beach),
    (7, 2, TerrainType::Beach),
    (7, 3, TerrainType::Beach),
];

/// The sparse city grid
pub struct ZoneGrid {
    rows: u32,
    cols: u32,
    cells: HashMap<Coord, Cell>,
}

impl ZoneGrid {
    /// Create an empty grid with the given dimensions.
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            cells: HashMap::new(),
        }
    }

    /// Create a grid with the standard terrain layout stamped on.
    pub fn with_standard_terrain(rows: u32, cols: u32) -> Self {
        let mut grid = Self::new(rows, cols);
        for &(row, col, terrain) in STANDARD_TERRAIN {
            let coord = Coord::new(row, col);
            if grid.in_bounds(coord) {
                grid.cells.insert(
                    coord,
                    Cell {
                        tag: CellTag::Terrain(terrain),
                        installation: None,
                    },
                );
            }
        }
        grid
    }

    /// Number of rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Whether the coordinate lies within the grid.
    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.row < self.rows && coord.col < self.cols
    }

    /// Look up an occupied cell.
    pub fn cell(&self, coord: Coord) -> Option<&Cell> {
        self.cells.get(&coord)
    }

    /// Iterate over all occupied cells.
    pub fn cells(&self) -> impl Iterator<Item = (Coord, &Cell)> {
        self.cells.iter().map(|(&coord, cell)| (coord, cell))
    }

    /// Assign, reassign or clear a cell's zone designation.
    ///
    /// Returns false (and leaves the cell unchanged) when the coordinate is
    /// out of bounds, the cell holds protected terrain, or an attempt is made
    /// to unzone a cell that still has an installation.
    pub fn set_zone(&mut self, coord: Coord, zone: Option<ZoneType>) -> bool {
        if !self.in_bounds(coord) {
            return false;
        }

        match self.cells.get_mut(&coord) {
            Some(cell) => {
                if matches!(cell.tag, CellTag::Terrain(_)) {
                    return false;
                }
                match zone {
                    Some(zone) => cell.tag = CellTag::Zoned(zone),
                    None => {
                        if cell.installation.is_some() {
                            return false;
                        }
                        self.cells.remove(&coord);
                    }
                }
                true
            }
            None => {
                if let Some(zone) = zone {
                    self.cells.insert(
                        coord,
                        Cell {
                            tag: CellTag::Zoned(zone),
                            installation: None,
                        },
                    );
                }
                true
            }
        }
    }

    /// Check whether an installation of `source_id` may be placed at `coord`.
    pub fn validate_placement(&self, coord: Coord, source_id: &str) -> Placement {
        let Some(cell) = self.cells.get(&coord) else {
            return Placement::Invalid("must be zoned");
        };

        if cell.installation.is_some() {
            return Placement::Invalid("already occupied");
        }

        // Terrain cells carry no exclusion table
        if let CellTag::Zoned(zone) = cell.tag
            && zone.exclusions().contains(&source_id)
        {
            return Placement::Invalid("not compatible with this zone type");
        }

        Placement::Valid
    }

    /// Associate an installation with a cell.
    ///
    /// Catalog counts and the budget ledger are the caller's responsibility;
    /// the [`CitySim`](crate::simulation::CitySim) facade performs all three
    /// mutations atomically.
    pub fn add_source(&mut self, coord: Coord, source_id: SourceID) -> bool {
        match self.cells.get_mut(&coord) {
            Some(cell) if cell.installation.is_none() => {
                cell.installation = Some(source_id);
                true
            }
            _ => false,
        }
    }

    /// Dissociate and return a cell's installation.
    pub fn remove_source(&mut self, coord: Coord) -> Option<SourceID> {
        self.cells.get_mut(&coord)?.installation.take()
    }

    /// Iterate over all installations with their hosting cell tags.
    pub fn installations(&self) -> impl Iterator<Item = (Coord, CellTag, &SourceID)> {
        self.cells.iter().filter_map(|(&coord, cell)| {
            cell.installation.as_ref().map(|id| (coord, cell.tag, id))
        })
    }

    /// Number of cells carrying the given tag.
    pub fn tag_cell_count(&self, tag: CellTag) -> usize {
        self.cells.values().filter(|cell| cell.tag == tag).count()
    }

    /// Insert a cell restored from a save envelope.
    ///
    /// The coordinate must be in bounds and not already occupied.
    pub(crate) fn restore_cell(&mut self, coord: Coord, cell: Cell) -> Result<()> {
        ensure!(self.in_bounds(coord), "Cell {coord} is out of bounds");
        ensure!(
            !self.cells.contains_key(&coord),
            "Duplicate cell {coord} in saved state"
        );
        self.cells.insert(coord, cell);
        Ok(())
    }

    /// Change the grid dimensions, evicting cells that fall out of bounds.
    ///
    /// Returns the number of evicted cells.
    pub fn resize(&mut self, rows: u32, cols: u32) -> usize {
        self.rows = rows;
        self.cols = cols;

        let before = self.cells.len();
        self.cells
            .retain(|coord, _| coord.row < rows && coord.col < cols);
        before - self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::grid;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn test_terrain_layout(grid: ZoneGrid) {
        assert_eq!(
            grid.cell(Coord::new(0, 0)).unwrap().tag,
            CellTag::Terrain(TerrainType::Forest)
        );
        assert_eq!(grid.tag_cell_count(CellTag::Terrain(TerrainType::River)), 8);
        assert_eq!(grid.tag_cell_count(CellTag::Terrain(TerrainType::Beach)), 4);
        assert!(grid.cell(Coord::new(3, 3)).is_none());
    }

    #[rstest]
    fn test_terrain_rejects_zone_mutation(mut grid: ZoneGrid) {
        // Terrain tags are immutable regardless of the requested zone type
        for zone in ZoneType::iter() {
            assert!(!grid.set_zone(Coord::new(0, 0), Some(zone)));
        }
        assert!(!grid.set_zone(Coord::new(0, 5), None));
        assert_eq!(
            grid.cell(Coord::new(0, 0)).unwrap().tag,
            CellTag::Terrain(TerrainType::Forest)
        );
    }

    #[rstest]
    fn test_set_zone(mut grid: ZoneGrid) {
        let coord = Coord::new(3, 3);
        assert!(grid.set_zone(coord, Some(ZoneType::Residential)));
        assert_eq!(
            grid.cell(coord).unwrap().tag,
            CellTag::Zoned(ZoneType::Residential)
        );

        // Reassignment moves the cell between zone buckets
        assert!(grid.set_zone(coord, Some(ZoneType::Industrial)));
        assert_eq!(grid.tag_cell_count(CellTag::Zoned(ZoneType::Residential)), 0);
        assert_eq!(grid.tag_cell_count(CellTag::Zoned(ZoneType::Industrial)), 1);

        assert!(grid.set_zone(coord, None));
        assert!(grid.cell(coord).is_none());

        assert!(!grid.set_zone(Coord::new(99, 0), Some(ZoneType::Commercial)));
    }

    #[rstest]
    fn test_unzone_refused_while_occupied(mut grid: ZoneGrid) {
        let coord = Coord::new(4, 4);
        grid.set_zone(coord, Some(ZoneType::Commercial));
        assert!(grid.add_source(coord, "solar".into()));

        assert!(!grid.set_zone(coord, None));
        assert!(grid.cell(coord).is_some());
    }

    #[rstest]
    fn test_validate_placement(mut grid: ZoneGrid) {
        let coord = Coord::new(3, 3);
        assert_eq!(
            grid.validate_placement(coord, "solar"),
            Placement::Invalid("must be zoned")
        );

        grid.set_zone(coord, Some(ZoneType::Residential));
        assert!(grid.validate_placement(coord, "solar").is_valid());

        // Fixed exclusion table: no hydro or biomass among houses
        assert_eq!(
            grid.validate_placement(coord, "hydro"),
            Placement::Invalid("not compatible with this zone type")
        );
        assert_eq!(
            grid.validate_placement(coord, "biomass"),
            Placement::Invalid("not compatible with this zone type")
        );

        grid.add_source(coord, "solar".into());
        assert_eq!(
            grid.validate_placement(coord, "wind"),
            Placement::Invalid("already occupied")
        );
    }

    #[rstest]
    fn test_terrain_has_no_exclusions(mut grid: ZoneGrid) {
        // Energy sources may be sited on terrain; only occupancy blocks them
        let beach = Coord::new(7, 0);
        assert!(grid.validate_placement(beach, "solar").is_valid());
        assert!(grid.validate_placement(Coord::new(0, 5), "hydro").is_valid());

        grid.add_source(beach, "solar".into());
        assert_eq!(
            grid.validate_placement(beach, "solar"),
            Placement::Invalid("already occupied")
        );
    }

    #[rstest]
    fn test_add_remove_source(mut grid: ZoneGrid) {
        let coord = Coord::new(2, 2);
        assert!(!grid.add_source(coord, "solar".into())); // unzoned

        grid.set_zone(coord, Some(ZoneType::Industrial));
        assert!(grid.add_source(coord, "solar".into()));
        assert!(!grid.add_source(coord, "wind".into())); // at most one per cell

        assert_eq!(grid.remove_source(coord), Some("solar".into()));
        assert_eq!(grid.remove_source(coord), None);
    }

    #[rstest]
    fn test_resize_evicts_out_of_bound_cells(mut grid: ZoneGrid) {
        grid.set_zone(Coord::new(6, 8), Some(ZoneType::Residential));
        let evicted = grid.resize(6, 6);

        // River cells 6-7, beach row 7, mountains cols 8-9 and the new zone all fall away
        assert!(evicted > 0);
        assert!(grid.cell(Coord::new(6, 8)).is_none());
        assert!(grid.cells().all(|(coord, _)| coord.row < 6 && coord.col < 6));
    }

    #[test]
    fn test_terrain_output_bonus() {
        assert_eq!(
            TerrainType::River.output_bonus("hydro"),
            Dimensionless(1.5)
        );
        assert_eq!(TerrainType::River.output_bonus("solar"), Dimensionless(1.0));
        assert_eq!(TerrainType::Forest.output_bonus("solar"), Dimensionless(0.8));
    }
}
