//! Power allocation: turning production and demand into zone income.
//!
//! The city runs on a shared grid with no transmission constraint. When
//! production covers demand every zone is fully powered wherever the
//! installations physically sit; under shortage, production is rationed
//! uniformly in proportion to each zone's demand.
use crate::catalog::EnergyCatalog;
use crate::grid::{CellTag, TerrainType, ZoneGrid, ZoneType};
use crate::units::{Dimensionless, Money, Power};
use crate::weather::WeatherKind;
use strum::IntoEnumIterator;

/// Income floor under shortage: even an unpowered zone keeps 10% of its base income.
pub const INCOME_FLOOR: f64 = 0.1;

/// Income factor applied when collaborators are unavailable (degraded mode).
pub const DEGRADED_INCOME_FACTOR: f64 = 0.5;

/// Inputs to an aggregation query.
///
/// `Degraded` stands in for missing collaborators during partial
/// initialisation: production is reported as zero and income falls back to a
/// fixed 50% of base. It must be requested explicitly; the facade always
/// queries `Live`.
pub enum PowerContext<'a> {
    /// Catalog and weather are available; compute real figures.
    Live {
        /// The energy catalog
        catalog: &'a EnergyCatalog,
        /// The current weather state
        weather: WeatherKind,
    },
    /// A collaborator is missing; report defensive defaults.
    Degraded,
}

/// Per-bucket aggregation results
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneStats {
    /// The zone or terrain bucket these figures describe
    pub tag: CellTag,
    /// Number of member cells
    pub cell_count: usize,
    /// Total power demand of the bucket
    pub demand: Power,
    /// Power physically produced by installations in the bucket's cells
    pub production: Power,
    /// Power allocated to the bucket after rationing
    pub allocated: Power,
    /// Percentage of demand met (100 for demandless buckets)
    pub efficiency: f64,
    /// Monthly income, after the rationing rule
    pub income: Money,
}

/// City-wide aggregation results
#[derive(Clone, Debug, PartialEq)]
pub struct CityReport {
    /// Total production across all cells
    pub production: Power,
    /// Total demand across all zones
    pub demand: Power,
    /// Percentage of demand met, capped at 100 (100 when demand is zero)
    pub efficiency: f64,
    /// Total monthly income across all zones
    pub monthly_income: Money,
    /// Whether the report was computed with defensive defaults
    pub degraded: bool,
    /// Per-bucket breakdown: the three zone types plus any terrain in use
    pub zones: Vec<ZoneStats>,
}

impl CityReport {
    /// Compute the full city report from the grid and the given context.
    ///
    /// Pure query: no state is mutated.
    pub fn compute(grid: &ZoneGrid, context: &PowerContext) -> CityReport {
        let buckets = report_buckets(grid);

        match context {
            PowerContext::Live { catalog, weather } => {
                Self::compute_live(grid, &buckets, catalog, *weather)
            }
            PowerContext::Degraded => Self::compute_degraded(grid, &buckets),
        }
    }

    fn compute_live(
        grid: &ZoneGrid,
        buckets: &[CellTag],
        catalog: &EnergyCatalog,
        weather: WeatherKind,
    ) -> CityReport {
        let production: Power = buckets
            .iter()
            .map(|&tag| bucket_production(grid, tag, catalog, weather))
            .sum();
        let demand: Power = buckets.iter().map(|&tag| bucket_demand(grid, tag)).sum();

        // Uniform proportional rationing across the shared grid
        let ratio = if demand.value() > 0.0 {
            (production / demand).0.min(1.0)
        } else {
            1.0
        };

        let zones = buckets
            .iter()
            .map(|&tag| {
                let bucket_demand = bucket_demand(grid, tag);
                let base_income = bucket_base_income(grid, tag);
                let has_demand = bucket_demand.value() > 0.0;

                ZoneStats {
                    tag,
                    cell_count: grid.tag_cell_count(tag),
                    demand: bucket_demand,
                    production: bucket_production(grid, tag, catalog, weather),
                    allocated: bucket_demand * Dimensionless(ratio),
                    // Zones with nothing to power are vacuously fully powered
                    efficiency: if has_demand { ratio * 100.0 } else { 100.0 },
                    income: zone_income(base_income, ratio),
                }
            })
            .collect::<Vec<_>>();

        let monthly_income = zones.iter().map(|stats| stats.income).sum();

        CityReport {
            production,
            demand,
            efficiency: city_efficiency(production, demand),
            monthly_income,
            degraded: false,
            zones,
        }
    }

    fn compute_degraded(grid: &ZoneGrid, buckets: &[CellTag]) -> CityReport {
        let zones = buckets
            .iter()
            .map(|&tag| {
                let demand = bucket_demand(grid, tag);
                let base_income = bucket_base_income(grid, tag);
                let has_demand = demand.value() > 0.0;

                ZoneStats {
                    tag,
                    cell_count: grid.tag_cell_count(tag),
                    demand,
                    production: Power(0.0),
                    allocated: Power(0.0),
                    efficiency: if has_demand {
                        DEGRADED_INCOME_FACTOR * 100.0
                    } else {
                        100.0
                    },
                    income: (base_income * Dimensionless(DEGRADED_INCOME_FACTOR)).floor(),
                }
            })
            .collect::<Vec<_>>();

        let demand = zones.iter().map(|stats| stats.demand).sum();
        let monthly_income = zones.iter().map(|stats| stats.income).sum();

        CityReport {
            production: Power(0.0),
            demand,
            efficiency: DEGRADED_INCOME_FACTOR * 100.0,
            monthly_income,
            degraded: true,
            zones,
        }
    }

    /// Number of zone types whose demand is fully met (terrain excluded).
    pub fn fully_powered_zone_types(&self) -> usize {
        self.zones
            .iter()
            .filter(|stats| matches!(stats.tag, CellTag::Zoned(_)) && stats.efficiency >= 100.0)
            .count()
    }
}

/// The buckets a report covers: every zone type, plus terrain types in use.
fn report_buckets(grid: &ZoneGrid) -> Vec<CellTag> {
    let zones = ZoneType::iter().map(CellTag::Zoned);
    let terrain = TerrainType::iter()
        .map(CellTag::Terrain)
        .filter(|&tag| grid.tag_cell_count(tag) > 0);

    zones.chain(terrain).collect()
}

/// Total demand of a bucket: cell count × per-cell demand (terrain demands nothing).
pub fn bucket_demand(grid: &ZoneGrid, tag: CellTag) -> Power {
    match tag {
        CellTag::Zoned(zone) => {
            let cells = grid.tag_cell_count(tag) as f64;
            zone.demand_per_cell() * Dimensionless(cells)
        }
        CellTag::Terrain(_) => Power(0.0),
    }
}

/// Base monthly income of a bucket at full power.
fn bucket_base_income(grid: &ZoneGrid, tag: CellTag) -> Money {
    match tag {
        CellTag::Zoned(zone) => {
            let cells = grid.tag_cell_count(tag) as f64;
            zone.income_per_cell() * Dimensionless(cells)
        }
        CellTag::Terrain(_) => Money(0.0),
    }
}

/// Power physically produced inside a bucket's cells under the given weather.
///
/// Terrain bonuses apply only to installations sited on that terrain.
pub fn bucket_production(
    grid: &ZoneGrid,
    tag: CellTag,
    catalog: &EnergyCatalog,
    weather: WeatherKind,
) -> Power {
    grid.installations()
        .filter(|&(_, cell_tag, _)| cell_tag == tag)
        .map(|(_, cell_tag, id)| {
            let output = catalog.current_output(&id.0, weather).unwrap_or(Power(0.0));
            match cell_tag {
                CellTag::Terrain(terrain) => output * terrain.output_bonus(&id.0),
                CellTag::Zoned(_) => output,
            }
        })
        .sum()
}

/// Monthly income for a zone given the city-wide allocation ratio.
///
/// Guarantees the 10% floor under shortage and rounds down to whole currency.
fn zone_income(base_income: Money, ratio: f64) -> Money {
    (base_income * Dimensionless(ratio.max(INCOME_FLOOR))).floor()
}

/// City efficiency percentage: demand coverage capped at 100.
///
/// Zero demand is vacuously fully powered.
fn city_efficiency(production: Power, demand: Power) -> f64 {
    if demand.value() > 0.0 {
        ((production / demand).0 * 100.0).min(100.0)
    } else {
        100.0
    }
}
