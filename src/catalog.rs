//! The catalog of energy source types available to the player.
//!
//! The catalog owns the immutable source definitions and the mutable
//! per-source installation counts. All output/cost/carbon aggregates are
//! computed on demand from these two tables.
use crate::grid::ZoneType;
use crate::id::define_id_type;
use crate::units::{Carbon, Dimensionless, Money, Power};
use crate::weather::WeatherKind;
use anyhow::{Context, Result};
use indexmap::IndexMap;

define_id_type! {SourceID}

/// The weather state against which energy-mix percentages are computed.
///
/// Pinned to a fixed state rather than the live weather so the mix chart does
/// not change every weather tick.
pub const REFERENCE_WEATHER: WeatherKind = WeatherKind::Sunny;

/// Source IDs counted as advanced technology by the innovation sub-score.
pub const ADVANCED_SOURCES: [&str; 2] = ["geothermal", "biomass"];

/// Score bonus applied when a source is a good fit for the target zone type.
const ZONE_AFFINITY_BONUS: f64 = 25.0;

/// Numerator of the cost-efficiency recommendation term (cheaper sources score higher).
const COST_EFFICIENCY_SCALE: f64 = 200_000.0;

/// An immutable energy source definition
#[derive(Clone, Debug, PartialEq)]
pub struct EnergySource {
    /// Unique identifier for the source (e.g. "solar")
    pub id: SourceID,
    /// Display name (e.g. "Solar Farm")
    pub name: String,
    /// Cost of one installation
    pub base_cost: Money,
    /// Output of one installation under neutral weather
    pub base_output: Power,
    /// Tons of CO2 avoided per installation per year. Negative for fossil sources.
    pub carbon_impact: Carbon,
    /// Output multiplier per weather state. States not listed default to 1.0.
    pub weather_multipliers: IndexMap<WeatherKind, Dimensionless>,
}

/// One row of the energy-mix summary
#[derive(Clone, Debug, PartialEq)]
pub struct MixEntry {
    /// Number of installations of this source
    pub count: u32,
    /// Combined output at the reference weather
    pub output: Power,
    /// Share of total city output, in percent
    pub percentage: f64,
    /// Combined purchase cost of the installations
    pub cost: Money,
}

/// A ranked suggestion produced by [`EnergyCatalog::recommendations`]
#[derive(Clone, Debug, PartialEq)]
pub struct Recommendation {
    /// The recommended source
    pub id: SourceID,
    /// Composite suitability score (higher is better)
    pub score: f64,
}

/// Registry of energy source types and their installation counts
pub struct EnergyCatalog {
    sources: IndexMap<SourceID, EnergySource>,
    installed: IndexMap<SourceID, u32>,
}

impl EnergyCatalog {
    /// Create a catalog from the given source definitions with zero installations.
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = EnergySource>,
    {
        let sources: IndexMap<_, _> = sources
            .into_iter()
            .map(|source| (source.id.clone(), source))
            .collect();
        let installed = sources.keys().map(|id| (id.clone(), 0)).collect();

        Self { sources, installed }
    }

    /// The stock catalog: five renewable and two fossil source types.
    pub fn standard() -> Self {
        use WeatherKind::{Cloudy, Rainy, Stormy, Sunny, Windy};

        let source = |id: &str,
                      name: &str,
                      cost: f64,
                      output: f64,
                      carbon: f64,
                      multipliers: &[(WeatherKind, f64)]| {
            EnergySource {
                id: id.into(),
                name: name.into(),
                base_cost: Money(cost),
                base_output: Power(output),
                carbon_impact: Carbon(carbon),
                weather_multipliers: multipliers
                    .iter()
                    .map(|&(kind, value)| (kind, Dimensionless(value)))
                    .collect(),
            }
        };

        Self::new([
            source(
                "solar",
                "Solar Farm",
                12_000.0,
                100.0,
                50.0,
                &[
                    (Sunny, 1.4),
                    (Cloudy, 0.6),
                    (Windy, 0.9),
                    (Rainy, 0.3),
                    (Stormy, 0.1),
                ],
            ),
            source(
                "wind",
                "Wind Turbine",
                15_000.0,
                150.0,
                60.0,
                &[
                    (Sunny, 0.8),
                    (Windy, 1.6),
                    (Rainy, 1.1),
                    (Stormy, 0.5),
                ],
            ),
            source(
                "hydro",
                "Hydroelectric Dam",
                35_000.0,
                400.0,
                120.0,
                &[(Sunny, 0.9), (Rainy, 1.4), (Stormy, 1.5)],
            ),
            source("geothermal", "Geothermal Plant", 28_000.0, 250.0, 90.0, &[]),
            source("biomass", "Biomass Plant", 18_000.0, 180.0, 40.0, &[]),
            source("coal", "Coal Plant", 8_000.0, 500.0, -200.0, &[]),
            source(
                "natural_gas",
                "Natural Gas Plant",
                10_000.0,
                350.0,
                -120.0,
                &[],
            ),
        ])
    }

    /// Look up a source definition by ID.
    pub fn get(&self, id: &str) -> Option<&EnergySource> {
        self.sources.get(id)
    }

    /// Iterate over all source definitions in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &EnergySource> {
        self.sources.values()
    }

    /// The number of installations of the given source.
    pub fn count(&self, id: &str) -> u32 {
        self.installed.get(id).copied().unwrap_or(0)
    }

    /// Record one more installation of the given source.
    ///
    /// Unknown IDs are ignored (returns false).
    pub fn add_installation(&mut self, id: &str) -> bool {
        match self.installed.get_mut(id) {
            Some(count) => {
                *count += 1;
                true
            }
            None => {
                log::warn!("Ignoring installation of unknown energy source '{id}'");
                false
            }
        }
    }

    /// Record one fewer installation of the given source.
    ///
    /// A no-op at zero: the count never goes negative.
    pub fn remove_installation(&mut self, id: &str) {
        if let Some(count) = self.installed.get_mut(id) {
            *count = count.saturating_sub(1);
        }
    }

    /// The output multiplier for a source under the given weather.
    ///
    /// Defaults to 1.0 for weather states the source does not list, and for
    /// unknown source IDs.
    pub fn multiplier(&self, id: &str, weather: WeatherKind) -> Dimensionless {
        self.sources
            .get(id)
            .and_then(|source| source.weather_multipliers.get(&weather))
            .copied()
            .unwrap_or(Dimensionless(1.0))
    }

    /// The output of a single installation of the given source under the given weather.
    pub fn current_output(&self, id: &str, weather: WeatherKind) -> Option<Power> {
        let source = self.sources.get(id)?;
        Some(source.base_output * self.multiplier(id, weather))
    }

    /// Combined output of every installation in the city under the given weather.
    pub fn total_output(&self, weather: WeatherKind) -> Power {
        self.sources
            .values()
            .map(|source| {
                source.base_output
                    * self.multiplier(&source.id.0, weather)
                    * Dimensionless(f64::from(self.count(&source.id.0)))
            })
            .sum()
    }

    /// Combined purchase cost of every installation in the city.
    pub fn total_cost(&self) -> Money {
        self.sources
            .values()
            .map(|source| source.base_cost * Dimensionless(f64::from(self.count(&source.id.0))))
            .sum()
    }

    /// Net tons of CO2 avoided per year across all installations.
    ///
    /// Negative when fossil sources dominate.
    pub fn total_carbon_reduction(&self) -> Carbon {
        self.sources
            .values()
            .map(|source| {
                source.carbon_impact * Dimensionless(f64::from(self.count(&source.id.0)))
            })
            .sum()
    }

    /// The number of distinct source types with at least one installation.
    pub fn distinct_sources_in_use(&self) -> usize {
        self.installed.values().filter(|&&count| count > 0).count()
    }

    /// Total installations of advanced sources (see [`ADVANCED_SOURCES`]).
    pub fn advanced_installations(&self) -> u32 {
        ADVANCED_SOURCES.iter().map(|id| self.count(id)).sum()
    }

    /// Summarise the in-use sources with their share of total output.
    ///
    /// Percentages are computed at [`REFERENCE_WEATHER`], not the live weather.
    pub fn energy_mix(&self) -> IndexMap<SourceID, MixEntry> {
        let total = self.total_output(REFERENCE_WEATHER);

        self.sources
            .values()
            .filter(|source| self.count(&source.id.0) > 0)
            .map(|source| {
                let count = self.count(&source.id.0);
                let output = source.base_output
                    * self.multiplier(&source.id.0, REFERENCE_WEATHER)
                    * Dimensionless(f64::from(count));
                let percentage = if total.value() > 0.0 {
                    output.value() / total.value() * 100.0
                } else {
                    0.0
                };

                (
                    source.id.clone(),
                    MixEntry {
                        count,
                        output,
                        percentage,
                        cost: source.base_cost * Dimensionless(f64::from(count)),
                    },
                )
            })
            .collect()
    }

    /// Rank the sources affordable under `budget_cap` for the given zone and weather.
    ///
    /// Score = weather multiplier × 100 + zone-affinity bonus + cost-efficiency
    /// term. Ties keep catalog order.
    pub fn recommendations(
        &self,
        weather: WeatherKind,
        budget_cap: Money,
        zone: ZoneType,
    ) -> Vec<Recommendation> {
        let mut ranked: Vec<_> = self
            .sources
            .values()
            .filter(|source| source.base_cost <= budget_cap)
            .map(|source| {
                let score = self.multiplier(&source.id.0, weather).0 * 100.0
                    + zone_affinity_bonus(zone, &source.id.0)
                    + COST_EFFICIENCY_SCALE / source.base_cost.value();
                Recommendation {
                    id: source.id.clone(),
                    score,
                }
            })
            .collect();

        // Stable sort keeps catalog order for equal scores
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// The installation count per source, for the save envelope.
    pub fn export_counts(&self) -> IndexMap<SourceID, u32> {
        self.installed.clone()
    }

    /// Overwrite the installation counts from a save envelope.
    ///
    /// Counts for sources missing from the map are zeroed. Unknown source IDs
    /// are a hard error (corrupt save data).
    pub fn restore_counts(&mut self, counts: &IndexMap<SourceID, u32>) -> Result<()> {
        for id in counts.keys() {
            self.sources
                .get(id.0.as_ref())
                .with_context(|| format!("Unknown energy source '{id}' in saved state"))?;
        }

        for (id, count) in &mut self.installed {
            *count = counts.get(id.0.as_ref()).copied().unwrap_or(0);
        }

        Ok(())
    }

    /// Zero every installation count.
    pub fn reset_counts(&mut self) {
        for count in self.installed.values_mut() {
            *count = 0;
        }
    }
}

/// Fixed zone-affinity table for recommendations.
///
/// Residential favours quiet rooftop-scale sources, commercial favours
/// wind/solar, industrial favours the heavy producers.
fn zone_affinity_bonus(zone: ZoneType, id: &str) -> f64 {
    let favoured: &[&str] = match zone {
        ZoneType::Residential => &["solar", "geothermal"],
        ZoneType::Commercial => &["wind", "solar"],
        ZoneType::Industrial => &["hydro", "biomass"],
    };

    if favoured.contains(&id) {
        ZONE_AFFINITY_BONUS
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::catalog;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_installation_count_floor(mut catalog: EnergyCatalog) {
        catalog.add_installation("solar");
        catalog.add_installation("solar");

        // More removals than installations must floor at zero
        for _ in 0..5 {
            catalog.remove_installation("solar");
        }
        assert_eq!(catalog.count("solar"), 0);

        // Unknown IDs are ignored entirely
        assert!(!catalog.add_installation("fusion"));
        catalog.remove_installation("fusion");
        assert_eq!(catalog.count("fusion"), 0);
    }

    #[rstest]
    fn test_current_output(catalog: EnergyCatalog) {
        let sunny = catalog.current_output("solar", WeatherKind::Sunny).unwrap();
        assert_approx_eq!(f64, sunny.value(), 140.0);

        // Geothermal lists no multipliers, so every weather state is neutral
        let stormy = catalog
            .current_output("geothermal", WeatherKind::Stormy)
            .unwrap();
        assert_approx_eq!(f64, stormy.value(), 250.0);

        assert!(catalog.current_output("fusion", WeatherKind::Sunny).is_none());
    }

    #[rstest]
    fn test_totals(mut catalog: EnergyCatalog) {
        catalog.add_installation("solar");
        catalog.add_installation("solar");
        catalog.add_installation("coal");

        assert_approx_eq!(
            f64,
            catalog.total_output(WeatherKind::Sunny).value(),
            2.0 * 140.0 + 500.0
        );
        assert_approx_eq!(f64, catalog.total_cost().value(), 2.0 * 12_000.0 + 8_000.0);

        // Fossil-heavy mix drives the aggregate negative
        assert_approx_eq!(
            f64,
            catalog.total_carbon_reduction().value(),
            2.0 * 50.0 - 200.0
        );
    }

    #[rstest]
    fn test_energy_mix_reference_weather(mut catalog: EnergyCatalog) {
        catalog.add_installation("solar");
        catalog.add_installation("wind");

        let mix = catalog.energy_mix();
        assert_eq!(mix.len(), 2);

        let total: f64 = mix.values().map(|entry| entry.percentage).sum();
        assert_approx_eq!(f64, total, 100.0);

        // Solar: 140 of 260 at the sunny reference weather
        let solar = mix.get("solar").unwrap();
        assert_eq!(solar.count, 1);
        assert_approx_eq!(f64, solar.percentage, 140.0 / 260.0 * 100.0);
    }

    #[rstest]
    fn test_recommendations_filter_and_order(catalog: EnergyCatalog) {
        let ranked =
            catalog.recommendations(WeatherKind::Sunny, Money(13_000.0), ZoneType::Residential);

        // Only solar ($12k), coal ($8k) and natural gas ($10k) are affordable
        let ids: Vec<_> = ranked.iter().map(|r| r.id.0.as_ref().to_string()).collect();
        assert_eq!(ids.len(), 3);

        // Solar leads: 1.4 × 100 + 25 affinity + cost term
        assert_eq!(ids[0], "solar");
        assert_approx_eq!(f64, ranked[0].score, 140.0 + 25.0 + 200_000.0 / 12_000.0);
    }

    #[rstest]
    fn test_restore_counts(mut catalog: EnergyCatalog) {
        let counts: IndexMap<SourceID, u32> =
            [("solar".into(), 3), ("wind".into(), 1)].into_iter().collect();
        catalog.restore_counts(&counts).unwrap();
        assert_eq!(catalog.count("solar"), 3);
        assert_eq!(catalog.count("coal"), 0);

        let bad: IndexMap<SourceID, u32> = [("fusion".into(), 1)].into_iter().collect();
        assert!(catalog.restore_counts(&bad).is_err());
    }
}
