#![allow(missing_docs)]

//! The sustainability score: six weighted sub-scores, a letter grade and
//! achievement checks.
use crate::units::Carbon;
use std::fmt::Display;

/// Maximum points per sub-score.
pub const MAX_EFFICIENCY: f64 = 25.0;
pub const MAX_CARBON: f64 = 20.0;
pub const MAX_DIVERSITY: f64 = 20.0;
pub const MAX_RELIABILITY: f64 = 15.0;
pub const MAX_INNOVATION: f64 = 10.0;
pub const MAX_COMMUNITY: f64 = 10.0;

/// Carbon reduction (tons/year) worth the full carbon sub-score.
const CARBON_FULL_SCORE: f64 = 500.0;

/// Inputs to the score computation, gathered from the other components
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreInputs {
    /// City efficiency percentage (0–100)
    pub city_efficiency: f64,
    /// Net carbon reduction in tons per year (negative if fossil-dominated)
    pub carbon_reduction: Carbon,
    /// Distinct source types with at least one installation
    pub distinct_sources: usize,
    /// Total installations of advanced sources (geothermal, biomass)
    pub advanced_installations: u32,
    /// Zone types whose demand is fully met
    pub fully_powered_zone_types: usize,
    /// Total zone types
    pub total_zone_types: usize,
}

/// The six sub-scores, each independently capped
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreBreakdown {
    /// Demand coverage (max 25)
    pub efficiency: f64,
    /// Carbon reduction (max 20)
    pub carbon: f64,
    /// Source diversity (max 20)
    pub diversity: f64,
    /// Grid reliability (max 15)
    pub reliability: f64,
    /// Advanced technology adoption (max 10)
    pub innovation: f64,
    /// Community power coverage (max 10)
    pub community: f64,
}

impl ScoreBreakdown {
    /// Composite score, clamped to 0–100.
    pub fn total(&self) -> f64 {
        let sum = self.efficiency
            + self.carbon
            + self.diversity
            + self.reliability
            + self.innovation
            + self.community;
        sum.clamp(0.0, 100.0)
    }

    /// Letter grade for the composite score.
    pub fn grade(&self) -> Grade {
        Grade::from_score(self.total())
    }
}

/// Letter grade derived from the composite score
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
}

impl Grade {
    /// Map a 0–100 score to its grade via the fixed thresholds.
    pub fn from_score(score: f64) -> Grade {
        if score >= 90.0 {
            Grade::APlus
        } else if score >= 80.0 {
            Grade::A
        } else if score >= 70.0 {
            Grade::BPlus
        } else if score >= 60.0 {
            Grade::B
        } else if score >= 50.0 {
            Grade::CPlus
        } else if score >= 40.0 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
        };
        write!(f, "{label}")
    }
}

/// Compute the six capped sub-scores from the given inputs.
pub fn compute_score(inputs: &ScoreInputs) -> ScoreBreakdown {
    let efficiency = (inputs.city_efficiency * 0.25).min(MAX_EFFICIENCY);

    let carbon =
        (inputs.carbon_reduction.value() / CARBON_FULL_SCORE * MAX_CARBON).min(MAX_CARBON);

    let diversity = (inputs.distinct_sources as f64 * 4.0).min(MAX_DIVERSITY);

    let reliability = if inputs.city_efficiency >= 100.0 {
        MAX_RELIABILITY
    } else {
        (inputs.city_efficiency - 50.0).max(0.0) * 0.3
    };

    let innovation = (f64::from(inputs.advanced_installations) * 2.0).min(MAX_INNOVATION);

    let community = if inputs.total_zone_types > 0 {
        inputs.fully_powered_zone_types as f64 / inputs.total_zone_types as f64 * MAX_COMMUNITY
    } else {
        MAX_COMMUNITY
    };

    ScoreBreakdown {
        efficiency,
        carbon,
        diversity,
        reliability,
        innovation,
        community,
    }
}

/// Achievements unlocked by maxing out a sub-score.
///
/// Purely derived from the breakdown; no additional state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Achievement {
    /// Efficiency sub-score at its maximum
    FullyPowered,
    /// Carbon sub-score at its maximum
    CarbonChampion,
    /// Every source type in use
    DiversePortfolio,
    /// Reliability sub-score at its maximum
    AlwaysOn,
    /// Innovation sub-score at its maximum
    Innovator,
    /// Every zone type fully powered
    CommunityHero,
}

impl Display for Achievement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Achievement::FullyPowered => "Fully Powered",
            Achievement::CarbonChampion => "Carbon Champion",
            Achievement::DiversePortfolio => "Diverse Portfolio",
            Achievement::AlwaysOn => "Always On",
            Achievement::Innovator => "Innovator",
            Achievement::CommunityHero => "Community Hero",
        };
        write!(f, "{label}")
    }
}

/// The achievements unlocked by the given breakdown.
pub fn achievements(breakdown: &ScoreBreakdown) -> Vec<Achievement> {
    let thresholds = [
        (breakdown.efficiency, MAX_EFFICIENCY, Achievement::FullyPowered),
        (breakdown.carbon, MAX_CARBON, Achievement::CarbonChampion),
        (
            breakdown.diversity,
            MAX_DIVERSITY,
            Achievement::DiversePortfolio,
        ),
        (breakdown.reliability, MAX_RELIABILITY, Achievement::AlwaysOn),
        (breakdown.innovation, MAX_INNOVATION, Achievement::Innovator),
        (breakdown.community, MAX_COMMUNITY, Achievement::CommunityHero),
    ];

    thresholds
        .into_iter()
        .filter(|&(value, max, _)| value >= max)
        .map(|(_, _, achievement)| achievement)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn inputs() -> ScoreInputs {
        ScoreInputs {
            city_efficiency: 100.0,
            carbon_reduction: Carbon(500.0),
            distinct_sources: 5,
            advanced_installations: 5,
            fully_powered_zone_types: 3,
            total_zone_types: 3,
        }
    }

    #[test]
    fn test_perfect_score() {
        let breakdown = compute_score(&inputs());
        assert_approx_eq!(f64, breakdown.total(), 100.0);
        assert_eq!(breakdown.grade(), Grade::APlus);
        assert_eq!(achievements(&breakdown).len(), 6);
    }

    #[test]
    fn test_sub_scores_never_exceed_max() {
        // Extreme inputs must still respect every cap
        let breakdown = compute_score(&ScoreInputs {
            city_efficiency: 10_000.0,
            carbon_reduction: Carbon(1.0e6),
            distinct_sources: 10,
            advanced_installations: 99,
            fully_powered_zone_types: 3,
            total_zone_types: 3,
        });

        assert_approx_eq!(f64, breakdown.efficiency, MAX_EFFICIENCY);
        assert_approx_eq!(f64, breakdown.carbon, MAX_CARBON);
        assert_approx_eq!(f64, breakdown.diversity, MAX_DIVERSITY);
        assert_approx_eq!(f64, breakdown.reliability, MAX_RELIABILITY);
        assert_approx_eq!(f64, breakdown.innovation, MAX_INNOVATION);
        assert_approx_eq!(f64, breakdown.community, MAX_COMMUNITY);
        assert_approx_eq!(f64, breakdown.total(), 100.0);
    }

    #[test]
    fn test_reliability_below_full_efficiency() {
        let mut inputs = inputs();
        inputs.city_efficiency = 80.0;
        let breakdown = compute_score(&inputs);
        assert_approx_eq!(f64, breakdown.reliability, 9.0); // (80 - 50) × 0.3

        inputs.city_efficiency = 40.0;
        assert_approx_eq!(f64, compute_score(&inputs).reliability, 0.0);
    }

    #[test]
    fn test_fossil_city_scores_poorly() {
        let breakdown = compute_score(&ScoreInputs {
            city_efficiency: 100.0,
            carbon_reduction: Carbon(-400.0),
            distinct_sources: 1,
            advanced_installations: 0,
            fully_powered_zone_types: 3,
            total_zone_types: 3,
        });

        assert!(breakdown.carbon < 0.0);
        assert!(breakdown.total() < 60.0);
    }

    #[rstest]
    #[case(95.0, Grade::APlus)]
    #[case(90.0, Grade::APlus)]
    #[case(80.0, Grade::A)]
    #[case(70.0, Grade::BPlus)]
    #[case(60.0, Grade::B)]
    #[case(50.0, Grade::CPlus)]
    #[case(40.0, Grade::C)]
    #[case(39.9, Grade::D)]
    #[case(0.0, Grade::D)]
    fn test_grade_thresholds(#[case] score: f64, #[case] expected: Grade) {
        assert_eq!(Grade::from_score(score), expected);
    }
}
