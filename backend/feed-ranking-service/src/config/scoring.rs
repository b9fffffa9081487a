//! Scoring weights and thresholds.
//!
//! Built once at startup and shared read-only by every scorer, so tests can
//! tune a single mode without touching global state.

use serde::{Deserialize, Serialize};

/// Step function over post age
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyCurve {
    /// (exclusive upper bound on age in minutes, multiplier), ascending by age
    pub steps: Vec<(i64, f64)>,
    /// Multiplier for anything older than the last step
    pub floor: f64,
}

impl Default for RecencyCurve {
    fn default() -> Self {
        Self {
            steps: vec![
                (60, 10.0),       // < 1h
                (6 * 60, 6.0),    // < 6h
                (24 * 60, 3.0),   // < 24h
                (3 * 1440, 1.5),  // < 3d
                (7 * 1440, 0.5),  // < 7d
            ],
            floor: 0.1,
        }
    }
}

impl RecencyCurve {
    pub fn max_multiplier(&self) -> f64 {
        self.steps
            .iter()
            .map(|(_, m)| *m)
            .fold(self.floor, f64::max)
    }
}

/// Multiplicative penalties for content the viewer already engaged with
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FreshnessPenalties {
    pub viewed: f64,
    pub reacted: f64,
    pub commented: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub recency_scale: f64,
    pub reaction_weight: f64,
    pub comment_weight: f64,
    pub view_weight: f64,
    pub engagement_cap: f64,
    pub penalties: FreshnessPenalties,
    pub secondary_network_factor: f64,
}

impl Default for NetworkWeights {
    fn default() -> Self {
        Self {
            recency_scale: 10.0,
            reaction_weight: 1.5,
            comment_weight: 2.0,
            view_weight: 0.1,
            engagement_cap: 10.0,
            penalties: FreshnessPenalties {
                viewed: 0.15,
                reacted: 0.05,
                commented: 0.02,
            },
            secondary_network_factor: 0.7,
        }
    }
}

/// Assumed distances when only region membership is known
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegionalDistances {
    pub same_city_km: f64,
    pub same_state_km: f64,
    pub same_country_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalWeights {
    /// (inclusive max distance km, multiplier), ascending by distance
    pub radius_tiers: Vec<(f64, f64)>,
    pub beyond_multiplier: f64,
    pub recency_damping: f64,
    pub near_recency_boost_km: f64,
    pub near_recency_boost: f64,
    pub skill_bonus_cap: f64,
    pub engagement_bonus_cap: f64,
    /// Upper bound of the squashed secondary factor; must stay below the
    /// smallest ratio between adjacent radius tiers minus one
    pub secondary_ceiling: f64,
    pub secondary_scale: f64,
    pub penalties: FreshnessPenalties,
    pub regional: RegionalDistances,
}

impl Default for LocalWeights {
    fn default() -> Self {
        Self {
            radius_tiers: vec![(5.0, 100.0), (20.0, 50.0), (50.0, 20.0), (100.0, 5.0)],
            beyond_multiplier: 1.0,
            recency_damping: 0.3,
            near_recency_boost_km: 25.0,
            near_recency_boost: 2.0,
            skill_bonus_cap: 0.5,
            engagement_bonus_cap: 0.3,
            secondary_ceiling: 0.95,
            secondary_scale: 4.0,
            penalties: FreshnessPenalties {
                viewed: 0.15,
                reacted: 0.05,
                commented: 0.02,
            },
            regional: RegionalDistances {
                same_city_km: 10.0,
                same_state_km: 50.0,
                same_country_km: 150.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalWeights {
    pub quality: f64,
    pub trending: f64,
    pub personalization: f64,
    pub recency: f64,
    pub diversity: f64,
    pub penalties: FreshnessPenalties,
    /// Content length that earns the full length share of quality
    pub quality_length_target: usize,
    /// Engagement volume at which trending stops being discounted
    pub trending_volume_reference: f64,
    /// Follower count treated as full reputation
    pub reputation_reference: f64,
}

impl Default for GlobalWeights {
    fn default() -> Self {
        Self {
            quality: 0.35,
            trending: 0.25,
            personalization: 0.20,
            recency: 0.12,
            diversity: 0.08,
            penalties: FreshnessPenalties {
                viewed: 0.10,
                reacted: 0.03,
                commented: 0.01,
            },
            quality_length_target: 280,
            trending_volume_reference: 50.0,
            reputation_reference: 1000.0,
        }
    }
}

impl GlobalWeights {
    pub fn total(&self) -> f64 {
        self.quality + self.trending + self.personalization + self.recency + self.diversity
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub recency: RecencyCurve,
    pub network: NetworkWeights,
    pub local: LocalWeights,
    pub global: GlobalWeights,
    /// Fraction of the window's score range used as the tie-break jitter bound
    pub tie_jitter_fraction: f64,
}

impl ScoringConfig {
    pub fn with_default_jitter() -> Self {
        Self {
            tie_jitter_fraction: 0.001,
            ..Self::default()
        }
    }

    /// Reject weight sets that would break the per-mode dominance rules
    pub fn validate(&self) -> Result<(), String> {
        if self.recency.steps.windows(2).any(|w| w[0].0 >= w[1].0 || w[0].1 < w[1].1) {
            return Err("recency steps must be ascending in age and non-increasing".into());
        }

        for (name, p) in [
            ("network", self.network.penalties),
            ("local", self.local.penalties),
            ("global", self.global.penalties),
        ] {
            if !(p.commented < p.reacted && p.reacted < p.viewed && p.viewed <= 1.0) {
                return Err(format!(
                    "{} penalties must satisfy commented < reacted < viewed <= 1",
                    name
                ));
            }
        }

        let tiers = &self.local.radius_tiers;
        if tiers.is_empty() {
            return Err("local radius tiers must not be empty".into());
        }
        let mut multipliers: Vec<f64> = tiers.iter().map(|(_, m)| *m).collect();
        multipliers.push(self.local.beyond_multiplier);
        let mut min_ratio = f64::MAX;
        for w in tiers.windows(2) {
            if w[0].0 >= w[1].0 {
                return Err("local radius tiers must be ascending by distance".into());
            }
        }
        for w in multipliers.windows(2) {
            if w[1] <= 0.0 || w[0] <= w[1] {
                return Err("local tier multipliers must be strictly decreasing".into());
            }
            min_ratio = min_ratio.min(w[0] / w[1]);
        }
        if self.local.secondary_ceiling >= min_ratio - 1.0 {
            return Err(format!(
                "local secondary_ceiling {} must be below {} so distance tiers dominate",
                self.local.secondary_ceiling,
                min_ratio - 1.0
            ));
        }

        if (self.global.total() - 1.0).abs() > 1e-6 {
            return Err(format!(
                "global weights must sum to 1.0, got {}",
                self.global.total()
            ));
        }

        if !(0.0..=0.01).contains(&self.tie_jitter_fraction) {
            return Err("tie_jitter_fraction must be within [0, 0.01]".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ScoringConfig::default().validate().is_ok());
        assert!(ScoringConfig::with_default_jitter().validate().is_ok());
    }

    #[test]
    fn test_rejects_ceiling_that_breaks_distance_dominance() {
        let mut config = ScoringConfig::default();
        config.local.secondary_ceiling = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unordered_penalties() {
        let mut config = ScoringConfig::default();
        config.global.penalties.reacted = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_global_weights_not_summing_to_one() {
        let mut config = ScoringConfig::default();
        config.global.quality = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recency_max_multiplier() {
        assert_eq!(RecencyCurve::default().max_multiplier(), 10.0);
    }
}
