use super::network::capped_engagement;
use super::{
    freshness_penalty, post_age, recency_multiplier, DistanceEstimate, FeedScorer, Score,
    ScoringContext, ScoringInput,
};
use crate::config::{LocalWeights, NetworkWeights, RecencyCurve, ScoringConfig};
use crate::models::FeedMode;
use crate::utils::jaccard;

/// Distance-first scoring for posts by nearby developers
pub struct LocalScorer {
    recency: RecencyCurve,
    weights: LocalWeights,
    engagement: NetworkWeights,
}

impl LocalScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            recency: config.recency.clone(),
            weights: config.local.clone(),
            engagement: config.network.clone(),
        }
    }

    pub fn radius_multiplier(&self, distance_km: f64) -> f64 {
        self.weights
            .radius_tiers
            .iter()
            .find(|(max_km, _)| distance_km <= *max_km)
            .map(|(_, multiplier)| *multiplier)
            .unwrap_or(self.weights.beyond_multiplier)
    }

    /// Recency, skill overlap and engagement folded into [0, secondary_ceiling)
    fn secondary_factor(&self, input: &ScoringInput<'_>, ctx: &ScoringContext, distance_km: f64) -> f64 {
        let w = &self.weights;

        let mut recency =
            recency_multiplier(&self.recency, post_age(input.created_at, ctx.now)) * w.recency_damping;
        if distance_km <= w.near_recency_boost_km {
            recency *= w.near_recency_boost;
        }

        let skill = ctx
            .author(&input.post.author_id)
            .map(|author| jaccard(&ctx.viewer_skills, &author.skills))
            .unwrap_or(0.0)
            * w.skill_bonus_cap;

        let engagement = if self.engagement.engagement_cap > 0.0 {
            capped_engagement(&self.engagement, input.post) / self.engagement.engagement_cap
                * w.engagement_bonus_cap
        } else {
            0.0
        };

        let raw = recency + skill.min(w.skill_bonus_cap) + engagement.min(w.engagement_bonus_cap);
        w.secondary_ceiling * (raw / w.secondary_scale).tanh()
    }
}

impl FeedScorer for LocalScorer {
    fn mode(&self) -> FeedMode {
        FeedMode::Local
    }

    fn score(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> Score {
        let Some(distance) = input.distance else {
            // Not reachable through the composer, which only keeps located authors
            return Score {
                value: 0.0,
                reason: "Near you".to_string(),
            };
        };
        let km = distance.km();

        let value = self.radius_multiplier(km)
            * (1.0 + self.secondary_factor(input, ctx, km))
            * freshness_penalty(&self.weights.penalties, input.interaction);

        let reason = match distance {
            DistanceEstimate::Measured(km) => format!("{:.1} km away", km),
            DistanceEstimate::Regional(_) => "Near you".to_string(),
        };

        Score { value, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use crate::services::geo::distance_km;
    use crate::services::scoring::test_support::{input, post_aged};
    use crate::services::scoring::AuthorSignals;
    use chrono::Utc;

    fn scorer() -> LocalScorer {
        LocalScorer::new(&ScoringConfig::default())
    }

    fn located<'a>(post: &'a crate::models::Post, km: f64) -> ScoringInput<'a> {
        let mut i = input(post);
        i.distance = Some(DistanceEstimate::Measured(km));
        i
    }

    #[test]
    fn test_radius_tiers() {
        let s = scorer();
        assert_eq!(s.radius_multiplier(0.0), 100.0);
        assert_eq!(s.radius_multiplier(5.0), 100.0);
        assert_eq!(s.radius_multiplier(5.1), 50.0);
        assert_eq!(s.radius_multiplier(50.0), 20.0);
        assert_eq!(s.radius_multiplier(99.0), 5.0);
        assert_eq!(s.radius_multiplier(400.0), 1.0);
    }

    #[test]
    fn test_nearer_author_ranks_higher_at_same_time() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let near = post_aged(30, now);
        let far = post_aged(30, now);

        let near_km = distance_km(0.0, 0.0, 0.01, 0.0);
        let far_km = distance_km(0.0, 0.0, 1.0, 0.0);

        let near_score = scorer().score(&located(&near, near_km), &ctx);
        let far_score = scorer().score(&located(&far, far_km), &ctx);
        assert!(near_score.value > far_score.value);
        assert_eq!(near_score.reason, "1.1 km away");
    }

    #[test]
    fn test_distance_dominates_across_tiers() {
        let now = Utc::now();
        let s = scorer();
        let distances = [1.0, 10.0, 30.0, 80.0, 300.0];

        // Farther author gets every secondary advantage, nearer author none
        let mut ctx = ScoringContext::new(now);
        ctx.viewer_skills = ["rust".to_string(), "go".to_string()].into_iter().collect();

        for (i, near_km) in distances.iter().enumerate() {
            for far_km in distances.iter().skip(i + 1) {
                let near = post_aged(20 * 1440, now);
                let mut far = post_aged(1, now);
                far.reaction_count = 100;
                ctx.authors.insert(
                    far.author_id,
                    AuthorSignals {
                        skills: ctx.viewer_skills.clone(),
                        follower_count: 0,
                    },
                );

                let near_score = s.score(&located(&near, *near_km), &ctx).value;
                let far_score = s.score(&located(&far, *far_km), &ctx).value;
                assert!(
                    near_score > far_score,
                    "{} km scored {} but {} km scored {}",
                    near_km,
                    near_score,
                    far_km,
                    far_score
                );
            }
        }
    }

    #[test]
    fn test_regional_distance_reason() {
        let now = Utc::now();
        let post = post_aged(30, now);
        let mut i = input(&post);
        i.distance = Some(DistanceEstimate::Regional(10.0));
        let score = scorer().score(&i, &ScoringContext::new(now));
        assert_eq!(score.reason, "Near you");
        assert!(score.value >= 50.0);
    }

    #[test]
    fn test_freshness_penalty_monotonic() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let post = post_aged(120, now);
        let s = scorer();
        let score_with = |interaction| {
            let mut i = located(&post, 3.0);
            i.interaction = interaction;
            s.score(&i, &ctx).value
        };
        let none = score_with(InteractionKind::None);
        let viewed = score_with(InteractionKind::Viewed);
        let reacted = score_with(InteractionKind::Reacted);
        let commented = score_with(InteractionKind::Commented);
        assert!(commented < reacted && reacted < viewed && viewed < none);
    }
}
