use super::{
    freshness_penalty, post_age, recency_multiplier, FeedScorer, Score, ScoringContext,
    ScoringInput,
};
use crate::config::{NetworkWeights, RecencyCurve, ScoringConfig};
use crate::models::{FeedMode, Post};

/// Recency-first scoring for posts by the viewer's follow network
pub struct NetworkScorer {
    recency: RecencyCurve,
    weights: NetworkWeights,
}

impl NetworkScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            recency: config.recency.clone(),
            weights: config.network.clone(),
        }
    }

    /// Weighted engagement, capped so it never outweighs a recency step
    pub fn engagement(&self, post: &Post) -> f64 {
        capped_engagement(&self.weights, post)
    }
}

pub(crate) fn capped_engagement(weights: &NetworkWeights, post: &Post) -> f64 {
    let raw = post.reaction_count as f64 * weights.reaction_weight
        + post.comment_count as f64 * weights.comment_weight
        + post.view_count as f64 * weights.view_weight;
    raw.min(weights.engagement_cap)
}

impl FeedScorer for NetworkScorer {
    fn mode(&self) -> FeedMode {
        FeedMode::Network
    }

    fn score(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> Score {
        let age = post_age(input.created_at, ctx.now);
        let recency = recency_multiplier(&self.recency, age);

        let base = recency * self.weights.recency_scale + self.engagement(input.post);
        let mut value = base * freshness_penalty(&self.weights.penalties, input.interaction);

        let reason = if input.is_secondary_network {
            value *= self.weights.secondary_network_factor;
            "Followed by people you follow"
        } else {
            "From someone you follow"
        };

        Score {
            value,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use crate::services::scoring::test_support::{input, post_aged};
    use chrono::Utc;

    fn scorer() -> NetworkScorer {
        NetworkScorer::new(&ScoringConfig::default())
    }

    #[test]
    fn test_recent_post_beats_older_popular_post() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);

        let mut a = post_aged(60, now);
        a.reaction_count = 10;
        let b = post_aged(3 * 1440 - 1, now);

        let score_a = scorer().score(&input(&a), &ctx);
        let score_b = scorer().score(&input(&b), &ctx);
        assert!(score_a.value > score_b.value);
        assert_eq!(score_a.reason, "From someone you follow");
    }

    #[test]
    fn test_recency_dominates_two_buckets_apart() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let scorer = scorer();
        // Representative ages for each bucket: <1h, <6h, <24h, <3d, <7d, older
        let ages = [30, 3 * 60, 12 * 60, 2 * 1440, 5 * 1440, 10 * 1440];

        for (i, newer_age) in ages.iter().enumerate() {
            for older_age in ages.iter().skip(i + 2) {
                let newer = post_aged(*newer_age, now);
                let mut older = post_aged(*older_age, now);
                older.reaction_count = 1_000;
                older.comment_count = 1_000;

                let newer_score = scorer.score(&input(&newer), &ctx).value;
                let older_score = scorer.score(&input(&older), &ctx).value;
                assert!(
                    newer_score >= older_score,
                    "age {} scored {} below age {} at {}",
                    newer_age,
                    newer_score,
                    older_age,
                    older_score
                );
            }
        }
    }

    #[test]
    fn test_engagement_is_capped() {
        let now = Utc::now();
        let mut post = post_aged(10, now);
        post.reaction_count = 500;
        assert_eq!(scorer().engagement(&post), 10.0);
    }

    #[test]
    fn test_freshness_penalty_monotonic() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let post = post_aged(120, now);
        let scorer = scorer();

        let score_with = |interaction| {
            let mut i = input(&post);
            i.interaction = interaction;
            scorer.score(&i, &ctx).value
        };

        let none = score_with(InteractionKind::None);
        let viewed = score_with(InteractionKind::Viewed);
        let reacted = score_with(InteractionKind::Reacted);
        let commented = score_with(InteractionKind::Commented);
        assert!(commented < reacted && reacted < viewed && viewed < none);
    }

    #[test]
    fn test_secondary_network_discount() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let post = post_aged(5, now);
        let direct = scorer().score(&input(&post), &ctx);

        let mut i = input(&post);
        i.is_secondary_network = true;
        let secondary = scorer().score(&i, &ctx);

        assert!((secondary.value - direct.value * 0.7).abs() < 1e-9);
        assert_eq!(secondary.reason, "Followed by people you follow");
    }
}
