use super::{
    freshness_penalty, post_age, recency_bucket, recency_multiplier, FeedScorer, Score,
    ScoringContext, ScoringInput,
};
use crate::config::{GlobalWeights, RecencyCurve, ScoringConfig};
use crate::models::{FeedMode, Post};
use crate::utils::{jaccard, log_scale, normalize_score};
use std::collections::HashSet;

const LENGTH_SHARE: f64 = 0.4;
const CODE_SHARE: f64 = 0.25;
const IMAGE_SHARE: f64 = 0.2;
const LINK_SHARE: f64 = 0.15;

const SKILL_SHARE: f64 = 0.5;
const NEW_AUTHOR_SHARE: f64 = 0.25;
const REPUTATION_SHARE: f64 = 0.25;

const UNSEEN_AUTHOR_SHARE: f64 = 0.5;
const UNSEEN_SKILL_SHARE: f64 = 0.3;
const UNSEEN_BUCKET_SHARE: f64 = 0.2;

const REACTION_ENGAGEMENT: f64 = 2.0;
const COMMENT_ENGAGEMENT: f64 = 3.0;

/// Per-component values, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalComponents {
    pub quality: f64,
    pub trending: f64,
    pub skill_match: f64,
    pub new_author: f64,
    pub reputation: f64,
    pub recency: f64,
    pub diversity: f64,
}

impl GlobalComponents {
    pub fn personalization(&self) -> f64 {
        self.skill_match * SKILL_SHARE
            + self.new_author * NEW_AUTHOR_SHARE
            + self.reputation * REPUTATION_SHARE
    }
}

/// Weighted multi-factor scoring for discovery posts
pub struct GlobalScorer {
    recency: RecencyCurve,
    weights: GlobalWeights,
}

impl GlobalScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            recency: config.recency.clone(),
            weights: config.global.clone(),
        }
    }

    pub fn quality(&self, post: &Post) -> f64 {
        let target = self.weights.quality_length_target.max(1) as f64;
        let length = (post.content.chars().count() as f64 / target).min(1.0);

        let mut quality = length * LENGTH_SHARE;
        if post.has_code() {
            quality += CODE_SHARE;
        }
        if post.has_image() {
            quality += IMAGE_SHARE;
        }
        if post.has_link() {
            quality += LINK_SHARE;
        }
        quality.min(1.0)
    }

    /// Share of engagement that happened recently, discounted for small volumes
    pub fn trending(&self, post: &Post) -> f64 {
        let recent = post.recent_reaction_count as f64 * REACTION_ENGAGEMENT
            + post.recent_comment_count as f64 * COMMENT_ENGAGEMENT;
        let total = post.reaction_count as f64 * REACTION_ENGAGEMENT
            + post.comment_count as f64 * COMMENT_ENGAGEMENT;
        if recent <= 0.0 || total <= 0.0 {
            return 0.0;
        }
        let velocity = (recent / total).min(1.0);
        velocity * log_scale(recent, self.weights.trending_volume_reference)
    }

    /// Which recency step a post falls into, shared with the diversity state
    pub fn recency_bucket(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> usize {
        recency_bucket(&self.recency, post_age(input.created_at, ctx.now))
    }

    pub fn components(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> GlobalComponents {
        let post = input.post;
        let author = ctx.author(&post.author_id);
        let empty = HashSet::new();
        let author_skills = author.map(|a| &a.skills).unwrap_or(&empty);

        let recency = recency_multiplier(&self.recency, post_age(input.created_at, ctx.now));
        let bucket = self.recency_bucket(input, ctx);

        let state = &ctx.diversity;
        let mut diversity = 0.0;
        if !state.has_author(&post.author_id) {
            diversity += UNSEEN_AUTHOR_SHARE;
        }
        if author_skills.iter().any(|skill| !state.has_skill(skill)) {
            diversity += UNSEEN_SKILL_SHARE;
        }
        if !state.has_bucket(bucket) {
            diversity += UNSEEN_BUCKET_SHARE;
        }

        GlobalComponents {
            quality: self.quality(post),
            trending: self.trending(post),
            skill_match: jaccard(&ctx.viewer_skills, author_skills),
            new_author: if ctx.engaged_authors.contains(&post.author_id) {
                0.0
            } else {
                1.0
            },
            reputation: log_scale(
                author.map(|a| a.follower_count).unwrap_or(0) as f64,
                self.weights.reputation_reference,
            ),
            recency: normalize_score(recency, 0.0, self.recency.max_multiplier()),
            diversity,
        }
    }

    fn reason(&self, post: &Post, c: &GlobalComponents) -> &'static str {
        let w = &self.weights;
        let candidates = [
            (c.trending * w.trending, "Trending right now"),
            (c.skill_match * SKILL_SHARE * w.personalization, "Matches your skills"),
            (
                if post.has_code() { c.quality * w.quality } else { 0.0 },
                "Rich log with code",
            ),
            (
                (c.new_author * NEW_AUTHOR_SHARE + c.reputation * REPUTATION_SHARE)
                    * w.personalization,
                "New voice for you",
            ),
            (c.recency * w.recency, "Fresh from the community"),
        ];

        candidates
            .iter()
            .fold((0.0, "Fresh from the community"), |best, (value, label)| {
                if *value > best.0 {
                    (*value, *label)
                } else {
                    best
                }
            })
            .1
    }
}

impl FeedScorer for GlobalScorer {
    fn mode(&self) -> FeedMode {
        FeedMode::Global
    }

    fn score(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> Score {
        let c = self.components(input, ctx);
        let w = &self.weights;

        let blended = w.quality * c.quality
            + w.trending * c.trending
            + w.personalization * c.personalization()
            + w.recency * c.recency
            + w.diversity * c.diversity;

        Score {
            value: blended * freshness_penalty(&w.penalties, input.interaction),
            reason: self.reason(input.post, &c).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use crate::services::scoring::test_support::{input, post_aged};
    use crate::services::scoring::AuthorSignals;
    use chrono::Utc;

    fn scorer() -> GlobalScorer {
        GlobalScorer::new(&ScoringConfig::default())
    }

    #[test]
    fn test_quality_rewards_rich_posts() {
        let now = Utc::now();
        let plain = post_aged(10, now);
        let mut rich = post_aged(10, now);
        rich.content = "x".repeat(400);
        rich.code_snippet = Some("fn main() {}".into());
        rich.image_url = Some("https://img".into());
        rich.link = Some("https://example.dev".into());

        assert!((scorer().quality(&rich) - 1.0).abs() < 1e-9);
        assert!(scorer().quality(&plain) < 0.2);
    }

    #[test]
    fn test_trending_needs_recent_engagement() {
        let now = Utc::now();
        let mut stale = post_aged(10, now);
        stale.reaction_count = 40;
        assert_eq!(scorer().trending(&stale), 0.0);

        let mut hot = post_aged(10, now);
        hot.reaction_count = 40;
        hot.recent_reaction_count = 40;
        hot.comment_count = 10;
        hot.recent_comment_count = 10;
        assert!(scorer().trending(&hot) > 0.9);
    }

    #[test]
    fn test_components_within_unit_interval() {
        let now = Utc::now();
        let mut post = post_aged(5, now);
        post.reaction_count = 10_000;
        post.recent_reaction_count = 10_000;
        post.comment_count = 10_000;
        post.recent_comment_count = 10_000;
        let mut ctx = ScoringContext::new(now);
        ctx.viewer_skills = ["rust".to_string()].into_iter().collect();
        ctx.authors.insert(
            post.author_id,
            AuthorSignals {
                skills: ctx.viewer_skills.clone(),
                follower_count: 1_000_000,
            },
        );

        let c = scorer().components(&input(&post), &ctx);
        for value in [
            c.quality,
            c.trending,
            c.personalization(),
            c.recency,
            c.diversity,
        ] {
            assert!((0.0..=1.0).contains(&value), "component {} out of range", value);
        }
        let total = scorer().score(&input(&post), &ctx).value;
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_skill_match_reason() {
        let now = Utc::now();
        let post = post_aged(3 * 1440, now);
        let mut ctx = ScoringContext::new(now);
        ctx.viewer_skills = ["rust".to_string(), "wasm".to_string()].into_iter().collect();
        ctx.engaged_authors.insert(post.author_id);
        ctx.authors.insert(
            post.author_id,
            AuthorSignals {
                skills: ctx.viewer_skills.clone(),
                follower_count: 0,
            },
        );

        let score = scorer().score(&input(&post), &ctx);
        assert_eq!(score.reason, "Matches your skills");
    }

    #[test]
    fn test_seen_author_lowers_diversity() {
        let now = Utc::now();
        let post = post_aged(5, now);
        let mut ctx = ScoringContext::new(now);
        let fresh = scorer().score(&input(&post), &ctx).value;

        ctx.diversity.observe(post.author_id, &HashSet::new(), 0);
        let repeated = scorer().score(&input(&post), &ctx).value;
        assert!(repeated < fresh);
    }

    #[test]
    fn test_freshness_penalty_monotonic() {
        let now = Utc::now();
        let ctx = ScoringContext::new(now);
        let post = post_aged(300, now);
        let s = scorer();
        let score_with = |interaction| {
            let mut i = input(&post);
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
