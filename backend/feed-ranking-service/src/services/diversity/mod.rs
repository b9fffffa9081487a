use crate::models::FeedCandidate;
use crate::services::scoring::{FeedScorer, GlobalScorer, ScoringContext, ScoringInput};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// What the page under construction already covers
#[derive(Debug, Clone, Default)]
pub struct DiversityState {
    authors: HashSet<Uuid>,
    skills: HashSet<String>,
    buckets: HashSet<usize>,
}

impl DiversityState {
    pub fn has_author(&self, author_id: &Uuid) -> bool {
        self.authors.contains(author_id)
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.contains(skill)
    }

    pub fn has_bucket(&self, bucket: usize) -> bool {
        self.buckets.contains(&bucket)
    }

    pub fn observe(&mut self, author_id: Uuid, skills: &HashSet<String>, bucket: usize) {
        self.authors.insert(author_id);
        self.skills.extend(skills.iter().cloned());
        self.buckets.insert(bucket);
    }

    pub fn clear(&mut self) {
        self.authors.clear();
        self.skills.clear();
        self.buckets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

/// Diversity Layer for global pages
///
/// Greedy page construction: every pick re-scores the remaining candidates
/// against what the page already holds, so the diversity component reflects
/// the actual page. Authors at `max_per_author` are skipped for the rest of
/// the page.
pub struct DiversityLayer {
    max_per_author: usize,
}

impl DiversityLayer {
    pub fn new(max_per_author: usize) -> Self {
        Self {
            max_per_author: max_per_author.max(1),
        }
    }

    pub fn max_per_author(&self) -> usize {
        self.max_per_author
    }

    /// Build one page of up to `page_size` items from `remaining`.
    /// Candidates left out stay in `remaining` in unspecified order.
    pub fn rerank_page(
        &self,
        remaining: &mut Vec<FeedCandidate>,
        page_size: usize,
        scorer: &GlobalScorer,
        ctx: &mut ScoringContext,
    ) -> Vec<FeedCandidate> {
        ctx.diversity.clear();
        let mut page: Vec<FeedCandidate> = Vec::with_capacity(page_size);
        let mut per_author: HashMap<Uuid, usize> = HashMap::new();

        while page.len() < page_size {
            let mut best: Option<usize> = None;

            for i in 0..remaining.len() {
                let author = remaining[i].author_id();
                // Hard constraint: author already at the page cap
                if per_author.get(&author).copied().unwrap_or(0) >= self.max_per_author {
                    continue;
                }

                let score = scorer.score(&ScoringInput::from_candidate(&remaining[i]), ctx);
                let candidate = &mut remaining[i];
                candidate.score = score.value;
                candidate.reason = score.reason;

                best = match best {
                    Some(b) if remaining[b].rank_cmp(&remaining[i]).is_le() => Some(b),
                    _ => Some(i),
                };
            }

            let Some(best) = best else {
                break;
            };

            let picked = remaining.swap_remove(best);
            let bucket = scorer.recency_bucket(&ScoringInput::from_candidate(&picked), ctx);
            let skills = ctx
                .author(&picked.author_id())
                .map(|a| a.skills.clone())
                .unwrap_or_default();
            ctx.diversity.observe(picked.author_id(), &skills, bucket);
            *per_author.entry(picked.author_id()).or_insert(0) += 1;
            page.push(picked);
        }

        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{FeedMode, InteractionKind, Post};
    use crate::services::scoring::AuthorSignals;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn candidate(author: Uuid, minutes_ago: i64, content_len: usize) -> FeedCandidate {
        let created_at = Utc::now() - Duration::minutes(minutes_ago);
        let post = Post::new(Uuid::new_v4(), author, "x".repeat(content_len), created_at);
        FeedCandidate {
            post: Arc::new(post),
            created_at,
            distance_km: None,
            distance_is_regional: false,
            score: 0.0,
            jitter: 0.0,
            mode: FeedMode::Global,
            is_secondary_network: false,
            interaction: InteractionKind::None,
            reason: String::new(),
        }
    }

    #[test]
    fn test_author_cap_per_page() {
        let layer = DiversityLayer::new(2);
        let scorer = GlobalScorer::new(&ScoringConfig::default());
        let mut ctx = ScoringContext::new(Utc::now());

        let prolific = Uuid::new_v4();
        let mut remaining: Vec<FeedCandidate> =
            (0..6).map(|i| candidate(prolific, i, 280)).collect();
        remaining.push(candidate(Uuid::new_v4(), 500, 10));
        remaining.push(candidate(Uuid::new_v4(), 600, 10));

        let page = layer.rerank_page(&mut remaining, 5, &scorer, &mut ctx);

        let from_prolific = page.iter().filter(|c| c.author_id() == prolific).count();
        assert_eq!(from_prolific, 2);
        assert_eq!(page.len(), 4);
        assert_eq!(remaining.len(), 4);
    }

    #[test]
    fn test_page_is_in_rank_order() {
        let layer = DiversityLayer::new(2);
        let scorer = GlobalScorer::new(&ScoringConfig::default());
        let mut ctx = ScoringContext::new(Utc::now());

        let mut remaining: Vec<FeedCandidate> = (0..10)
            .map(|i| candidate(Uuid::new_v4(), i * 90, 20 + i as usize * 25))
            .collect();
        let page = layer.rerank_page(&mut remaining, 7, &scorer, &mut ctx);

        assert_eq!(page.len(), 7);
        for pair in page.windows(2) {
            assert!(pair[0].rank_cmp(&pair[1]).is_le());
        }
    }

    #[test]
    fn test_unseen_author_beats_repeat_author_on_tie() {
        let layer = DiversityLayer::new(2);
        let scorer = GlobalScorer::new(&ScoringConfig::default());
        let mut ctx = ScoringContext::new(Utc::now());

        let repeat = Uuid::new_v4();
        let other = Uuid::new_v4();
        ctx.authors.insert(repeat, AuthorSignals::default());
        ctx.authors.insert(other, AuthorSignals::default());

        let mut remaining = vec![
            candidate(repeat, 5, 100),
            candidate(repeat, 5, 100),
            candidate(other, 5, 100),
        ];
        let page = layer.rerank_page(&mut remaining, 2, &scorer, &mut ctx);

        let authors: HashSet<Uuid> = page.iter().map(|c| c.author_id()).collect();
        assert_eq!(authors.len(), 2);
    }

    #[test]
    fn test_state_resets_per_page() {
        let layer = DiversityLayer::new(2);
        let scorer = GlobalScorer::new(&ScoringConfig::default());
        let mut ctx = ScoringContext::new(Utc::now());
        let author = Uuid::new_v4();

        let mut remaining = vec![candidate(author, 1, 50), candidate(author, 2, 50)];
        let first = layer.rerank_page(&mut remaining, 1, &scorer, &mut ctx);
        let second = layer.rerank_page(&mut remaining, 1, &scorer, &mut ctx);

        assert!((first[0].score - second[0].score).abs() < 0.05);
        assert!(remaining.is_empty());
    }
}
