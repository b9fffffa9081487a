use crate::error::{FeedError, Result};
use crate::models::Post;
use crate::repository::PostStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const REACTION_POINTS: u64 = 2;
/// Comments and replies score the same
const COMMENT_POINTS: u64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingLog {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub engagement_score: u64,
    pub engagement_text: String,
}

/// Lifetime engagement. The time window applies to when the log was
/// created, so a log inside the window keeps all of its reactions.
pub fn engagement_score(post: &Post) -> u64 {
    post.reaction_count as u64 * REACTION_POINTS + post.comment_count as u64 * COMMENT_POINTS
}

pub fn engagement_text(score: u64) -> String {
    if score >= 10 {
        format!("{}+ engaging right now", score)
    } else {
        format!("{} engaging right now", score)
    }
}

/// Most engaged logs of the last few hours
pub struct TrendingService {
    posts: Arc<dyn PostStore>,
    /// Posts read per request before ranking
    window: usize,
}

impl TrendingService {
    pub fn new(posts: Arc<dyn PostStore>, window: usize) -> Self {
        Self { posts, window }
    }

    pub async fn trending_logs(&self, limit: usize, hours: i64) -> Result<Vec<TrendingLog>> {
        let since = Utc::now() - Duration::hours(hours.max(1));
        let posts = self
            .posts
            .posts_since(since, self.window)
            .await
            .map_err(FeedError::storage)?;

        let mut ranked: Vec<(u64, Post)> = posts
            .into_iter()
            .filter(|p| p.created_at.is_some())
            .map(|p| (engagement_score(&p), p))
            .filter(|(score, _)| *score > 0)
            .collect();

        ranked.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.id.cmp(&b.id)));
        ranked.truncate(limit);

        debug!(count = ranked.len(), hours, "Computed trending logs");

        Ok(ranked
            .into_iter()
            .filter_map(|(score, post)| {
                post.created_at.map(|created_at| TrendingLog {
                    id: post.id,
                    author_id: post.author_id,
                    content: post.content,
                    created_at,
                    engagement_score: score,
                    engagement_text: engagement_text(score),
                })
            })
            .collect())
    }
}
