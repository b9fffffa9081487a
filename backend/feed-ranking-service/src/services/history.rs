use crate::error::{FeedError, Result};
use crate::models::Post;
use crate::repository::PostStore;
use crate::services::pagination::page_offset;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ProfileLogsPage {
    pub author_id: Uuid,
    pub page: u32,
    pub per_page: usize,
    pub logs: Vec<Post>,
    pub has_next: bool,
}

/// An author's own logs, newest first, for profile pages
pub struct ProfileHistory {
    posts: Arc<dyn PostStore>,
}

impl ProfileHistory {
    pub fn new(posts: Arc<dyn PostStore>) -> Self {
        Self { posts }
    }

    pub async fn page(&self, author_id: Uuid, page: u32, per_page: usize) -> Result<ProfileLogsPage> {
        let page = page.max(1);
        // One extra row tells us whether another page exists
        let mut logs = self
            .posts
            .posts_by_author(author_id, per_page + 1, page_offset(page, per_page))
            .await
            .map_err(FeedError::storage)?;

        let has_next = logs.len() > per_page;
        logs.truncate(per_page);

        Ok(ProfileLogsPage {
            author_id,
            page,
            per_page,
            logs,
            has_next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryFeedStore;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let store = Arc::new(InMemoryFeedStore::new());
        let author = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..5 {
            store.insert_post(Post::new(
                Uuid::new_v4(),
                author,
                format!("day {}", i),
                now - Duration::days(i),
            ));
        }
        store.insert_post(Post::new(Uuid::new_v4(), Uuid::new_v4(), "other", now));

        let history = ProfileHistory::new(store);
        let first = history.page(author, 1, 2).await.unwrap();
        assert_eq!(first.logs.len(), 2);
        assert!(first.has_next);
        assert_eq!(first.logs[0].content, "day 0");

        let last = history.page(author, 3, 2).await.unwrap();
        assert_eq!(last.logs.len(), 1);
        assert!(!last.has_next);
        assert_eq!(last.logs[0].content, "day 4");
    }
}
