use crate::error::{FeedError, Result};
use crate::models::{InteractionKind, InteractionSets, ViewRecord};
use crate::repository::InteractionStore;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Reads the viewer's interaction history and records views
pub struct InteractionTracker {
    store: Arc<dyn InteractionStore>,
}

impl InteractionTracker {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self { store }
    }

    /// Viewed, reacted and commented post ids, loaded concurrently
    pub async fn interaction_sets(&self, user_id: Uuid) -> Result<InteractionSets> {
        let (viewed, reacted, commented) = tokio::try_join!(
            self.store.viewed_post_ids(user_id),
            self.store.reacted_post_ids(user_id),
            self.store.commented_post_ids(user_id),
        )
        .map_err(FeedError::storage)?;

        debug!(
            user_id = %user_id,
            viewed = viewed.len(),
            reacted = reacted.len(),
            commented = commented.len(),
            "Loaded interaction sets"
        );

        Ok(InteractionSets {
            viewed,
            reacted,
            commented,
        })
    }

    pub async fn record_view(&self, user_id: Uuid, post_id: Uuid) -> Result<ViewRecord> {
        let mut records = self.record_view_batch(user_id, &[post_id]).await?;
        records
            .pop()
            .ok_or_else(|| FeedError::Internal("view upsert returned no record".to_string()))
    }

    /// Deduplicates ids and upserts them in one storage write
    pub async fn record_view_batch(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<Vec<ViewRecord>> {
        let mut seen = HashSet::with_capacity(post_ids.len());
        let unique: Vec<Uuid> = post_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let records = self
            .store
            .upsert_views(user_id, &unique, Utc::now())
            .await
            .map_err(FeedError::storage)?;

        info!(user_id = %user_id, count = records.len(), "Recorded log views");
        Ok(records)
    }
}

/// Deepest interaction wins: commented, then reacted, then viewed
pub fn classify(post_id: &Uuid, sets: &InteractionSets) -> InteractionKind {
    if sets.commented.contains(post_id) {
        InteractionKind::Commented
    } else if sets.reacted.contains(post_id) {
        InteractionKind::Reacted
    } else if sets.viewed.contains(post_id) {
        InteractionKind::Viewed
    } else {
        InteractionKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryFeedStore, MockInteractionStore};

    #[test]
    fn test_classify_prefers_deepest_interaction() {
        let post = Uuid::new_v4();
        let mut sets = InteractionSets::default();
        assert_eq!(classify(&post, &sets), InteractionKind::None);

        sets.viewed.insert(post);
        assert_eq!(classify(&post, &sets), InteractionKind::Viewed);

        sets.commented.insert(post);
        assert_eq!(classify(&post, &sets), InteractionKind::Commented);

        sets.reacted.insert(post);
        assert_eq!(classify(&post, &sets), InteractionKind::Commented);
    }

    #[tokio::test]
    async fn test_record_view_twice_increments_single_record() {
        let store = Arc::new(InMemoryFeedStore::new());
        let tracker = InteractionTracker::new(store.clone());
        let user = Uuid::new_v4();
        let post = Uuid::new_v4();

        tracker.record_view(user, post).await.unwrap();
        let second = tracker.record_view(user, post).await.unwrap();

        assert_eq!(second.view_count, 2);
        assert_eq!(store.view_record_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_views_share_one_record() {
        const VIEWS: u32 = 64;
        let store = Arc::new(InMemoryFeedStore::new());
        let tracker = Arc::new(InteractionTracker::new(store.clone()));
        let user = Uuid::new_v4();
        let post = Uuid::new_v4();

        let handles: Vec<_> = (0..VIEWS)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.record_view(user, post).await })
            })
            .collect();

        let mut counts = Vec::with_capacity(VIEWS as usize);
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap().view_count);
        }
        counts.sort_unstable();

        assert_eq!(store.view_record_count(), 1);
        // Every increment was observed exactly once
        assert_eq!(counts, (1..=VIEWS).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batch_deduplicates_and_writes_once() {
        let user = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut store = MockInteractionStore::new();
        store
            .expect_upsert_views()
            .times(1)
            .withf(move |_, ids, _| ids.len() == 2)
            .returning(|user_id, ids, at| {
                Ok(ids
                    .iter()
                    .map(|post_id| ViewRecord {
                        user_id,
                        post_id: *post_id,
                        view_count: 1,
                        last_viewed_at: at,
                    })
                    .collect())
            });

        let tracker = InteractionTracker::new(Arc::new(store));
        let records = tracker.record_view_batch(user, &[a, b, a]).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let mut store = MockInteractionStore::new();
        store.expect_upsert_views().times(0);
        let tracker = InteractionTracker::new(Arc::new(store));
        assert!(tracker
            .record_view_batch(Uuid::new_v4(), &[])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_interaction_sets_propagate_storage_failure() {
        let mut store = MockInteractionStore::new();
        store.expect_viewed_post_ids().returning(|_| Ok(HashSet::new()));
        store
            .expect_reacted_post_ids()
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        store.expect_commented_post_ids().returning(|_| Ok(HashSet::new()));

        let tracker = InteractionTracker::new(Arc::new(store));
        let err = tracker.interaction_sets(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, FeedError::StorageUnavailable(_)));
    }
}
