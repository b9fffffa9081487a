use crate::error::{FeedError, Result};
use crate::repository::FollowGraphStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Primary and secondary network resolution over the follow graph
pub struct GraphResolver {
    graph: Arc<dyn FollowGraphStore>,
}

impl GraphResolver {
    pub fn new(graph: Arc<dyn FollowGraphStore>) -> Self {
        Self { graph }
    }

    /// Everyone `user_id` follows. Self edges never count.
    pub async fn primary_network(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let followees = self
            .graph
            .followees(user_id)
            .await
            .map_err(FeedError::storage)?;

        Ok(followees.into_iter().filter(|id| *id != user_id).collect())
    }

    /// Friends of friends: followees of the primary network, minus the
    /// primary network itself and the viewer
    pub async fn secondary_network(
        &self,
        user_id: Uuid,
        primary: &HashSet<Uuid>,
    ) -> Result<HashSet<Uuid>> {
        if primary.is_empty() {
            return Ok(HashSet::new());
        }

        let members: Vec<Uuid> = primary.iter().copied().collect();
        let second_hop = self
            .graph
            .followees_of_many(&members)
            .await
            .map_err(FeedError::storage)?;

        let secondary: HashSet<Uuid> = second_hop
            .into_iter()
            .filter(|id| *id != user_id && !primary.contains(id))
            .collect();

        debug!(
            user_id = %user_id,
            primary = primary.len(),
            secondary = secondary.len(),
            "Resolved follow network"
        );
        Ok(secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockFollowGraphStore;

    #[tokio::test]
    async fn test_secondary_excludes_primary_and_self() {
        let viewer = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let mut graph = MockFollowGraphStore::new();
        graph
            .expect_followees_of_many()
            .times(1)
            .returning(move |_| Ok(vec![viewer, b, c, c]));

        let resolver = GraphResolver::new(Arc::new(graph));
        let primary: HashSet<Uuid> = [a, b].into_iter().collect();
        let secondary = resolver.secondary_network(viewer, &primary).await.unwrap();

        assert_eq!(secondary, [c].into_iter().collect());
    }

    #[tokio::test]
    async fn test_empty_primary_skips_storage() {
        let mut graph = MockFollowGraphStore::new();
        graph.expect_followees_of_many().times(0);

        let resolver = GraphResolver::new(Arc::new(graph));
        let secondary = resolver
            .secondary_network(Uuid::new_v4(), &HashSet::new())
            .await
            .unwrap();
        assert!(secondary.is_empty());
    }

    #[tokio::test]
    async fn test_primary_drops_self_edge() {
        let viewer = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let mut graph = MockFollowGraphStore::new();
        graph
            .expect_followees()
            .returning(move |_| Ok(vec![viewer, friend]));

        let resolver = GraphResolver::new(Arc::new(graph));
        let primary = resolver.primary_network(viewer).await.unwrap();
        assert_eq!(primary, [friend].into_iter().collect());
    }

    #[tokio::test]
    async fn test_storage_failure_is_retryable() {
        let mut graph = MockFollowGraphStore::new();
        graph
            .expect_followees()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let resolver = GraphResolver::new(Arc::new(graph));
        let err = resolver.primary_network(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
