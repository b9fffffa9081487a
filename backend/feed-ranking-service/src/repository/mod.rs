mod memory_repository;
mod postgres_repository;
mod r#trait;

pub use memory_repository::InMemoryFeedStore;
pub use postgres_repository::{create_pool, PgFeedStore};
pub use r#trait::{FollowGraphStore, InteractionStore, LocalPoolQuery, PostStore, ProfileStore};

#[cfg(test)]
pub use r#trait::{MockFollowGraphStore, MockInteractionStore, MockPostStore, MockProfileStore};

use std::sync::Arc;

/// Storage collaborators handed to the ranking engine
#[derive(Clone)]
pub struct FeedStores {
    pub posts: Arc<dyn PostStore>,
    pub graph: Arc<dyn FollowGraphStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl FeedStores {
    /// Use one adapter for every concern
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: PostStore + FollowGraphStore + InteractionStore + ProfileStore + 'static,
    {
        Self {
            posts: store.clone(),
            graph: store.clone(),
            interactions: store.clone(),
            profiles: store,
        }
    }
}
