use crate::models::{Post, UserProfile, ViewRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Bulk post reads. Every read carries its engagement counters so scoring
/// never goes back to storage per post.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    /// Newest posts written by any of `authors`, created at or before `until`
    /// when given. Ordered by (created_at desc, id desc).
    async fn recent_posts_by_authors(
        &self,
        authors: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    /// Newest posts written by anyone outside `excluded`, same ordering and
    /// bound semantics as `recent_posts_by_authors`.
    async fn recent_posts_excluding_authors(
        &self,
        excluded: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    /// Posts created at or after `since`, newest first
    async fn posts_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Post>>;

    /// One author's posts, newest first
    async fn posts_by_author(&self, author_id: Uuid, limit: usize, offset: usize)
        -> Result<Vec<Post>>;
}

/// Read access to the directed follow relation
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FollowGraphStore: Send + Sync {
    /// Users `user_id` follows
    async fn followees(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Distinct users followed by any of `user_ids`, in a single read
    async fn followees_of_many(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>>;
}

/// Per-user interaction history plus the view-recording side channel
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    async fn viewed_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn reacted_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    /// Posts the user commented on or replied under, at any depth
    async fn commented_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    /// Increment-and-touch upsert keyed by (user, post). Never inserts a
    /// second record for the same pair.
    async fn upsert_views(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
        viewed_at: DateTime<Utc>,
    ) -> Result<Vec<ViewRecord>>;
}

/// Filter for the local feed's author pool
#[derive(Debug, Clone, Default)]
pub struct LocalPoolQuery {
    pub exclude_user: Uuid,
    /// (latitude, longitude) of the viewer when one could be resolved
    pub center: Option<(f64, f64)>,
    pub radius_km: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub limit: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>>;

    /// Profiles with a coordinate within the query radius or sharing one of
    /// its regions, closest first: measured in-radius profiles by distance,
    /// then same city, same state, same country. `limit` cuts the tail.
    async fn local_profiles(&self, query: &LocalPoolQuery) -> Result<Vec<UserProfile>>;

    /// Profiles with any coordinate within `radius_km` of `center`, nearest
    /// first. Region membership is ignored.
    async fn profiles_within_radius(
        &self,
        exclude_user: Uuid,
        center: (f64, f64),
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<UserProfile>>;

    /// Health check (optional)
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
