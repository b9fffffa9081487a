use super::{FollowGraphStore, InteractionStore, LocalPoolQuery, PostStore, ProfileStore};
use crate::models::{FollowEdge, Post, UserProfile, ViewRecord};
use crate::services::geo::distance_km;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct CommentRecord {
    user_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
}

/// In-process store used for local development and tests.
///
/// Engagement counters live on the stored posts and are bumped as reactions,
/// comments and views arrive. Recent counters are not aged out.
#[derive(Default)]
pub struct InMemoryFeedStore {
    posts: DashMap<Uuid, Post>,
    /// follower -> edges
    follows: DashMap<Uuid, Vec<FollowEdge>>,
    /// (user, post) -> reaction kind
    reactions: DashMap<(Uuid, Uuid), String>,
    comments: DashMap<Uuid, CommentRecord>,
    views: DashMap<(Uuid, Uuid), ViewRecord>,
    profiles: DashMap<Uuid, UserProfile>,
    unavailable: AtomicBool,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail, as if the database were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("in-memory store marked unavailable");
        }
        Ok(())
    }

    pub fn insert_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    pub fn upsert_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.id, profile);
    }

    /// Adds a follow edge; returns false for self edges and duplicates
    pub fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> bool {
        let Some(edge) = FollowEdge::new(follower_id, followee_id) else {
            return false;
        };
        let mut edges = self.follows.entry(follower_id).or_default();
        if edges.iter().any(|e| e.followee_id == followee_id) {
            return false;
        }
        edges.push(edge);
        drop(edges);

        if let Some(mut profile) = self.profiles.get_mut(&followee_id) {
            profile.follower_count += 1;
        }
        true
    }

    /// One reaction per (user, post); a repeat call only changes the kind
    pub fn react(&self, user_id: Uuid, post_id: Uuid, kind: &str) {
        let mut created = false;
        self.reactions
            .entry((user_id, post_id))
            .and_modify(|existing| *existing = kind.to_string())
            .or_insert_with(|| {
                created = true;
                kind.to_string()
            });

        if created {
            if let Some(mut post) = self.posts.get_mut(&post_id) {
                post.reaction_count += 1;
                post.recent_reaction_count += 1;
            }
        }
    }

    pub fn reaction_kind(&self, user_id: Uuid, post_id: Uuid) -> Option<String> {
        self.reactions
            .get(&(user_id, post_id))
            .map(|r| r.clone())
    }

    /// Records a comment (or a reply when `parent_id` is set), returning its id
    pub fn comment(&self, user_id: Uuid, post_id: Uuid, parent_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.comments.insert(
            id,
            CommentRecord {
                user_id,
                post_id,
                parent_id,
            },
        );
        if let Some(mut post) = self.posts.get_mut(&post_id) {
            post.comment_count += 1;
            post.recent_comment_count += 1;
        }
        id
    }

    /// Number of ancestors above a comment: 0 for a top-level comment
    pub fn thread_depth(&self, comment_id: Uuid) -> Option<usize> {
        let mut parent = self.comments.get(&comment_id)?.parent_id;
        let mut depth = 0;
        while let Some(id) = parent {
            depth += 1;
            parent = self.comments.get(&id).and_then(|c| c.parent_id);
        }
        Some(depth)
    }

    pub fn view_record(&self, user_id: Uuid, post_id: Uuid) -> Option<ViewRecord> {
        self.views.get(&(user_id, post_id)).map(|v| v.clone())
    }

    pub fn view_record_count(&self) -> usize {
        self.views.len()
    }

    fn sorted_recent<F>(&self, until: Option<DateTime<Utc>>, limit: usize, keep: F) -> Vec<Post>
    where
        F: Fn(&Post) -> bool,
    {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|entry| keep(entry.value()))
            .filter(|entry| match (until, entry.created_at) {
                (Some(bound), Some(created_at)) => created_at <= bound,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .map(|entry| entry.value().clone())
            .collect();

        // NULL timestamps last, like the SQL adapter
        posts.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.id.cmp(&a.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        posts.truncate(limit);
        posts
    }
}

#[async_trait::async_trait]
impl PostStore for InMemoryFeedStore {
    async fn recent_posts_by_authors(
        &self,
        authors: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.ensure_available()?;
        let authors: HashSet<Uuid> = authors.iter().copied().collect();
        Ok(self.sorted_recent(until, limit, |p| authors.contains(&p.author_id)))
    }

    async fn recent_posts_excluding_authors(
        &self,
        excluded: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.ensure_available()?;
        let excluded: HashSet<Uuid> = excluded.iter().copied().collect();
        Ok(self.sorted_recent(until, limit, |p| !excluded.contains(&p.author_id)))
    }

    async fn posts_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Post>> {
        self.ensure_available()?;
        Ok(self.sorted_recent(None, limit, |p| {
            p.created_at.map(|t| t >= since).unwrap_or(false)
        }))
    }

    async fn posts_by_author(
        &self,
        author_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        self.ensure_available()?;
        let posts = self.sorted_recent(None, usize::MAX, |p| p.author_id == author_id);
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait::async_trait]
impl FollowGraphStore for InMemoryFeedStore {
    async fn followees(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.ensure_available()?;
        Ok(self
            .follows
            .get(&user_id)
            .map(|edges| edges.iter().map(|e| e.followee_id).collect())
            .unwrap_or_default())
    }

    async fn followees_of_many(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        self.ensure_available()?;
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for user_id in user_ids {
            if let Some(edges) = self.follows.get(user_id) {
                for edge in edges.iter() {
                    if seen.insert(edge.followee_id) {
                        result.push(edge.followee_id);
                    }
                }
            }
        }
        Ok(result)
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryFeedStore {
    async fn viewed_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.ensure_available()?;
        Ok(self
            .views
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.key().1)
            .collect())
    }

    async fn reacted_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.ensure_available()?;
        Ok(self
            .reactions
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.key().1)
            .collect())
    }

    async fn commented_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.ensure_available()?;
        Ok(self
            .comments
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.post_id)
            .collect())
    }

    async fn upsert_views(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
        viewed_at: DateTime<Utc>,
    ) -> Result<Vec<ViewRecord>> {
        self.ensure_available()?;
        let mut records = Vec::with_capacity(post_ids.len());
        for post_id in post_ids {
            // entry() holds the shard lock, so concurrent upserts serialize per key
            let record = self
                .views
                .entry((user_id, *post_id))
                .and_modify(|v| {
                    v.view_count += 1;
                    v.last_viewed_at = viewed_at;
                })
                .or_insert_with(|| ViewRecord {
                    user_id,
                    post_id: *post_id,
                    view_count: 1,
                    last_viewed_at: viewed_at,
                })
                .clone();

            if let Some(mut post) = self.posts.get_mut(post_id) {
                post.view_count += 1;
            }
            records.push(record);
        }
        debug!(user_id = %user_id, count = records.len(), "Upserted views in memory");
        Ok(records)
    }
}

fn same_region(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref(), b.as_deref()) {
        (Some(x), Some(y)) => {
            let x = x.trim();
            !x.is_empty() && x.eq_ignore_ascii_case(y.trim())
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryFeedStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.ensure_available()?;
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        self.ensure_available()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn local_profiles(&self, query: &LocalPoolQuery) -> Result<Vec<UserProfile>> {
        self.ensure_available()?;
        let mut ranked: Vec<(u8, f64, UserProfile)> = self
            .profiles
            .iter()
            .filter(|entry| entry.id != query.exclude_user)
            .filter_map(|entry| {
                let location = &entry.location;
                let distance = query
                    .center
                    .and_then(|center| nearest_coordinate_km(entry.value(), center))
                    .filter(|km| *km <= query.radius_km);
                let tier = if distance.is_some() {
                    0
                } else if same_region(&location.city, &query.city) {
                    1
                } else if same_region(&location.state, &query.state) {
                    2
                } else if same_region(&location.country, &query.country) {
                    3
                } else {
                    return None;
                };
                Some((tier, distance.unwrap_or(f64::MAX), entry.value().clone()))
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        ranked.truncate(query.limit);
        Ok(ranked.into_iter().map(|(_, _, profile)| profile).collect())
    }

    async fn profiles_within_radius(
        &self,
        exclude_user: Uuid,
        center: (f64, f64),
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<UserProfile>> {
        self.ensure_available()?;
        let mut nearby: Vec<(f64, UserProfile)> = self
            .profiles
            .iter()
            .filter(|entry| entry.id != exclude_user)
            .filter_map(|entry| {
                nearest_coordinate_km(entry.value(), center)
                    .filter(|km| *km <= radius_km)
                    .map(|km| (km, entry.value().clone()))
            })
            .collect();

        nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        nearby.truncate(limit);
        Ok(nearby.into_iter().map(|(_, profile)| profile).collect())
    }
}

/// Closest of the profile's stored coordinates, like LEAST() over both in SQL
fn nearest_coordinate_km(profile: &UserProfile, (lat, lon): (f64, f64)) -> Option<f64> {
    [profile.location.precise, profile.location.approximate]
        .iter()
        .flatten()
        .filter(|c| c.is_valid())
        .map(|c| distance_km(lat, lon, c.latitude, c.longitude))
        .min_by(|a, b| a.total_cmp(b))
}
