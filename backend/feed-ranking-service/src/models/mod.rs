use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Feed mode requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Network, // direct follows + friends of friends
    Local,   // geographically near developers
    Global,  // discovery outside the viewer's circle
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Network => "network",
            FeedMode::Local => "local",
            FeedMode::Global => "global",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(FeedMode::Network),
            "local" => Ok(FeedMode::Local),
            "global" => Ok(FeedMode::Global),
            other => Err(format!(
                "unknown feed mode '{}', expected network, local or global",
                other
            )),
        }
    }
}

/// A log post as read from storage. Never mutated by the ranking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub code_snippet: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    /// `None` only for malformed rows; such posts are skipped during ranking
    pub created_at: Option<DateTime<Utc>>,
    pub reaction_count: u32,
    /// Comments including replies
    pub comment_count: u32,
    pub view_count: u32,
    /// Engagement inside the trending window
    pub recent_reaction_count: u32,
    pub recent_comment_count: u32,
}

impl Post {
    pub fn new(id: Uuid, author_id: Uuid, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            author_id,
            content: content.into(),
            code_snippet: None,
            image_url: None,
            link: None,
            created_at: Some(created_at),
            reaction_count: 0,
            comment_count: 0,
            view_count: 0,
            recent_reaction_count: 0,
            recent_comment_count: 0,
        }
    }

    pub fn has_code(&self) -> bool {
        self.code_snippet
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().map(|u| !u.is_empty()).unwrap_or(false)
    }

    pub fn has_link(&self) -> bool {
        self.link.as_deref().map(|u| !u.is_empty()).unwrap_or(false)
    }
}

/// Directed follow edge (follower -> followee)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FollowEdge {
    /// Returns `None` for self edges.
    pub fn new(follower_id: Uuid, followee_id: Uuid) -> Option<Self> {
        if follower_id == followee_id {
            return None;
        }
        Some(Self {
            follower_id,
            followee_id,
            created_at: Utc::now(),
        })
    }
}

/// A coordinate pair together with the moment it was captured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

impl TimedCoordinate {
    pub fn new(latitude: f64, longitude: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            updated_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Browser geolocation permission as last reported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPermission {
    #[default]
    Unknown,
    Allowed,
    Denied,
}

/// Everything known about where a user is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLocation {
    /// High precision, user granted (browser geolocation)
    pub precise: Option<TimedCoordinate>,
    /// Low precision, inferred automatically (IP lookup)
    pub approximate: Option<TimedCoordinate>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub permission: LocationPermission,
}

impl UserLocation {
    pub fn has_region(&self) -> bool {
        [&self.city, &self.state, &self.country]
            .iter()
            .any(|field| field.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub skills: Vec<String>,
    pub follower_count: u32,
    pub location: UserLocation,
}

impl UserProfile {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            skills: Vec::new(),
            follower_count: 0,
            location: UserLocation::default(),
        }
    }

    /// Lowercased skill set for overlap computations
    pub fn skill_set(&self) -> HashSet<String> {
        self.skills
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// How deeply the viewer has already engaged with a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    None,
    Viewed,
    Reacted,
    Commented,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::None => "none",
            InteractionKind::Viewed => "viewed",
            InteractionKind::Reacted => "reacted",
            InteractionKind::Commented => "commented",
        }
    }
}

/// Post ids the viewer has viewed / reacted to / commented on
#[derive(Debug, Clone, Default)]
pub struct InteractionSets {
    pub viewed: HashSet<Uuid>,
    pub reacted: HashSet<Uuid>,
    /// Top-level comments and replies at any depth
    pub commented: HashSet<Uuid>,
}

impl InteractionSets {
    pub fn is_empty(&self) -> bool {
        self.viewed.is_empty() && self.reacted.is_empty() && self.commented.is_empty()
    }

    pub fn touched(&self, post_id: &Uuid) -> bool {
        self.viewed.contains(post_id)
            || self.reacted.contains(post_id)
            || self.commented.contains(post_id)
    }
}

/// Stored result of a view upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub view_count: u32,
    pub last_viewed_at: DateTime<Utc>,
}

/// A post annotated with request-scoped ranking data.
/// Wraps the post instead of patching fields onto it.
#[derive(Debug, Clone)]
pub struct FeedCandidate {
    pub post: Arc<Post>,
    /// Copied from the post once validated
    pub created_at: DateTime<Utc>,
    pub distance_km: Option<f64>,
    /// Distance was assumed from a shared city/state/country
    pub distance_is_regional: bool,
    pub score: f64,
    /// Tiebreak only, never added to the score
    pub jitter: f64,
    pub mode: FeedMode,
    pub is_secondary_network: bool,
    pub interaction: InteractionKind,
    pub reason: String,
}

impl FeedCandidate {
    pub fn post_id(&self) -> Uuid {
        self.post.id
    }

    pub fn author_id(&self) -> Uuid {
        self.post.author_id
    }

    /// Total rank order: score desc, jitter asc, post id asc
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                self.jitter
                    .partial_cmp(&other.jitter)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| self.post.id.cmp(&other.post.id))
    }

    /// Recency order used to cut cursor pages: created_at desc, post id desc
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.post.id.cmp(&self.post.id))
    }
}

/// Why a feed came back empty when that is expected rather than an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPrerequisite {
    NoFollows,
    NoLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Ok,
    MissingPrerequisite,
}

/// What the client should do about geolocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationAction {
    UseLocation,
    RequestLocation,
    RetryRequestLocation,
}

/// Pagination strategy for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Infinite scroll; `None` is the first page
    Cursor(Option<String>),
    /// 1-based page number into the ranked list
    Offset { page: u32 },
}

#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub user_id: Uuid,
    pub mode: FeedMode,
    pub page: PageRequest,
    pub page_size: usize,
}

/// Serialized feed entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reaction_count: u32,
    pub comment_count: u32,
    pub score: f64,
    pub feed_type: FeedMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub is_secondary_network: bool,
    pub interaction: InteractionKind,
    pub reason: String,
}

impl From<&FeedCandidate> for FeedItem {
    fn from(candidate: &FeedCandidate) -> Self {
        let post = &candidate.post;
        Self {
            id: post.id,
            author_id: post.author_id,
            content: post.content.clone(),
            code_snippet: post.code_snippet.clone(),
            image_url: post.image_url.clone(),
            link: post.link.clone(),
            created_at: candidate.created_at,
            reaction_count: post.reaction_count,
            comment_count: post.comment_count,
            score: candidate.score,
            feed_type: candidate.mode,
            distance_km: candidate.distance_km,
            is_secondary_network: candidate.is_secondary_network,
            interaction: candidate.interaction,
            reason: candidate.reason.clone(),
        }
    }
}

/// One page of a composed feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub mode: FeedMode,
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub status: FeedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MissingPrerequisite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_action: Option<LocationAction>,
    /// Candidates dropped because their stored data was unusable
    pub skipped_malformed: usize,
    /// The supplied cursor could not be decoded and the first page was served
    pub cursor_reset: bool,
}

impl FeedPage {
    pub fn missing(mode: FeedMode, reason: MissingPrerequisite) -> Self {
        Self {
            mode,
            items: Vec::new(),
            next_cursor: None,
            has_next: false,
            status: FeedStatus::MissingPrerequisite,
            reason: Some(reason),
            location_action: None,
            skipped_malformed: 0,
            cursor_reset: false,
        }
    }

    pub fn is_missing_prerequisite(&self) -> bool {
        self.status == FeedStatus::MissingPrerequisite
    }
}

/// Per-request bookkeeping, logged once composition finishes
#[derive(Debug, Clone, Default)]
pub struct ComposeStats {
    pub window_size: usize,
    pub scored: usize,
    pub skipped_malformed: usize,
    pub duplicates_removed: usize,
    pub capped_by_author: usize,
}
