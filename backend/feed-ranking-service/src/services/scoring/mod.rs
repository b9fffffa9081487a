/// Scoring Engine
///
/// One strategy per feed mode, each a pure function of its input, the
/// per-request context and the immutable `ScoringConfig` it was built with.
///
/// # Policies
/// - **Network**: recency first, engagement secondary
/// - **Local**: distance first, recency / skills / engagement secondary
/// - **Global**: weighted blend of quality, trending, personalization,
///   recency and page diversity
pub mod global;
pub mod local;
pub mod network;

pub use global::{GlobalComponents, GlobalScorer};
pub use local::LocalScorer;
pub use network::NetworkScorer;

use crate::config::{FreshnessPenalties, RecencyCurve, ScoringConfig};
use crate::models::{FeedCandidate, FeedMode, InteractionKind, Post};
use crate::services::diversity::DiversityState;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Result of scoring one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub reason: String,
}

/// How far away an author is, and whether that distance was measured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceEstimate {
    Measured(f64),
    /// Assumed from a shared city, state or country
    Regional(f64),
}

impl DistanceEstimate {
    pub fn km(&self) -> f64 {
        match self {
            DistanceEstimate::Measured(km) | DistanceEstimate::Regional(km) => *km,
        }
    }
}

/// Per-candidate inputs
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub post: &'a Post,
    pub created_at: DateTime<Utc>,
    pub interaction: InteractionKind,
    pub is_secondary_network: bool,
    pub distance: Option<DistanceEstimate>,
}

impl<'a> ScoringInput<'a> {
    pub fn from_candidate(candidate: &'a FeedCandidate) -> Self {
        let distance = candidate.distance_km.map(|km| {
            if candidate.distance_is_regional {
                DistanceEstimate::Regional(km)
            } else {
                DistanceEstimate::Measured(km)
            }
        });
        Self {
            post: candidate.post.as_ref(),
            created_at: candidate.created_at,
            interaction: candidate.interaction,
            is_secondary_network: candidate.is_secondary_network,
            distance,
        }
    }
}

/// Author attributes used by the local and global scorers
#[derive(Debug, Clone, Default)]
pub struct AuthorSignals {
    pub skills: HashSet<String>,
    pub follower_count: u32,
}

/// Everything a scorer may read about the viewer, built once per request
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    pub viewer_skills: HashSet<String>,
    pub authors: HashMap<Uuid, AuthorSignals>,
    /// Authors whose posts the viewer already viewed, reacted to or commented on
    pub engaged_authors: HashSet<Uuid>,
    /// Items already selected for the page being built
    pub diversity: DiversityState,
}

impl ScoringContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            viewer_skills: HashSet::new(),
            authors: HashMap::new(),
            engaged_authors: HashSet::new(),
            diversity: DiversityState::default(),
        }
    }

    pub fn author(&self, author_id: &Uuid) -> Option<&AuthorSignals> {
        self.authors.get(author_id)
    }
}

/// One scoring policy per feed mode
pub trait FeedScorer: Send + Sync {
    fn mode(&self) -> FeedMode;

    fn score(&self, input: &ScoringInput<'_>, ctx: &ScoringContext) -> Score;
}

/// Pick the scorer for a request
pub fn scorer_for(mode: FeedMode, config: &ScoringConfig) -> Box<dyn FeedScorer> {
    match mode {
        FeedMode::Network => Box::new(NetworkScorer::new(config)),
        FeedMode::Local => Box::new(LocalScorer::new(config)),
        FeedMode::Global => Box::new(GlobalScorer::new(config)),
    }
}

/// Age clamped at zero so future timestamps count as brand new
pub fn post_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let age = now.signed_duration_since(created_at);
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Index of the recency step a post falls into; `steps.len()` means the floor
pub fn recency_bucket(curve: &RecencyCurve, age: Duration) -> usize {
    let minutes = age.num_minutes();
    curve
        .steps
        .iter()
        .position(|(limit, _)| minutes < *limit)
        .unwrap_or(curve.steps.len())
}

pub fn recency_multiplier(curve: &RecencyCurve, age: Duration) -> f64 {
    curve
        .steps
        .get(recency_bucket(curve, age))
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(curve.floor)
}

pub fn freshness_penalty(penalties: &FreshnessPenalties, interaction: InteractionKind) -> f64 {
    match interaction {
        InteractionKind::None => 1.0,
        InteractionKind::Viewed => penalties.viewed,
        InteractionKind::Reacted => penalties.reacted,
        InteractionKind::Commented => penalties.commented,
    }
}
