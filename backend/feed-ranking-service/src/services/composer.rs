use crate::config::{FeedSettings, ScoringConfig};
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::models::{
    ComposeStats, FeedCandidate, FeedItem, FeedMode, FeedPage, FeedRequest, FeedStatus,
    InteractionSets, MissingPrerequisite, PageRequest, Post, UserProfile,
};
use crate::repository::{FeedStores, LocalPoolQuery};
use crate::services::diversity::DiversityLayer;
use crate::services::geo::{self, LocationStatus};
use crate::services::graph::GraphResolver;
use crate::services::interactions::{classify, InteractionTracker};
use crate::services::pagination::{offset_page, recency_slice, Cursor};
use crate::services::scoring::{
    scorer_for, AuthorSignals, DistanceEstimate, FeedScorer, GlobalScorer, ScoringContext,
    ScoringInput,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything fetched for one request before scoring
struct CandidatePool {
    posts: Vec<Post>,
    secondary: HashSet<Uuid>,
    distances: HashMap<Uuid, DistanceEstimate>,
    sets: InteractionSets,
    ctx: ScoringContext,
}

enum Gathered {
    Ready(CandidatePool),
    Missing(FeedPage),
}

/// Feed Composer - one request end to end
///
/// 1. Resolve the author sets for the mode
/// 2. Read a bounded, recency ordered window
/// 3. Score every well-formed candidate
/// 4. Order by (score desc, jitter asc, post id asc)
/// 5. Global only: diversity re-rank with the per-page author cap
/// 6. Paginate
///
/// Composition never writes; abandoning a request is always safe.
pub struct FeedComposer {
    stores: FeedStores,
    graph: GraphResolver,
    interactions: InteractionTracker,
    settings: FeedSettings,
    scoring: Arc<ScoringConfig>,
    diversity: DiversityLayer,
}

impl FeedComposer {
    pub fn new(stores: FeedStores, settings: FeedSettings, scoring: ScoringConfig) -> Self {
        Self {
            graph: GraphResolver::new(stores.graph.clone()),
            interactions: InteractionTracker::new(stores.interactions.clone()),
            diversity: DiversityLayer::new(settings.max_logs_per_author),
            scoring: Arc::new(scoring),
            settings,
            stores,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn interactions(&self) -> &InteractionTracker {
        &self.interactions
    }

    pub async fn compose_feed(&self, request: &FeedRequest) -> Result<FeedPage> {
        let started = Instant::now();
        let mode = request.mode.as_str();
        let result = self.compose(request).await;

        let status = match &result {
            Ok(page) if page.is_missing_prerequisite() => "missing_prerequisite",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::record_feed_request(mode, status);
        metrics::record_compose_duration(mode, started.elapsed());

        if let Err(e) = &result {
            warn!(user_id = %request.user_id, mode, error = %e, "Feed composition failed");
        }
        result
    }

    pub async fn location_status(&self, user_id: Uuid) -> Result<LocationStatus> {
        let location = self.viewer_profile(user_id).await?.location;
        Ok(geo::location_status(&location, Utc::now()))
    }

    async fn compose(&self, request: &FeedRequest) -> Result<FeedPage> {
        let now = Utc::now();
        let mut cursor_reset = false;

        let cursor = match &request.page {
            PageRequest::Cursor(Some(raw)) => match Cursor::decode(raw) {
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    warn!(user_id = %request.user_id, error = %e, "Invalid feed cursor, serving first page");
                    metrics::record_invalid_cursor();
                    cursor_reset = true;
                    None
                }
            },
            _ => None,
        };
        let until = cursor.map(|c| c.created_at);

        let gathered = match request.mode {
            FeedMode::Network => self.gather_network(request.user_id, until, now).await?,
            FeedMode::Local => self.gather_local(request.user_id, until, now).await?,
            FeedMode::Global => self.gather_global(request.user_id, until, now).await?,
        };
        let pool = match gathered {
            Gathered::Ready(pool) => pool,
            Gathered::Missing(mut page) => {
                page.cursor_reset = cursor_reset;
                info!(
                    user_id = %request.user_id,
                    mode = request.mode.as_str(),
                    reason = ?page.reason,
                    "Feed prerequisite missing"
                );
                return Ok(page);
            }
        };

        let scorer = scorer_for(request.mode, &self.scoring);
        let (candidates, mut stats) = self.score_candidates(request.mode, &pool, scorer.as_ref());
        metrics::record_skipped_candidates(request.mode.as_str(), stats.skipped_malformed);

        let mut ctx = pool.ctx;
        let page_size = request.page_size.max(1);
        let (ranked, has_next, next_cursor) = match &request.page {
            PageRequest::Cursor(_) => {
                let slice = recency_slice(candidates, cursor.as_ref(), page_size);
                let items = self.order_page(request.mode, slice.items, page_size, &mut ctx, &mut stats);
                (items, slice.has_more, slice.next_cursor.map(|c| c.encode()))
            }
            PageRequest::Offset { page } => {
                let (items, has_next) =
                    self.paginate_offset(request.mode, candidates, *page, page_size, &mut ctx, &mut stats);
                (items, has_next, None)
            }
        };

        info!(
            user_id = %request.user_id,
            mode = request.mode.as_str(),
            window = stats.window_size,
            scored = stats.scored,
            skipped = stats.skipped_malformed,
            duplicates = stats.duplicates_removed,
            capped = stats.capped_by_author,
            returned = ranked.len(),
            has_next,
            "Composed feed page"
        );

        Ok(FeedPage {
            mode: request.mode,
            items: ranked.iter().map(FeedItem::from).collect(),
            next_cursor,
            has_next,
            status: FeedStatus::Ok,
            reason: None,
            location_action: None,
            skipped_malformed: stats.skipped_malformed,
            cursor_reset,
        })
    }

    async fn viewer_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        let profile = self
            .stores
            .profiles
            .get_profile(user_id)
            .await
            .map_err(FeedError::storage)?;
        Ok(profile.unwrap_or_else(|| UserProfile::new(user_id)))
    }

    async fn gather_network(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Gathered> {
        let (primary, sets) = tokio::try_join!(
            self.graph.primary_network(user_id),
            self.interactions.interaction_sets(user_id),
        )?;

        if primary.is_empty() {
            return Ok(Gathered::Missing(FeedPage::missing(
                FeedMode::Network,
                MissingPrerequisite::NoFollows,
            )));
        }

        let secondary = self.graph.secondary_network(user_id, &primary).await?;
        let authors: Vec<Uuid> = primary.iter().chain(secondary.iter()).copied().collect();
        let posts = self
            .stores
            .posts
            .recent_posts_by_authors(&authors, until, self.settings.candidate_window)
            .await
            .map_err(FeedError::storage)?;

        Ok(Gathered::Ready(CandidatePool {
            posts,
            secondary,
            distances: HashMap::new(),
            sets,
            ctx: ScoringContext::new(now),
        }))
    }

    async fn gather_local(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Gathered> {
        let (viewer, sets) = tokio::try_join!(
            self.viewer_profile(user_id),
            self.interactions.interaction_sets(user_id),
        )?;

        let coordinate = geo::resolve_coordinate(&viewer.location, now);
        if coordinate.is_none() && !viewer.location.has_region() {
            let mut page = FeedPage::missing(FeedMode::Local, MissingPrerequisite::NoLocation);
            page.location_action = Some(geo::location_status(&viewer.location, now).recommended_action);
            return Ok(Gathered::Missing(page));
        }

        let query = LocalPoolQuery {
            exclude_user: user_id,
            center: coordinate.map(|c| (c.latitude, c.longitude)),
            radius_km: self.settings.local_max_radius_km,
            city: non_blank(&viewer.location.city),
            state: non_blank(&viewer.location.state),
            country: non_blank(&viewer.location.country),
            limit: self.settings.local_pool_limit,
        };
        let pool = self
            .stores
            .profiles
            .local_profiles(&query)
            .await
            .map_err(FeedError::storage)?;

        let mut ctx = ScoringContext::new(now);
        ctx.viewer_skills = viewer.skill_set();
        let mut distances = HashMap::with_capacity(pool.len());
        for author in pool {
            let measured = coordinate.and_then(|c| {
                geo::resolve_coordinate(&author.location, now)
                    .map(|a| geo::distance_km(c.latitude, c.longitude, a.latitude, a.longitude))
            });
            let estimate = match measured {
                Some(km) if km <= self.settings.local_max_radius_km => {
                    Some(DistanceEstimate::Measured(km))
                }
                Some(_) => None,
                None => geo::regional_distance(
                    &viewer.location,
                    &author.location,
                    &self.scoring.local.regional,
                )
                .map(DistanceEstimate::Regional),
            };
            if let Some(estimate) = estimate {
                ctx.authors.insert(author.id, author_signals(&author));
                distances.insert(author.id, estimate);
            }
        }

        debug!(user_id = %user_id, located_authors = distances.len(), "Resolved local pool");
        if distances.is_empty() {
            return Ok(Gathered::Ready(CandidatePool {
                posts: Vec::new(),
                secondary: HashSet::new(),
                distances,
                sets,
                ctx,
            }));
        }

        let authors: Vec<Uuid> = distances.keys().copied().collect();
        let posts = self
            .stores
            .posts
            .recent_posts_by_authors(&authors, until, self.settings.candidate_window)
            .await
            .map_err(FeedError::storage)?;

        Ok(Gathered::Ready(CandidatePool {
            posts,
            secondary: HashSet::new(),
            distances,
            sets,
            ctx,
        }))
    }

    async fn gather_global(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Gathered> {
        let (primary, viewer, sets) = tokio::try_join!(
            self.graph.primary_network(user_id),
            self.viewer_profile(user_id),
            self.interactions.interaction_sets(user_id),
        )?;
        let secondary = self.graph.secondary_network(user_id, &primary).await?;

        let mut excluded: HashSet<Uuid> = primary.union(&secondary).copied().collect();
        excluded.insert(user_id);

        if let Some(center) = geo::resolve_coordinate(&viewer.location, now) {
            let radius = self.settings.global_exclude_radius_km;
            let nearby = self
                .stores
                .profiles
                .profiles_within_radius(
                    user_id,
                    (center.latitude, center.longitude),
                    radius,
                    self.settings.global_exclude_limit,
                )
                .await
                .map_err(FeedError::storage)?;
            excluded.extend(nearby.iter().filter_map(|author| {
                let at = geo::resolve_coordinate(&author.location, now)?;
                let km = geo::distance_km(center.latitude, center.longitude, at.latitude, at.longitude);
                (km <= radius).then_some(author.id)
            }));
        }

        let excluded: Vec<Uuid> = excluded.into_iter().collect();
        let posts = self
            .stores
            .posts
            .recent_posts_excluding_authors(&excluded, until, self.settings.candidate_window)
            .await
            .map_err(FeedError::storage)?;

        let authors: Vec<Uuid> = posts
            .iter()
            .map(|p| p.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self
            .stores
            .profiles
            .get_profiles(&authors)
            .await
            .map_err(FeedError::storage)?;

        let mut ctx = ScoringContext::new(now);
        ctx.viewer_skills = viewer.skill_set();
        ctx.authors = profiles
            .iter()
            .map(|(id, profile)| (*id, author_signals(profile)))
            .collect();
        ctx.engaged_authors = posts
            .iter()
            .filter(|p| sets.touched(&p.id))
            .map(|p| p.author_id)
            .collect();

        Ok(Gathered::Ready(CandidatePool {
            posts,
            secondary,
            distances: HashMap::new(),
            sets,
            ctx,
        }))
    }

    /// Wrap, validate, deduplicate and score the window, then assign jitter
    fn score_candidates(
        &self,
        mode: FeedMode,
        pool: &CandidatePool,
        scorer: &dyn FeedScorer,
    ) -> (Vec<FeedCandidate>, ComposeStats) {
        let mut stats = ComposeStats {
            window_size: pool.posts.len(),
            ..Default::default()
        };
        let mut seen = HashSet::with_capacity(pool.posts.len());
        let mut candidates = Vec::with_capacity(pool.posts.len());

        for post in &pool.posts {
            let Some(created_at) = post.created_at else {
                stats.skipped_malformed += 1;
                continue;
            };
            if !seen.insert(post.id) {
                stats.duplicates_removed += 1;
                continue;
            }

            let distance = pool.distances.get(&post.author_id).copied();
            if mode == FeedMode::Local && distance.is_none() {
                stats.skipped_malformed += 1;
                continue;
            }

            let input = ScoringInput {
                post,
                created_at,
                interaction: classify(&post.id, &pool.sets),
                is_secondary_network: pool.secondary.contains(&post.author_id),
                distance,
            };
            let score = scorer.score(&input, &pool.ctx);
            if !score.value.is_finite() {
                stats.skipped_malformed += 1;
                continue;
            }

            candidates.push(FeedCandidate {
                post: Arc::new(post.clone()),
                created_at,
                distance_km: distance.map(|d| d.km()),
                distance_is_regional: matches!(distance, Some(DistanceEstimate::Regional(_))),
                score: score.value,
                jitter: 0.0,
                mode,
                is_secondary_network: input.is_secondary_network,
                interaction: input.interaction,
                reason: score.reason,
            });
        }
        stats.scored = candidates.len();

        self.assign_jitter(&mut candidates);
        (candidates, stats)
    }

    fn assign_jitter(&self, candidates: &mut [FeedCandidate]) {
        let (min, max) = candidates.iter().fold((f64::MAX, f64::MIN), |(lo, hi), c| {
            (lo.min(c.score), hi.max(c.score))
        });
        let bound = self.scoring.tie_jitter_fraction * (max - min);
        if bound.is_nan() || bound <= 0.0 {
            return;
        }
        let mut rng = rand::thread_rng();
        for candidate in candidates.iter_mut() {
            candidate.jitter = rng.gen_range(0.0..bound);
        }
    }

    /// Rank the items of one cursor page
    fn order_page(
        &self,
        mode: FeedMode,
        mut items: Vec<FeedCandidate>,
        page_size: usize,
        ctx: &mut ScoringContext,
        stats: &mut ComposeStats,
    ) -> Vec<FeedCandidate> {
        if mode != FeedMode::Global {
            items.sort_by(|a, b| a.rank_cmp(b));
            return items;
        }
        let scorer = GlobalScorer::new(&self.scoring);
        let page = self.diversity.rerank_page(&mut items, page_size, &scorer, ctx);
        // Leftovers exceeded the author cap for this page
        stats.capped_by_author += items.len();
        page
    }

    fn paginate_offset(
        &self,
        mode: FeedMode,
        mut candidates: Vec<FeedCandidate>,
        page: u32,
        page_size: usize,
        ctx: &mut ScoringContext,
        stats: &mut ComposeStats,
    ) -> (Vec<FeedCandidate>, bool) {
        candidates.sort_by(|a, b| a.rank_cmp(b));
        if mode != FeedMode::Global {
            return offset_page(candidates, page, page_size);
        }

        // Earlier pages are rebuilt so capped authors spill over consistently
        let scorer = GlobalScorer::new(&self.scoring);
        let mut current = Vec::new();
        for _ in 0..page.max(1) {
            if candidates.is_empty() {
                return (Vec::new(), false);
            }
            current = self
                .diversity
                .rerank_page(&mut candidates, page_size, &scorer, ctx);
            if current.is_empty() {
                stats.capped_by_author += candidates.len();
                return (Vec::new(), false);
            }
        }
        (current, !candidates.is_empty())
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn author_signals(profile: &UserProfile) -> AuthorSignals {
    AuthorSignals {
        skills: profile.skill_set(),
        follower_count: profile.follower_count,
    }
}
