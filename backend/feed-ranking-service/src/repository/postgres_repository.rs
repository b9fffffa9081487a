use super::{FollowGraphStore, InteractionStore, LocalPoolQuery, PostStore, ProfileStore};
use crate::config::DatabaseConfig;
use crate::models::{
    LocationPermission, Post, TimedCoordinate, UserLocation, UserProfile, ViewRecord,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const KM_PER_DEGREE: f64 = 111.32;

/// Haversine distance in km from ($lat_param, $lon_param) to the profile's
/// precise or approximate coordinate, whichever is closer. LEAST skips NULLs.
fn nearest_distance_sql(lat_param: u8, lon_param: u8) -> String {
    let one = |lat: &str, lon: &str| {
        format!(
            "6371.0088 * 2 * ASIN(LEAST(1.0, SQRT(\
             POWER(SIN(RADIANS(p.{lat} - ${la}) / 2), 2) + \
             COS(RADIANS(${la})) * COS(RADIANS(p.{lat})) * \
             POWER(SIN(RADIANS(p.{lon} - ${lo}) / 2), 2))))",
            lat = lat,
            lon = lon,
            la = lat_param,
            lo = lon_param,
        )
    };
    format!(
        "LEAST({}, {})",
        one("precise_latitude", "precise_longitude"),
        one("approx_latitude", "approx_longitude")
    )
}

/// Corners of a box that contains every point within `radius_km`
fn bounding_box(lat: f64, lon: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let cos_lat = lat.to_radians().cos().abs();
    let lon_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_km / (KM_PER_DEGREE * cos_lat)).min(180.0)
    };
    (lat - lat_delta, lat + lat_delta, lon - lon_delta, lon + lon_delta)
}

/// Create the connection pool and verify it with a round trip
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    debug!(
        "Creating database pool: max={}, min={}, acquire_timeout={}s",
        config.max_connections, config.min_connections, config.acquire_timeout_secs
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .test_before_acquire(true)
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("PostgreSQL connectivity check failed")?;

    info!("Database pool created and verified");
    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    content: String,
    code_snippet: Option<String>,
    image_url: Option<String>,
    link: Option<String>,
    created_at: Option<DateTime<Utc>>,
    reaction_count: i64,
    comment_count: i64,
    view_count: i64,
    recent_reaction_count: i64,
    recent_comment_count: i64,
}

fn clamp_count(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            author_id: row.author_id,
            content: row.content,
            code_snippet: row.code_snippet,
            image_url: row.image_url,
            link: row.link,
            created_at: row.created_at,
            reaction_count: clamp_count(row.reaction_count),
            comment_count: clamp_count(row.comment_count),
            view_count: clamp_count(row.view_count),
            recent_reaction_count: clamp_count(row.recent_reaction_count),
            recent_comment_count: clamp_count(row.recent_comment_count),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    skills: Vec<String>,
    follower_count: i64,
    precise_latitude: Option<f64>,
    precise_longitude: Option<f64>,
    precise_updated_at: Option<DateTime<Utc>>,
    approx_latitude: Option<f64>,
    approx_longitude: Option<f64>,
    approx_updated_at: Option<DateTime<Utc>>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    location_permission: Option<String>,
}

fn timed(lat: Option<f64>, lon: Option<f64>, at: Option<DateTime<Utc>>) -> Option<TimedCoordinate> {
    match (lat, lon, at) {
        (Some(lat), Some(lon), Some(at)) => Some(TimedCoordinate::new(lat, lon, at)),
        _ => None,
    }
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        let permission = match row.location_permission.as_deref() {
            Some("allowed") => LocationPermission::Allowed,
            Some("denied") => LocationPermission::Denied,
            _ => LocationPermission::Unknown,
        };
        UserProfile {
            id: row.user_id,
            skills: row.skills,
            follower_count: clamp_count(row.follower_count),
            location: UserLocation {
                precise: timed(row.precise_latitude, row.precise_longitude, row.precise_updated_at),
                approximate: timed(row.approx_latitude, row.approx_longitude, row.approx_updated_at),
                city: row.city,
                state: row.state,
                country: row.country,
                permission,
            },
        }
    }
}

/// Every post read goes through this projection so counts arrive in the
/// same round trip as the rows
const POST_SELECT: &str = r#"
    SELECT l.id, l.author_id, l.content, l.code_snippet, l.image_url, l.link, l.created_at,
           COALESCE(r.total, 0) AS reaction_count,
           COALESCE(c.total, 0) AS comment_count,
           COALESCE(v.total, 0) AS view_count,
           COALESCE(r.recent, 0) AS recent_reaction_count,
           COALESCE(c.recent, 0) AS recent_comment_count
    FROM logs l
    LEFT JOIN LATERAL (
        SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE lr.created_at >= $1) AS recent
        FROM log_reactions lr WHERE lr.log_id = l.id
    ) r ON TRUE
    LEFT JOIN LATERAL (
        SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE lc.created_at >= $1) AS recent
        FROM log_comments lc WHERE lc.log_id = l.id
    ) c ON TRUE
    LEFT JOIN LATERAL (
        SELECT COALESCE(SUM(lv.view_count), 0)::BIGINT AS total
        FROM log_views lv WHERE lv.log_id = l.id
    ) v ON TRUE
"#;

const PROFILE_SELECT: &str = r#"
    SELECT p.user_id, p.skills,
           (SELECT COUNT(*) FROM follows f WHERE f.following_id = p.user_id) AS follower_count,
           p.precise_latitude, p.precise_longitude, p.precise_updated_at,
           p.approx_latitude, p.approx_longitude, p.approx_updated_at,
           p.city, p.state, p.country, p.location_permission
    FROM user_profiles p
"#;

/// PostgreSQL adapter for every storage trait
#[derive(Clone)]
pub struct PgFeedStore {
    pool: PgPool,
    trending_window: ChronoDuration,
}

impl PgFeedStore {
    pub fn new(pool: PgPool, trending_window_hours: i64) -> Self {
        Self {
            pool,
            trending_window: ChronoDuration::hours(trending_window_hours),
        }
    }

    fn trending_since(&self) -> DateTime<Utc> {
        Utc::now() - self.trending_window
    }

    async fn post_ids(&self, sql: &str, user_id: Uuid, context: &'static str) -> Result<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context(context)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait::async_trait]
impl PostStore for PgFeedStore {
    async fn recent_posts_by_authors(
        &self,
        authors: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE l.author_id = ANY($2) AND ($3::timestamptz IS NULL OR l.created_at <= $3)
             ORDER BY l.created_at DESC NULLS LAST, l.id DESC LIMIT $4",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(self.trending_since())
            .bind(authors)
            .bind(until)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read posts by authors")?;

        debug!(authors = authors.len(), rows = rows.len(), "Loaded posts by authors");
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn recent_posts_excluding_authors(
        &self,
        excluded: &[Uuid],
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE NOT (l.author_id = ANY($2)) AND ($3::timestamptz IS NULL OR l.created_at <= $3)
             ORDER BY l.created_at DESC NULLS LAST, l.id DESC LIMIT $4",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(self.trending_since())
            .bind(excluded)
            .bind(until)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read posts outside the excluded authors")?;

        debug!(excluded = excluded.len(), rows = rows.len(), "Loaded discovery posts");
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn posts_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE l.created_at >= $2 ORDER BY l.created_at DESC, l.id DESC LIMIT $3",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(self.trending_since())
            .bind(since)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read recent posts")?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn posts_by_author(
        &self,
        author_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE l.author_id = $2
             ORDER BY l.created_at DESC NULLS LAST, l.id DESC LIMIT $3 OFFSET $4",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(self.trending_since())
            .bind(author_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read author history")?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[async_trait::async_trait]
impl FollowGraphStore for PgFeedStore {
    async fn followees(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT following_id FROM follows
             WHERE follower_id = $1 AND following_id <> follower_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read followees")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn followees_of_many(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT following_id FROM follows WHERE follower_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read followees of the primary network")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait::async_trait]
impl InteractionStore for PgFeedStore {
    async fn viewed_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.post_ids(
            "SELECT log_id FROM log_views WHERE user_id = $1",
            user_id,
            "Failed to read viewed logs",
        )
        .await
    }

    async fn reacted_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.post_ids(
            "SELECT log_id FROM log_reactions WHERE user_id = $1",
            user_id,
            "Failed to read reacted logs",
        )
        .await
    }

    async fn commented_post_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        // Replies carry the log id of their thread, so one scan covers every depth
        self.post_ids(
            "SELECT DISTINCT log_id FROM log_comments WHERE user_id = $1",
            user_id,
            "Failed to read commented logs",
        )
        .await
    }

    async fn upsert_views(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
        viewed_at: DateTime<Utc>,
    ) -> Result<Vec<ViewRecord>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, Uuid, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO log_views (user_id, log_id, view_count, viewed_at)
            SELECT $1, ids.log_id, 1, $3 FROM UNNEST($2::uuid[]) AS ids(log_id)
            ON CONFLICT (user_id, log_id) DO UPDATE SET
                view_count = log_views.view_count + 1,
                viewed_at = EXCLUDED.viewed_at
            RETURNING user_id, log_id, view_count, viewed_at
            "#,
        )
        .bind(user_id)
        .bind(post_ids)
        .bind(viewed_at)
        .fetch_all(&self.pool)
        .await
        .context("Failed to upsert log views")?;

        debug!(user_id = %user_id, count = rows.len(), "Upserted log views");
        Ok(rows
            .into_iter()
            .map(|(user_id, post_id, view_count, last_viewed_at)| ViewRecord {
                user_id,
                post_id,
                view_count: view_count.max(0) as u32,
                last_viewed_at,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgFeedStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let sql = format!("{} WHERE p.user_id = $1", PROFILE_SELECT);
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read user profile")?;
        Ok(row.map(UserProfile::from))
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!("{} WHERE p.user_id = ANY($1)", PROFILE_SELECT);
        let rows: Vec<ProfileRow> = sqlx::query_as(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read user profiles")?;
        Ok(rows
            .into_iter()
            .map(|row| (row.user_id, UserProfile::from(row)))
            .collect())
    }

    async fn local_profiles(&self, query: &LocalPoolQuery) -> Result<Vec<UserProfile>> {
        // Bounding box prefilter on the indexed columns, then exact distance
        // for ordering. Measured in-radius profiles fill the limit first.
        let bbox = query
            .center
            .map(|(lat, lon)| bounding_box(lat, lon, query.radius_km));
        let (lat_min, lat_max, lon_min, lon_max) = match bbox {
            Some((a, b, c, d)) => (Some(a), Some(b), Some(c), Some(d)),
            None => (None, None, None, None),
        };
        let distance = nearest_distance_sql(10, 11);

        let sql = format!(
            r#"{select} WHERE p.user_id <> $1 AND (
                ($2::float8 IS NOT NULL AND (
                    (p.precise_latitude BETWEEN $2 AND $3 AND p.precise_longitude BETWEEN $4 AND $5)
                    OR (p.approx_latitude BETWEEN $2 AND $3 AND p.approx_longitude BETWEEN $4 AND $5)
                ))
                OR ($6::text IS NOT NULL AND LOWER(TRIM(p.city)) = LOWER(TRIM($6)))
                OR ($7::text IS NOT NULL AND LOWER(TRIM(p.state)) = LOWER(TRIM($7)))
                OR ($8::text IS NOT NULL AND LOWER(TRIM(p.country)) = LOWER(TRIM($8)))
            )
            ORDER BY
                CASE
                    WHEN $10::float8 IS NOT NULL AND {distance} <= $12 THEN 0
                    WHEN $6::text IS NOT NULL AND LOWER(TRIM(p.city)) = LOWER(TRIM($6)) THEN 1
                    WHEN $7::text IS NOT NULL AND LOWER(TRIM(p.state)) = LOWER(TRIM($7)) THEN 2
                    WHEN $8::text IS NOT NULL AND LOWER(TRIM(p.country)) = LOWER(TRIM($8)) THEN 3
                    ELSE 4
                END,
                {distance} NULLS LAST,
                p.user_id
            LIMIT $9"#,
            select = PROFILE_SELECT,
            distance = distance,
        );

        let rows: Vec<ProfileRow> = sqlx::query_as(&sql)
            .bind(query.exclude_user)
            .bind(lat_min)
            .bind(lat_max)
            .bind(lon_min)
            .bind(lon_max)
            .bind(query.city.as_deref())
            .bind(query.state.as_deref())
            .bind(query.country.as_deref())
            .bind(query.limit as i64)
            .bind(query.center.map(|(lat, _)| lat))
            .bind(query.center.map(|(_, lon)| lon))
            .bind(query.radius_km)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read local author pool")?;

        debug!(rows = rows.len(), "Loaded local author pool");
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn profiles_within_radius(
        &self,
        exclude_user: Uuid,
        center: (f64, f64),
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<UserProfile>> {
        let (lat_min, lat_max, lon_min, lon_max) = bounding_box(center.0, center.1, radius_km);
        let distance = nearest_distance_sql(6, 7);

        let sql = format!(
            r#"{select} WHERE p.user_id <> $1 AND (
                (p.precise_latitude BETWEEN $2 AND $3 AND p.precise_longitude BETWEEN $4 AND $5)
                OR (p.approx_latitude BETWEEN $2 AND $3 AND p.approx_longitude BETWEEN $4 AND $5)
            ) AND {distance} <= $8
            ORDER BY {distance}, p.user_id
            LIMIT $9"#,
            select = PROFILE_SELECT,
            distance = distance,
        );

        let rows: Vec<ProfileRow> = sqlx::query_as(&sql)
            .bind(exclude_user)
            .bind(lat_min)
            .bind(lat_max)
            .bind(lon_min)
            .bind(lon_max)
            .bind(center.0)
            .bind(center.1)
            .bind(radius_km)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read profiles within radius")?;

        debug!(rows = rows.len(), radius_km, "Loaded nearby profiles");
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }
}
