mod scoring;

pub use scoring::{
    FreshnessPenalties, GlobalWeights, LocalWeights, NetworkWeights, RecencyCurve,
    RegionalDistances, ScoringConfig,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub feed: FeedSettings,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub service_name: String,
    /// Emit JSON log lines instead of the human readable format
    pub json_logs: bool,
}

/// Storage backend behind the collaborator traits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unsupported store backend: {}", other)),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Candidate window caps and page bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Posts pulled from storage per request, newest first
    pub candidate_window: usize,
    /// Profiles considered for the local pool
    pub local_pool_limit: usize,
    pub local_max_radius_km: f64,
    /// Authors closer than this are left out of the global feed
    pub global_exclude_radius_km: f64,
    /// Nearby profiles read when building the global exclusion set
    pub global_exclude_limit: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub max_logs_per_author: usize,
    pub trending_window_hours: i64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            candidate_window: 500,
            local_pool_limit: 200,
            local_max_radius_km: 500.0,
            global_exclude_radius_km: 50.0,
            global_exclude_limit: 5000,
            default_page_size: 7,
            max_page_size: 50,
            max_logs_per_author: 2,
            trending_window_hours: 24,
        }
    }
}

impl FeedSettings {
    /// Clamp a requested page size into 1..=max_page_size
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = FeedSettings::default();

        let backend: StoreBackend = env_or("FEED_STORE", "postgres")?;
        let url = match backend {
            StoreBackend::Postgres => {
                env::var("DATABASE_URL").context("DATABASE_URL must be set for the postgres store")?
            }
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let mut scoring = ScoringConfig::with_default_jitter();
        scoring.network.engagement_cap =
            env_or("SCORING_ENGAGEMENT_CAP", &scoring.network.engagement_cap.to_string())?;
        scoring.network.secondary_network_factor = env_or(
            "SCORING_SECONDARY_NETWORK_FACTOR",
            &scoring.network.secondary_network_factor.to_string(),
        )?;
        scoring.tie_jitter_fraction = env_or(
            "SCORING_TIE_JITTER_FRACTION",
            &scoring.tie_jitter_fraction.to_string(),
        )?;

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("APP_PORT", "8090")?,
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "feed-ranking-service".to_string()),
                json_logs: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            database: DatabaseConfig {
                backend,
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", "2")?,
                acquire_timeout_secs: env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", "5")?,
            },
            feed: FeedSettings {
                candidate_window: env_or(
                    "FEED_CANDIDATE_WINDOW",
                    &defaults.candidate_window.to_string(),
                )?,
                local_pool_limit: env_or(
                    "FEED_LOCAL_POOL_LIMIT",
                    &defaults.local_pool_limit.to_string(),
                )?,
                local_max_radius_km: env_or(
                    "FEED_LOCAL_MAX_RADIUS_KM",
                    &defaults.local_max_radius_km.to_string(),
                )?,
                global_exclude_radius_km: env_or(
                    "FEED_GLOBAL_EXCLUDE_RADIUS_KM",
                    &defaults.global_exclude_radius_km.to_string(),
                )?,
                global_exclude_limit: env_or(
                    "FEED_GLOBAL_EXCLUDE_LIMIT",
                    &defaults.global_exclude_limit.to_string(),
                )?,
                default_page_size: env_or(
                    "FEED_DEFAULT_PAGE_SIZE",
                    &defaults.default_page_size.to_string(),
                )?,
                max_page_size: env_or("FEED_MAX_PAGE_SIZE", &defaults.max_page_size.to_string())?,
                max_logs_per_author: env_or(
                    "FEED_MAX_LOGS_PER_AUTHOR",
                    &defaults.max_logs_per_author.to_string(),
                )?,
                trending_window_hours: env_or(
                    "FEED_TRENDING_WINDOW_HOURS",
                    &defaults.trending_window_hours.to_string(),
                )?,
            },
            scoring,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.candidate_window == 0 {
            bail!("FEED_CANDIDATE_WINDOW must be positive");
        }
        if self.feed.max_page_size == 0 || self.feed.default_page_size > self.feed.max_page_size {
            bail!("FEED_DEFAULT_PAGE_SIZE must be within 1..=FEED_MAX_PAGE_SIZE");
        }
        if self.feed.max_logs_per_author == 0 {
            bail!("FEED_MAX_LOGS_PER_AUTHOR must be positive");
        }
        if self.database.min_connections > self.database.max_connections {
            bail!("DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS");
        }
        self.scoring
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid scoring config: {}", e))?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.app.env.to_ascii_lowercase().as_str(),
            "production" | "staging"
        )
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
}
