/// Trending API Handlers
///
/// Most engaged logs of the last few hours, shared by every viewer
use actix_web::{get, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::handlers::AppState;
use crate::services::trending::TrendingLog;

/// Query parameters for GET /api/v1/feed/trending
#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    /// Limit (default: 10, max: 50)
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Look-back window in hours (default: 24, max: 168)
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_limit() -> usize {
    10
}

fn default_hours() -> i64 {
    24
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub logs: Vec<TrendingLog>,
    pub hours: i64,
}

#[get("/api/v1/feed/trending")]
pub async fn get_trending(
    state: web::Data<AppState>,
    query: web::Query<TrendingQuery>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.clamp(1, 50);
    let hours = query.hours.clamp(1, 168);

    let logs = state.trending.trending_logs(limit, hours).await?;
    Ok(HttpResponse::Ok().json(TrendingResponse { logs, hours }))
}
