use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileLogsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    pub per_page: Option<usize>,
}

fn default_page() -> u32 {
    1
}

/// An author's own logs, newest first (offset pagination)
#[get("/api/v1/users/{user_id}/logs")]
pub async fn get_user_logs(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<ProfileLogsQuery>,
) -> AppResult<HttpResponse> {
    let per_page = state.composer.settings().clamp_page_size(query.per_page);
    let page = state
        .history
        .page(path.into_inner(), query.page, per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}
