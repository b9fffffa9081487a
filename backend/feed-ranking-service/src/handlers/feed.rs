/// Feed API Handlers
///
/// GET /api/v1/feed serves one ranked page for the requested mode.
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::handlers::{AppState, AuthenticatedUser};
use crate::models::{FeedMode, FeedRequest, PageRequest};

/// Query parameters for GET /api/v1/feed
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// "network" (default), "local" or "global"
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Opaque cursor from the previous page
    pub cursor: Option<String>,

    /// 1-based page number; switches to offset pagination
    pub page: Option<u32>,

    /// Clamped to 1..=max_page_size
    pub page_size: Option<usize>,
}

fn default_mode() -> String {
    "network".to_string()
}

impl FeedQuery {
    fn into_request(self, user_id: uuid::Uuid, page_size: usize) -> AppResult<FeedRequest> {
        let mode: FeedMode = self.mode.parse().map_err(AppError::BadRequest)?;

        let page = match self.page {
            Some(page) => PageRequest::Offset { page: page.max(1) },
            None => PageRequest::Cursor(self.cursor.filter(|c| !c.trim().is_empty())),
        };

        Ok(FeedRequest {
            user_id,
            mode,
            page,
            page_size,
        })
    }
}

#[get("/api/v1/feed")]
pub async fn get_feed(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<FeedQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let page_size = state.composer.settings().clamp_page_size(query.page_size);
    let request = query.into_request(user.0, page_size)?;

    debug!(
        user_id = %request.user_id,
        mode = %request.mode,
        page_size,
        "Feed request"
    );

    let page = state.composer.compose_feed(&request).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Whether the client should use, request or re-request device location
#[get("/api/v1/feed/location-status")]
pub async fn location_status(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let status = state.composer.location_status(user.0).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn query(mode: &str, cursor: Option<&str>, page: Option<u32>) -> FeedQuery {
        FeedQuery {
            mode: mode.to_string(),
            cursor: cursor.map(str::to_string),
            page,
            page_size: None,
        }
    }

    #[test]
    fn test_page_number_selects_offset_mode() {
        let request = query("global", Some("ignored"), Some(3))
            .into_request(Uuid::new_v4(), 7)
            .unwrap();
        assert_eq!(request.mode, FeedMode::Global);
        assert_eq!(request.page, PageRequest::Offset { page: 3 });
    }

    #[test]
    fn test_blank_cursor_is_first_page() {
        let request = query("Local", Some("  "), None)
            .into_request(Uuid::new_v4(), 7)
            .unwrap();
        assert_eq!(request.mode, FeedMode::Local);
        assert_eq!(request.page, PageRequest::Cursor(None));
    }

    #[test]
    fn test_page_zero_clamps_to_first_page() {
        let request = query("network", None, Some(0))
            .into_request(Uuid::new_v4(), 7)
            .unwrap();
        assert_eq!(request.page, PageRequest::Offset { page: 1 });
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(matches!(
            query("everything", None, None).into_request(Uuid::new_v4(), 7),
            Err(AppError::BadRequest(_))
        ));
    }
}
