//! HTTP handlers
//!
//! The gateway authenticates callers and forwards the user id in the
//! `x-user-id` header; handlers never see credentials.

pub mod feed;
pub mod health;
pub mod profile;
pub mod trending;
pub mod views;

use actix_web::{web, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::repository::ProfileStore;
use crate::services::{FeedComposer, ProfileHistory, TrendingService};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared state for every handler
pub struct AppState {
    pub composer: Arc<FeedComposer>,
    pub trending: TrendingService,
    pub history: ProfileHistory,
    /// Storage health for GET /health
    pub profiles: Arc<dyn ProfileStore>,
}

/// Viewer id forwarded by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        let result = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("User ID missing".to_string()))
            .and_then(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
                    .map(AuthenticatedUser)
                    .ok_or_else(|| AppError::Unauthorized("User ID is not a valid UUID".to_string()))
            });
        ready(result)
    }
}

/// Register every route on an actix `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(health::serve_metrics)
        .service(feed::location_status)
        .service(trending::get_trending)
        .service(views::record_view)
        .service(views::record_view_batch)
        .service(feed::get_feed)
        .service(profile::get_user_logs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_extractor_reads_header() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, id.to_string()))
            .to_http_request();
        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.0, id);
    }

    #[actix_rt::test]
    async fn test_extractor_rejects_missing_or_garbled_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&req).await,
            Err(AppError::Unauthorized(_))
        ));

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(AuthenticatedUser::extract(&req).await.is_err());
    }
}
