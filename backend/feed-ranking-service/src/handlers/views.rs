/// View recording endpoints
///
/// Recording runs on a spawned task; the client gets 202 immediately and
/// the feed path never waits on the upsert.
use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::{AppState, AuthenticatedUser};
use crate::metrics;
use crate::services::FeedComposer;

/// Upper bound on ids accepted by one batch call
const MAX_BATCH_VIEWS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecordViewRequest {
    pub post_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RecordViewBatchRequest {
    pub post_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ViewsAccepted {
    pub accepted: usize,
}

fn spawn_recording(composer: Arc<FeedComposer>, user_id: Uuid, post_ids: Vec<Uuid>) {
    let requested = post_ids.len();
    tokio::spawn(async move {
        match composer
            .interactions()
            .record_view_batch(user_id, &post_ids)
            .await
        {
            Ok(records) => metrics::record_views("success", records.len()),
            Err(e) => {
                metrics::record_views("error", requested);
                error!(user_id = %user_id, count = requested, error = %e, "Failed to record log views");
            }
        }
    });
}

#[post("/api/v1/feed/views")]
pub async fn record_view(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<RecordViewRequest>,
) -> AppResult<HttpResponse> {
    spawn_recording(state.composer.clone(), user.0, vec![body.post_id]);
    Ok(HttpResponse::Accepted().json(ViewsAccepted { accepted: 1 }))
}

#[post("/api/v1/feed/views/batch")]
pub async fn record_view_batch(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<RecordViewBatchRequest>,
) -> AppResult<HttpResponse> {
    let post_ids = body.into_inner().post_ids;
    if post_ids.len() > MAX_BATCH_VIEWS {
        warn!(user_id = %user.0, count = post_ids.len(), "Oversized view batch rejected");
        return Err(AppError::BadRequest(format!(
            "at most {} post ids per batch",
            MAX_BATCH_VIEWS
        )));
    }

    let accepted = post_ids.len();
    if accepted > 0 {
        spawn_recording(state.composer.clone(), user.0, post_ids);
    }
    Ok(HttpResponse::Accepted().json(ViewsAccepted { accepted }))
}
