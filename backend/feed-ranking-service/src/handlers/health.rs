use actix_web::{get, web, HttpResponse};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics;

/// Readiness: storage must answer
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    if let Err(e) = state.profiles.health_check().await {
        warn!(error = %e, "Health check failed");
        return Err(AppError::ServiceUnavailable(format!("storage: {:#}", e)));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

#[get("/metrics")]
pub async fn serve_metrics() -> AppResult<HttpResponse> {
    let body = metrics::render().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}
