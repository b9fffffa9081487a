use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use feed_ranking_service::config::{Config, StoreBackend};
use feed_ranking_service::handlers::{self, AppState};
use feed_ranking_service::repository::{create_pool, FeedStores, InMemoryFeedStore, PgFeedStore};
use feed_ranking_service::services::{FeedComposer, ProfileHistory, TrendingService};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Configuration loading failed")?;
    init_tracing(config.app.json_logs);

    tracing::info!(
        service = %config.app.service_name,
        env = %config.app.env,
        store = ?config.database.backend,
        "Starting feed ranking service"
    );

    let stores = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database)
                .await
                .context("Failed to connect to PostgreSQL")?;
            FeedStores::from_shared(Arc::new(PgFeedStore::new(
                pool,
                config.feed.trending_window_hours,
            )))
        }
        StoreBackend::Memory => {
            if config.is_production() {
                tracing::warn!("In-memory store selected in a production environment");
            }
            FeedStores::from_shared(Arc::new(InMemoryFeedStore::new()))
        }
    };

    let state = web::Data::new(AppState {
        trending: TrendingService::new(stores.posts.clone(), config.feed.candidate_window),
        history: ProfileHistory::new(stores.posts.clone()),
        profiles: stores.profiles.clone(),
        composer: Arc::new(FeedComposer::new(
            stores,
            config.feed.clone(),
            config.scoring.clone(),
        )),
    });

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server terminated with an error")?;

    tracing::info!("Feed ranking service stopped");
    Ok(())
}
