//! AI News Alert: binary entrypoint.
//! Boots the news pipeline, the collection timer and the Axum control surface.

use std::sync::Arc;

use ai_news_alert::api::{self, AppState};
use ai_news_alert::metrics::Metrics;
use ai_news_alert::scheduler::spawn_scheduler;
use ai_news_alert::{Collaborators, NewsPipeline, PipelineConfig};
use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NEWS_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NEWS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_alert=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let config = PipelineConfig::load_default().context("loading pipeline config")?;
    let metrics = Metrics::init(config.broker.queue_capacity)?;
    let interval = config.scheduler_interval();

    let collaborators = Collaborators::from_env(&config)?;
    let pipeline = Arc::new(NewsPipeline::launch(config, collaborators)?);
    spawn_scheduler(Arc::clone(&pipeline), interval);

    let router = api::router(AppState::new(pipeline)).merge(metrics.router());
    Ok(router.into())
}
