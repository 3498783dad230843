//! Footfall dashboard service: binary entrypoint.
//! Loads configuration, wires the pipeline and serves the Axum router.

use std::sync::Arc;

use footfall_dashboard::{
    api::{create_router, AppState},
    auth::AuthFlag,
    clock::SystemClock,
    metrics::Metrics,
    Pipeline, PipelineConfig,
};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FOOTFALL_DEV_LOG=1 (or `json` for structured output)
fn enable_dev_tracing() {
    let flag = std::env::var("FOOTFALL_DEV_LOG").unwrap_or_default();
    if !matches!(flag.as_str(), "1" | "json") {
        return;
    }

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );
    if !is_dev_env {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline=info,ingest=info,warn"));

    // the runtime may already have installed a subscriber
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if flag == "json" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = PipelineConfig::load_default()?;

    // A configured token means the session talks to the real source.
    let auth = Arc::new(AuthFlag::new(cfg.source_token.is_some()));
    let pipeline = Pipeline::from_config(&cfg, Arc::new(SystemClock), auth)?;

    tracing::info!(
        target: "pipeline",
        source = cfg.source_url.as_deref().unwrap_or("synthetic"),
        cadence_minutes = cfg.cadence_minutes,
        "pipeline ready"
    );

    let mut router = create_router(AppState::new(pipeline));
    match Metrics::init(cfg.cadence()) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "metrics disabled"),
    }

    Ok(router.into())
}
