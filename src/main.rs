mod answer;
mod api;
mod config;
mod dataset;
mod errors;
mod generation;
mod kb;
mod models;
mod normalize;
mod report;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::Config,
    dataset::Dataset,
    generation::{GenerationClient, TextGenerator, UnconfiguredGenerator},
    kb::KbIndex,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Active measurement snapshot. Reload builds a replacement and
    /// swaps the inner Arc; readers clone it and never block writers.
    pub dataset: Arc<RwLock<Arc<Dataset>>>,
    pub kb: Arc<RwLock<Arc<KbIndex>>>,
    pub generator: Arc<dyn TextGenerator>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bhujal_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let dataset = Dataset::load(&config.dataset_path)?;
    info!(
        records = dataset.records().len(),
        "Loaded groundwater snapshot"
    );

    let kb = KbIndex::load(&config.kb_dir)?;
    info!(documents = kb.len(), "Indexed knowledge base");
    if kb.is_empty() {
        warn!("Knowledge base is empty; ask responses will report no information");
    }

    let generator: Arc<dyn TextGenerator> = match GenerationClient::from_config(&config)? {
        Some(client) => Arc::new(client),
        None => {
            warn!("No generation provider configured; ask responses will degrade");
            Arc::new(UnconfiguredGenerator)
        }
    };

    let state = AppState {
        config: config.clone(),
        dataset: Arc::new(RwLock::new(Arc::new(dataset))),
        kb: Arc::new(RwLock::new(Arc::new(kb))),
        generator,
    };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/filters", get(api::get_filters))
        .route("/v1/water-levels", get(api::get_water_levels))
        .route("/v1/water-levels/series", get(api::get_series))
        .route("/v1/search", get(api::search_kb))
        .route("/v1/ask", post(api::ask))
        .route("/v1/reports", post(api::generate_report))
        .route("/v1/reload", post(api::reload))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("bhujal-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
