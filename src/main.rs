// Main entry point - Dependency injection and server setup
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

use eol_force_results::application::clock::SystemClock;
use eol_force_results::application::events::TracingEventSink;
use eol_force_results::application::live_feed;
use eol_force_results::application::visualizer::{VisualizerController, VisualizerOptions};
use eol_force_results::infrastructure::config::load_settings;
use eol_force_results::infrastructure::http_dataset_source::HttpDatasetSource;
use eol_force_results::presentation::app_state::AppState;
use eol_force_results::presentation::router;

const FEED_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = load_settings().context("failed to load settings")?;

    // Create dataset source (infrastructure layer)
    let dataset_source = HttpDatasetSource::new(&settings.backend)
        .map_err(|e| anyhow::anyhow!("failed to create dataset source: {}", e))?;

    // Create controller (application layer)
    let mut controller = VisualizerController::new(
        VisualizerOptions::from_settings(&settings),
        Arc::new(SystemClock),
    );
    controller.add_sink(Arc::new(TracingEventSink));
    let controller = Arc::new(Mutex::new(controller));

    // Live feed consumes frames posted to /events
    let (feed, frames) = mpsc::channel(FEED_CAPACITY);
    tokio::spawn(live_feed::run(controller.clone(), frames));

    let state = Arc::new(AppState {
        controller,
        dataset_source: Arc::new(dataset_source),
        feed,
    });

    // Build router (presentation layer)
    let app = router(state);

    // Start server
    let addr: SocketAddr = settings
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.server.bind_addr))?;
    tracing::info!("Starting eol-force-results service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
