// Presentation layer - HTTP surface over the visualizer controller
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    clear_filters, compare, export, fetch_dataset, get_history, get_history_overview, get_history_scatter,
    get_matrix, get_series, get_statistics, health_check, load_dataset, post_event, run_analysis, set_filters,
};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/datasets", post(load_dataset))
        .route("/datasets/:test_id/fetch", post(fetch_dataset))
        .route("/matrix", get(get_matrix))
        .route("/statistics", get(get_statistics))
        .route("/series", get(get_series))
        .route("/history", get(get_history))
        .route("/history/overview", get(get_history_overview))
        .route("/history/scatter", get(get_history_scatter))
        .route("/filters", put(set_filters).delete(clear_filters))
        .route("/analysis", post(run_analysis))
        .route("/export/:format", get(export))
        .route("/comparison", post(compare))
        .route("/events", post(post_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
