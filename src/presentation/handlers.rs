// HTTP request handlers
use crate::application::events::VisualizerState;
use crate::application::live_feed::SharedController;
use crate::application::visualizer::{LoadOptions, LoadTicket, VisualizerController};
use crate::domain::analysis::{AnalysisKind, AnalysisReport, Grouping};
use crate::domain::comparison::ComparisonReport;
use crate::domain::error::{ForceResultsError, TransportError};
use crate::domain::filters::Filters;
use crate::domain::history::{HistoryOverview, HistoryPoint, HistorySummary};
use crate::domain::measurement::RawTestDataset;
use crate::domain::series::ChartSeries;
use crate::domain::statistics::Statistics;
use crate::infrastructure::compression::{accepts_brotli, brotli_compress};
use crate::infrastructure::export::{write_artifact, ExportDocument, ExportFormat};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug)]
pub enum ApiError {
    Core(ForceResultsError),
    Internal(String),
}

impl From<ForceResultsError> for ApiError {
    fn from(e: ForceResultsError) -> Self {
        Self::Core(e)
    }
}

pub fn status_for(error: &ForceResultsError) -> StatusCode {
    match error {
        ForceResultsError::InvalidData(_) | ForceResultsError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
        ForceResultsError::Degenerate(_)
        | ForceResultsError::InsufficientGroups { .. }
        | ForceResultsError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ForceResultsError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ForceResultsError::Cancelled | ForceResultsError::Transport(TransportError::Cancelled) => {
            StatusCode::CONFLICT
        }
        ForceResultsError::Transport(TransportError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        ForceResultsError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, message) = match self {
            Self::Core(e) => (status_for(&e), e.kind(), e.to_string()),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
        };
        let body = serde_json::json!({ "error": kind, "message": message });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: VisualizerState,
    pub test_id: Option<String>,
    pub statistics: Statistics,
    pub filters: Filters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    fn of(vc: &VisualizerController) -> Self {
        Self {
            state: vc.state(),
            test_id: vc
                .current_dataset()
                .and_then(|d| d.test_id())
                .map(str::to_string),
            statistics: vc.statistics(),
            filters: vc.filters().clone(),
            last_error: vc.last_error().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBody {
    pub tests: Vec<AnalysisKind>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub grouping: Grouping,
}

#[derive(Debug, Deserialize)]
pub struct ComparisonBody {
    pub selection: Vec<usize>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Load a dataset posted in wire form
pub async fn load_dataset(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawTestDataset>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let mut vc = state.controller.lock().await;
    vc.load_data(raw, LoadOptions::default())?;
    Ok(Json(StatusSnapshot::of(&vc)))
}

/// Abandons its load ticket when dropped before [`PendingLoad::settle`].
/// axum drops the handler future when the client goes away mid-fetch.
struct PendingLoad {
    controller: SharedController,
    ticket: Option<LoadTicket>,
}

impl PendingLoad {
    fn new(controller: SharedController, ticket: LoadTicket) -> Self {
        Self {
            controller,
            ticket: Some(ticket),
        }
    }

    fn settle(&mut self) {
        self.ticket = None;
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        match self.controller.try_lock() {
            Ok(mut vc) => {
                vc.abandon_load(ticket);
            }
            Err(_) => {
                let controller = self.controller.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            controller.lock().await.abandon_load(ticket);
                        });
                    }
                    Err(_) => tracing::warn!("Load {} left pending without a runtime", ticket.generation()),
                }
            }
        }
    }
}

/// Fetch a dataset from the backend and load it. The controller lock is not
/// held across the fetch, so a newer load supersedes this one.
pub async fn fetch_dataset(
    Path(test_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let ticket = state.controller.lock().await.begin_load();
    let mut pending = PendingLoad::new(state.controller.clone(), ticket);
    let outcome = state.dataset_source.fetch_dataset(&test_id).await;

    let mut vc = state.controller.lock().await;
    pending.settle();
    vc.finish_load(ticket, outcome, LoadOptions::default())?;
    Ok(Json(StatusSnapshot::of(&vc)))
}

pub async fn get_matrix(State(state): State<Arc<AppState>>) -> Result<Json<ExportDocument>, StatusCode> {
    let vc = state.controller.lock().await;
    vc.matrix_document().map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_statistics(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let vc = state.controller.lock().await;
    Json(StatusSnapshot::of(&vc))
}

pub async fn get_series(State(state): State<Arc<AppState>>) -> Result<Json<ChartSeries>, StatusCode> {
    let vc = state.controller.lock().await;
    vc.chart_series().map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<HistorySummary>> {
    let vc = state.controller.lock().await;
    Json(vc.history_summaries())
}

pub async fn get_history_overview(State(state): State<Arc<AppState>>) -> Json<HistoryOverview> {
    let vc = state.controller.lock().await;
    Json(vc.history_overview())
}

pub async fn get_history_scatter(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryPoint>> {
    let vc = state.controller.lock().await;
    Json(vc.history_scatter())
}

pub async fn set_filters(
    State(state): State<Arc<AppState>>,
    Json(filters): Json<Filters>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let mut vc = state.controller.lock().await;
    vc.set_filters(filters)?;
    Ok(Json(StatusSnapshot::of(&vc)))
}

pub async fn clear_filters(State(state): State<Arc<AppState>>) -> Result<Json<StatusSnapshot>, ApiError> {
    let mut vc = state.controller.lock().await;
    vc.clear_filters()?;
    Ok(Json(StatusSnapshot::of(&vc)))
}

pub async fn run_analysis(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnalysisBody>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let mut vc = state.controller.lock().await;
    let mut request = vc.analysis_request(body.tests).with_grouping(body.grouping);
    if let Some(level) = body.confidence_level {
        request.confidence_level = level;
    }
    Ok(Json(vc.run_analysis(&request)?))
}

/// Export the filtered matrix, Brotli-compressed when the client accepts it
pub async fn export(
    Path(format): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, ApiError> {
    let format: ExportFormat = format.parse()?;
    let artifact = state.controller.lock().await.export_as(format)?;

    let compress = accepts_brotli(
        headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok()),
    );

    let mut payload = Vec::with_capacity(artifact.bytes.len());
    write_artifact(&artifact, &mut payload)
        .await
        .map_err(|e| ApiError::Internal(format!("export write failed: {}", e)))?;
    if compress {
        payload = brotli_compress(&payload)
            .await
            .map_err(|e| ApiError::Internal(format!("brotli compression failed: {}", e)))?;
    }

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        );
    if compress {
        response = response.header(header::CONTENT_ENCODING, "br");
    }
    response
        .body(Body::from(payload))
        .map_err(|e| ApiError::Internal(format!("response build failed: {}", e)))
}

pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ComparisonBody>,
) -> Result<Json<ComparisonReport>, ApiError> {
    let mut vc = state.controller.lock().await;
    Ok(Json(vc.begin_compare(body.selection)?))
}

/// Hand a raw event-channel frame to the live feed
pub async fn post_event(State(state): State<Arc<AppState>>, frame: String) -> StatusCode {
    match state.feed.send(frame).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            tracing::warn!("Live feed is closed; dropping event frame");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
