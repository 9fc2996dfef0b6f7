// Application state for HTTP handlers
use crate::application::dataset_source::DatasetSource;
use crate::application::live_feed::SharedController;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct AppState {
    pub controller: SharedController,
    pub dataset_source: Arc<dyn DatasetSource>,
    /// Raw event-channel frames for the live feed task.
    pub feed: mpsc::Sender<String>,
}
