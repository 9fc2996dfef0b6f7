// HTTP dataset source backed by the EOL tester backend
use crate::application::dataset_source::{AlwaysOnline, Connectivity, DatasetSource};
use crate::domain::error::TransportError;
use crate::domain::measurement::RawTestDataset;
use crate::infrastructure::config::BackendSettings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const TEST_ID_PLACEHOLDER: &str = "${testId}";

#[derive(Clone)]
pub struct HttpDatasetSource {
    client: reqwest::Client,
    base_url: String,
    dataset_path: String,
    connectivity: Arc<dyn Connectivity>,
}

impl HttpDatasetSource {
    pub fn new(settings: &BackendSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                TransportError::NetworkUnavailable
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            dataset_path: settings.dataset_path.clone(),
            connectivity: Arc::new(AlwaysOnline),
        })
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    fn build_url(&self, test_id: &str) -> String {
        let path = self
            .dataset_path
            .replace(TEST_ID_PLACEHOLDER, &urlencoding::encode(test_id));
        format!("{}{}", self.base_url, path)
    }
}

/// Map a reqwest failure onto the transport error kinds.
fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::NetworkUnavailable
    } else if let Some(status) = err.status() {
        status_error(status.as_u16())
    } else if err.is_decode() {
        TransportError::ParseError(err.to_string())
    } else {
        TransportError::NetworkUnavailable
    }
}

fn status_error(code: u16) -> TransportError {
    if code >= 500 {
        TransportError::Http5xx(code)
    } else {
        TransportError::Http4xx(code)
    }
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn fetch_dataset(&self, test_id: &str) -> Result<RawTestDataset, TransportError> {
        if !self.connectivity.is_online() {
            return Err(TransportError::NetworkUnavailable);
        }

        let url = self.build_url(test_id);
        tracing::debug!("Fetching dataset {} from {}", test_id, url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Dataset fetch for {} failed with status {}", test_id, status);
            return Err(status_error(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| classify(&e))?;
        serde_json::from_str::<RawTestDataset>(&body).map_err(|e| TransportError::ParseError(e.to_string()))
    }
}
