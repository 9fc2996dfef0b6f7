// Collaborator traits for fetching datasets
use crate::domain::error::TransportError;
use crate::domain::measurement::RawTestDataset;
use async_trait::async_trait;

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Fetch the dataset for `test_id`. Yields a single terminal outcome;
    /// implementations do not retry.
    async fn fetch_dataset(&self, test_id: &str) -> Result<RawTestDataset, TransportError>;
}

/// Connectivity check, so fetches can fail fast while offline.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}
