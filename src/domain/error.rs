// Error kinds shared by every force-results component
use thiserror::Error;

/// Terminal outcome of a dataset fetch. Surfaced unchanged; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("request timed out")]
    Timeout,
    #[error("client error: HTTP {0}")]
    Http4xx(u16),
    #[error("server error: HTTP {0}")]
    Http5xx(u16),
    #[error("malformed response: {0}")]
    ParseError(String),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForceResultsError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The statistical formula is undefined for the current sample.
    #[error("degenerate sample: {0}")]
    Degenerate(String),

    #[error("at least 2 groups are required, found {found}")]
    InsufficientGroups { found: usize },

    #[error("{observations} observations are not enough for {groups} groups")]
    InsufficientData { observations: usize, groups: usize },

    #[error("export format '{0}' is not supported")]
    Unsupported(String),

    #[error("operation superseded by a newer load")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ForceResultsError {
    /// Short machine-readable kind, used in event payloads and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::Degenerate(_) => "degenerate",
            Self::InsufficientGroups { .. } => "insufficient_groups",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Unsupported(_) => "unsupported",
            Self::Cancelled => "cancelled",
            Self::Transport(_) => "transport",
        }
    }
}

pub type Result<T> = std::result::Result<T, ForceResultsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts() {
        let err: ForceResultsError = TransportError::Http5xx(503).into();
        assert_eq!(err.kind(), "transport");
        assert_eq!(err.to_string(), "server error: HTTP 503");
    }
}
