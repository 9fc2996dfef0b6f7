// Presentation events emitted by the visualizer controller
use crate::domain::analysis::AnalysisKind;
use crate::domain::comparison::ComparisonReport;
use crate::domain::filters::Filters;
use crate::domain::matrix::RowStatistics;
use crate::domain::statistics::Statistics;
use crate::infrastructure::export::ExportFormat;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualizerState {
    Idle,
    Loading,
    Ready,
    Error,
}

impl fmt::Display for VisualizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Immutable snapshots handed to presentation collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualizerEvent {
    StateChange {
        from: VisualizerState,
        to: VisualizerState,
    },
    DatasetLoaded {
        test_id: Option<String>,
    },
    FiltersChanged {
        filters: Filters,
    },
    StatisticsChanged {
        statistics: Statistics,
        /// The row touched by an incremental update, if any.
        row: Option<RowStatistics>,
    },
    AnalysisReady {
        kinds: Vec<AnalysisKind>,
    },
    ExportReady {
        format: ExportFormat,
        bytes: Bytes,
    },
    ComparisonReady {
        report: ComparisonReport,
    },
    MessageRequested {
        text: String,
        level: MessageLevel,
    },
}

impl VisualizerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "stateChange",
            Self::DatasetLoaded { .. } => "datasetLoaded",
            Self::FiltersChanged { .. } => "filtersChanged",
            Self::StatisticsChanged { .. } => "statisticsChanged",
            Self::AnalysisReady { .. } => "analysisReady",
            Self::ExportReady { .. } => "exportReady",
            Self::ComparisonReady { .. } => "comparisonReady",
            Self::MessageRequested { .. } => "messageRequested",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn notify(&self, event: &VisualizerEvent);
}

/// Logs every event; keeps the service observable without a UI attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn notify(&self, event: &VisualizerEvent) {
        match event {
            VisualizerEvent::StateChange { from, to } => {
                tracing::info!("Visualizer state {} -> {}", from, to);
            }
            VisualizerEvent::DatasetLoaded { test_id } => {
                tracing::info!("Dataset loaded: {}", test_id.as_deref().unwrap_or("<unnamed>"));
            }
            VisualizerEvent::StatisticsChanged { statistics, .. } => {
                tracing::debug!(
                    "Statistics: total={} mean={:.3} passRate={:.2}%",
                    statistics.total,
                    statistics.mean,
                    statistics.pass_rate
                );
            }
            VisualizerEvent::ExportReady { format, bytes } => {
                tracing::info!("Export ready: {} ({} bytes)", format, bytes.len());
            }
            VisualizerEvent::MessageRequested { text, level } => match level {
                MessageLevel::Error => tracing::error!("{}", text),
                MessageLevel::Warning => tracing::warn!("{}", text),
                MessageLevel::Info => tracing::info!("{}", text),
            },
            other => tracing::debug!("Visualizer event: {}", other.name()),
        }
    }
}
