// Visualizer controller - owns the current dataset and every derived view
use crate::application::clock::Clock;
use crate::application::events::{EventSink, MessageLevel, VisualizerEvent, VisualizerState};
use crate::domain::analysis::{self, AnalysisReport, AnalysisRequest, DEFAULT_CONFIDENCE_LEVEL};
use crate::domain::comparison::{self, ComparisonReport};
use crate::domain::error::{ForceResultsError, Result, TransportError};
use crate::domain::filters::Filters;
use crate::domain::history::{
    HistoryEntry, HistoryOverview, HistoryPoint, HistoryStore, HistorySummary, DEFAULT_MAX_HISTORY_ENTRIES,
};
use crate::domain::matrix::{ForceMatrix, MatrixCell};
use crate::domain::measurement::{replace_measurement, Measurement, PassCriterion, RawTestDataset, TestDataset};
use crate::domain::series::ChartSeries;
use crate::domain::statistics::{Statistics, StatisticsPatch};
use crate::infrastructure::config::Settings;
use crate::infrastructure::export::{self, ExportArtifact, ExportDocument, ExportFormat};
use crate::infrastructure::message::{CellUpdate, IncrementalUpdate};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizerOptions {
    pub max_history_entries: usize,
    /// Loaded datasets with a test id are kept in history for comparison.
    pub comparison_mode: bool,
    pub incremental_updates: bool,
    pub confidence_level: f64,
    /// Used when an incoming dataset carries no pass criterion.
    pub default_criterion: PassCriterion,
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self {
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            comparison_mode: true,
            incremental_updates: true,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            default_criterion: PassCriterion::new(0.0, 1000.0, 0.1),
        }
    }
}

impl VisualizerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_history_entries: settings.visualizer.max_history_entries,
            comparison_mode: settings.visualizer.comparison_mode,
            incremental_updates: settings.visualizer.incremental_updates,
            confidence_level: settings.visualizer.confidence_level,
            default_criterion: settings.pass_criterion.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep this load out of history even in comparison mode.
    pub skip_history: bool,
}

/// Issued by [`VisualizerController::begin_load`]. Only the latest ticket
/// may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub applied: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct CurrentDataset {
    dataset: TestDataset,
    matrix: ForceMatrix,
}

/// Filtered measurements plus the matrix and statistics derived from them.
#[derive(Debug, Clone)]
struct FilteredView {
    measurements: Vec<Measurement>,
    matrix: ForceMatrix,
    statistics: Statistics,
}

impl FilteredView {
    fn derive(dataset: &TestDataset, filters: &Filters) -> Result<Self> {
        let criterion = dataset.pass_criterion();
        let measurements = filters.apply(dataset.measurements(), criterion)?;
        let matrix = ForceMatrix::from_measurements(
            dataset.temperature_list(),
            dataset.stroke_positions(),
            &measurements,
            criterion,
        );
        let statistics = Statistics::from_matrix(&matrix);
        Ok(Self {
            measurements,
            matrix,
            statistics,
        })
    }
}

pub struct VisualizerController {
    options: VisualizerOptions,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn EventSink>>,
    state: VisualizerState,
    last_error: Option<ForceResultsError>,
    current: Option<CurrentDataset>,
    view: Option<FilteredView>,
    filters: Filters,
    history: HistoryStore,
    comparison_selection: Vec<usize>,
    generation: u64,
    in_flight: Option<u64>,
    pending_cells: Vec<CellUpdate>,
    pending_patch: Option<StatisticsPatch>,
}

impl VisualizerController {
    pub fn new(options: VisualizerOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            history: HistoryStore::new(options.max_history_entries),
            options,
            clock,
            sinks: Vec::new(),
            state: VisualizerState::Idle,
            last_error: None,
            current: None,
            view: None,
            filters: Filters::default(),
            comparison_selection: Vec::new(),
            generation: 0,
            in_flight: None,
            pending_cells: Vec::new(),
            pending_patch: None,
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn options(&self) -> &VisualizerOptions {
        &self.options
    }

    pub fn state(&self) -> VisualizerState {
        self.state
    }

    pub fn last_error(&self) -> Option<&ForceResultsError> {
        self.last_error.as_ref()
    }

    pub fn current_dataset(&self) -> Option<&TestDataset> {
        self.current.as_ref().map(|c| &c.dataset)
    }

    /// The unfiltered matrix of the current dataset.
    pub fn full_matrix(&self) -> Option<&ForceMatrix> {
        self.current.as_ref().map(|c| &c.matrix)
    }

    /// The matrix of the filtered view.
    pub fn matrix(&self) -> Option<&ForceMatrix> {
        self.view.as_ref().map(|v| &v.matrix)
    }

    pub fn filtered_measurements(&self) -> &[Measurement] {
        self.view
            .as_ref()
            .map(|v| v.measurements.as_slice())
            .unwrap_or_default()
    }

    /// Summary of the filtered view; all zeros with no dataset.
    pub fn statistics(&self) -> Statistics {
        self.view.as_ref().map(|v| v.statistics).unwrap_or_default()
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_summaries(&self) -> Vec<HistorySummary> {
        self.history.summaries()
    }

    pub fn history_overview(&self) -> HistoryOverview {
        self.history.overview()
    }

    pub fn history_scatter(&self) -> Vec<HistoryPoint> {
        self.history.scatter()
    }

    pub fn comparison_selection(&self) -> &[usize] {
        &self.comparison_selection
    }

    pub fn chart_series(&self) -> Option<ChartSeries> {
        self.matrix().map(ChartSeries::from_matrix)
    }

    /// The filtered view in the same layout as the JSON export.
    pub fn matrix_document(&self) -> Option<ExportDocument> {
        let view = self.view.as_ref()?;
        Some(ExportDocument::new(
            &view.matrix,
            &view.statistics,
            &self.filters,
            self.clock.now(),
        ))
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Start a load. Any ticket issued earlier is superseded.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        if let Some(previous) = self.in_flight.replace(self.generation) {
            tracing::debug!("Load {} superseded by {}", previous, self.generation);
        }
        self.transition(VisualizerState::Loading);
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Commit the outcome of a load started with `ticket`. A superseded
    /// ticket returns `Cancelled` without touching any state.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        outcome: std::result::Result<RawTestDataset, TransportError>,
        options: LoadOptions,
    ) -> Result<()> {
        if self.in_flight != Some(ticket.generation) {
            tracing::debug!("Discarding result of cancelled load {}", ticket.generation);
            return Err(ForceResultsError::Cancelled);
        }
        self.in_flight = None;

        let loaded = outcome
            .map_err(ForceResultsError::from)
            .and_then(|raw| raw.validate(self.options.default_criterion, self.clock.now()))
            .and_then(|dataset| {
                let view = FilteredView::derive(&dataset, &self.filters)?;
                Ok((dataset, view))
            });

        match loaded {
            Ok((dataset, view)) => {
                self.commit(dataset, view, options);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Give up on a load whose result will never arrive. The ticket is
    /// spent, and the controller leaves Loading for whatever it showed before.
    /// Returns false when `ticket` was already superseded or finished.
    pub fn abandon_load(&mut self, ticket: LoadTicket) -> bool {
        if self.in_flight != Some(ticket.generation) {
            return false;
        }
        self.in_flight = None;
        tracing::debug!("Load {} abandoned", ticket.generation);
        if self.state == VisualizerState::Loading {
            let to = if self.current.is_some() {
                VisualizerState::Ready
            } else {
                VisualizerState::Idle
            };
            self.transition(to);
        }
        true
    }

    pub fn load_data(&mut self, raw: RawTestDataset, options: LoadOptions) -> Result<()> {
        let ticket = self.begin_load();
        self.finish_load(ticket, Ok(raw), options)
    }

    fn commit(&mut self, dataset: TestDataset, view: FilteredView, options: LoadOptions) {
        let matrix = ForceMatrix::build(&dataset);

        if self.options.comparison_mode && !options.skip_history && dataset.test_id().is_some() {
            self.history
                .add(HistoryEntry::new(dataset.clone(), self.clock.now()));
        }

        let test_id = dataset.test_id().map(str::to_string);
        tracing::debug!(
            "Loaded dataset {} ({} measurements, {}x{} matrix)",
            test_id.as_deref().unwrap_or("<unnamed>"),
            dataset.measurements().len(),
            matrix.temperatures().len(),
            matrix.strokes().len()
        );

        let statistics = view.statistics;
        self.current = Some(CurrentDataset { dataset, matrix });
        self.view = Some(view);
        self.comparison_selection.clear();
        self.pending_cells.clear();
        self.pending_patch = None;
        self.last_error = None;

        self.transition(VisualizerState::Ready);
        self.emit(VisualizerEvent::DatasetLoaded { test_id });
        self.emit(VisualizerEvent::StatisticsChanged {
            statistics,
            row: None,
        });
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    pub fn set_filters(&mut self, filters: Filters) -> Result<()> {
        let derived = filters.validate().and_then(|_| {
            self.current
                .as_ref()
                .map(|c| FilteredView::derive(&c.dataset, &filters))
                .transpose()
        });
        let view = match derived {
            Ok(view) => view,
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        tracing::debug!("Filters updated (empty: {})", filters.is_empty());
        self.filters = filters;
        let statistics = view.as_ref().map(|v| v.statistics);
        if view.is_some() {
            self.view = view;
        }
        self.recover();
        self.emit(VisualizerEvent::FiltersChanged {
            filters: self.filters.clone(),
        });
        if let Some(statistics) = statistics {
            self.emit(VisualizerEvent::StatisticsChanged {
                statistics,
                row: None,
            });
        }
        Ok(())
    }

    pub fn clear_filters(&mut self) -> Result<()> {
        self.set_filters(Filters::default())
    }

    // -----------------------------------------------------------------------
    // Analysis, export, comparison
    // -----------------------------------------------------------------------

    /// Run the requested analyses over the filtered measurements. Kinds that
    /// fail are listed in the report; the call fails only when all of them do.
    pub fn run_analysis(&mut self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        let report = match self.view.as_ref() {
            Some(view) => analysis::run(request, &view.measurements),
            None => return Err(self.no_dataset()),
        };

        if report.results.is_empty() {
            if let Some(failure) = report.failures.first() {
                let e = failure.error.clone();
                self.fail(e.clone());
                return Err(e);
            }
        }

        tracing::debug!(
            "Analysis finished: {} results, {} failures",
            report.results.len(),
            report.failures.len()
        );
        self.recover();
        for failure in &report.failures {
            self.emit(VisualizerEvent::MessageRequested {
                text: format!("{:?} analysis failed: {}", failure.kind, failure.error),
                level: MessageLevel::Warning,
            });
        }
        self.emit(VisualizerEvent::AnalysisReady {
            kinds: report.kinds(),
        });
        Ok(report)
    }

    /// A request for `tests` at the configured confidence level.
    pub fn analysis_request(&self, tests: Vec<analysis::AnalysisKind>) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(tests);
        request.confidence_level = self.options.confidence_level;
        request
    }

    pub fn export_as(&mut self, format: ExportFormat) -> Result<ExportArtifact> {
        let exported = match self.view.as_ref() {
            Some(view) => export::export(
                format,
                &view.matrix,
                &view.statistics,
                &self.filters,
                self.clock.now(),
            ),
            None => return Err(self.no_dataset()),
        };

        match exported {
            Ok(artifact) => {
                tracing::debug!("Exported {} ({} bytes)", artifact.filename, artifact.bytes.len());
                self.recover();
                self.emit(VisualizerEvent::ExportReady {
                    format,
                    bytes: artifact.bytes.clone(),
                });
                Ok(artifact)
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    pub fn begin_compare(&mut self, selection: Vec<usize>) -> Result<ComparisonReport> {
        let report = match self.current.as_ref() {
            Some(current) => comparison::compare(&current.dataset, &selection, &self.history),
            None => return Err(self.no_dataset()),
        };

        tracing::debug!("Comparing current dataset against {} history entries", selection.len());
        self.comparison_selection = selection;
        self.recover();
        for row in report.rows.iter().filter(|r| r.error.is_some()) {
            self.emit(VisualizerEvent::MessageRequested {
                text: format!("{}: {}", row.label, row.error.as_deref().unwrap_or_default()),
                level: MessageLevel::Warning,
            });
        }
        self.emit(VisualizerEvent::ComparisonReady {
            report: report.clone(),
        });
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Incremental updates
    // -----------------------------------------------------------------------

    /// Queue cell updates without applying them. A later update for the same
    /// cell replaces a queued one.
    pub fn enqueue_update(&mut self, update: IncrementalUpdate) {
        for cell_update in update.cell_updates {
            let queued = self.pending_cells.iter_mut().find(|p| {
                p.temperature == cell_update.temperature
                    && p.stroke_position == cell_update.stroke_position
            });
            match queued {
                Some(existing) => {
                    tracing::debug!(
                        "Coalesced update for ({}, {})",
                        cell_update.temperature,
                        cell_update.stroke_position
                    );
                    *existing = cell_update;
                }
                None => self.pending_cells.push(cell_update),
            }
        }
        if update.statistics_patch.is_some() {
            self.pending_patch = update.statistics_patch;
        }
    }

    /// Apply everything queued so far. Nothing reached from here can queue
    /// more cells, so a single pass drains the queue.
    pub fn flush_updates(&mut self) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        for cell_update in std::mem::take(&mut self.pending_cells) {
            if self.apply_cell(cell_update) {
                outcome.applied += 1;
            } else {
                outcome.dropped += 1;
            }
        }

        if let Some(patch) = self.pending_patch.take() {
            if let Some(view) = self.view.as_mut() {
                view.statistics.apply(&patch);
                let statistics = view.statistics;
                self.emit(VisualizerEvent::StatisticsChanged {
                    statistics,
                    row: None,
                });
            }
        }

        if outcome.dropped > 0 {
            tracing::debug!("Dropped {} off-axis cell updates", outcome.dropped);
        }
        outcome
    }

    pub fn apply_incremental_update(&mut self, update: IncrementalUpdate) -> UpdateOutcome {
        self.enqueue_update(update);
        self.flush_updates()
    }

    /// Replace one cell, then recompute row and global statistics, then
    /// notify. Returns false when the cell is not on the current axes.
    fn apply_cell(&mut self, update: CellUpdate) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };
        let (t, s) = (update.temperature, update.stroke_position);
        if current.matrix.get(t, s).is_none() {
            return false;
        }

        let criterion = *current.dataset.pass_criterion();
        let measurement = update.cell.reading().map(|r| Measurement {
            temperature: t,
            stroke_position: s,
            force: r.force,
            timestamp: r.timestamp,
            status: r.status,
            metadata: None,
        });
        // Pass is re-evaluated against the dataset's own criterion.
        let cell = measurement
            .as_ref()
            .map_or(MatrixCell::Empty, |m| MatrixCell::from_measurement(m, &criterion));

        current.matrix.set(t, s, cell);
        current.dataset.replace_at(t, s, measurement.clone());

        let Some(view) = self.view.as_mut() else {
            return true;
        };
        let visible = measurement
            .as_ref()
            .is_some_and(|m| self.filters.accepts(m, &criterion));
        replace_measurement(&mut view.measurements, t, s, measurement.filter(|_| visible));
        let row = view
            .matrix
            .set(t, s, if visible { cell } else { MatrixCell::Empty });
        view.statistics = Statistics::from_matrix(&view.matrix);

        let statistics = view.statistics;
        let row = row.map(|r| view.matrix.row_statistics(r));
        self.emit(VisualizerEvent::StatisticsChanged { statistics, row });
        true
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    fn transition(&mut self, to: VisualizerState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.emit(VisualizerEvent::StateChange { from, to });
    }

    fn fail(&mut self, error: ForceResultsError) {
        tracing::debug!("Visualizer operation failed: {}", error);
        self.emit(VisualizerEvent::MessageRequested {
            text: error.to_string(),
            level: MessageLevel::Error,
        });
        self.last_error = Some(error);
        self.transition(VisualizerState::Error);
    }

    /// Back to Ready after a successful operation, if there is data to show.
    fn recover(&mut self) {
        if self.state == VisualizerState::Error && self.current.is_some() {
            self.last_error = None;
            self.transition(VisualizerState::Ready);
        }
    }

    fn no_dataset(&mut self) -> ForceResultsError {
        let e = ForceResultsError::InvalidData("no dataset loaded".to_string());
        self.fail(e.clone());
        e
    }

    fn emit(&self, event: VisualizerEvent) {
        for sink in &self.sinks {
            sink.notify(&event);
        }
    }
}
