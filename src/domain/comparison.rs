// Side-by-side comparison of the current dataset against history entries
use super::history::HistoryStore;
use super::measurement::TestDataset;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    /// Test id, or a positional label when the dataset has none.
    pub label: String,
    pub is_current: bool,
    /// Position in the history listing; `None` for the current dataset.
    pub history_index: Option<usize>,
    pub measurement_count: usize,
    pub average_force: f64,
    pub min_force: f64,
    pub max_force: f64,
    pub force_range: f64,
    /// Set when this row could not be summarized; the row is then left out of
    /// the summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparisonRow {
    fn summarize(label: String, is_current: bool, history_index: Option<usize>, dataset: &TestDataset) -> Self {
        let forces: Vec<f64> = dataset
            .measurements()
            .iter()
            .filter(|m| m.has_force())
            .map(|m| m.force)
            .collect();

        if forces.is_empty() {
            return Self::failed(label, is_current, history_index, "no measurements with a force reading");
        }

        let min_force = forces.iter().copied().fold(f64::INFINITY, f64::min);
        let max_force = forces.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            label,
            is_current,
            history_index,
            measurement_count: forces.len(),
            average_force: forces.iter().sum::<f64>() / forces.len() as f64,
            min_force,
            max_force,
            force_range: max_force - min_force,
            error: None,
        }
    }

    fn failed(label: String, is_current: bool, history_index: Option<usize>, reason: &str) -> Self {
        Self {
            label,
            is_current,
            history_index,
            measurement_count: 0,
            average_force: 0.0,
            min_force: 0.0,
            max_force: 0.0,
            force_range: 0.0,
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub total_tests: usize,
    pub total_measurements: usize,
    pub min_average_force: f64,
    pub max_average_force: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub rows: Vec<ComparisonRow>,
    pub summary: ComparisonSummary,
}

/// Align `current` with the history entries at `selection` (positions in
/// `history.list()` order). Bad selections annotate their own row only.
pub fn compare(current: &TestDataset, selection: &[usize], history: &HistoryStore) -> ComparisonReport {
    let mut rows = Vec::with_capacity(selection.len() + 1);
    let current_label = current.test_id().unwrap_or("Current").to_string();
    rows.push(ComparisonRow::summarize(current_label, true, None, current));

    for &index in selection {
        let fallback = format!("Test {}", index + 1);
        match history.get(index) {
            Some(entry) => {
                let label = entry.dataset.test_id().map(str::to_string).unwrap_or(fallback);
                rows.push(ComparisonRow::summarize(label, false, Some(index), &entry.dataset));
            }
            None => {
                tracing::warn!("Comparison selection {} is outside history of {}", index, history.len());
                rows.push(ComparisonRow::failed(fallback, false, Some(index), "history entry not found"));
            }
        }
    }

    let summary = summarize(&rows);
    ComparisonReport { rows, summary }
}

fn summarize(rows: &[ComparisonRow]) -> ComparisonSummary {
    let valid: Vec<&ComparisonRow> = rows.iter().filter(|r| r.error.is_none()).collect();
    if valid.is_empty() {
        return ComparisonSummary::default();
    }
    ComparisonSummary {
        total_tests: valid.len(),
        total_measurements: valid.iter().map(|r| r.measurement_count).sum(),
        min_average_force: valid.iter().map(|r| r.average_force).fold(f64::INFINITY, f64::min),
        max_average_force: valid
            .iter()
            .map(|r| r.average_force)
            .fold(f64::NEG_INFINITY, f64::max),
    }
}
