// Bounded newest-first history of loaded datasets
use super::measurement::TestDataset;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub dataset: TestDataset,
    pub stored_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(dataset: TestDataset, stored_at: DateTime<Utc>) -> Self {
        Self { dataset, stored_at }
    }

    pub fn summary(&self, index: usize) -> HistorySummary {
        HistorySummary {
            index,
            test_id: self.dataset.test_id().map(str::to_string),
            stored_at: self.stored_at,
            measurement_count: self.dataset.measurements().len(),
        }
    }
}

/// Pass/fail roll-up across every stored test. A test passes when it has
/// at least one reading and every reading is inside its own criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOverview {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// Percentage in [0, 100].
    pub pass_rate: f64,
    pub average_force: f64,
    /// `[min, max]` over all readings, `[0, 0]` when there are none.
    pub force_range: [f64; 2],
}

/// One reading from any stored test, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub test_id: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub temperature: f64,
    pub stroke_position: f64,
    pub force: f64,
    pub pass: bool,
}

/// Listing row for one history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub index: usize,
    pub test_id: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub measurement_count: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_ENTRIES)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_HISTORY_ENTRIES)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend `entry`, evicting the oldest entries beyond capacity.
    pub fn add(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::debug!(
                    "Evicted history entry {:?} stored at {}",
                    evicted.dataset.test_id(),
                    evicted.stored_at
                );
            }
        }
    }

    /// Entries newest first. Indices into this order are used by comparison.
    pub fn list(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<HistorySummary> {
        self.list()
            .enumerate()
            .map(|(index, entry)| entry.summary(index))
            .collect()
    }

    pub fn overview(&self) -> HistoryOverview {
        let mut overview = HistoryOverview {
            total_tests: self.entries.len(),
            ..HistoryOverview::default()
        };
        let (mut sum, mut count) = (0.0, 0usize);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);

        for entry in &self.entries {
            let criterion = entry.dataset.pass_criterion();
            let mut readings = 0usize;
            let mut all_pass = true;
            for m in entry.dataset.measurements().iter().filter(|m| m.has_force()) {
                readings += 1;
                all_pass &= criterion.passes(m.force);
                sum += m.force;
                min = min.min(m.force);
                max = max.max(m.force);
            }
            count += readings;
            if readings > 0 && all_pass {
                overview.passed_tests += 1;
            }
        }

        overview.failed_tests = overview.total_tests - overview.passed_tests;
        if overview.total_tests > 0 {
            overview.pass_rate = overview.passed_tests as f64 / overview.total_tests as f64 * 100.0;
        }
        if count > 0 {
            overview.average_force = sum / count as f64;
            overview.force_range = [min, max];
        }
        overview
    }

    /// Every reading of every entry, newest entry first.
    pub fn scatter(&self) -> Vec<HistoryPoint> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let criterion = entry.dataset.pass_criterion();
                let test_id = entry.dataset.test_id();
                entry
                    .dataset
                    .measurements()
                    .iter()
                    .filter(|m| m.has_force())
                    .map(move |m| HistoryPoint {
                        test_id: test_id.map(str::to_string),
                        stored_at: entry.stored_at,
                        temperature: m.temperature,
                        stroke_position: m.stroke_position,
                        force: m.force,
                        pass: criterion.passes(m.force),
                    })
            })
            .collect()
    }
}
