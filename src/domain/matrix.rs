// Dense temperature x stroke force matrix
use super::measurement::{Measurement, MeasurementStatus, PassCriterion, TestDataset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellReading {
    pub force: f64,
    pub timestamp: DateTime<Utc>,
    pub status: MeasurementStatus,
    pub pass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MatrixCell {
    #[default]
    Empty,
    Present(CellReading),
}

impl MatrixCell {
    pub fn reading(&self) -> Option<&CellReading> {
        match self {
            Self::Empty => None,
            Self::Present(reading) => Some(reading),
        }
    }

    pub fn force(&self) -> Option<f64> {
        self.reading().map(|r| r.force)
    }

    /// Evaluate a measurement into a cell. Missing force yields `Empty`.
    pub fn from_measurement(m: &Measurement, criterion: &PassCriterion) -> Self {
        if !m.has_force() {
            return Self::Empty;
        }
        Self::Present(CellReading {
            force: m.force,
            timestamp: m.timestamp,
            status: m.status,
            pass: criterion.passes(m.force),
        })
    }
}

// Cells travel as `null` or a reading object.
impl Serialize for MatrixCell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.reading().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MatrixCell {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let reading = Option::<CellReading>::deserialize(deserializer)?;
        Ok(reading.map_or(Self::Empty, Self::Present))
    }
}

/// Row-major dense matrix: one cell per axis intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceMatrix {
    temperatures: Vec<f64>,
    strokes: Vec<f64>,
    cells: Vec<MatrixCell>,
}

impl ForceMatrix {
    pub fn empty(temperatures: Vec<f64>, strokes: Vec<f64>) -> Self {
        let cells = vec![MatrixCell::Empty; temperatures.len() * strokes.len()];
        Self {
            temperatures,
            strokes,
            cells,
        }
    }

    /// Bin the dataset's measurements onto its axes.
    pub fn build(dataset: &TestDataset) -> Self {
        Self::from_measurements(
            dataset.temperature_list(),
            dataset.stroke_positions(),
            dataset.measurements(),
            dataset.pass_criterion(),
        )
    }

    /// Bin `measurements` onto the given axes by exact coordinate equality.
    /// Off-axis measurements are dropped; later measurements overwrite earlier
    /// ones at the same coordinate.
    pub fn from_measurements(
        temperatures: &[f64],
        strokes: &[f64],
        measurements: &[Measurement],
        criterion: &PassCriterion,
    ) -> Self {
        let mut matrix = Self::empty(temperatures.to_vec(), strokes.to_vec());
        let mut dropped = 0usize;

        for m in measurements {
            match matrix.index_of(m.temperature, m.stroke_position) {
                Some(idx) => matrix.cells[idx] = MatrixCell::from_measurement(m, criterion),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::debug!("Dropped {} measurements with off-axis coordinates", dropped);
        }
        matrix
    }

    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    pub fn strokes(&self) -> &[f64] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn row_of(&self, temperature: f64) -> Option<usize> {
        self.temperatures.iter().position(|t| *t == temperature)
    }

    pub fn column_of(&self, stroke: f64) -> Option<usize> {
        self.strokes.iter().position(|s| *s == stroke)
    }

    fn index_of(&self, temperature: f64, stroke: f64) -> Option<usize> {
        let row = self.row_of(temperature)?;
        let col = self.column_of(stroke)?;
        Some(row * self.strokes.len() + col)
    }

    pub fn get(&self, temperature: f64, stroke: f64) -> Option<&MatrixCell> {
        self.index_of(temperature, stroke).map(|idx| &self.cells[idx])
    }

    /// Replace one cell. Returns the row index, or `None` when the coordinate
    /// is not on the axes.
    pub fn set(&mut self, temperature: f64, stroke: f64, cell: MatrixCell) -> Option<usize> {
        let row = self.row_of(temperature)?;
        let idx = self.index_of(temperature, stroke)?;
        self.cells[idx] = cell;
        Some(row)
    }

    pub fn row(&self, row: usize) -> &[MatrixCell] {
        let width = self.strokes.len();
        &self.cells[row * width..(row + 1) * width]
    }

    /// Iterate `(temperature, row cells)` in axis order.
    pub fn rows(&self) -> impl Iterator<Item = (f64, &[MatrixCell])> + '_ {
        self.temperatures
            .iter()
            .enumerate()
            .map(move |(i, t)| (*t, self.row(i)))
    }

    /// Present readings in row-major order.
    pub fn readings(&self) -> impl Iterator<Item = &CellReading> + '_ {
        self.cells.iter().filter_map(MatrixCell::reading)
    }

    pub fn row_statistics(&self, row: usize) -> RowStatistics {
        RowStatistics::from_cells(self.temperatures[row], self.row(row))
    }
}

/// Average/min/max/count over the present cells of one temperature row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStatistics {
    pub temperature: f64,
    pub count: usize,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RowStatistics {
    pub fn from_cells(temperature: f64, cells: &[MatrixCell]) -> Self {
        let forces: Vec<f64> = cells.iter().filter_map(MatrixCell::force).collect();
        if forces.is_empty() {
            return Self {
                temperature,
                count: 0,
                average: None,
                min: None,
                max: None,
            };
        }
        let sum: f64 = forces.iter().sum();
        Self {
            temperature,
            count: forces.len(),
            average: Some(sum / forces.len() as f64),
            min: forces.iter().copied().reduce(f64::min),
            max: forces.iter().copied().reduce(f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn scenario_dataset() -> TestDataset {
        TestDataset::new(
            Some("T-1".to_string()),
            vec![20.0, 25.0],
            vec![10.0, 20.0],
            vec![
                Measurement::new(20.0, 10.0, 150.0, ts()),
                Measurement::new(20.0, 20.0, 900.0, ts()),
                Measurement::new(25.0, 10.0, 1500.0, ts()),
            ],
            PassCriterion::new(100.0, 1000.0, 0.1),
            ts(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_minimal_matrix() {
        let matrix = ForceMatrix::build(&scenario_dataset());
        assert_eq!(matrix.len(), 4);

        let cell = matrix.get(20.0, 10.0).unwrap().reading().unwrap();
        assert_eq!(cell.force, 150.0);
        assert!(cell.pass);
        assert!(matrix.get(20.0, 20.0).unwrap().reading().unwrap().pass);
        assert!(!matrix.get(25.0, 10.0).unwrap().reading().unwrap().pass);
        assert_eq!(matrix.get(25.0, 20.0), Some(&MatrixCell::Empty));
    }

    #[test]
    fn test_last_measurement_wins_and_off_axis_dropped() {
        let measurements = vec![
            Measurement::new(20.0, 10.0, 1.0, ts()),
            Measurement::new(20.0, 10.0, 2.0, ts()),
            Measurement::new(21.0, 10.0, 3.0, ts()),
        ];
        let matrix = ForceMatrix::from_measurements(
            &[20.0],
            &[10.0],
            &measurements,
            &PassCriterion::new(0.0, 10.0, 0.0),
        );
        assert_eq!(matrix.get(20.0, 10.0).unwrap().force(), Some(2.0));
        assert_eq!(matrix.readings().count(), 1);
    }

    #[test]
    fn test_missing_force_leaves_cell_empty() {
        let measurements = vec![Measurement::new(20.0, 10.0, f64::NAN, ts())];
        let matrix = ForceMatrix::from_measurements(
            &[20.0],
            &[10.0],
            &measurements,
            &PassCriterion::new(0.0, 10.0, 0.0),
        );
        assert_eq!(matrix.get(20.0, 10.0), Some(&MatrixCell::Empty));
    }

    #[test]
    fn test_row_statistics() {
        let matrix = ForceMatrix::build(&scenario_dataset());
        let first = matrix.row_statistics(0);
        assert_eq!(first.count, 2);
        assert_eq!(first.average, Some(525.0));
        assert_eq!(first.min, Some(150.0));
        assert_eq!(first.max, Some(900.0));

        let second = matrix.row_statistics(1);
        assert_eq!(second.count, 1);
        assert_eq!(second.average, Some(1500.0));
    }

    #[test]
    fn test_set_off_axis_is_rejected() {
        let mut matrix = ForceMatrix::build(&scenario_dataset());
        assert_eq!(matrix.set(30.0, 10.0, MatrixCell::Empty), None);
        assert_eq!(matrix.set(25.0, 10.0, MatrixCell::Empty), Some(1));
        assert_eq!(matrix.get(25.0, 10.0), Some(&MatrixCell::Empty));
    }

    #[test]
    fn test_cell_serializes_as_nullable_reading() {
        let json = serde_json::to_value(MatrixCell::Empty).unwrap();
        assert!(json.is_null());

        let matrix = ForceMatrix::build(&scenario_dataset());
        let cell = *matrix.get(20.0, 10.0).unwrap();
        let back: MatrixCell = serde_json::from_value(serde_json::to_value(cell).unwrap()).unwrap();
        assert_eq!(back, cell);
    }
}
