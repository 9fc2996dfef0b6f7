// Summary statistics over the present cells of a matrix
use super::matrix::ForceMatrix;
use serde::{Deserialize, Serialize};

/// Force summary. All numeric fields are exactly 0 when `total` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    /// Percentage of present cells that pass, 0-100.
    pub pass_rate: f64,
}

impl Statistics {
    pub fn from_matrix(matrix: &ForceMatrix) -> Self {
        let mut forces = Vec::new();
        let mut passed = 0usize;
        for reading in matrix.readings() {
            forces.push(reading.force);
            if reading.pass {
                passed += 1;
            }
        }
        Self::from_forces(&forces, passed)
    }

    /// Summarize `forces`, of which `passed` met the criterion.
    pub fn from_forces(forces: &[f64], passed: usize) -> Self {
        let total = forces.len();
        if total == 0 {
            return Self::default();
        }

        let n = total as f64;
        let mean = forces.iter().sum::<f64>() / n;
        let variance = if total < 2 {
            0.0
        } else {
            forces.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };

        Self {
            total,
            min: forces.iter().copied().fold(f64::INFINITY, f64::min),
            max: forces.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std_dev: variance.sqrt(),
            variance,
            pass_rate: passed as f64 / n * 100.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn apply(&mut self, patch: &StatisticsPatch) {
        if let Some(total) = patch.total {
            self.total = total;
        }
        if let Some(min) = patch.min {
            self.min = min;
        }
        if let Some(max) = patch.max {
            self.max = max;
        }
        if let Some(mean) = patch.mean {
            self.mean = mean;
        }
        if let Some(std_dev) = patch.std_dev {
            self.std_dev = std_dev;
        }
        if let Some(variance) = patch.variance {
            self.variance = variance;
        }
        if let Some(pass_rate) = patch.pass_rate {
            self.pass_rate = pass_rate;
        }
    }
}

/// Server-supplied overrides delivered alongside incremental cell updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsPatch {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub std_dev: Option<f64>,
    #[serde(default)]
    pub variance: Option<f64>,
    #[serde(default)]
    pub pass_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_all_zero() {
        let stats = Statistics::from_forces(&[], 0);
        assert!(stats.is_empty());
        assert_eq!(stats, Statistics::default());
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
    }

    #[test]
    fn test_summary_of_three() {
        let stats = Statistics::from_forces(&[150.0, 900.0, 1500.0], 2);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.min, 150.0);
        assert_eq!(stats.max, 1500.0);
        assert_eq!(stats.mean, 850.0);
        assert_eq!(stats.variance, 457_500.0);
        assert!((stats.std_dev - 676.387).abs() < 1e-3);
        assert!((stats.pass_rate - 66.6667).abs() < 1e-3);
    }

    #[test]
    fn test_single_value_has_zero_spread() {
        let stats = Statistics::from_forces(&[1500.0], 0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.min, 1500.0);
        assert_eq!(stats.max, 1500.0);
    }

    #[test]
    fn test_patch_overrides_present_fields() {
        let mut stats = Statistics::from_forces(&[1.0, 3.0], 2);
        stats.apply(&StatisticsPatch {
            pass_rate: Some(50.0),
            ..Default::default()
        });
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.mean, 2.0);
    }
}
