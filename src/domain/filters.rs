// Compound measurement filters
use super::error::{ForceResultsError, Result};
use super::measurement::{Measurement, PassCriterion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.min.is_nan() || self.max.is_nan() {
            return Err(ForceResultsError::InvalidFilter(format!(
                "{} range has a NaN bound",
                name
            )));
        }
        if self.min > self.max {
            return Err(ForceResultsError::InvalidFilter(format!(
                "{} range min {} exceeds max {}",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Inclusive instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassFail {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_position: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_fail_status: Option<PassFail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(range) = &self.temperature {
            range.validate("temperature")?;
        }
        if let Some(range) = &self.stroke_position {
            range.validate("strokePosition")?;
        }
        if let Some(range) = &self.force_range {
            range.validate("forceRange")?;
        }
        if let Some(range) = &self.date_range {
            if range.from > range.to {
                return Err(ForceResultsError::InvalidFilter(format!(
                    "dateRange from {} is after to {}",
                    range.from, range.to
                )));
            }
        }
        Ok(())
    }

    /// True iff every active filter accepts `m`.
    pub fn accepts(&self, m: &Measurement, criterion: &PassCriterion) -> bool {
        if let Some(range) = &self.temperature {
            if !range.contains(m.temperature) {
                return false;
            }
        }
        if let Some(range) = &self.stroke_position {
            if !range.contains(m.stroke_position) {
                return false;
            }
        }
        if let Some(range) = &self.force_range {
            // NaN never lies in a range.
            if !range.contains(m.force) {
                return false;
            }
        }
        if let Some(wanted) = self.pass_fail_status {
            // Missing readings carry no pass bit and match neither side.
            if !m.has_force() {
                return false;
            }
            let passed = criterion.passes(m.force);
            let matches = match wanted {
                PassFail::Pass => passed,
                PassFail::Fail => !passed,
            };
            if !matches {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(m.timestamp) {
                return false;
            }
        }
        true
    }

    /// Survivors in their original order.
    pub fn apply(&self, measurements: &[Measurement], criterion: &PassCriterion) -> Result<Vec<Measurement>> {
        self.validate()?;
        Ok(measurements
            .iter()
            .filter(|m| self.accepts(m, criterion))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn criterion() -> PassCriterion {
        PassCriterion::new(100.0, 1000.0, 0.1)
    }

    fn sample() -> Vec<Measurement> {
        vec![
            Measurement::new(20.0, 10.0, 150.0, ts()),
            Measurement::new(20.0, 20.0, 900.0, ts() + Duration::minutes(1)),
            Measurement::new(25.0, 10.0, 1500.0, ts() + Duration::minutes(2)),
            Measurement::new(25.0, 20.0, f64::NAN, ts() + Duration::minutes(3)),
        ]
    }

    #[test]
    fn test_empty_filters_keep_everything() {
        let filters = Filters::default();
        assert!(filters.is_empty());
        assert_eq!(filters.apply(&sample(), &criterion()).unwrap().len(), 4);
    }

    #[test]
    fn test_fail_status_filter() {
        let filters = Filters {
            pass_fail_status: Some(PassFail::Fail),
            ..Default::default()
        };
        let survivors = filters.apply(&sample(), &criterion()).unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].force, 1500.0);
    }

    #[test]
    fn test_force_range_rejects_missing() {
        let filters = Filters {
            force_range: Some(ValueRange::new(0.0, 10_000.0)),
            ..Default::default()
        };
        let survivors = filters.apply(&sample(), &criterion()).unwrap();
        assert_eq!(survivors.len(), 3);
    }

    #[test]
    fn test_ranges_are_inclusive() {
        let filters = Filters {
            temperature: Some(ValueRange::new(20.0, 20.0)),
            stroke_position: Some(ValueRange::new(10.0, 20.0)),
            ..Default::default()
        };
        assert_eq!(filters.apply(&sample(), &criterion()).unwrap().len(), 2);
    }

    #[test]
    fn test_date_range() {
        let filters = Filters {
            date_range: Some(DateRange {
                from: ts() + Duration::minutes(1),
                to: ts() + Duration::minutes(2),
            }),
            ..Default::default()
        };
        let survivors = filters.apply(&sample(), &criterion()).unwrap();
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].force, 900.0);
    }

    #[test]
    fn test_inverted_range_is_invalid() {
        let filters = Filters {
            force_range: Some(ValueRange::new(10.0, 1.0)),
            ..Default::default()
        };
        assert!(matches!(
            filters.apply(&sample(), &criterion()),
            Err(ForceResultsError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_inverted_date_range_is_invalid() {
        let filters = Filters {
            date_range: Some(DateRange {
                from: ts() + Duration::minutes(2),
                to: ts(),
            }),
            ..Default::default()
        };
        assert!(matches!(filters.validate(), Err(ForceResultsError::InvalidFilter(_))));
        assert!(matches!(
            filters.apply(&sample(), &criterion()),
            Err(ForceResultsError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_nan_bound_is_invalid() {
        for range in [ValueRange::new(f64::NAN, 10.0), ValueRange::new(0.0, f64::NAN)] {
            let filters = Filters {
                stroke_position: Some(range),
                ..Default::default()
            };
            assert!(matches!(filters.validate(), Err(ForceResultsError::InvalidFilter(_))));
        }
    }

    #[test]
    fn test_filters_deserialize_from_camel_case() {
        let filters: Filters = serde_json::from_str(
            r#"{"forceRange": {"min": 1, "max": 2}, "passFailStatus": "pass"}"#,
        )
        .unwrap();
        assert_eq!(filters.force_range, Some(ValueRange::new(1.0, 2.0)));
        assert_eq!(filters.pass_fail_status, Some(PassFail::Pass));
    }
}
