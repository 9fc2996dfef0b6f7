// Force measurement domain models
use super::error::{ForceResultsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    #[default]
    Ok,
    Invalid,
    Missing,
}

impl MeasurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Invalid => "invalid",
            Self::Missing => "missing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(Self::Ok),
            "invalid" => Some(Self::Invalid),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single (temperature, stroke, force) sample.
///
/// A non-finite `force` means the reading is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub temperature: f64,
    pub stroke_position: f64,
    pub force: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MeasurementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Measurement {
    pub fn new(temperature: f64, stroke_position: f64, force: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature,
            stroke_position,
            force,
            timestamp,
            status: MeasurementStatus::Ok,
            metadata: None,
        }
    }

    pub fn with_status(mut self, status: MeasurementStatus) -> Self {
        self.status = status;
        self
    }

    pub fn has_force(&self) -> bool {
        self.force.is_finite()
    }
}

/// Tolerance-widened force acceptance window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassCriterion {
    pub min_force: f64,
    pub max_force: f64,
    pub tolerance: f64,
}

impl PassCriterion {
    pub fn new(min_force: f64, max_force: f64, tolerance: f64) -> Self {
        Self {
            min_force,
            max_force,
            tolerance,
        }
    }

    /// Closed interval `[min - max*tol, max + max*tol]`.
    pub fn range(&self) -> (f64, f64) {
        let margin = self.max_force * self.tolerance;
        (self.min_force - margin, self.max_force + margin)
    }

    pub fn passes(&self, force: f64) -> bool {
        if !force.is_finite() {
            return false;
        }
        let (low, high) = self.range();
        force >= low && force <= high
    }
}

/// A validated test dataset. Axes are non-empty and strictly ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDataset {
    test_id: Option<String>,
    temperature_list: Vec<f64>,
    stroke_positions: Vec<f64>,
    measurements: Vec<Measurement>,
    pass_criterion: PassCriterion,
    loaded_at: DateTime<Utc>,
}

impl TestDataset {
    pub fn new(
        test_id: Option<String>,
        temperature_list: Vec<f64>,
        stroke_positions: Vec<f64>,
        measurements: Vec<Measurement>,
        pass_criterion: PassCriterion,
        loaded_at: DateTime<Utc>,
    ) -> Result<Self> {
        validate_axis("temperatureList", &temperature_list)?;
        validate_axis("strokePositions", &stroke_positions)?;
        for (index, m) in measurements.iter().enumerate() {
            if !m.temperature.is_finite() || !m.stroke_position.is_finite() {
                return Err(ForceResultsError::InvalidData(format!(
                    "measurement {} has a non-finite coordinate",
                    index
                )));
            }
        }
        Ok(Self {
            test_id,
            temperature_list,
            stroke_positions,
            measurements,
            pass_criterion,
            loaded_at,
        })
    }

    pub fn test_id(&self) -> Option<&str> {
        self.test_id.as_deref()
    }

    pub fn temperature_list(&self) -> &[f64] {
        &self.temperature_list
    }

    pub fn stroke_positions(&self) -> &[f64] {
        &self.stroke_positions
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn pass_criterion(&self) -> &PassCriterion {
        &self.pass_criterion
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Replace every measurement at `(temperature, stroke)` with `replacement`.
    /// `None` removes them, leaving the cell empty.
    pub(crate) fn replace_at(&mut self, temperature: f64, stroke: f64, replacement: Option<Measurement>) {
        replace_measurement(&mut self.measurements, temperature, stroke, replacement);
    }
}

/// Drop every measurement at `(temperature, stroke)` and append `replacement`,
/// so it wins any later re-binning.
pub fn replace_measurement(
    measurements: &mut Vec<Measurement>,
    temperature: f64,
    stroke: f64,
    replacement: Option<Measurement>,
) {
    measurements.retain(|m| !(m.temperature == temperature && m.stroke_position == stroke));
    if let Some(m) = replacement {
        measurements.push(m);
    }
}

fn validate_axis(name: &str, axis: &[f64]) -> Result<()> {
    if axis.is_empty() {
        return Err(ForceResultsError::InvalidData(format!("{} is empty", name)));
    }
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(ForceResultsError::InvalidData(format!(
            "{} contains a non-finite value",
            name
        )));
    }
    if axis.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ForceResultsError::InvalidData(format!(
            "{} is not strictly ascending",
            name
        )));
    }
    Ok(())
}

/// Dataset as received from a transport, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestDataset {
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub temperature_list: Vec<f64>,
    #[serde(default)]
    pub stroke_positions: Vec<f64>,
    #[serde(default)]
    pub measurements: Value,
    #[serde(default)]
    pub pass_criterion: Option<PassCriterion>,
}

impl RawTestDataset {
    /// Validate into a [`TestDataset`]. `default_criterion` applies when the
    /// payload carries none; `loaded_at` stamps the dataset and any
    /// measurement without its own timestamp.
    pub fn validate(
        self,
        default_criterion: PassCriterion,
        loaded_at: DateTime<Utc>,
    ) -> Result<TestDataset> {
        let items = match &self.measurements {
            Value::Array(items) => items,
            other => {
                return Err(ForceResultsError::InvalidData(format!(
                    "measurements must be an array, got {}",
                    json_type_name(other)
                )));
            }
        };

        let measurements = items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_measurement(index, item, loaded_at))
            .collect::<Result<Vec<_>>>()?;

        TestDataset::new(
            self.test_id,
            self.temperature_list,
            self.stroke_positions,
            measurements,
            self.pass_criterion.unwrap_or(default_criterion),
            loaded_at,
        )
    }
}

impl From<&TestDataset> for RawTestDataset {
    fn from(dataset: &TestDataset) -> Self {
        Self {
            test_id: dataset.test_id.clone(),
            temperature_list: dataset.temperature_list.clone(),
            stroke_positions: dataset.stroke_positions.clone(),
            measurements: serde_json::to_value(&dataset.measurements).unwrap_or(Value::Null),
            pass_criterion: Some(dataset.pass_criterion),
        }
    }
}

fn parse_measurement(index: usize, item: &Value, loaded_at: DateTime<Utc>) -> Result<Measurement> {
    let obj = item.as_object().ok_or_else(|| {
        ForceResultsError::InvalidData(format!("measurement {} is not an object", index))
    })?;

    let temperature = required_number(obj, "temperature", index)?;
    let stroke_position = required_number(obj, "strokePosition", index)?;

    // An explicit null marks a missing reading; an absent key is malformed.
    let force = match obj.get("force") {
        None => {
            return Err(ForceResultsError::InvalidData(format!(
                "measurement {} is missing force",
                index
            )));
        }
        Some(Value::Null) => f64::NAN,
        Some(value) => value.as_f64().ok_or_else(|| {
            ForceResultsError::InvalidData(format!("measurement {} has a non-numeric force", index))
        })?,
    };

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => loaded_at,
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                ForceResultsError::InvalidData(format!(
                    "measurement {} has a bad timestamp '{}': {}",
                    index, s, e
                ))
            })?,
        Some(other) => {
            return Err(ForceResultsError::InvalidData(format!(
                "measurement {} timestamp must be a string, got {}",
                index,
                json_type_name(other)
            )));
        }
    };

    let status = match obj.get("status") {
        None | Some(Value::Null) => MeasurementStatus::Ok,
        Some(Value::String(s)) => MeasurementStatus::parse(s).ok_or_else(|| {
            ForceResultsError::InvalidData(format!("measurement {} has unknown status '{}'", index, s))
        })?,
        Some(other) => {
            return Err(ForceResultsError::InvalidData(format!(
                "measurement {} status must be a string, got {}",
                index,
                json_type_name(other)
            )));
        }
    };

    Ok(Measurement {
        temperature,
        stroke_position,
        force,
        timestamp,
        status,
        metadata: obj.get("metadata").filter(|v| !v.is_null()).cloned(),
    })
}

fn required_number(obj: &Map<String, Value>, key: &str, index: usize) -> Result<f64> {
    match obj.get(key) {
        Some(value) => value.as_f64().ok_or_else(|| {
            ForceResultsError::InvalidData(format!("measurement {} has a non-numeric {}", index, key))
        }),
        None => Err(ForceResultsError::InvalidData(format!(
            "measurement {} is missing {}",
            index, key
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
