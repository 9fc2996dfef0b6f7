// Chart-ready series derived from the filtered matrix
use super::matrix::ForceMatrix;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Force summary for one axis value. `std_dev` is the population deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedForce {
    pub key: f64,
    pub count: usize,
    pub average: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl GroupedForce {
    fn from_forces(key: f64, forces: &[f64]) -> Option<Self> {
        if forces.is_empty() {
            return None;
        }
        let n = forces.len() as f64;
        let average = forces.iter().sum::<f64>() / n;
        let variance = forces.iter().map(|f| (f - average).powi(2)).sum::<f64>() / n;
        Some(Self {
            key,
            count: forces.len(),
            average,
            std_dev: variance.sqrt(),
            min: forces.iter().copied().fold(f64::INFINITY, f64::min),
            max: forces.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatMap {
    pub temperatures: Vec<f64>,
    pub stroke_positions: Vec<f64>,
    /// `values[row][col]`; `None` marks an empty cell.
    pub values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterPoint {
    pub temperature: f64,
    pub stroke_position: f64,
    pub force: f64,
    pub timestamp: DateTime<Utc>,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub by_temperature: Vec<GroupedForce>,
    pub by_stroke_position: Vec<GroupedForce>,
    pub heat_map: HeatMap,
    pub scatter: Vec<ScatterPoint>,
}

impl ChartSeries {
    pub fn from_matrix(matrix: &ForceMatrix) -> Self {
        Self {
            by_temperature: by_temperature(matrix),
            by_stroke_position: by_stroke_position(matrix),
            heat_map: heat_map(matrix),
            scatter: scatter(matrix),
        }
    }
}

pub fn by_temperature(matrix: &ForceMatrix) -> Vec<GroupedForce> {
    matrix
        .rows()
        .filter_map(|(temperature, cells)| {
            let forces: Vec<f64> = cells.iter().filter_map(|c| c.force()).collect();
            GroupedForce::from_forces(temperature, &forces)
        })
        .collect()
}

pub fn by_stroke_position(matrix: &ForceMatrix) -> Vec<GroupedForce> {
    matrix
        .strokes()
        .iter()
        .enumerate()
        .filter_map(|(col, stroke)| {
            let forces: Vec<f64> = matrix
                .rows()
                .filter_map(|(_, cells)| cells[col].force())
                .collect();
            GroupedForce::from_forces(*stroke, &forces)
        })
        .collect()
}

pub fn heat_map(matrix: &ForceMatrix) -> HeatMap {
    HeatMap {
        temperatures: matrix.temperatures().to_vec(),
        stroke_positions: matrix.strokes().to_vec(),
        values: matrix
            .rows()
            .map(|(_, cells)| cells.iter().map(|c| c.force()).collect())
            .collect(),
    }
}

pub fn scatter(matrix: &ForceMatrix) -> Vec<ScatterPoint> {
    let strokes = matrix.strokes();
    matrix
        .rows()
        .flat_map(|(temperature, cells)| {
            cells.iter().zip(strokes).filter_map(move |(cell, stroke)| {
                cell.reading().map(|r| ScatterPoint {
                    temperature,
                    stroke_position: *stroke,
                    force: r.force,
                    timestamp: r.timestamp,
                    pass: r.pass,
                })
            })
        })
        .collect()
}
