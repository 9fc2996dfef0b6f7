// Export writer - CSV and JSON matrix exports plus their inverse readers
use crate::domain::error::{ForceResultsError, Result};
use crate::domain::filters::Filters;
use crate::domain::matrix::{ForceMatrix, MatrixCell, RowStatistics};
use crate::domain::measurement::{Measurement, MeasurementStatus};
use crate::domain::statistics::Statistics;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const FORCE_SUFFIX: &str = "mm Force (N)";
const ROW_AVERAGE: &str = "Row Average";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
    Pdf,
    Xml,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Excel => "excel",
            Self::Pdf => "pdf",
            Self::Xml => "xml",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
            Self::Xml => "application/xml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ForceResultsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "excel" | "xlsx" => Ok(Self::Excel),
            "pdf" => Ok(Self::Pdf),
            "xml" => Ok(Self::Xml),
            other => Err(ForceResultsError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

/// `force-data-matrix-{YYYY-MM-DD}.{ext}`
pub fn export_filename(format: ExportFormat, exported_at: DateTime<Utc>) -> String {
    format!(
        "force-data-matrix-{}.{}",
        exported_at.format("%Y-%m-%d"),
        format.as_str()
    )
}

/// Serialize the matrix view. Only CSV and JSON are implemented.
pub fn export(
    format: ExportFormat,
    matrix: &ForceMatrix,
    statistics: &Statistics,
    filters: &Filters,
    exported_at: DateTime<Utc>,
) -> Result<ExportArtifact> {
    let bytes = match format {
        ExportFormat::Csv => Bytes::from(matrix_to_csv(matrix)?),
        ExportFormat::Json => {
            let document = ExportDocument::new(matrix, statistics, filters, exported_at);
            let json = serde_json::to_vec_pretty(&document).map_err(|e| {
                ForceResultsError::InvalidData(format!("JSON serialization failed: {}", e))
            })?;
            Bytes::from(json)
        }
        ExportFormat::Excel | ExportFormat::Pdf | ExportFormat::Xml => {
            return Err(ForceResultsError::Unsupported(format.as_str().to_string()));
        }
    };

    Ok(ExportArtifact {
        format,
        filename: export_filename(format, exported_at),
        content_type: format.content_type(),
        bytes,
    })
}

/// Emit the artifact bytes into `writer`.
pub async fn write_artifact<W>(artifact: &ExportArtifact, writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&artifact.bytes).await?;
    writer.flush().await
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub fn matrix_to_csv(matrix: &ForceMatrix) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = vec!["Temperature (°C)".to_string()];
    for stroke in matrix.strokes() {
        header.push(format!("{}{}", stroke, FORCE_SUFFIX));
        header.push(format!("{}mm Pass/Fail", stroke));
        header.push(format!("{}mm Status", stroke));
    }
    header.extend([ROW_AVERAGE, "Row Min", "Row Max", "Row Count"].map(String::from));
    writer.write_record(&header).map_err(csv_error)?;

    for (temperature, cells) in matrix.rows() {
        let mut fields = vec![temperature.to_string()];
        for cell in cells {
            match cell {
                MatrixCell::Present(reading) => {
                    fields.push(reading.force.to_string());
                    fields.push(if reading.pass { "PASS" } else { "FAIL" }.to_string());
                    fields.push(reading.status.as_str().to_string());
                }
                MatrixCell::Empty => fields.extend([String::new(), String::new(), String::new()]),
            }
        }

        let row = RowStatistics::from_cells(temperature, cells);
        let optional = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        fields.push(optional(row.average));
        fields.push(optional(row.min));
        fields.push(optional(row.max));
        fields.push(row.count.to_string());

        writer.write_record(&fields).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ForceResultsError::InvalidData(format!("CSV write failed: {}", e.error())))?;
    String::from_utf8(bytes).map_err(|e| ForceResultsError::InvalidData(format!("CSV is not UTF-8: {}", e)))
}

/// Measurements recovered from a CSV matrix export.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub temperatures: Vec<f64>,
    pub stroke_positions: Vec<f64>,
    pub measurements: Vec<Measurement>,
}

/// Inverse of [`matrix_to_csv`]. Timestamps are not part of the CSV layout,
/// so every recovered measurement is stamped with `timestamp`.
pub fn parse_matrix_csv(text: &str, timestamp: DateTime<Utc>) -> Result<ParsedCsv> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().map_err(csv_error)?.clone();
    if header.is_empty() {
        return Err(ForceResultsError::InvalidData("CSV export is empty".to_string()));
    }

    let mut stroke_positions = Vec::new();
    for column in header.iter().skip(1) {
        if column == ROW_AVERAGE {
            break;
        }
        if let Some(value) = column.strip_suffix(FORCE_SUFFIX) {
            stroke_positions.push(parse_number(value, "stroke position")?);
        }
    }

    let mut temperatures = Vec::new();
    let mut measurements = Vec::new();
    let mut record = StringRecord::new();
    // Rows whose field count differs from the header are rejected by the reader.
    while reader.read_record(&mut record).map_err(csv_error)? {
        let temperature = parse_number(field(&record, 0)?, "temperature")?;
        temperatures.push(temperature);

        for (col, stroke) in stroke_positions.iter().enumerate() {
            let force_field = field(&record, 1 + col * 3)?;
            if force_field.is_empty() {
                continue;
            }
            let status_field = field(&record, 3 + col * 3)?;
            let status = MeasurementStatus::parse(status_field).ok_or_else(|| {
                ForceResultsError::InvalidData(format!("unknown status '{}'", status_field))
            })?;
            measurements.push(
                Measurement::new(temperature, *stroke, parse_number(force_field, "force")?, timestamp)
                    .with_status(status),
            );
        }
    }

    Ok(ParsedCsv {
        temperatures,
        stroke_positions,
        measurements,
    })
}

fn field(record: &StringRecord, index: usize) -> Result<&str> {
    record.get(index).ok_or_else(|| {
        ForceResultsError::InvalidData(format!("CSV row is missing column {}", index + 1))
    })
}

fn csv_error(e: csv::Error) -> ForceResultsError {
    ForceResultsError::InvalidData(format!("CSV: {}", e))
}

fn parse_number(field: &str, what: &str) -> Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| ForceResultsError::InvalidData(format!("bad {} '{}'", what, field)))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    fn of(axis: &[f64]) -> Option<Self> {
        Some(Self {
            min: *axis.first()?,
            max: *axis.last()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: DateTime<Utc>,
    pub total_measurements: usize,
    pub temperature_range: Option<AxisRange>,
    pub stroke_range: Option<AxisRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub statistics: Statistics,
    #[serde(default)]
    pub filters: Filters,
    pub matrix: BTreeMap<String, BTreeMap<String, MatrixCell>>,
    pub temperature_list: Vec<f64>,
    pub stroke_positions: Vec<f64>,
}

impl ExportDocument {
    pub fn new(
        matrix: &ForceMatrix,
        statistics: &Statistics,
        filters: &Filters,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let cells = matrix
            .rows()
            .map(|(temperature, row)| {
                let columns = matrix
                    .strokes()
                    .iter()
                    .zip(row)
                    .map(|(stroke, cell)| (stroke.to_string(), *cell))
                    .collect();
                (temperature.to_string(), columns)
            })
            .collect();

        Self {
            metadata: ExportMetadata {
                export_date: exported_at,
                total_measurements: statistics.total,
                temperature_range: AxisRange::of(matrix.temperatures()),
                stroke_range: AxisRange::of(matrix.strokes()),
            },
            statistics: *statistics,
            filters: filters.clone(),
            matrix: cells,
            temperature_list: matrix.temperatures().to_vec(),
            stroke_positions: matrix.strokes().to_vec(),
        }
    }

    /// Rebuild the dense matrix from the keyed cells.
    pub fn to_matrix(&self) -> Result<ForceMatrix> {
        let mut matrix = ForceMatrix::empty(self.temperature_list.clone(), self.stroke_positions.clone());
        for temperature in &self.temperature_list {
            let row = self.matrix.get(&temperature.to_string()).ok_or_else(|| {
                ForceResultsError::InvalidData(format!("matrix has no row for {}", temperature))
            })?;
            for stroke in &self.stroke_positions {
                let cell = row.get(&stroke.to_string()).ok_or_else(|| {
                    ForceResultsError::InvalidData(format!(
                        "matrix row {} has no column for {}",
                        temperature, stroke
                    ))
                })?;
                matrix.set(*temperature, *stroke, *cell);
            }
        }
        Ok(matrix)
    }
}

pub fn parse_matrix_json(text: &str) -> Result<ExportDocument> {
    serde_json::from_str(text)
        .map_err(|e| ForceResultsError::InvalidData(format!("malformed JSON export: {}", e)))
}
