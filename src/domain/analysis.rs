// Statistics engine - descriptive, normality, correlation, regression, ANOVA
use super::error::{ForceResultsError, Result};
use super::measurement::Measurement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rule-of-thumb F threshold for ANOVA significance. Not a table lookup.
pub const ANOVA_F_THRESHOLD: f64 = 4.0;
/// |r| above this is flagged significant. Not a p-value.
pub const CORRELATION_SIGNIFICANCE: f64 = 0.3;
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Descriptive,
    Normality,
    Correlation,
    Regression,
    Anova,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grouping {
    #[default]
    Temperature,
    StrokePosition,
}

impl Grouping {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::StrokePosition => "stroke position",
        }
    }

    fn key(&self, m: &Measurement) -> f64 {
        match self {
            Self::Temperature => m.temperature,
            Self::StrokePosition => m.stroke_position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variable {
    Force,
    Temperature,
    StrokePosition,
}

impl Variable {
    fn value(&self, m: &Measurement) -> f64 {
        match self {
            Self::Force => m.force,
            Self::Temperature => m.temperature,
            Self::StrokePosition => m.stroke_position,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptiveStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub mode: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub iqr: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Set when n is too small (or the spread is zero) for some formula.
    pub degenerate: bool,
}

/// Descriptive summary of `values`, which must be non-empty.
pub fn descriptive(values: &[f64]) -> Result<DescriptiveStatistics> {
    let count = values.len();
    if count == 0 {
        return Err(ForceResultsError::InsufficientData {
            observations: 0,
            groups: 1,
        });
    }

    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let quantile = |p: f64| sorted[(n * p).floor() as usize];
    let q1 = quantile(0.25);
    let median = quantile(0.5);
    let q3 = quantile(0.75);
    let min = sorted[0];
    let max = sorted[count - 1];

    let variance = if count < 2 {
        0.0
    } else {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    };
    let std_dev = variance.sqrt();
    let spread = std_dev > 0.0;

    let skewness = if count >= 3 && spread {
        let sum_cubed: f64 = values.iter().map(|x| ((x - mean) / std_dev).powi(3)).sum();
        n / ((n - 1.0) * (n - 2.0)) * sum_cubed
    } else {
        0.0
    };

    let kurtosis = if count >= 4 && spread {
        let sum_fourth: f64 = values.iter().map(|x| ((x - mean) / std_dev).powi(4)).sum();
        n * (n + 1.0) / ((n - 1.0) * (n - 2.0) * (n - 3.0)) * sum_fourth
            - 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0))
    } else {
        0.0
    };

    Ok(DescriptiveStatistics {
        count,
        mean,
        median,
        q1,
        q3,
        mode: mode(values),
        variance,
        std_dev,
        min,
        max,
        range: max - min,
        iqr: q3 - q1,
        skewness,
        kurtosis,
        degenerate: count < 4 || !spread,
    })
}

/// Most frequent value; ties go to the first occurrence.
fn mode(values: &[f64]) -> f64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        *counts.entry(canonical_bits(*v)).or_default() += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);
    values
        .iter()
        .copied()
        .find(|v| counts.get(&canonical_bits(*v)) == Some(&best))
        .unwrap_or(0.0)
}

// -0.0 and 0.0 compare equal, so they share a bucket.
fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }
}

// ---------------------------------------------------------------------------
// Normality (skewness/kurtosis bounds, not a true test statistic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalityResult {
    pub is_normal: bool,
    pub skewness: f64,
    pub kurtosis: f64,
    pub degenerate: bool,
    pub interpretation: String,
}

pub fn normality(values: &[f64]) -> Result<NormalityResult> {
    let stats = descriptive(values)?;
    let is_normal = stats.skewness.abs() < 2.0 && stats.kurtosis.abs() < 7.0;
    let interpretation = if is_normal {
        format!(
            "Data appears approximately normal (skewness {:.3}, kurtosis {:.3})",
            stats.skewness, stats.kurtosis
        )
    } else {
        format!(
            "Data departs from normality (skewness {:.3}, kurtosis {:.3})",
            stats.skewness, stats.kurtosis
        )
    };
    Ok(NormalityResult {
        is_normal,
        skewness: stats.skewness,
        kurtosis: stats.kurtosis,
        degenerate: stats.degenerate,
        interpretation,
    })
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    VeryWeak,
}

impl CorrelationStrength {
    pub fn classify(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude >= 0.7 {
            Self::Strong
        } else if magnitude >= 0.5 {
            Self::Moderate
        } else if magnitude >= 0.3 {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationPair {
    pub x: Variable,
    pub y: Variable,
    pub r: f64,
    pub strength: CorrelationStrength,
    pub significant: bool,
    /// One side has zero variance (or n < 2); `r` is reported as 0.
    pub degenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResult {
    pub count: usize,
    pub pairs: Vec<CorrelationPair>,
}

impl CorrelationResult {
    pub fn pair(&self, x: Variable, y: Variable) -> Option<&CorrelationPair> {
        self.pairs.iter().find(|p| p.x == x && p.y == y)
    }
}

const CORRELATION_PAIRS: [(Variable, Variable); 3] = [
    (Variable::Force, Variable::Temperature),
    (Variable::Force, Variable::StrokePosition),
    (Variable::Temperature, Variable::StrokePosition),
];

pub fn correlation(measurements: &[Measurement]) -> CorrelationResult {
    let pairs = CORRELATION_PAIRS
        .iter()
        .map(|(x, y)| {
            let xs: Vec<f64> = measurements.iter().map(|m| x.value(m)).collect();
            let ys: Vec<f64> = measurements.iter().map(|m| y.value(m)).collect();
            let (r, degenerate) = match pearson(&xs, &ys) {
                Some(r) => (r, false),
                None => (0.0, true),
            };
            CorrelationPair {
                x: *x,
                y: *y,
                r,
                strength: CorrelationStrength::classify(r),
                significant: r.abs() > CORRELATION_SIGNIFICANCE,
                degenerate,
            }
        })
        .collect();

    CorrelationResult {
        count: measurements.len(),
        pairs,
    }
}

/// Pearson r, or `None` when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

// ---------------------------------------------------------------------------
// Regression (force on temperature)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionResult {
    pub count: usize,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub equation: String,
}

impl RegressionResult {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn regression(xs: &[f64], ys: &[f64]) -> Result<RegressionResult> {
    let count = xs.len().min(ys.len());
    let n = count as f64;
    let (xs, ys) = (&xs[..count], &ys[..count]);

    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() <= f64::EPSILON * (n * sum_x2).abs() {
        return Err(ForceResultsError::Degenerate(
            "no variance in temperature; slope is undefined".to_string(),
        ));
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    Ok(RegressionResult {
        count,
        slope,
        intercept,
        r_squared,
        equation: format!("y = {:.4}x + {:.4}", slope, intercept),
    })
}

// ---------------------------------------------------------------------------
// One-way ANOVA
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub value: f64,
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnovaResult {
    pub grouping: Grouping,
    pub groups: Vec<GroupSummary>,
    pub ss_between: f64,
    pub ss_within: f64,
    pub df_between: usize,
    pub df_within: usize,
    pub f_statistic: f64,
    pub significant: bool,
    pub interpretation: String,
}

pub fn anova(measurements: &[Measurement], grouping: Grouping) -> Result<AnovaResult> {
    // Groups keep first-appearance order.
    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut groups: Vec<(f64, Vec<f64>)> = Vec::new();
    for m in measurements {
        let key = grouping.key(m);
        let slot = *index.entry(canonical_bits(key)).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(m.force);
    }

    let k = groups.len();
    let total = measurements.len();
    if k < 2 {
        return Err(ForceResultsError::InsufficientGroups { found: k });
    }
    if total <= k {
        return Err(ForceResultsError::InsufficientData {
            observations: total,
            groups: k,
        });
    }

    let grand_mean = measurements.iter().map(|m| m.force).sum::<f64>() / total as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    let mut summaries = Vec::with_capacity(k);
    for (value, forces) in &groups {
        let count = forces.len();
        let mean = forces.iter().sum::<f64>() / count as f64;
        ss_between += count as f64 * (mean - grand_mean).powi(2);
        ss_within += forces.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        summaries.push(GroupSummary {
            value: *value,
            count,
            mean,
        });
    }

    let df_between = k - 1;
    let df_within = total - k;
    let ms_within = ss_within / df_within as f64;
    if ms_within == 0.0 {
        return Err(ForceResultsError::Degenerate(format!(
            "no within-group variance across {} groups",
            grouping.label()
        )));
    }
    let f_statistic = (ss_between / df_between as f64) / ms_within;
    let significant = f_statistic > ANOVA_F_THRESHOLD;

    let interpretation = if significant {
        format!(
            "Force differs significantly between {} groups (F = {:.3} > {})",
            grouping.label(),
            f_statistic,
            ANOVA_F_THRESHOLD
        )
    } else {
        format!(
            "No significant force difference between {} groups (F = {:.3} <= {})",
            grouping.label(),
            f_statistic,
            ANOVA_F_THRESHOLD
        )
    };

    Ok(AnovaResult {
        grouping,
        groups: summaries,
        ss_between,
        ss_within,
        df_between,
        df_within,
        f_statistic,
        significant,
        interpretation,
    })
}

// ---------------------------------------------------------------------------
// Requests and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Descriptive(DescriptiveStatistics),
    Normality(NormalityResult),
    Correlation(CorrelationResult),
    Regression(RegressionResult),
    Anova(AnovaResult),
}

impl AnalysisResult {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::Descriptive(_) => AnalysisKind::Descriptive,
            Self::Normality(_) => AnalysisKind::Normality,
            Self::Correlation(_) => AnalysisKind::Correlation,
            Self::Regression(_) => AnalysisKind::Regression,
            Self::Anova(_) => AnalysisKind::Anova,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub tests: Vec<AnalysisKind>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default)]
    pub grouping: Grouping,
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

impl AnalysisRequest {
    pub fn new(tests: Vec<AnalysisKind>) -> Self {
        Self {
            tests,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            grouping: Grouping::default(),
        }
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFailure {
    pub kind: AnalysisKind,
    #[serde(serialize_with = "serialize_error")]
    pub error: ForceResultsError,
}

fn serialize_error<S: serde::Serializer>(
    error: &ForceResultsError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct ErrorBody<'a> {
        kind: &'a str,
        message: String,
    }
    ErrorBody {
        kind: error.kind(),
        message: error.to_string(),
    }
    .serialize(serializer)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Carried verbatim; no formula consumes it yet.
    pub confidence_level: f64,
    pub grouping: Grouping,
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<AnalysisFailure>,
}

impl AnalysisReport {
    pub fn get(&self, kind: AnalysisKind) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<AnalysisKind> {
        self.results.iter().map(AnalysisResult::kind).collect()
    }
}

/// Run every requested kind over the measurements that carry a force.
/// A failing kind is recorded in `failures` without stopping the others.
pub fn run(request: &AnalysisRequest, measurements: &[Measurement]) -> AnalysisReport {
    let usable: Vec<Measurement> = measurements.iter().filter(|m| m.has_force()).cloned().collect();
    let forces: Vec<f64> = usable.iter().map(|m| m.force).collect();

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for kind in &request.tests {
        let outcome = match kind {
            AnalysisKind::Descriptive => descriptive(&forces).map(AnalysisResult::Descriptive),
            AnalysisKind::Normality => normality(&forces).map(AnalysisResult::Normality),
            AnalysisKind::Correlation => Ok(AnalysisResult::Correlation(correlation(&usable))),
            AnalysisKind::Regression => {
                let temperatures: Vec<f64> = usable.iter().map(|m| m.temperature).collect();
                regression(&temperatures, &forces).map(AnalysisResult::Regression)
            }
            AnalysisKind::Anova => anova(&usable, request.grouping).map(AnalysisResult::Anova),
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::debug!("Analysis {:?} failed: {}", kind, e);
                failures.push(AnalysisFailure { kind: *kind, error: e });
            }
        }
    }

    AnalysisReport {
        confidence_level: request.confidence_level,
        grouping: request.grouping,
        results,
        failures,
    }
}
