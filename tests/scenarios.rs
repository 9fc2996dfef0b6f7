use chrono::{DateTime, TimeZone, Utc};
use eol_force_results::application::clock::FixedClock;
use eol_force_results::application::events::{EventSink, VisualizerEvent, VisualizerState};
use eol_force_results::application::visualizer::{LoadOptions, VisualizerController, VisualizerOptions};
use eol_force_results::domain::analysis::{AnalysisKind, AnalysisRequest, AnalysisResult, CorrelationStrength, Variable};
use eol_force_results::domain::filters::{Filters, PassFail};
use eol_force_results::domain::matrix::MatrixCell;
use eol_force_results::domain::measurement::{PassCriterion, RawTestDataset};
use eol_force_results::infrastructure::export::{parse_matrix_json, ExportFormat};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<VisualizerEvent>>,
}

impl RecordingSink {
    fn drain_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().drain(..).map(|e| e.name()).collect()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: &VisualizerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn controller() -> (VisualizerController, Arc<RecordingSink>) {
    let mut vc = VisualizerController::new(VisualizerOptions::default(), Arc::new(FixedClock::new(at())));
    let sink = Arc::new(RecordingSink::default());
    vc.add_sink(sink.clone());
    (vc, sink)
}

fn dataset(temperatures: &[f64], strokes: &[f64], measurements: Value) -> RawTestDataset {
    serde_json::from_value(json!({
        "testId": "EOL-100",
        "temperatureList": temperatures,
        "strokePositions": strokes,
        "measurements": measurements,
        "passCriterion": {"minForce": 100.0, "maxForce": 1000.0, "tolerance": 0.1}
    }))
    .unwrap()
}

fn minimal_matrix() -> RawTestDataset {
    dataset(
        &[20.0, 25.0],
        &[10.0, 20.0],
        json!([
            {"temperature": 20, "strokePosition": 10, "force": 150, "status": "ok"},
            {"temperature": 20, "strokePosition": 20, "force": 900, "status": "ok"},
            {"temperature": 25, "strokePosition": 10, "force": 1500, "status": "ok"}
        ]),
    )
}

fn pass_of(cell: Option<&MatrixCell>) -> Option<bool> {
    cell.and_then(MatrixCell::reading).map(|r| r.pass)
}

#[test]
fn test_minimal_matrix() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();

    let matrix = vc.matrix().unwrap();
    assert_eq!(matrix.len(), 4);
    assert_eq!(pass_of(matrix.get(20.0, 10.0)), Some(true));
    assert_eq!(pass_of(matrix.get(20.0, 20.0)), Some(true));
    assert_eq!(pass_of(matrix.get(25.0, 10.0)), Some(false));
    assert_eq!(matrix.get(25.0, 20.0), Some(&MatrixCell::Empty));

    let stats = vc.statistics();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.min, 150.0);
    assert_eq!(stats.max, 1500.0);
    assert_eq!(stats.mean, 850.0);
    // Sample standard deviation.
    assert!((stats.std_dev - 457_500f64.sqrt()).abs() < 1e-9);
    assert!((stats.pass_rate - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_fail_filter() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();
    vc.set_filters(Filters {
        pass_fail_status: Some(PassFail::Fail),
        ..Filters::default()
    })
    .unwrap();

    let survivors = vc.filtered_measurements();
    assert_eq!(survivors.len(), 1);
    assert_eq!(
        (survivors[0].temperature, survivors[0].stroke_position, survivors[0].force),
        (25.0, 10.0, 1500.0)
    );

    let stats = vc.statistics();
    assert_eq!(stats.total, 1);
    assert_eq!((stats.min, stats.max, stats.mean), (1500.0, 1500.0, 1500.0));
    assert_eq!(stats.std_dev, 0.0);
}

#[test]
fn test_descriptive_degenerate() {
    let (mut vc, _) = controller();
    vc.load_data(
        dataset(&[20.0], &[10.0], json!([{"temperature": 20, "strokePosition": 10, "force": 500, "status": "ok"}])),
        LoadOptions::default(),
    )
    .unwrap();

    let report = vc.run_analysis(&AnalysisRequest::new(vec![AnalysisKind::Descriptive])).unwrap();
    match report.get(AnalysisKind::Descriptive) {
        Some(AnalysisResult::Descriptive(d)) => {
            assert_eq!(d.count, 1);
            assert_eq!(d.mean, 500.0);
            assert_eq!((d.variance, d.std_dev, d.skewness, d.kurtosis), (0.0, 0.0, 0.0, 0.0));
            assert!(d.degenerate);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_correlation_sign() {
    let (mut vc, _) = controller();
    let temperatures = [10.0, 20.0, 30.0, 40.0];
    let measurements: Vec<Value> = temperatures
        .iter()
        .map(|t| json!({"temperature": t, "strokePosition": 5.0, "force": 100.0 + 3.0 * t}))
        .collect();
    vc.load_data(dataset(&temperatures, &[5.0], Value::Array(measurements)), LoadOptions::default())
        .unwrap();

    let report = vc.run_analysis(&AnalysisRequest::new(vec![AnalysisKind::Correlation])).unwrap();
    let Some(AnalysisResult::Correlation(result)) = report.get(AnalysisKind::Correlation) else {
        panic!("correlation missing");
    };

    let force_temp = result.pair(Variable::Force, Variable::Temperature).unwrap();
    assert!((force_temp.r - 1.0).abs() < 1e-9);
    assert_eq!(force_temp.strength, CorrelationStrength::Strong);

    let force_stroke = result.pair(Variable::Force, Variable::StrokePosition).unwrap();
    assert_eq!(force_stroke.r, 0.0);
    assert!(force_stroke.degenerate);
}

#[test]
fn test_anova_by_temperature() {
    let (mut vc, _) = controller();
    let mut measurements = Vec::new();
    for (t, mean) in [(20.0, 100.0), (25.0, 500.0), (30.0, 900.0)] {
        for (s, offset) in [(1.0, -1.0), (2.0, 0.0), (3.0, 1.0)] {
            measurements.push(json!({"temperature": t, "strokePosition": s, "force": mean + offset}));
        }
    }
    vc.load_data(
        dataset(&[20.0, 25.0, 30.0], &[1.0, 2.0, 3.0], Value::Array(measurements)),
        LoadOptions::default(),
    )
    .unwrap();

    let report = vc.run_analysis(&AnalysisRequest::new(vec![AnalysisKind::Anova])).unwrap();
    let Some(AnalysisResult::Anova(anova)) = report.get(AnalysisKind::Anova) else {
        panic!("anova missing");
    };
    assert!(anova.f_statistic > 1e5);
    assert!(anova.significant);
    assert!(anova.interpretation.contains("temperature"));
}

#[test]
fn test_csv_export_rows() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();

    let artifact = vc.export_as(ExportFormat::Csv).unwrap();
    let text = String::from_utf8(artifact.bytes.to_vec()).unwrap();
    let mut rows = text.lines().skip(1);
    assert!(rows.next().unwrap().starts_with("20,150,PASS,ok,900,PASS,ok,525,150,900,2"));
    assert!(rows.next().unwrap().starts_with("25,1500,FAIL,ok,,,,1500,1500,1500,1"));
}

#[test]
fn test_json_export_restores_matrix() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();

    let artifact = vc.export_as(ExportFormat::Json).unwrap();
    let document = parse_matrix_json(std::str::from_utf8(&artifact.bytes).unwrap()).unwrap();
    assert_eq!(&document.to_matrix().unwrap(), vc.matrix().unwrap());
    assert_eq!(document.statistics, vc.statistics());
}

#[test]
fn test_idempotent_reload() {
    let (mut vc, sink) = controller();

    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();
    let first_matrix = vc.matrix().cloned();
    let first_stats = vc.statistics();
    let first_events = sink.drain_names();

    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();
    assert_eq!(vc.matrix().cloned(), first_matrix);
    assert_eq!(vc.statistics(), first_stats);
    assert_eq!(sink.drain_names(), first_events);
}

#[test]
fn test_failed_load_keeps_previous_dataset() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();

    let bad = dataset(&[20.0], &[10.0], json!([{"temperature": 20, "force": 1}]));
    assert!(vc.load_data(bad, LoadOptions::default()).is_err());
    assert_eq!(vc.state(), VisualizerState::Error);
    assert_eq!(vc.statistics().total, 3);
    assert_eq!(vc.current_dataset().unwrap().pass_criterion(), &PassCriterion::new(100.0, 1000.0, 0.1));
}

#[test]
fn test_comparison_against_history() {
    let (mut vc, _) = controller();
    vc.load_data(minimal_matrix(), LoadOptions::default()).unwrap();
    let mut second = minimal_matrix();
    second.test_id = Some("EOL-101".to_string());
    vc.load_data(second, LoadOptions::default()).unwrap();

    let report = vc.begin_compare(vec![1, 5]).unwrap();
    assert_eq!(report.rows[0].label, "EOL-101");
    assert!(report.rows[0].is_current);
    assert_eq!(report.rows[1].label, "EOL-100");
    assert!(report.rows[2].error.is_some());
    assert_eq!(report.summary.total_tests, 2);
    assert_eq!(report.summary.total_measurements, 6);
}
