use chrono::{DateTime, TimeZone, Utc};
use eol_force_results::application::clock::FixedClock;
use eol_force_results::application::visualizer::{LoadOptions, VisualizerController, VisualizerOptions};
use eol_force_results::domain::filters::{Filters, PassFail, ValueRange};
use eol_force_results::domain::matrix::ForceMatrix;
use eol_force_results::domain::measurement::{PassCriterion, RawTestDataset};
use eol_force_results::domain::statistics::Statistics;
use eol_force_results::infrastructure::export::{parse_matrix_csv, parse_matrix_json, ExportFormat};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn controller(max_history_entries: usize) -> VisualizerController {
    VisualizerController::new(
        VisualizerOptions {
            max_history_entries,
            ..VisualizerOptions::default()
        },
        Arc::new(FixedClock::new(at())),
    )
}

/// Strictly ascending axis values.
fn axis(range: std::ops::Range<i32>, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::btree_set(range, 1..max_len).prop_map(|set| set.into_iter().map(f64::from).collect())
}

/// A dataset where each cell independently holds a force, a null force, or
/// nothing at all.
fn raw_dataset() -> impl Strategy<Value = RawTestDataset> {
    (axis(-40..120, 5), axis(0..200, 5)).prop_flat_map(|(temperatures, strokes)| {
        let cells = temperatures.len() * strokes.len();
        prop::collection::vec(prop::option::of(prop::option::of(0.0f64..2500.0)), cells).prop_map(move |forces| {
            let mut measurements = Vec::new();
            for (i, slot) in forces.into_iter().enumerate() {
                let t = temperatures[i / strokes.len()];
                let s = strokes[i % strokes.len()];
                match slot {
                    Some(Some(force)) => {
                        measurements.push(json!({"temperature": t, "strokePosition": s, "force": force}))
                    }
                    Some(None) => {
                        measurements.push(json!({"temperature": t, "strokePosition": s, "force": null}))
                    }
                    None => {}
                }
            }
            RawTestDataset {
                test_id: Some("PROP".to_string()),
                temperature_list: temperatures.clone(),
                stroke_positions: strokes.clone(),
                measurements: Value::Array(measurements),
                pass_criterion: Some(PassCriterion::new(200.0, 1800.0, 0.05)),
            }
        })
    })
}

fn range_filter() -> impl Strategy<Value = Option<ValueRange>> {
    prop::option::of((0.0f64..2500.0, 0.0f64..2500.0).prop_map(|(a, b)| ValueRange::new(a.min(b), a.max(b))))
}

proptest! {
    #[test]
    fn prop_matrix_is_dense(raw in raw_dataset()) {
        let expected = raw.temperature_list.len() * raw.stroke_positions.len();
        let mut vc = controller(10);
        vc.load_data(raw, LoadOptions::default()).unwrap();
        prop_assert_eq!(vc.full_matrix().unwrap().len(), expected);
        prop_assert_eq!(vc.matrix().unwrap().len(), expected);
    }

    #[test]
    fn prop_filter_superset_narrows(
        raw in raw_dataset(),
        force_range in range_filter(),
        temperature in prop::option::of((-40.0f64..120.0, -40.0f64..120.0)),
        pass in any::<bool>(),
    ) {
        let dataset = raw.validate(PassCriterion::new(0.0, 1000.0, 0.1), at()).unwrap();
        let criterion = dataset.pass_criterion();

        let base = Filters { force_range, ..Filters::default() };
        let narrower = Filters {
            temperature: temperature.map(|(a, b)| ValueRange::new(a.min(b), a.max(b))),
            pass_fail_status: Some(if pass { PassFail::Pass } else { PassFail::Fail }),
            ..base.clone()
        };

        let wide = base.apply(dataset.measurements(), criterion).unwrap();
        let narrow = narrower.apply(dataset.measurements(), criterion).unwrap();
        prop_assert!(narrow.len() <= wide.len());
        for m in &narrow {
            prop_assert!(wide.contains(m));
        }
    }

    #[test]
    fn prop_history_is_bounded(capacity in 1usize..6, extra in 1usize..6) {
        let mut vc = controller(capacity);
        let total = capacity + extra;
        for i in 0..total {
            let raw: RawTestDataset = serde_json::from_value(json!({
                "testId": format!("T-{}", i),
                "temperatureList": [20.0],
                "strokePositions": [10.0],
                "measurements": [{"temperature": 20.0, "strokePosition": 10.0, "force": i as f64}]
            }))
            .unwrap();
            vc.load_data(raw, LoadOptions::default()).unwrap();
        }

        let ids: Vec<Option<&str>> = vc.history().list().map(|e| e.dataset.test_id()).collect();
        prop_assert_eq!(ids.len(), capacity);
        let latest = format!("T-{}", total - 1);
        prop_assert_eq!(ids[0], Some(latest.as_str()));
    }

    #[test]
    fn prop_csv_round_trip(raw in raw_dataset()) {
        let mut vc = controller(10);
        vc.load_data(raw, LoadOptions::default()).unwrap();
        let artifact = vc.export_as(ExportFormat::Csv).unwrap();

        let parsed = parse_matrix_csv(std::str::from_utf8(&artifact.bytes).unwrap(), at()).unwrap();
        let dataset = vc.current_dataset().unwrap();
        let rebuilt = ForceMatrix::from_measurements(
            &parsed.temperatures,
            &parsed.stroke_positions,
            &parsed.measurements,
            dataset.pass_criterion(),
        );

        let original = vc.matrix().unwrap();
        prop_assert_eq!(rebuilt.temperatures(), original.temperatures());
        prop_assert_eq!(rebuilt.strokes(), original.strokes());
        for &t in original.temperatures() {
            for &s in original.strokes() {
                let before = original.get(t, s).and_then(|c| c.reading());
                let after = rebuilt.get(t, s).and_then(|c| c.reading());
                if let Some(before) = before {
                    let after = after.unwrap();
                    prop_assert_eq!(after.force, before.force);
                    prop_assert_eq!(after.pass, before.pass);
                    prop_assert_eq!(after.status, before.status);
                } else {
                    prop_assert!(after.is_none());
                }
            }
        }
    }

    #[test]
    fn prop_json_round_trip(raw in raw_dataset()) {
        let mut vc = controller(10);
        vc.load_data(raw, LoadOptions::default()).unwrap();
        let artifact = vc.export_as(ExportFormat::Json).unwrap();

        let document = parse_matrix_json(std::str::from_utf8(&artifact.bytes).unwrap()).unwrap();
        prop_assert_eq!(&document.to_matrix().unwrap(), vc.matrix().unwrap());
        prop_assert_eq!(document.statistics, vc.statistics());
    }

    #[test]
    fn prop_empty_view_statistics_are_zero(raw in raw_dataset()) {
        let mut vc = controller(10);
        vc.load_data(raw, LoadOptions::default()).unwrap();
        vc.set_filters(Filters {
            force_range: Some(ValueRange::new(-10.0, -5.0)),
            ..Filters::default()
        })
        .unwrap();
        prop_assert_eq!(vc.statistics(), Statistics::default());
    }
}
