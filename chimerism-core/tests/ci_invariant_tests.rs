//! CI Invariant Tests
//!
//! These tests explicitly validate critical invariants that must always hold.
//! Run in CI to prevent regressions.

use chimerism_core::input::MeasurementRow;
use chimerism_core::risk::assign_alarm_level;
use chimerism_core::{
    render_json, score_cohort, score_patient, AlarmLevel, CanonicalGrid, CohortEntry,
    CohortInput, PatientInput, ScoringContext,
};
use proptest::prelude::*;
use std::path::PathBuf;

fn load_entries() -> Vec<CohortEntry> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
        .join("cohort.json");
    CohortInput::load(&path)
        .expect("fixture should parse")
        .entries()
}

#[test]
fn test_records_follow_grid_order_without_duplicates() {
    let context = ScoringContext::default();
    let outcome = score_cohort(&load_entries(), &context);

    let grid_orders: Vec<u32> = context.grid.slots().iter().map(|s| s.order).collect();
    for timeline in outcome.timelines.iter().filter(|t| !t.is_rejected()) {
        let orders: Vec<u32> = timeline.records.iter().map(|r| r.slot_order).collect();
        assert_eq!(orders, grid_orders, "{} out of grid order", timeline.patient_id);
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_byte_identical_output_across_runs() {
    let entries = load_entries();
    let context = ScoringContext::default();

    let first = render_json(&score_cohort(&entries, &context).timelines);
    let second = render_json(&score_cohort(&entries, &context).timelines);
    assert_eq!(first, second, "output should be byte-for-byte identical");
}

#[test]
fn test_alarm_level_matches_emitted_score() {
    let outcome = score_cohort(&load_entries(), &ScoringContext::default());
    for timeline in &outcome.timelines {
        for record in &timeline.records {
            assert!((0.0..=100.0).contains(&record.risk_score));
            assert_eq!(record.alarm_level, assign_alarm_level(record.risk_score));
            if record.is_unmeasured() {
                assert_eq!(record.risk_score, 0.0);
                assert_eq!(record.alarm_level, AlarmLevel::Normal);
            }
        }
    }
}

#[test]
fn test_no_look_ahead() {
    let entries = load_entries();
    let context = ScoringContext::default();
    let full = entries[0].input.as_ref().unwrap();

    // Keep only rows up to and including Month_1 (order 10)
    let mut truncated = full.clone();
    truncated.measurements.truncate(8);
    assert_eq!(truncated.measurements.last().unwrap().slot_key, "Month_1");

    let full_records = score_patient(full, &context).unwrap();
    let truncated_records = score_patient(&truncated, &context).unwrap();

    for (a, b) in full_records.iter().zip(&truncated_records).take(10) {
        assert_eq!(a.slot_key, b.slot_key);
        assert_eq!(a.components, b.components, "components changed at {}", a.slot_key);
        assert_eq!(a.risk_score, b.risk_score, "risk changed at {}", a.slot_key);
    }
}

#[test]
fn test_grid_is_shared_read_only() {
    let context = ScoringContext::default();
    let before = context.grid.clone();
    let _ = score_cohort(&load_entries(), &context);
    assert_eq!(context.grid, before);
    assert_eq!(before, CanonicalGrid::standard());
}

fn arbitrary_patient() -> impl Strategy<Value = PatientInput> {
    let slot_keys: Vec<String> = CanonicalGrid::standard()
        .slots()
        .iter()
        .map(|s| s.key.clone())
        .collect();
    proptest::collection::btree_map(
        0usize..slot_keys.len(),
        (
            proptest::option::of(0.0..20.0f64),
            proptest::option::of(0.3..9.0f64),
            proptest::option::of(5.0..140.0f64),
        ),
        0..21,
    )
    .prop_map(move |rows| PatientInput {
        patient_id: "PROP".to_string(),
        measurements: rows
            .into_iter()
            .map(|(idx, (kmr, kre, gfr))| MeasurementRow {
                slot_key: slot_keys[idx].clone(),
                kmr,
                kre,
                gfr,
            })
            .collect(),
        ..Default::default()
    })
}

proptest! {
    #[test]
    fn prop_every_patient_gets_a_full_bounded_timeline(patient in arbitrary_patient()) {
        let context = ScoringContext::default();
        let records = score_patient(&patient, &context).unwrap();
        prop_assert_eq!(records.len(), context.grid.len());
        for record in &records {
            prop_assert!((0.0..=100.0).contains(&record.risk_score));
            if record.is_unmeasured() {
                prop_assert_eq!(record.risk_score, 0.0);
            }
        }
    }
}
