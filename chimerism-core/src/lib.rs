//! Chimerism core library - unified timeline stitching and risk scoring for
//! chimerism (KMR) and renal lab (KRE, GFR) follow-up series

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Scoring is strictly per-patient
// - No global mutable state; grid and parameters are read-only once built
// - No randomness, clocks, or I/O inside scoring
// - Slot traversal order is explicit (ascending grid order)
// - A score never sees a later slot's value
// - Identical input yields byte-for-byte identical output

pub mod aggregates;
pub mod config;
pub mod error;
pub mod grid;
pub mod input;
pub mod report;
pub mod risk;
pub mod scoring;
pub mod signals;
pub mod stats;
pub mod timeline;

pub use aggregates::{compute_cohort_summary, CohortSummary, PatientStatus};
pub use config::ResolvedConfig;
pub use error::{TimelineError, TimelineResult};
pub use grid::{CanonicalGrid, TimeSlot};
pub use input::{CohortEntry, CohortInput, Metric, PatientInput};
pub use report::{render_json, render_jsonl, render_text, PatientTimeline, RiskRecord};
pub use risk::AlarmLevel;
pub use timeline::{PredictionStatus, TimelineAssembler};

use rayon::prelude::*;
use risk::{AlarmThresholds, BlendWeights, KmrWeights, LabWeights};
use scoring::ClinicalThresholds;
use signals::SignalLookup;

/// Every tunable number used by the score calculators and combiner
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoringParams {
    pub kmr_weights: KmrWeights,
    pub lab_weights: LabWeights,
    pub blend: BlendWeights,
    pub thresholds: ClinicalThresholds,
    pub alarm: AlarmThresholds,
}

/// Grid and parameters shared read-only by every patient walk
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub grid: CanonicalGrid,
    pub params: ScoringParams,
}

impl ScoringContext {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        ScoringContext {
            grid: config.grid.clone(),
            params: config.params,
        }
    }
}

/// A patient rejected at the input boundary
#[derive(Debug, Clone, PartialEq)]
pub struct PatientFailure {
    pub patient_id: String,
    pub error: TimelineError,
}

/// Result of scoring a cohort, in input order
#[derive(Debug, Clone, Default)]
pub struct CohortOutcome {
    pub timelines: Vec<PatientTimeline>,
    pub failures: Vec<PatientFailure>,
}

impl CohortOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Score one patient into an ordered record list, one record per grid slot
pub fn score_patient(patient: &PatientInput, context: &ScoringContext) -> TimelineResult<Vec<RiskRecord>> {
    let signals = SignalLookup::build(patient, &context.grid)?;
    Ok(TimelineAssembler::new(context).assemble(&signals))
}

/// Score every entry in parallel; a rejected patient never affects the others
pub fn score_cohort(entries: &[CohortEntry], context: &ScoringContext) -> CohortOutcome {
    score_cohort_with_progress(entries, context, || {})
}

/// Like `score_cohort`, calling `on_patient_done` once per finished patient
pub fn score_cohort_with_progress<F>(
    entries: &[CohortEntry],
    context: &ScoringContext,
    on_patient_done: F,
) -> CohortOutcome
where
    F: Fn() + Sync,
{
    let results: Vec<(String, TimelineResult<Vec<RiskRecord>>)> = entries
        .par_iter()
        .map(|entry| {
            let result = match entry.input {
                Ok(ref patient) => score_patient(patient, context),
                Err(ref error) => Err(error.clone()),
            };
            on_patient_done();
            (entry.label(), result)
        })
        .collect();

    let mut outcome = CohortOutcome::default();
    for (patient_id, result) in results {
        match result {
            Ok(records) => outcome.timelines.push(PatientTimeline {
                patient_id,
                records,
                error: None,
            }),
            Err(error) => {
                tracing::warn!(patient_id = %patient_id, error = %error, "patient rejected");
                outcome.timelines.push(PatientTimeline {
                    patient_id: patient_id.clone(),
                    records: Vec::new(),
                    error: Some(error.to_string()),
                });
                outcome.failures.push(PatientFailure { patient_id, error });
            }
        }
    }

    tracing::info!(
        patients = entries.len(),
        rejected = outcome.failures.len(),
        "cohort scored"
    );
    outcome
}

/// Entries selected by the config's include/exclude patterns, in input order
///
/// Records without a readable patient id are always kept so their rejection
/// is reported.
pub fn select_patients(entries: Vec<CohortEntry>, config: &ResolvedConfig) -> Vec<CohortEntry> {
    entries
        .into_iter()
        .filter(|entry| match entry.patient_id {
            Some(ref id) => config.should_include_patient(id),
            None => true,
        })
        .collect()
}
