//! Dashboard aggregates - patient status and cohort alarm distribution
//!
//! Computes derived views from emitted risk records without touching them.
//!
//! Global invariants enforced:
//! - Aggregates are strictly derived (never stored, always computed)
//! - Deterministic ordering
//! - Rejected patients are counted, never summarized

use crate::input::{Metric, MetricMap};
use crate::report::PatientTimeline;
use crate::risk::AlarmLevel;
use crate::scoring::ClinicalThresholds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GFR above this is physiologically implausible and flagged
pub const GFR_PLAUSIBLE_MAX: f64 = 120.0;

/// Most recent actual value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastValue {
    pub slot_order: u32,
    pub value: f64,
}

/// Per-patient dashboard summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PatientStatus {
    pub patient_id: String,
    pub peak_risk: f64,
    pub peak_slot_key: Option<String>,
    pub peak_alarm_level: AlarmLevel,
    pub last_values: MetricMap<Option<LastValue>>,
    pub anomaly_flags: MetricMap<bool>,
    pub has_anomaly: bool,
}

/// Cohort-wide summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CohortSummary {
    pub patient_count: usize,
    pub failed_count: usize,
    pub alarm_distribution: BTreeMap<AlarmLevel, usize>,
    pub anomaly_patient_count: usize,
    pub patients: Vec<PatientStatus>,
}

/// Whether a value is outside the clinically expected range for its metric
pub fn breaches_threshold(metric: Metric, value: f64, thresholds: &ClinicalThresholds) -> bool {
    match metric {
        Metric::Kmr => value > thresholds.kmr.kritik_upper || value < 0.0,
        Metric::Kre => value > thresholds.kre.very_bad_gt || value < 0.0,
        Metric::Gfr => value < thresholds.gfr.very_bad_le || value > GFR_PLAUSIBLE_MAX,
    }
}

/// Summarize one scored patient
pub fn compute_patient_status(
    timeline: &PatientTimeline,
    thresholds: &ClinicalThresholds,
) -> PatientStatus {
    let mut peak: Option<(f64, &str, AlarmLevel)> = None;
    let mut last_values: MetricMap<Option<LastValue>> = MetricMap::default();
    let mut anomaly_flags: MetricMap<bool> = MetricMap::default();

    for record in &timeline.records {
        // Strictly greater: the first slot wins ties
        let is_new_peak = match peak {
            Some((risk, _, _)) => record.risk_score > risk,
            None => true,
        };
        if is_new_peak {
            peak = Some((record.risk_score, &record.slot_key, record.alarm_level));
        }

        for metric in Metric::ALL {
            if record.anomalies.get(metric).flag {
                *anomaly_flags.get_mut(metric) = true;
            }
            if let Some(value) = record.value(metric) {
                *last_values.get_mut(metric) = Some(LastValue {
                    slot_order: record.slot_order,
                    value,
                });
                if breaches_threshold(metric, value, thresholds) {
                    *anomaly_flags.get_mut(metric) = true;
                }
            }
        }
    }

    let (peak_risk, peak_slot_key, peak_alarm_level) = match peak {
        Some((risk, key, level)) => (risk, Some(key.to_string()), level),
        None => (0.0, None, AlarmLevel::Normal),
    };
    let has_anomaly = Metric::ALL.iter().any(|m| *anomaly_flags.get(*m));

    PatientStatus {
        patient_id: timeline.patient_id.clone(),
        peak_risk,
        peak_slot_key,
        peak_alarm_level,
        last_values,
        anomaly_flags,
        has_anomaly,
    }
}

/// Summarize a cohort; rejected patients only contribute to `failed_count`
pub fn compute_cohort_summary(
    timelines: &[PatientTimeline],
    thresholds: &ClinicalThresholds,
) -> CohortSummary {
    let mut alarm_distribution: BTreeMap<AlarmLevel, usize> =
        AlarmLevel::ALL.iter().map(|level| (*level, 0)).collect();

    let patients: Vec<PatientStatus> = timelines
        .iter()
        .filter(|t| !t.is_rejected())
        .map(|t| compute_patient_status(t, thresholds))
        .collect();

    for status in &patients {
        *alarm_distribution.entry(status.peak_alarm_level).or_insert(0) += 1;
    }

    CohortSummary {
        patient_count: timelines.len(),
        failed_count: timelines.iter().filter(|t| t.is_rejected()).count(),
        alarm_distribution,
        anomaly_patient_count: patients.iter().filter(|p| p.has_anomaly).count(),
        patients,
    }
}

/// Render a cohort summary as text
pub fn render_summary_text(summary: &CohortSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Patients: {} ({} rejected)\n",
        summary.patient_count, summary.failed_count
    ));
    output.push_str(&format!(
        "Patients with anomalies: {}\n",
        summary.anomaly_patient_count
    ));
    output.push_str("Peak alarm distribution:\n");
    for (level, count) in &summary.alarm_distribution {
        output.push_str(&format!("  {:<12} {}\n", level.as_str(), count));
    }

    if !summary.patients.is_empty() {
        output.push('\n');
        output.push_str(&format!(
            "{:<12} {:>6}  {:<10} {:<12} {}\n",
            "PATIENT", "PEAK", "SLOT", "ALARM", "ANOMALY"
        ));
        for status in &summary.patients {
            output.push_str(&format!(
                "{:<12} {:>6.1}  {:<10} {:<12} {}\n",
                status.patient_id,
                status.peak_risk,
                status.peak_slot_key.as_deref().unwrap_or("-"),
                status.peak_alarm_level.as_str(),
                if status.has_anomaly { "yes" } else { "no" },
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ComponentBreakdown, MetricAnomaly, RiskRecord};

    fn record(order: u32, kmr: Option<f64>, gfr: Option<f64>, risk: f64, alarm: AlarmLevel) -> RiskRecord {
        RiskRecord {
            slot_key: format!("S{}", order),
            slot_order: order,
            pseudo_day_offset: order,
            kmr,
            kre: None,
            gfr,
            predictions: MetricMap::default(),
            anomalies: MetricMap::default(),
            components: ComponentBreakdown::default(),
            risk_score: risk,
            alarm_level: alarm,
        }
    }

    fn timeline(id: &str, records: Vec<RiskRecord>) -> PatientTimeline {
        PatientTimeline {
            patient_id: id.to_string(),
            records,
            error: None,
        }
    }

    #[test]
    fn test_peak_first_slot_wins_ties() {
        let t = timeline(
            "P1",
            vec![
                record(1, Some(1.0), None, 40.0, AlarmLevel::Dikkat),
                record(2, Some(2.0), None, 65.0, AlarmLevel::Kritik),
                record(3, Some(2.0), None, 65.0, AlarmLevel::Kritik),
            ],
        );
        let status = compute_patient_status(&t, &ClinicalThresholds::default());
        assert_eq!(status.peak_risk, 65.0);
        assert_eq!(status.peak_slot_key.as_deref(), Some("S2"));
        assert_eq!(status.peak_alarm_level, AlarmLevel::Kritik);
    }

    #[test]
    fn test_last_values_skip_unmeasured_slots() {
        let t = timeline(
            "P1",
            vec![
                record(1, Some(1.0), Some(80.0), 10.0, AlarmLevel::Normal),
                record(2, Some(0.5), None, 5.0, AlarmLevel::Normal),
                record(3, None, None, 0.0, AlarmLevel::Normal),
            ],
        );
        let status = compute_patient_status(&t, &ClinicalThresholds::default());
        assert_eq!(
            status.last_values.kmr,
            Some(LastValue {
                slot_order: 2,
                value: 0.5
            })
        );
        assert_eq!(status.last_values.gfr.map(|v| v.slot_order), Some(1));
        assert_eq!(status.last_values.kre, None);
        assert!(!status.has_anomaly);
    }

    #[test]
    fn test_anomaly_from_oracle_flag_or_threshold() {
        let mut flagged = record(1, Some(0.2), None, 3.0, AlarmLevel::Normal);
        flagged.anomalies.kmr = MetricAnomaly {
            score: Some(70.0),
            flag: true,
        };
        let status = compute_patient_status(&timeline("P1", vec![flagged]), &ClinicalThresholds::default());
        assert!(status.anomaly_flags.kmr);
        assert!(status.has_anomaly);

        let low_gfr = record(1, None, Some(12.0), 50.0, AlarmLevel::Dikkat);
        let status = compute_patient_status(&timeline("P2", vec![low_gfr]), &ClinicalThresholds::default());
        assert!(status.anomaly_flags.gfr);
        assert!(!status.anomaly_flags.kmr);
    }

    #[test]
    fn test_threshold_breaches() {
        let t = ClinicalThresholds::default();
        assert!(breaches_threshold(Metric::Kmr, 5.1, &t));
        assert!(!breaches_threshold(Metric::Kmr, 5.0, &t));
        assert!(breaches_threshold(Metric::Kre, 4.6, &t));
        assert!(breaches_threshold(Metric::Gfr, 121.0, &t));
        assert!(!breaches_threshold(Metric::Gfr, 15.0, &t));
    }

    #[test]
    fn test_cohort_summary_counts() {
        let rejected = PatientTimeline {
            patient_id: "P3".to_string(),
            records: Vec::new(),
            error: Some("patient id is empty".to_string()),
        };
        let timelines = vec![
            timeline("P1", vec![record(1, Some(6.0), None, 85.0, AlarmLevel::CokKritik)]),
            timeline("P2", vec![record(1, Some(0.1), None, 4.0, AlarmLevel::Normal)]),
            rejected,
        ];
        let summary = compute_cohort_summary(&timelines, &ClinicalThresholds::default());
        assert_eq!(summary.patient_count, 3);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.patients.len(), 2);
        assert_eq!(summary.alarm_distribution.len(), 4);
        assert_eq!(summary.alarm_distribution[&AlarmLevel::CokKritik], 1);
        assert_eq!(summary.alarm_distribution[&AlarmLevel::Normal], 1);
        assert_eq!(summary.alarm_distribution[&AlarmLevel::Kritik], 0);
        // KMR 6.0 breaches the kritik bound
        assert_eq!(summary.anomaly_patient_count, 1);
    }

    #[test]
    fn test_summary_serializes_all_levels() {
        let summary = compute_cohort_summary(&[], &ClinicalThresholds::default());
        let json = serde_json::to_value(&summary).unwrap();
        let dist = json["alarm_distribution"].as_object().unwrap();
        assert_eq!(dist.len(), 4);
        assert_eq!(dist["Çok Kritik"], 0);
        assert!(render_summary_text(&summary).contains("Patients: 0 (0 rejected)"));
    }
}
