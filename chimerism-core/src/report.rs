//! Risk records and output rendering
//!
//! Global invariants enforced:
//! - Records are emitted in ascending slot order
//! - Renderers only serialize; no scoring happens here
//! - Byte-for-byte identical output across runs

use crate::input::{Metric, MetricMap};
use crate::risk::{AlarmLevel, ComponentScoreSet};
use crate::stats::round_to;
use crate::timeline::PredictionStatus;
use serde::{Deserialize, Serialize};

/// Forecast view for one metric at one slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricPrediction {
    pub point: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub status: PredictionStatus,
}

/// Anomaly view for one metric at one slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAnomaly {
    pub score: Option<f64>,
    pub flag: bool,
}

/// Sub-scores behind a slot's risk score, rounded to one decimal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComponentBreakdown {
    pub kmr_level: f64,
    pub kmr_trend: f64,
    pub kmr_volatility: f64,
    pub kmr_anomaly: f64,
    pub kmr_residual: f64,
    pub kmr_risk: Option<f64>,
    pub kre_level: Option<f64>,
    pub gfr_level: Option<f64>,
    pub lab_level: Option<f64>,
    pub kre_trend: Option<f64>,
    pub gfr_trend: Option<f64>,
    pub lab_trend: Option<f64>,
    pub lab_anomaly: Option<f64>,
    pub lab_risk: Option<f64>,
}

fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

impl From<&ComponentScoreSet> for ComponentBreakdown {
    fn from(scores: &ComponentScoreSet) -> Self {
        ComponentBreakdown {
            kmr_level: round1(scores.kmr.level),
            kmr_trend: round1(scores.kmr.trend),
            kmr_volatility: round1(scores.kmr.volatility),
            kmr_anomaly: round1(scores.kmr.anomaly),
            kmr_residual: round1(scores.kmr.residual),
            kmr_risk: scores.kmr_risk.map(round1),
            kre_level: scores.lab.kre_level.map(round1),
            gfr_level: scores.lab.gfr_level.map(round1),
            lab_level: scores.lab.level.map(round1),
            kre_trend: scores.lab.kre_trend.map(round1),
            gfr_trend: scores.lab.gfr_trend.map(round1),
            lab_trend: scores.lab.trend.map(round1),
            lab_anomaly: scores.lab.anomaly.map(round1),
            lab_risk: scores.lab_risk.map(round1),
        }
    }
}

/// One slot of a patient's unified timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskRecord {
    pub slot_key: String,
    pub slot_order: u32,
    pub pseudo_day_offset: u32,
    pub kmr: Option<f64>,
    pub kre: Option<f64>,
    pub gfr: Option<f64>,
    pub predictions: MetricMap<MetricPrediction>,
    pub anomalies: MetricMap<MetricAnomaly>,
    pub components: ComponentBreakdown,
    pub risk_score: f64,
    pub alarm_level: AlarmLevel,
}

impl RiskRecord {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Kmr => self.kmr,
            Metric::Kre => self.kre,
            Metric::Gfr => self.gfr,
        }
    }

    /// True when no marker was measured at this slot
    pub fn is_unmeasured(&self) -> bool {
        Metric::ALL.iter().all(|m| self.value(*m).is_none())
    }
}

/// A patient's full timeline, or the reason it was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTimeline {
    pub patient_id: String,
    pub records: Vec<RiskRecord>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl PatientTimeline {
    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }
}

/// Render timelines as pretty JSON
pub fn render_json(timelines: &[PatientTimeline]) -> String {
    serde_json::to_string_pretty(timelines).unwrap_or_else(|_| "[]".to_string())
}

/// Render one JSON object per record, tagged with the patient id
pub fn render_jsonl(timelines: &[PatientTimeline]) -> String {
    #[derive(Serialize)]
    struct Line<'a> {
        patient_id: &'a str,
        #[serde(flatten)]
        record: &'a RiskRecord,
    }

    let mut output = String::new();
    for timeline in timelines {
        for record in &timeline.records {
            let line = Line {
                patient_id: &timeline.patient_id,
                record,
            };
            if let Ok(json) = serde_json::to_string(&line) {
                output.push_str(&json);
                output.push('\n');
            }
        }
    }
    output
}

/// Render timelines as a fixed-width text table
pub fn render_text(timelines: &[PatientTimeline]) -> String {
    let mut output = String::new();

    for timeline in timelines {
        output.push_str(&format!("Patient {}\n", timeline.patient_id));
        if let Some(ref error) = timeline.error {
            output.push_str(&format!("  rejected: {}\n\n", error));
            continue;
        }

        output.push_str(&format!(
            "{:<10} {:>5} {:>8} {:>8} {:>8} {:>6}  {:<10} {}\n",
            "SLOT", "DAY", "KMR", "KRE", "GFR", "RISK", "ALARM", "KMR STATUS"
        ));
        for record in &timeline.records {
            output.push_str(&format!(
                "{:<10} {:>5} {:>8} {:>8} {:>8} {:>6.1}  {:<10} {}\n",
                record.slot_key,
                record.pseudo_day_offset,
                format_value(record.kmr),
                format_value(record.kre),
                format_value(record.gfr),
                record.risk_score,
                record.alarm_level.as_str(),
                record.predictions.kmr.status.as_str(),
            ));
        }
        output.push('\n');
    }

    output
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order: u32, kmr: Option<f64>, risk: f64, alarm: AlarmLevel) -> RiskRecord {
        RiskRecord {
            slot_key: format!("Day_{}", order),
            slot_order: order,
            pseudo_day_offset: order,
            kmr,
            kre: None,
            gfr: None,
            predictions: MetricMap::default(),
            anomalies: MetricMap::default(),
            components: ComponentBreakdown::default(),
            risk_score: risk,
            alarm_level: alarm,
        }
    }

    fn timeline() -> PatientTimeline {
        PatientTimeline {
            patient_id: "P001".to_string(),
            records: vec![
                record(1, Some(3.2), 41.5, AlarmLevel::Dikkat),
                record(2, None, 0.0, AlarmLevel::Normal),
            ],
            error: None,
        }
    }

    #[test]
    fn test_render_json_shape() {
        let json = render_json(&[timeline()]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &value[0]["records"][0];
        assert_eq!(first["slot_key"], "Day_1");
        assert_eq!(first["alarm_level"], "Dikkat");
        assert_eq!(first["predictions"]["kmr"]["status"], "missing_prediction");
        assert!(first["kre"].is_null());
        assert!(value[0].get("error").is_none());
    }

    #[test]
    fn test_render_json_round_trips() {
        let timelines = vec![timeline()];
        let parsed: Vec<PatientTimeline> = serde_json::from_str(&render_json(&timelines)).unwrap();
        assert_eq!(parsed, timelines);
    }

    #[test]
    fn test_render_jsonl_one_line_per_record() {
        let jsonl = render_jsonl(&[timeline()]);
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["patient_id"], "P001");
        assert_eq!(second["slot_order"], 2);
    }

    #[test]
    fn test_render_text_lists_rejections() {
        let rejected = PatientTimeline {
            patient_id: "P404".to_string(),
            records: Vec::new(),
            error: Some("unknown slot key: Month_13".to_string()),
        };
        let text = render_text(&[timeline(), rejected]);
        assert!(text.contains("Patient P001"));
        assert!(text.contains("41.5"));
        assert!(text.contains("rejected: unknown slot key: Month_13"));
    }

    #[test]
    fn test_unmeasured_record() {
        assert!(record(2, None, 0.0, AlarmLevel::Normal).is_unmeasured());
        assert!(!record(1, Some(0.1), 2.0, AlarmLevel::Normal).is_unmeasured());
    }

    #[test]
    fn test_breakdown_rounds_to_one_decimal() {
        let mut scores = ComponentScoreSet::default();
        scores.kmr.level = 33.333;
        scores.kmr_risk = Some(12.06);
        scores.lab.level = Some(44.44);
        let breakdown = ComponentBreakdown::from(&scores);
        assert_eq!(breakdown.kmr_level, 33.3);
        assert_eq!(breakdown.kmr_risk, Some(12.1));
        assert_eq!(breakdown.lab_level, Some(44.4));
        assert_eq!(breakdown.lab_risk, None);
    }
}
