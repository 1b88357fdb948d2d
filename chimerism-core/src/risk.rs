//! Ensemble risk combination and alarm classification
//!
//! Global invariants enforced:
//! - Deterministic risk calculations
//! - Risk scores stay within [0, 100]
//! - Alarm level is a pure function of the risk score

use serde::{Deserialize, Serialize};

/// Fixed weight of the lab anomaly component
pub const LAB_ANOMALY_WEIGHT: f64 = 0.3;

/// Lab anomaly scores are scaled by this before entering lab risk
pub const LAB_ANOMALY_SCALE: f64 = 0.25;

/// Upper bound on the scaled lab anomaly component
pub const LAB_ANOMALY_CAP: f64 = 50.0;

/// Final multiplier on lab risk
pub const LAB_RISK_SCALE: f64 = 0.9;

/// Lab risk may exceed KMR risk by at most this margin in the blend
pub const LAB_OVER_KMR_MARGIN: f64 = 20.0;

/// Weights for the five KMR sub-scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmrWeights {
    pub level: f64,
    pub trend: f64,
    pub volatility: f64,
    pub anomaly: f64,
    pub residual: f64,
}

impl Default for KmrWeights {
    fn default() -> Self {
        KmrWeights {
            level: 0.35,
            trend: 0.25,
            volatility: 0.10,
            anomaly: 0.15,
            residual: 0.15,
        }
    }
}

/// Weights for the lab level and trend components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabWeights {
    pub level: f64,
    pub trend: f64,
}

impl Default for LabWeights {
    fn default() -> Self {
        LabWeights {
            level: 0.6,
            trend: 0.4,
        }
    }
}

/// Modality blend for the overall score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub kmr: f64,
    pub lab: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        BlendWeights {
            kmr: 0.65,
            lab: 0.35,
        }
    }
}

/// KMR sub-scores for one slot (all zero when KMR was not measured)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KmrComponents {
    pub level: f64,
    pub trend: f64,
    pub volatility: f64,
    pub anomaly: f64,
    pub residual: f64,
}

/// Lab sub-scores for one slot; absent components are `None`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LabComponents {
    pub kre_level: Option<f64>,
    pub gfr_level: Option<f64>,
    pub level: Option<f64>,
    pub kre_trend: Option<f64>,
    pub gfr_trend: Option<f64>,
    pub trend: Option<f64>,
    /// Blended oracle anomaly score, before scaling
    pub anomaly: Option<f64>,
}

/// Everything scored at one slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentScoreSet {
    pub kmr: KmrComponents,
    /// `None` when KMR was not measured at the slot
    pub kmr_risk: Option<f64>,
    pub lab: LabComponents,
    pub lab_risk: Option<f64>,
}

/// Weighted sum of the KMR sub-scores
pub fn calculate_kmr_risk(c: &KmrComponents, w: &KmrWeights) -> f64 {
    (w.level * c.level
        + w.trend * c.trend
        + w.volatility * c.volatility
        + w.anomaly * c.anomaly
        + w.residual * c.residual)
        .clamp(0.0, 100.0)
}

/// Lab risk from whichever lab components exist at this slot
///
/// Components are weighted, normalized by the weight actually present, then
/// scaled by `LAB_RISK_SCALE`. Returns `None` when no component exists.
pub fn calculate_lab_risk(c: &LabComponents, w: &LabWeights) -> Option<f64> {
    let anomaly = c
        .anomaly
        .filter(|score| *score > 0.0)
        .map(|score| (score * LAB_ANOMALY_SCALE).min(LAB_ANOMALY_CAP));

    let weighted = [
        (c.level, w.level),
        (c.trend, w.trend),
        (anomaly, LAB_ANOMALY_WEIGHT),
    ];

    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    for (score, weight) in weighted {
        if let Some(score) = score {
            total_score += weight * score;
            total_weight += weight;
        }
    }

    if total_weight <= 0.0 {
        return None;
    }
    Some((total_score / total_weight * LAB_RISK_SCALE).clamp(0.0, 100.0))
}

/// Blend KMR and lab risk, keeping lab from running far above KMR
pub fn calculate_overall_risk(kmr_risk: f64, lab_risk: Option<f64>, w: &BlendWeights) -> f64 {
    let Some(lab_risk) = lab_risk else {
        return kmr_risk;
    };
    let capped_lab = lab_risk.min(kmr_risk + LAB_OVER_KMR_MARGIN);
    (w.kmr * kmr_risk + w.lab * capped_lab).clamp(0.0, 100.0)
}

/// Slot risk across modalities
///
/// - KMR measured: blend with lab risk (if any)
/// - KMR unmeasured, lab risk present: lab risk alone
/// - Nothing measured: 0, never carried forward from history
pub fn calculate_slot_risk(
    kmr_risk: Option<f64>,
    lab_risk: Option<f64>,
    w: &BlendWeights,
) -> f64 {
    match (kmr_risk, lab_risk) {
        (Some(kmr), lab) => calculate_overall_risk(kmr, lab, w),
        (None, Some(lab)) => lab,
        (None, None) => 0.0,
    }
}

/// Clinical alarm level, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlarmLevel {
    Normal,
    Dikkat,
    Kritik,
    #[serde(rename = "Çok Kritik")]
    CokKritik,
}

impl AlarmLevel {
    pub const ALL: [AlarmLevel; 4] = [
        AlarmLevel::Normal,
        AlarmLevel::Dikkat,
        AlarmLevel::Kritik,
        AlarmLevel::CokKritik,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmLevel::Normal => "Normal",
            AlarmLevel::Dikkat => "Dikkat",
            AlarmLevel::Kritik => "Kritik",
            AlarmLevel::CokKritik => "Çok Kritik",
        }
    }
}

/// Lower bounds (inclusive) of each alarm level above Normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmThresholds {
    pub dikkat: f64,
    pub kritik: f64,
    pub cok_kritik: f64,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        AlarmThresholds {
            dikkat: 30.0,
            kritik: 60.0,
            cok_kritik: 80.0,
        }
    }
}

/// Assign alarm level with default thresholds
pub fn assign_alarm_level(risk_score: f64) -> AlarmLevel {
    assign_alarm_level_with_thresholds(risk_score, &AlarmThresholds::default())
}

/// Assign alarm level with custom thresholds
pub fn assign_alarm_level_with_thresholds(risk_score: f64, t: &AlarmThresholds) -> AlarmLevel {
    if risk_score >= t.cok_kritik {
        AlarmLevel::CokKritik
    } else if risk_score >= t.kritik {
        AlarmLevel::Kritik
    } else if risk_score >= t.dikkat {
        AlarmLevel::Dikkat
    } else {
        AlarmLevel::Normal
    }
}
