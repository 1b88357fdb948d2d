//! Component score calculators
//!
//! Pure functions from clinical values and point-in-time histories to 0-100
//! sub-scores. No state is kept here; the timeline assembler owns histories.
//!
//! Global invariants enforced:
//! - Every score is clamped to [0, 100]
//! - Level scores are monotonic in the direction of clinical harm
//! - Histories passed in never contain future slots

use crate::stats;

/// Number of history values fitted per KMR slope
pub const KMR_SLOPE_WINDOW: usize = 3;

/// Number of trailing slopes averaged into the KMR trend
pub const KMR_SLOPE_AVERAGE: usize = 3;

/// Trailing values used for KMR coefficient of variation
pub const KMR_VOLATILITY_WINDOW: usize = 5;

/// Minimum history length for a lab trend
pub const LAB_TREND_MIN_POINTS: usize = 3;

/// KMR clinical thresholds (fraction of recipient chimerism)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmrThresholds {
    pub normal_upper: f64,
    pub dikkat_upper: f64,
    pub kritik_upper: f64,
}

impl Default for KmrThresholds {
    fn default() -> Self {
        KmrThresholds {
            normal_upper: 0.5,
            dikkat_upper: 2.0,
            kritik_upper: 5.0,
        }
    }
}

/// Creatinine thresholds (lower is better)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KreThresholds {
    pub very_good_lt: f64,
    pub very_bad_gt: f64,
}

impl Default for KreThresholds {
    fn default() -> Self {
        KreThresholds {
            very_good_lt: 1.2,
            very_bad_gt: 4.5,
        }
    }
}

/// GFR thresholds (higher is better)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GfrThresholds {
    pub very_good_ge: f64,
    pub very_bad_le: f64,
}

impl Default for GfrThresholds {
    fn default() -> Self {
        GfrThresholds {
            very_good_ge: 90.0,
            very_bad_le: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClinicalThresholds {
    pub kmr: KmrThresholds,
    pub kre: KreThresholds,
    pub gfr: GfrThresholds,
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// KMR level score before phase dampening
///
/// Piecewise linear: 0-20 normal, 20-50 dikkat, 50-80 kritik, 80-100 above.
pub fn kmr_base_level_score(kmr: f64, t: &KmrThresholds) -> f64 {
    let v = kmr.max(0.0);
    let score = if v <= t.normal_upper {
        v / t.normal_upper * 20.0
    } else if v <= t.dikkat_upper {
        20.0 + (v - t.normal_upper) / (t.dikkat_upper - t.normal_upper) * 30.0
    } else if v <= t.kritik_upper {
        50.0 + (v - t.dikkat_upper) / (t.kritik_upper - t.dikkat_upper) * 30.0
    } else {
        (80.0 + (v - t.kritik_upper) * 4.0).min(100.0)
    };
    clamp_score(score)
}

/// Multiplier for early post-transplant readings, which run transiently high
pub fn phase_dampening(pseudo_day_offset: u32) -> f64 {
    if pseudo_day_offset <= 2 {
        0.55
    } else if pseudo_day_offset <= 6 {
        0.80
    } else {
        1.0
    }
}

/// KMR level score with phase dampening
pub fn kmr_level_score(kmr: f64, pseudo_day_offset: u32, t: &KmrThresholds) -> f64 {
    kmr_base_level_score(kmr, t) * phase_dampening(pseudo_day_offset)
}

/// KMR trend score from the slope series and the consecutive-increase count
///
/// Rising slopes are penalized up to 50, falling slopes earn a floor near 0,
/// and each consecutive increase adds 10 (up to 30).
pub fn kmr_trend_score(slopes: &[f64], consecutive_up: u32) -> f64 {
    let recent = &slopes[slopes.len().saturating_sub(KMR_SLOPE_AVERAGE)..];
    let Some(avg_slope) = stats::mean(recent) else {
        return 0.0;
    };

    let slope_score = if avg_slope > 0.0 {
        (avg_slope * 20.0).min(50.0)
    } else {
        (10.0 + avg_slope * 5.0).max(0.0)
    };
    let consecutive_score = (f64::from(consecutive_up) * 10.0).min(30.0);

    clamp_score(slope_score + consecutive_score)
}

/// Rolling coefficient of variation over the trailing KMR window
pub fn kmr_coefficient_of_variation(history: &[f64]) -> f64 {
    let window = &history[history.len().saturating_sub(KMR_VOLATILITY_WINDOW)..];
    if window.len() < 2 {
        return 0.0;
    }
    match (stats::population_std_dev(window), stats::mean(window)) {
        (Some(sd), Some(m)) => sd / (m + 1e-6),
        _ => 0.0,
    }
}

pub fn kmr_volatility_score(history: &[f64]) -> f64 {
    clamp_score(kmr_coefficient_of_variation(history) * 100.0)
}

/// Oracle anomaly score passed through, capped at 100
pub fn kmr_anomaly_score(anomaly: Option<f64>) -> f64 {
    anomaly.map(clamp_score).unwrap_or(0.0)
}

/// Forecast residual relative to the running KMR mean
pub fn kmr_residual_score(residual: Option<f64>, history_mean: f64) -> f64 {
    let Some(residual) = residual else {
        return 0.0;
    };
    if history_mean < 0.01 {
        return 0.0;
    }
    clamp_score(residual.abs() / (history_mean + 0.01) * 50.0)
}

/// Creatinine level score: 0-10 very good, 10-90 linear, 90-100 very bad
pub fn kre_level_score(kre: f64, t: &KreThresholds) -> f64 {
    let v = kre.max(0.0);
    let score = if v <= t.very_good_lt {
        v / t.very_good_lt * 10.0
    } else if v <= t.very_bad_gt {
        10.0 + (v - t.very_good_lt) / (t.very_bad_gt - t.very_good_lt) * 80.0
    } else {
        (90.0 + (v - t.very_bad_gt) * 2.0).min(100.0)
    };
    clamp_score(score)
}

/// GFR level score, mirrored: high filtration scores low
pub fn gfr_level_score(gfr: f64, t: &GfrThresholds) -> f64 {
    let score = if gfr >= t.very_good_ge {
        (10.0 - (gfr - t.very_good_ge) * 0.1).max(0.0)
    } else if gfr >= t.very_bad_le {
        90.0 - (gfr - t.very_bad_le) / (t.very_good_ge - t.very_bad_le) * 80.0
    } else {
        (90.0 + (t.very_bad_le - gfr) * 0.5).min(100.0)
    };
    clamp_score(score)
}

/// Creatinine trend: rising creatinine is harmful
pub fn kre_trend_score(history: &[f64]) -> Option<f64> {
    if history.len() < LAB_TREND_MIN_POINTS {
        return None;
    }
    let slope = stats::theil_sen_slope(history)?;
    let score = if slope > 0.0 {
        (slope * 50.0).min(100.0)
    } else {
        (20.0 + slope * 20.0).max(0.0)
    };
    Some(clamp_score(score))
}

/// GFR trend: falling filtration is harmful
pub fn gfr_trend_score(history: &[f64]) -> Option<f64> {
    if history.len() < LAB_TREND_MIN_POINTS {
        return None;
    }
    let slope = stats::theil_sen_slope(history)?;
    let score = if slope < 0.0 {
        (slope.abs() * 2.0).min(100.0)
    } else {
        (20.0 - slope * 0.5).max(0.0)
    };
    Some(clamp_score(score))
}

/// Per-metric lab trends and their combination
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LabTrend {
    pub kre: Option<f64>,
    pub gfr: Option<f64>,
    pub combined: Option<f64>,
}

/// Lab trend over point-in-time KRE and GFR histories
///
/// When only one marker has enough history its trend stands in for the
/// combined trend at full weight.
pub fn lab_trend_score(kre_history: &[f64], gfr_history: &[f64]) -> LabTrend {
    let kre = kre_trend_score(kre_history);
    let gfr = gfr_trend_score(gfr_history);
    LabTrend {
        kre,
        gfr,
        combined: mean_of_available(kre, gfr),
    }
}

/// Mean of the values that are present, `None` if neither is
pub fn mean_of_available(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(0.5 * a + 0.5 * b),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}
