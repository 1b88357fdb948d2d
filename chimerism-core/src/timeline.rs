//! Timeline assembler - one forward walk per patient over the canonical grid
//!
//! Global invariants enforced:
//! - Slots are visited once, in ascending order
//! - A slot's score only sees history up to and including that slot
//! - A slot with no measured marker scores 0 / Normal
//! - Identical input yields byte-for-byte identical records

use crate::grid::TimeSlot;
use crate::input::{Metric, MetricMap, OracleStatus};
use crate::report::{ComponentBreakdown, MetricAnomaly, MetricPrediction, RiskRecord};
use crate::risk::{
    assign_alarm_level_with_thresholds, calculate_kmr_risk, calculate_lab_risk,
    calculate_slot_risk, AlarmLevel, AlarmThresholds, ComponentScoreSet, KmrComponents,
    LabComponents,
};
use crate::scoring::{self, KMR_SLOPE_WINDOW};
use crate::signals::SignalLookup;
use crate::stats;
use crate::ScoringContext;
use serde::{Deserialize, Serialize};

/// Below this many actual points a metric cannot be forecast
pub const MIN_POINTS_FOR_PREDICTION: usize = 3;

/// Why a metric does or does not carry a prediction at a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Ok,
    WarmupCopy,
    WarmupBootstrap,
    Forecast,
    FallbackEwma,
    FallbackForecast,
    TimepointNotApplicable,
    InsufficientData,
    #[default]
    MissingPrediction,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Ok => "ok",
            PredictionStatus::WarmupCopy => "warmup_copy",
            PredictionStatus::WarmupBootstrap => "warmup_bootstrap",
            PredictionStatus::Forecast => "forecast",
            PredictionStatus::FallbackEwma => "fallback_ewma",
            PredictionStatus::FallbackForecast => "fallback_forecast",
            PredictionStatus::TimepointNotApplicable => "timepoint_not_applicable",
            PredictionStatus::InsufficientData => "insufficient_data",
            PredictionStatus::MissingPrediction => "missing_prediction",
        }
    }
}

impl From<OracleStatus> for PredictionStatus {
    fn from(status: OracleStatus) -> Self {
        match status {
            OracleStatus::Ok => PredictionStatus::Ok,
            OracleStatus::WarmupCopy => PredictionStatus::WarmupCopy,
            OracleStatus::WarmupBootstrap => PredictionStatus::WarmupBootstrap,
            OracleStatus::Forecast => PredictionStatus::Forecast,
            OracleStatus::FallbackEwma => PredictionStatus::FallbackEwma,
            OracleStatus::FallbackForecast => PredictionStatus::FallbackForecast,
        }
    }
}

/// Resolve a metric's prediction status at one slot; first rule that matches wins
pub fn resolve_prediction_status(
    applicable: bool,
    oracle_status: Option<OracleStatus>,
    total_points: usize,
) -> PredictionStatus {
    if !applicable {
        return PredictionStatus::TimepointNotApplicable;
    }
    if let Some(status) = oracle_status {
        return status.into();
    }
    if total_points < MIN_POINTS_FOR_PREDICTION {
        return PredictionStatus::InsufficientData;
    }
    PredictionStatus::MissingPrediction
}

/// Append-only, point-in-time buffer of one metric's observed values
#[derive(Debug, Clone, Default)]
pub struct RollingHistory {
    values: Vec<f64>,
}

impl RollingHistory {
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> f64 {
        stats::mean(&self.values).unwrap_or(0.0)
    }
}

/// Slope series and consecutive-increase counter for the KMR trend
#[derive(Debug, Clone, Default)]
pub struct KmrTrendState {
    slopes: Vec<f64>,
    consecutive_up: u32,
    previous: Option<f64>,
}

impl KmrTrendState {
    /// Record a new KMR reading; `history` must already contain it
    pub fn observe(&mut self, value: f64, history: &RollingHistory) {
        self.consecutive_up = match self.previous {
            Some(previous) if value > previous => self.consecutive_up + 1,
            _ => 0,
        };
        self.previous = Some(value);

        let values = history.values();
        if values.len() >= KMR_SLOPE_WINDOW {
            if let Some(slope) = stats::least_squares_slope(&values[values.len() - KMR_SLOPE_WINDOW..]) {
                self.slopes.push(slope);
            }
        }
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    pub fn consecutive_up(&self) -> u32 {
        self.consecutive_up
    }

    pub fn score(&self) -> f64 {
        scoring::kmr_trend_score(&self.slopes, self.consecutive_up)
    }
}

/// Drives the per-patient walk with a shared, read-only scoring context
pub struct TimelineAssembler<'a> {
    context: &'a ScoringContext,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(context: &'a ScoringContext) -> Self {
        TimelineAssembler { context }
    }

    /// Walk every grid slot and emit one record per slot
    pub fn assemble(&self, signals: &SignalLookup) -> Vec<RiskRecord> {
        let mut walk = PatientWalk::default();
        self.context
            .grid
            .slots()
            .iter()
            .map(|slot| walk.step(slot, signals, self.context))
            .collect()
    }
}

/// Mutable state owned by a single walk, dropped when the walk ends
#[derive(Debug, Default)]
struct PatientWalk {
    history: MetricMap<RollingHistory>,
    kmr_trend: KmrTrendState,
}

impl PatientWalk {
    fn step(&mut self, slot: &TimeSlot, signals: &SignalLookup, context: &ScoringContext) -> RiskRecord {
        let measured = MetricMap::from_fn(|m| signals.measured(m, slot.order));

        for metric in Metric::ALL {
            if let Some(value) = *measured.get(metric) {
                self.history.get_mut(metric).push(value);
            }
        }
        if let Some(kmr) = measured.kmr {
            self.kmr_trend.observe(kmr, &self.history.kmr);
        }

        let predictions = MetricMap::from_fn(|m| resolve_prediction(slot, m, signals));
        let anomalies = MetricMap::from_fn(|m| match signals.anomaly(m, slot.order) {
            Some(a) => MetricAnomaly {
                score: Some(a.score),
                flag: a.flag,
            },
            None => MetricAnomaly::default(),
        });

        let scores = self.score_slot(slot, &measured, signals, context);

        let any_measured = Metric::ALL.iter().any(|m| measured.get(*m).is_some());
        let raw_risk = if any_measured {
            calculate_slot_risk(scores.kmr_risk, scores.lab_risk, &context.params.blend)
        } else {
            0.0
        };
        let (risk_score, alarm_level) = emitted_risk(raw_risk, &context.params.alarm);

        RiskRecord {
            slot_key: slot.key.clone(),
            slot_order: slot.order,
            pseudo_day_offset: slot.pseudo_day_offset,
            kmr: measured.kmr,
            kre: measured.kre,
            gfr: measured.gfr,
            predictions,
            anomalies,
            components: ComponentBreakdown::from(&scores),
            risk_score,
            alarm_level,
        }
    }

    fn score_slot(
        &self,
        slot: &TimeSlot,
        measured: &MetricMap<Option<f64>>,
        signals: &SignalLookup,
        context: &ScoringContext,
    ) -> ComponentScoreSet {
        let params = &context.params;
        let thresholds = &params.thresholds;

        let (kmr, kmr_risk) = match measured.kmr {
            Some(value) => {
                let residual = signals
                    .forecast(Metric::Kmr, slot.order)
                    .and_then(|f| f.residual);
                let components = KmrComponents {
                    level: scoring::kmr_level_score(value, slot.pseudo_day_offset, &thresholds.kmr),
                    trend: self.kmr_trend.score(),
                    volatility: scoring::kmr_volatility_score(self.history.kmr.values()),
                    anomaly: scoring::kmr_anomaly_score(
                        signals.anomaly(Metric::Kmr, slot.order).map(|a| a.score),
                    ),
                    residual: scoring::kmr_residual_score(residual, self.history.kmr.mean()),
                };
                let risk = calculate_kmr_risk(&components, &params.kmr_weights);
                (components, Some(risk))
            }
            None => (KmrComponents::default(), None),
        };

        let kre_level = measured.kre.map(|v| scoring::kre_level_score(v, &thresholds.kre));
        let gfr_level = measured.gfr.map(|v| scoring::gfr_level_score(v, &thresholds.gfr));

        // Point-in-time lab trend counts at any measured slot, KMR-only included
        let any_measured = Metric::ALL.iter().any(|m| measured.get(*m).is_some());
        let trend = if any_measured {
            scoring::lab_trend_score(self.history.kre.values(), self.history.gfr.values())
        } else {
            scoring::LabTrend::default()
        };

        let lab_anomaly = scoring::mean_of_available(
            signals.anomaly(Metric::Kre, slot.order).map(|a| a.score),
            signals.anomaly(Metric::Gfr, slot.order).map(|a| a.score),
        );

        let lab = LabComponents {
            kre_level,
            gfr_level,
            level: scoring::mean_of_available(kre_level, gfr_level),
            kre_trend: trend.kre,
            gfr_trend: trend.gfr,
            trend: trend.combined,
            anomaly: lab_anomaly,
        };
        let lab_risk = calculate_lab_risk(&lab, &params.lab_weights);

        ComponentScoreSet {
            kmr,
            kmr_risk,
            lab,
            lab_risk,
        }
    }
}

/// Round a slot's risk to one decimal and classify the rounded value, so the
/// emitted score and alarm always agree
fn emitted_risk(raw_risk: f64, thresholds: &AlarmThresholds) -> (f64, AlarmLevel) {
    let risk_score = stats::round_to(raw_risk, 1);
    (
        risk_score,
        assign_alarm_level_with_thresholds(risk_score, thresholds),
    )
}

fn resolve_prediction(slot: &TimeSlot, metric: Metric, signals: &SignalLookup) -> MetricPrediction {
    let applicable = slot.is_applicable(metric);
    let forecast = signals.forecast(metric, slot.order).filter(|_| applicable);
    let status = resolve_prediction_status(
        applicable,
        forecast.and_then(|f| f.oracle_status),
        signals.point_count(metric),
    );

    MetricPrediction {
        point: forecast.and_then(|f| f.point_estimate),
        lower: forecast.and_then(|f| f.lower_bound),
        upper: forecast.and_then(|f| f.upper_bound),
        status,
    }
}
