//! Per-patient input errors
//!
//! A `TimelineError` rejects exactly one patient; it never aborts a cohort.

use crate::input::Metric;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("malformed patient record: {0}")]
    MalformedRecord(String),

    #[error("patient id is empty")]
    EmptyPatientId,

    #[error("unknown slot key: {0}")]
    UnknownSlot(String),

    #[error("{metric} value at {slot_key} is not finite")]
    NonFiniteValue { metric: Metric, slot_key: String },

    #[error("{metric} value at {slot_key} is negative ({value})")]
    NegativeValue {
        metric: Metric,
        slot_key: String,
        value: f64,
    },

    #[error("duplicate {metric} measurement at {slot_key}")]
    DuplicateMeasurement { metric: Metric, slot_key: String },

    #[error("{metric} forecast #{index}: {field} is not finite")]
    NonFiniteForecast {
        metric: Metric,
        index: usize,
        field: &'static str,
    },

    #[error("{metric} forecast #{index}: unknown oracle status '{status}'")]
    UnknownOracleStatus {
        metric: Metric,
        index: usize,
        status: String,
    },

    #[error("{metric} anomaly #{index}: invalid score {score}")]
    InvalidAnomalyScore {
        metric: Metric,
        index: usize,
        score: f64,
    },
}

/// Convenience result type.
pub type TimelineResult<T> = Result<T, TimelineError>;
