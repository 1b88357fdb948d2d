//! Input boundary - wire records delivered by the extraction and oracle layers
//!
//! These are the shapes the core consumes. They are deserialized as-is and
//! only validated when projected onto the grid (see `signals`).

use crate::error::{TimelineError, TimelineResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tracked clinical marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Chimerism decay marker
    Kmr,
    /// Creatinine
    Kre,
    /// Glomerular filtration rate
    Gfr,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Kmr, Metric::Kre, Metric::Gfr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Kmr => "kmr",
            Metric::Kre => "kre",
            Metric::Gfr => "gfr",
        }
    }

    /// KRE and GFR share the lab calendar
    pub fn is_lab(&self) -> bool {
        matches!(self, Metric::Kre | Metric::Gfr)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per tracked marker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricMap<T> {
    pub kmr: T,
    pub kre: T,
    pub gfr: T,
}

impl<T> MetricMap<T> {
    pub fn get(&self, metric: Metric) -> &T {
        match metric {
            Metric::Kmr => &self.kmr,
            Metric::Kre => &self.kre,
            Metric::Gfr => &self.gfr,
        }
    }

    pub fn get_mut(&mut self, metric: Metric) -> &mut T {
        match metric {
            Metric::Kmr => &mut self.kmr,
            Metric::Kre => &mut self.kre,
            Metric::Gfr => &mut self.gfr,
        }
    }

    /// Build a map by evaluating `f` once per metric, in `Metric::ALL` order
    pub fn from_fn(mut f: impl FnMut(Metric) -> T) -> Self {
        MetricMap {
            kmr: f(Metric::Kmr),
            kre: f(Metric::Kre),
            gfr: f(Metric::Gfr),
        }
    }
}

/// Raw measurement row for one visit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasurementRow {
    /// Grid slot key, e.g. `Day_7` or `Month_3`
    pub slot_key: String,
    #[serde(default)]
    pub kmr: Option<f64>,
    #[serde(default)]
    pub kre: Option<f64>,
    #[serde(default)]
    pub gfr: Option<f64>,
}

impl MeasurementRow {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Kmr => self.kmr,
            Metric::Kre => self.kre,
            Metric::Gfr => self.gfr,
        }
    }
}

/// Status reported by a forecasting oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleStatus {
    Ok,
    WarmupCopy,
    WarmupBootstrap,
    Forecast,
    FallbackEwma,
    FallbackForecast,
}

impl OracleStatus {
    /// Parse one of the known oracle status strings
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(OracleStatus::Ok),
            "warmup_copy" => Some(OracleStatus::WarmupCopy),
            "warmup_bootstrap" => Some(OracleStatus::WarmupBootstrap),
            "forecast" => Some(OracleStatus::Forecast),
            "fallback_ewma" => Some(OracleStatus::FallbackEwma),
            "fallback_forecast" => Some(OracleStatus::FallbackForecast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleStatus::Ok => "ok",
            OracleStatus::WarmupCopy => "warmup_copy",
            OracleStatus::WarmupBootstrap => "warmup_bootstrap",
            OracleStatus::Forecast => "forecast",
            OracleStatus::FallbackEwma => "fallback_ewma",
            OracleStatus::FallbackForecast => "fallback_forecast",
        }
    }
}

/// Forecast entry as emitted by a per-metric oracle
///
/// `slot_order` is optional: entries without it are legacy positional entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastRecord {
    #[serde(default)]
    pub slot_order: Option<u32>,
    #[serde(default)]
    pub point_estimate: Option<f64>,
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub residual: Option<f64>,
}

/// Anomaly entry, positionally aligned to the metric's measured points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyRecord {
    pub score: f64,
    #[serde(default)]
    pub flag: bool,
}

/// Everything the engine needs for one patient
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientInput {
    pub patient_id: String,
    #[serde(default)]
    pub measurements: Vec<MeasurementRow>,
    #[serde(default)]
    pub forecasts: MetricMap<Vec<ForecastRecord>>,
    #[serde(default)]
    pub anomalies: MetricMap<Vec<AnomalyRecord>>,
}

/// A cohort document: the unit the CLI reads
///
/// Patient records stay raw until `entries` decodes them one by one, so a
/// corrupt record rejects only its own patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohortInput {
    pub patients: Vec<serde_json::Value>,
}

impl CohortInput {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse cohort input")
    }

    /// Read and parse a cohort document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cohort input: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Decode every patient record, in document order
    pub fn entries(self) -> Vec<CohortEntry> {
        self.patients
            .into_iter()
            .enumerate()
            .map(|(index, value)| CohortEntry::decode(index, value))
            .collect()
    }
}

/// One patient record of a cohort document, decoded or rejected
#[derive(Debug, Clone, PartialEq)]
pub struct CohortEntry {
    /// Position in the document
    pub index: usize,
    /// Patient id, when the record carries a readable one
    pub patient_id: Option<String>,
    pub input: TimelineResult<PatientInput>,
}

impl CohortEntry {
    pub fn decode(index: usize, value: serde_json::Value) -> Self {
        let patient_id = value
            .get("patient_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let input = serde_json::from_value::<PatientInput>(value)
            .map_err(|e| TimelineError::MalformedRecord(e.to_string()));
        CohortEntry {
            index,
            patient_id,
            input,
        }
    }

    /// Patient id, or `#<index>` for a record without one
    pub fn label(&self) -> String {
        match self.patient_id {
            Some(ref id) => id.clone(),
            None => format!("#{}", self.index),
        }
    }
}

impl From<PatientInput> for CohortEntry {
    fn from(patient: PatientInput) -> Self {
        CohortEntry {
            index: 0,
            patient_id: Some(patient.patient_id.clone()),
            input: Ok(patient),
        }
    }
}

/// A validated measurement projected onto the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementPoint {
    pub slot_order: u32,
    pub metric: Metric,
    pub value: f64,
}

/// A validated forecast keyed to a grid slot
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalForecast {
    pub slot_order: u32,
    pub metric: Metric,
    pub point_estimate: Option<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub oracle_status: Option<OracleStatus>,
    pub residual: Option<f64>,
}

/// A validated anomaly signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalAnomaly {
    pub metric: Metric,
    pub score: f64,
    pub flag: bool,
}
