//! Signal lookup builder - projects one patient's inputs onto the grid
//!
//! This is the validation boundary. Oracle payloads are normalized into one
//! record shape here; scoring never branches on payload shape.
//!
//! Keying rules:
//! - Measurements are keyed by their slot key
//! - Forecasts carrying `slot_order` are keyed by it; entries without it are
//!   legacy positional entries (KMR: i-th measured KMR slot, lab: i-th
//!   lab-applicable grid slot). Slot-order keys always win.
//! - Anomalies are keyed to the i-th measured slot of their metric
//! - Short or missing oracle arrays resolve to "no data"

use crate::error::{TimelineError, TimelineResult};
use crate::grid::CanonicalGrid;
use crate::input::{
    AnomalyRecord, ExternalAnomaly, ExternalForecast, ForecastRecord, MeasurementPoint,
    MeasurementRow, Metric, MetricMap, OracleStatus, PatientInput,
};
use std::collections::BTreeMap;

/// Validate one measurement row and project its values onto the grid
fn project_row(row: &MeasurementRow, grid: &CanonicalGrid) -> TimelineResult<Vec<MeasurementPoint>> {
    let slot = grid
        .lookup(&row.slot_key)
        .ok_or_else(|| TimelineError::UnknownSlot(row.slot_key.clone()))?;

    let mut points = Vec::new();
    for metric in Metric::ALL {
        let Some(value) = row.value(metric) else {
            continue;
        };
        if !value.is_finite() {
            return Err(TimelineError::NonFiniteValue {
                metric,
                slot_key: row.slot_key.clone(),
            });
        }
        if value < 0.0 {
            return Err(TimelineError::NegativeValue {
                metric,
                slot_key: row.slot_key.clone(),
                value,
            });
        }
        points.push(MeasurementPoint {
            slot_order: slot.order,
            metric,
            value,
        });
    }
    Ok(points)
}

/// Slot-indexed views over one patient's signals
#[derive(Debug, Clone, Default)]
pub struct SignalLookup {
    measured: MetricMap<BTreeMap<u32, f64>>,
    forecasts: MetricMap<BTreeMap<u32, ExternalForecast>>,
    anomalies: MetricMap<BTreeMap<u32, ExternalAnomaly>>,
}

impl SignalLookup {
    /// Validate a patient's input and index it by slot order
    pub fn build(patient: &PatientInput, grid: &CanonicalGrid) -> TimelineResult<Self> {
        if patient.patient_id.trim().is_empty() {
            return Err(TimelineError::EmptyPatientId);
        }

        let mut lookup = SignalLookup::default();
        lookup.index_measurements(patient, grid)?;

        for metric in Metric::ALL {
            let axis = lookup.positional_axis(metric, grid);
            lookup.index_forecasts(metric, patient.forecasts.get(metric), &axis, grid)?;
            lookup.index_anomalies(metric, patient.anomalies.get(metric))?;
        }

        Ok(lookup)
    }

    pub fn measured(&self, metric: Metric, slot_order: u32) -> Option<f64> {
        self.measured.get(metric).get(&slot_order).copied()
    }

    pub fn forecast(&self, metric: Metric, slot_order: u32) -> Option<&ExternalForecast> {
        self.forecasts.get(metric).get(&slot_order)
    }

    pub fn anomaly(&self, metric: Metric, slot_order: u32) -> Option<&ExternalAnomaly> {
        self.anomalies.get(metric).get(&slot_order)
    }

    /// Total actual points for the metric across the whole series
    pub fn point_count(&self, metric: Metric) -> usize {
        self.measured.get(metric).len()
    }

    fn index_measurements(&mut self, patient: &PatientInput, grid: &CanonicalGrid) -> TimelineResult<()> {
        for row in &patient.measurements {
            for point in project_row(row, grid)? {
                if self
                    .measured
                    .get_mut(point.metric)
                    .insert(point.slot_order, point.value)
                    .is_some()
                {
                    return Err(TimelineError::DuplicateMeasurement {
                        metric: point.metric,
                        slot_key: row.slot_key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Slot orders that legacy positional forecast entries map onto
    fn positional_axis(&self, metric: Metric, grid: &CanonicalGrid) -> Vec<u32> {
        if metric.is_lab() {
            grid.applicable_slots(metric).map(|s| s.order).collect()
        } else {
            self.measured.get(metric).keys().copied().collect()
        }
    }

    fn index_forecasts(
        &mut self,
        metric: Metric,
        records: &[ForecastRecord],
        axis: &[u32],
        grid: &CanonicalGrid,
    ) -> TimelineResult<()> {
        let validated = records
            .iter()
            .enumerate()
            .map(|(index, record)| validate_forecast(metric, index, record))
            .collect::<TimelineResult<Vec<_>>>()?;

        let target = self.forecasts.get_mut(metric);

        // Positional entries first so that explicit slot orders overwrite them
        let mut positional = 0usize;
        for (record, forecast) in records.iter().zip(&validated) {
            if record.slot_order.is_some() {
                continue;
            }
            match axis.get(positional) {
                Some(&order) => {
                    target.insert(order, forecast.at(order));
                }
                None => {
                    tracing::debug!(
                        metric = metric.as_str(),
                        position = positional,
                        "positional forecast has no slot to map to; ignored"
                    );
                }
            }
            positional += 1;
        }

        for (record, forecast) in records.iter().zip(&validated) {
            let Some(order) = record.slot_order else {
                continue;
            };
            if grid.by_order(order).is_none() {
                tracing::debug!(
                    metric = metric.as_str(),
                    slot_order = order,
                    "forecast slot order is not on the grid; ignored"
                );
                continue;
            }
            target.insert(order, forecast.at(order));
        }

        Ok(())
    }

    fn index_anomalies(&mut self, metric: Metric, records: &[AnomalyRecord]) -> TimelineResult<()> {
        for (index, record) in records.iter().enumerate() {
            if !record.score.is_finite() || record.score < 0.0 {
                return Err(TimelineError::InvalidAnomalyScore {
                    metric,
                    index,
                    score: record.score,
                });
            }
        }

        let measured: Vec<u32> = self.measured.get(metric).keys().copied().collect();
        if records.len() > measured.len() {
            tracing::debug!(
                metric = metric.as_str(),
                anomalies = records.len(),
                measured = measured.len(),
                "more anomaly entries than measured points; surplus ignored"
            );
        }

        let target = self.anomalies.get_mut(metric);
        for (&order, record) in measured.iter().zip(records) {
            target.insert(
                order,
                ExternalAnomaly {
                    metric,
                    score: record.score,
                    flag: record.flag,
                },
            );
        }
        Ok(())
    }
}

/// A forecast that passed validation but is not yet keyed to a slot
#[derive(Debug, Clone)]
struct ValidForecast {
    metric: Metric,
    point_estimate: Option<f64>,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
    oracle_status: Option<OracleStatus>,
    residual: Option<f64>,
}

impl ValidForecast {
    fn at(&self, slot_order: u32) -> ExternalForecast {
        ExternalForecast {
            slot_order,
            metric: self.metric,
            point_estimate: self.point_estimate,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            oracle_status: self.oracle_status,
            residual: self.residual,
        }
    }
}

fn validate_forecast(metric: Metric, index: usize, record: &ForecastRecord) -> TimelineResult<ValidForecast> {
    for (field, value) in [
        ("point_estimate", record.point_estimate),
        ("lower_bound", record.lower_bound),
        ("upper_bound", record.upper_bound),
        ("residual", record.residual),
    ] {
        if matches!(value, Some(v) if !v.is_finite()) {
            return Err(TimelineError::NonFiniteForecast {
                metric,
                index,
                field,
            });
        }
    }

    // An oracle that produced a point estimate without a status reported "ok"
    let oracle_status = match record.status.as_deref() {
        Some(raw) => Some(OracleStatus::parse(raw).ok_or_else(|| {
            TimelineError::UnknownOracleStatus {
                metric,
                index,
                status: raw.to_string(),
            }
        })?),
        None => record.point_estimate.map(|_| OracleStatus::Ok),
    };

    Ok(ValidForecast {
        metric,
        point_estimate: record.point_estimate,
        lower_bound: record.lower_bound,
        upper_bound: record.upper_bound,
        oracle_status,
        residual: record.residual,
    })
}
