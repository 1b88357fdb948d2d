//! Canonical time grid
//!
//! KMR and lab markers are recorded on different clinical calendars. Every
//! signal is re-expressed on this single ordered axis before any combination.
//!
//! Global invariants enforced:
//! - Slot orders are unique and strictly increasing
//! - Slot keys are unique
//! - The grid is immutable once built

use crate::input::Metric;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One observation slot on the canonical axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeSlot {
    pub key: String,
    pub order: u32,
    pub pseudo_day_offset: u32,
    pub kmr_applicable: bool,
    pub lab_applicable: bool,
}

impl TimeSlot {
    /// Whether the metric is scheduled at this slot
    pub fn is_applicable(&self, metric: Metric) -> bool {
        match metric {
            Metric::Kmr => self.kmr_applicable,
            Metric::Kre | Metric::Gfr => self.lab_applicable,
        }
    }
}

/// (key, order, pseudo days, kmr, lab)
const STANDARD_SLOTS: &[(&str, u32, u32, bool, bool)] = &[
    ("Day_1", 1, 1, true, false),
    ("Day_2", 2, 2, true, false),
    ("Day_3", 3, 3, true, false),
    ("Day_4", 4, 4, true, false),
    ("Day_5", 5, 5, true, false),
    ("Day_6", 6, 6, true, false),
    ("Day_7", 7, 7, true, true),
    ("Week_2", 8, 14, true, true),
    ("Week_3", 9, 21, true, true),
    ("Month_1", 10, 30, true, true),
    ("Month_2", 11, 60, true, true),
    ("Month_3", 12, 90, true, true),
    ("Month_4", 13, 120, true, true),
    ("Month_5", 14, 150, true, true),
    ("Month_6", 15, 180, true, true),
    ("Month_7", 16, 210, true, false),
    ("Month_8", 17, 240, true, false),
    ("Month_9", 18, 270, true, false),
    ("Month_10", 19, 300, true, false),
    ("Month_11", 20, 330, true, false),
    ("Month_12", 21, 365, true, true),
];

/// Ordered, read-only table of slots shared by every patient
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGrid {
    slots: Vec<TimeSlot>,
}

impl CanonicalGrid {
    /// Build a grid from slots, rejecting anything that breaks the grid invariants
    pub fn new(slots: Vec<TimeSlot>) -> Result<Self> {
        if slots.is_empty() {
            anyhow::bail!("grid must contain at least one slot");
        }

        let mut keys = HashSet::new();
        for (i, slot) in slots.iter().enumerate() {
            if slot.key.trim().is_empty() {
                anyhow::bail!("grid slot #{} has an empty key", i);
            }
            if !keys.insert(slot.key.as_str()) {
                anyhow::bail!("grid slot key '{}' is duplicated", slot.key);
            }
            if !slot.kmr_applicable && !slot.lab_applicable {
                anyhow::bail!(
                    "grid slot '{}' is not applicable to any marker",
                    slot.key
                );
            }
            if i > 0 && slot.order <= slots[i - 1].order {
                anyhow::bail!(
                    "grid slot '{}' has order {} which does not follow {} ('{}')",
                    slot.key,
                    slot.order,
                    slots[i - 1].order,
                    slots[i - 1].key
                );
            }
        }

        Ok(CanonicalGrid { slots })
    }

    /// The 21-slot transplant follow-up calendar
    pub fn standard() -> Self {
        CanonicalGrid {
            slots: STANDARD_SLOTS
                .iter()
                .map(|&(key, order, days, kmr, lab)| TimeSlot {
                    key: key.to_string(),
                    order,
                    pseudo_day_offset: days,
                    kmr_applicable: kmr,
                    lab_applicable: lab,
                })
                .collect(),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&TimeSlot> {
        self.slots.iter().find(|s| s.key == key)
    }

    pub fn by_order(&self, order: u32) -> Option<&TimeSlot> {
        self.slots
            .binary_search_by_key(&order, |s| s.order)
            .ok()
            .map(|idx| &self.slots[idx])
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots at which the metric is scheduled, in grid order
    pub fn applicable_slots(&self, metric: Metric) -> impl Iterator<Item = &TimeSlot> + '_ {
        self.slots.iter().filter(move |s| s.is_applicable(metric))
    }
}

impl Default for CanonicalGrid {
    fn default() -> Self {
        CanonicalGrid::standard()
    }
}
