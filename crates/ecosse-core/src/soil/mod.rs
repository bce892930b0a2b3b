//! Soil mapping units and their sub-soil records.
//!
//! A mapping unit (`mu_global`) identifies a soil class in the global soil
//! database; each unit owns up to ten sub-soil records, each covering a
//! `share` (0–100 %) of the unit's area.

pub mod simplify;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use simplify::{simplify_soil_records, SimplifyStats};

/// Mapping-unit key. Unit 0 marks "no soil" and is always excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MuGlobal(pub u32);

impl MuGlobal {
    pub const UNDEFINED: MuGlobal = MuGlobal(0);
}

impl fmt::Display for MuGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One sub-soil of a mapping unit: soil metrics plus the percentage of the
/// unit covered by this soil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSubRecord {
    pub metrics: Vec<f64>,
    pub share: f64,
}

impl SoilSubRecord {
    pub fn new(metrics: Vec<f64>, share: f64) -> Self {
        Self { metrics, share }
    }

    /// Total order over the metric tuple, ignoring `share`.
    pub fn cmp_metrics(&self, other: &Self) -> Ordering {
        for (a, b) in self.metrics.iter().zip(&other.metrics) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.metrics.len().cmp(&other.metrics.len())
    }

    pub fn same_metrics(&self, other: &Self) -> bool {
        self.cmp_metrics(other) == Ordering::Equal
    }
}

pub type SoilRecords = BTreeMap<MuGlobal, Vec<SoilSubRecord>>;

/// Remove unit 0 and every unit flagged defective by the soil reader.
/// Returns the number of units removed.
pub fn drop_bad_mapping_units(records: &mut SoilRecords, bad: &[MuGlobal]) -> usize {
    let before = records.len();
    records.remove(&MuGlobal::UNDEFINED);
    for mu in bad {
        records.remove(mu);
    }
    before - records.len()
}
