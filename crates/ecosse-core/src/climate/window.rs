//! Simulation window over a monthly future series.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

/// Inclusive range of simulated years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimWindow {
    pub start_year: i32,
    pub end_year: i32,
}

impl SimWindow {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self { start_year, end_year }
    }

    pub fn n_years(&self) -> usize {
        (self.end_year - self.start_year + 1).max(0) as usize
    }

    pub fn n_months(&self) -> usize {
        self.n_years() * 12
    }

    /// Month offsets of the window inside a series starting in `dataset_start_year`.
    ///
    /// Fails when the simulation starts before the dataset does.
    pub fn month_range(&self, dataset_start_year: i32) -> Result<Range<usize>> {
        if self.start_year < dataset_start_year {
            return Err(PrepError::YearOrdering {
                sim_start: self.start_year,
                dataset_start: dataset_start_year,
            });
        }
        let start = 12 * (self.start_year - dataset_start_year) as usize;
        Ok(start..start + self.n_months())
    }

    /// `YYYY-MM` label for every simulated month.
    pub fn month_labels(&self) -> Vec<String> {
        (self.start_year..=self.end_year)
            .flat_map(|year| (1..=12).map(move |month| format!("{year}-{month:02}")))
            .collect()
    }
}

/// Slice `series` to `range`, clipped to the data actually present.
pub fn slice_months(series: &[f64], range: &Range<usize>) -> Vec<f64> {
    let end = range.end.min(series.len());
    let start = range.start.min(end);
    series[start..end].to_vec()
}
