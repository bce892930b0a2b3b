//! Climate time series and their association with AOI cells.
//!
//! Series are monthly, one value per month, for a historic period and a
//! future (scenario) period. A climate dataset is a regular lat/lon grid
//! ([`grid::ClimateGrid`]); cells are bound to the grid cell containing them.

pub mod grid;
pub mod window;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::BoundingBox;
use crate::error::{PrepError, Result};
use crate::site::SiteRecord;

pub use grid::{ClimateGrid, ClimateIndices, GridIndex};
pub use window::SimWindow;

/// Climate variables carried through to the simulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Precipitation,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Precipitation, Metric::Temperature];

    /// Short name used in output file names.
    pub fn short_name(self) -> &'static str {
        match self {
            Metric::Precipitation => "precip",
            Metric::Temperature => "tair",
        }
    }
}

/// Weather dataset families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeatherResource {
    /// Global CRU historic record with ClimGen future scenarios.
    Cru,
    /// UK-only CHESS dataset.
    Chess,
}

impl fmt::Display for WeatherResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WeatherResource::Cru => "CRU",
            WeatherResource::Chess => "CHESS",
        })
    }
}

/// Monthly precipitation (mm) and mean air temperature (°C).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySeries {
    #[serde(default)]
    pub precipitation: Vec<f64>,
    #[serde(default)]
    pub temperature: Vec<f64>,
}

impl MonthlySeries {
    pub fn get(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::Precipitation => &self.precipitation,
            Metric::Temperature => &self.temperature,
        }
    }

    /// A series without precipitation is treated as missing.
    pub fn is_empty(&self) -> bool {
        self.precipitation.is_empty()
    }

    /// Long-term mean for each calendar month (January first).
    /// Months with no data are `NaN`.
    pub fn monthly_means(&self, metric: Metric) -> [f64; 12] {
        let mut sums = [0.0; 12];
        let mut counts = [0usize; 12];
        for (i, v) in self.get(metric).iter().enumerate() {
            sums[i % 12] += v;
            counts[i % 12] += 1;
        }
        let mut means = [f64::NAN; 12];
        for m in 0..12 {
            if counts[m] > 0 {
                means[m] = sums[m] / counts[m] as f64;
            }
        }
        means
    }
}

/// Climate for one AOI cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellClimate {
    pub historic: MonthlySeries,
    pub future: MonthlySeries,
}

/// Series fetched for one band, keyed by climate grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateBlock {
    pub band: usize,
    pub cells: BTreeMap<GridIndex, MonthlySeries>,
}

impl ClimateBlock {
    pub fn get(&self, idx: GridIndex) -> Option<&MonthlySeries> {
        self.cells.get(&idx)
    }
}

/// Bind a site to the climate grid cell containing it.
///
/// Returns `None` when the site lies off the grid or the future block has no
/// data for its cell. A missing historic series is returned as empty so the
/// caller can report the two gaps separately.
pub fn associate_climate(
    grid: &ClimateGrid,
    site: &SiteRecord,
    historic: &ClimateBlock,
    future: &ClimateBlock,
) -> Option<CellClimate> {
    let idx = grid.cell_index(site.location())?;
    let future = future.get(idx)?.clone();
    let historic = historic.get(idx).cloned().unwrap_or_default();
    Some(CellClimate { historic, future })
}

/// Fail the run when the AOI is not wholly inside the dataset's coverage.
pub fn check_coverage(resource: WeatherResource, aoi: &BoundingBox, coverage: &BoundingBox) -> Result<()> {
    if aoi.within(coverage) {
        Ok(())
    } else {
        Err(PrepError::OutsideCoverage { resource, aoi: *aoi, coverage: *coverage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LatLon;
    use crate::soil::MuGlobal;

    fn grid() -> ClimateGrid {
        ClimateGrid { lon_min: 0.0, lat_min: 40.0, resol_deg: 0.5, nlons: 40, nlats: 40 }
    }

    fn site_at(lat: f64, lon: f64) -> SiteRecord {
        let (gran_lat, gran_lon) = LatLon::new(lat, lon).granular();
        SiteRecord {
            gran_lat,
            gran_lon,
            lat,
            lon,
            area: 1.0,
            composition: [(MuGlobal(1), 100.0)].into(),
        }
    }

    fn series(v: f64) -> MonthlySeries {
        MonthlySeries { precipitation: vec![v; 12], temperature: vec![v; 12] }
    }

    #[test]
    fn association_needs_future_data() {
        let g = grid();
        let idx = g.cell_index(LatLon::new(50.1, 10.1)).unwrap();
        let future = ClimateBlock { band: 1, cells: [(idx, series(3.0))].into() };
        let historic = ClimateBlock::default();

        let hit = associate_climate(&g, &site_at(50.1, 10.1), &historic, &future).unwrap();
        assert_eq!(hit.future.precipitation[0], 3.0);
        assert!(hit.historic.is_empty(), "missing historic comes back empty");

        assert!(associate_climate(&g, &site_at(50.7, 10.1), &historic, &future).is_none());
        assert!(associate_climate(&g, &site_at(10.0, 10.1), &historic, &future).is_none());
    }

    #[test]
    fn monthly_means_average_each_calendar_month() {
        let s = MonthlySeries {
            precipitation: (0..24).map(|i| if i < 12 { 10.0 } else { 30.0 }).collect(),
            temperature: vec![5.0; 13],
        };
        assert_eq!(s.monthly_means(Metric::Precipitation), [20.0; 12]);
        let t = s.monthly_means(Metric::Temperature);
        assert_eq!(t[0], 5.0);
        assert_eq!(t[11], 5.0);
    }

    #[test]
    fn coverage_check_rejects_partial_overlap() {
        let cov = grid().extent();
        let inside = BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap();
        let straddling = BoundingBox::new(19.0, 50.0, 21.0, 50.3).unwrap();
        assert!(check_coverage(WeatherResource::Cru, &inside, &cov).is_ok());
        assert!(matches!(
            check_coverage(WeatherResource::Chess, &straddling, &cov),
            Err(PrepError::OutsideCoverage { resource: WeatherResource::Chess, .. })
        ));
    }

    #[test]
    fn resource_names_round_trip_through_serde() {
        assert_eq!(serde_json::to_string(&WeatherResource::Cru).unwrap(), "\"CRU\"");
        let r: WeatherResource = serde_json::from_str("\"CHESS\"").unwrap();
        assert_eq!(r, WeatherResource::Chess);
    }
}
