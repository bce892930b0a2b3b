//! Per-cell AOI records and the highest-coverage reduction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coords::LatLon;
use crate::soil::MuGlobal;

/// Mapping unit → proportion of the cell area it covers.
pub type Composition = BTreeMap<MuGlobal, f64>;

/// One AOI grid cell with its soil composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Soil raster row index, counted southward from 90°N.
    pub gran_lat: i32,
    /// Soil raster column index, counted eastward from 180°W.
    pub gran_lon: i32,
    pub lat: f64,
    pub lon: f64,
    /// Cell area in km².
    pub area: f64,
    pub composition: Composition,
}

impl SiteRecord {
    pub fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    pub fn total_proportion(&self) -> f64 {
        self.composition.values().sum()
    }

    /// Mapping unit with the highest proportion; ties go to the smaller key.
    pub fn dominant_mu(&self) -> Option<MuGlobal> {
        self.composition
            .iter()
            .fold(None, |best: Option<(MuGlobal, f64)>, (&mu, &prop)| match best {
                Some((_, p)) if p >= prop => best,
                _ => Some((mu, prop)),
            })
            .map(|(mu, _)| mu)
    }

    /// Strip excluded mapping units from the composition.
    pub fn without_units(mut self, excluded: &[MuGlobal]) -> Self {
        self.composition
            .retain(|mu, _| *mu != MuGlobal::UNDEFINED && !excluded.contains(mu));
        self
    }
}

/// Result of [`simplify_aoi`]: surviving cells plus the soil-less count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AoiReduction {
    pub cells: Vec<SiteRecord>,
    pub skipped: usize,
}

/// Reduce every multi-unit cell to its dominant mapping unit.
///
/// The surviving unit is credited with the sum of every proportion in the cell:
/// the cell is treated as belonging wholly to its representative soil class.
/// Cells with no soil at all are dropped and counted.
pub fn simplify_aoi(num_band: usize, cells: Vec<SiteRecord>) -> AoiReduction {
    let mut out = AoiReduction { cells: Vec::with_capacity(cells.len()), skipped: 0 };

    for mut site in cells {
        match site.composition.len() {
            0 => {
                debug!(lat = site.lat, lon = site.lon, "no soil information for AOI cell, skipping");
                out.skipped += 1;
            }
            1 => out.cells.push(site),
            _ => {
                let total = site.total_proportion();
                if let Some(dominant) = site.dominant_mu() {
                    site.composition = Composition::from([(dominant, total)]);
                }
                out.cells.push(site);
            }
        }
    }

    if out.skipped > 0 {
        info!(band = num_band, skipped = out.skipped, "no soil information for AOI cells");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn site(lat: f64, lon: f64, comp: &[(u32, f64)]) -> SiteRecord {
        let (gran_lat, gran_lon) = LatLon::new(lat, lon).granular();
        SiteRecord {
            gran_lat,
            gran_lon,
            lat,
            lon,
            area: 1.0,
            composition: comp.iter().map(|&(mu, p)| (MuGlobal(mu), p)).collect(),
        }
    }

    #[test]
    fn dominant_unit_takes_total_proportion() {
        let red = simplify_aoi(1, vec![site(50.1, 10.1, &[(7, 30.0), (12, 70.0)])]);
        assert_eq!(red.cells.len(), 1);
        assert_eq!(red.cells[0].composition, Composition::from([(MuGlobal(12), 100.0)]));
    }

    /// Conservation of total proportion over a spread of compositions.
    #[test]
    fn reduction_conserves_proportion() {
        let inputs = vec![
            site(1.0, 1.0, &[(1, 0.2), (2, 0.3), (3, 0.1)]),
            site(2.0, 1.0, &[(4, 12.5), (5, 12.5)]),
            site(3.0, 1.0, &[(6, 0.05), (7, 0.9), (8, 0.03), (9, 0.01)]),
        ];
        let totals: Vec<f64> = inputs.iter().map(SiteRecord::total_proportion).collect();
        let red = simplify_aoi(1, inputs);
        for (cell, total) in red.cells.iter().zip(totals) {
            assert_eq!(cell.composition.len(), 1);
            assert_relative_eq!(cell.total_proportion(), total, max_relative = 1e-12);
        }
        // Tie at 12.5 goes to the smaller key.
        assert!(red.cells[1].composition.contains_key(&MuGlobal(4)));
    }

    #[test]
    fn soilless_cells_are_dropped_and_counted() {
        let red = simplify_aoi(
            3,
            vec![site(1.0, 1.0, &[]), site(2.0, 2.0, &[(7, 100.0)]), site(3.0, 3.0, &[])],
        );
        assert_eq!(red.skipped, 2);
        assert_eq!(red.cells.len(), 1);
        assert_eq!(red.cells[0].lat, 2.0);
    }

    #[test]
    fn without_units_removes_bad_and_zero() {
        let s = site(1.0, 1.0, &[(0, 10.0), (5, 20.0), (6, 70.0)]).without_units(&[MuGlobal(6)]);
        assert_eq!(s.composition, Composition::from([(MuGlobal(5), 20.0)]));
    }
}
