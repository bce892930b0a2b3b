//! Latitude banding of the AOI.
//!
//! Bands are cut top-down from the AOI's northern edge with a fixed step; the
//! last band is clipped at the AOI's southern edge so no band reaches below it.

use serde::Serialize;

use crate::coords::BoundingBox;

/// Default band height in degrees of latitude.
pub const DEFAULT_LAT_STEP: f64 = 0.5;

/// Tolerance for floating-point band edges.
const EDGE_EPS: f64 = 1e-9;

/// One latitude band. `index` is 1-based, matching the resume offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub index: usize,
    pub lon_ll: f64,
    /// Band floor.
    pub lat_ll: f64,
    pub lon_ur: f64,
    /// Band ceiling.
    pub lat_ur: f64,
}

impl Band {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            lon_ll: self.lon_ll,
            lat_ll: self.lat_ll,
            lon_ur: self.lon_ur,
            lat_ur: self.lat_ur,
        }
    }

    pub fn height(&self) -> f64 {
        self.lat_ur - self.lat_ll
    }
}

/// What the driver does with a planned band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandDisposition {
    Process,
    /// Band floor lies north of the soil AOI's upper boundary.
    AboveSoilAoi,
    /// Band index precedes the configured resume offset.
    BeforeResumePoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedBand {
    pub band: Band,
    pub disposition: BandDisposition,
}

/// Number of candidate bands: ⌈(lat_ur − lat_ll) / step⌉, at least one.
pub fn band_count(aoi: &BoundingBox, step: f64) -> usize {
    let n = (aoi.lat_span() / step - EDGE_EPS).ceil();
    (n as usize).max(1)
}

/// Plan the band sequence for `aoi`.
///
/// `soil_extent` is the true extent of the soil data; bands whose floor lies
/// north of it are skipped, and the plan ends early once a band reaches the
/// soil extent's southern edge. `start_at_band` skips bands with a lower
/// index so an interrupted run can be resumed.
pub fn plan_bands(
    aoi: &BoundingBox,
    soil_extent: Option<&BoundingBox>,
    step: f64,
    start_at_band: usize,
) -> Vec<PlannedBand> {
    let nsteps = band_count(aoi, step);
    let mut plan = Vec::with_capacity(nsteps);

    for isec in 0..nsteps {
        let index = isec + 1;
        // Computed from the AOI edge rather than accumulated, so rounding
        // error does not drift across many bands.
        let lat_ur = aoi.lat_ur - step * isec as f64;
        let lat_ll = (aoi.lat_ur - step * index as f64).max(aoi.lat_ll);

        let band = Band {
            index,
            lon_ll: aoi.lon_ll,
            lat_ll,
            lon_ur: aoi.lon_ur,
            lat_ur,
        };

        let disposition = match soil_extent {
            Some(soil) if lat_ll > soil.lat_ur => BandDisposition::AboveSoilAoi,
            _ if index < start_at_band => BandDisposition::BeforeResumePoint,
            _ => BandDisposition::Process,
        };
        plan.push(PlannedBand { band, disposition });

        let floor_reached = lat_ll <= aoi.lat_ll + EDGE_EPS
            || soil_extent.is_some_and(|soil| soil.lat_ll >= lat_ll);
        if floor_reached {
            break;
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(lon_ll: f64, lat_ll: f64, lon_ur: f64, lat_ur: f64) -> BoundingBox {
        BoundingBox::new(lon_ll, lat_ll, lon_ur, lat_ur).unwrap()
    }

    #[test]
    fn narrow_aoi_is_a_single_band() {
        let aoi = bbox(10.0, 50.0, 10.5, 50.3);
        let plan = plan_bands(&aoi, None, DEFAULT_LAT_STEP, 0);
        assert_eq!(plan.len(), 1);
        let b = plan[0].band;
        assert_eq!((b.lat_ll, b.lat_ur), (50.0, 50.3));
        assert_eq!(plan[0].disposition, BandDisposition::Process);
    }

    /// ⌈(U−L)/S⌉ bands, each no taller than S, tiling [L, U] top-down.
    #[test]
    fn bands_tile_the_aoi_without_overshooting() {
        for (lat_ll, lat_ur, step) in [
            (50.0, 52.0, 0.5),
            (-3.3, 4.1, 0.5),
            (10.0, 10.25, 0.5),
            (0.0, 7.0, 0.7),
            (-60.0, 70.0, 2.5),
        ] {
            let aoi = bbox(0.0, lat_ll, 1.0, lat_ur);
            let plan = plan_bands(&aoi, None, step, 0);
            let expected = ((lat_ur - lat_ll) / step - 1e-9).ceil() as usize;
            assert_eq!(plan.len(), expected.max(1), "aoi {lat_ll}..{lat_ur} step {step}");

            assert!((plan[0].band.lat_ur - lat_ur).abs() < 1e-9);
            assert!((plan.last().unwrap().band.lat_ll - lat_ll).abs() < 1e-9);
            for pair in plan.windows(2) {
                assert!(
                    (pair[0].band.lat_ll - pair[1].band.lat_ur).abs() < 1e-9,
                    "gap between band {} and {}",
                    pair[0].band.index,
                    pair[1].band.index
                );
            }
            for p in &plan {
                assert!(p.band.height() <= step + 1e-9, "band {} too tall", p.band.index);
                assert!(p.band.lat_ll >= lat_ll, "band {} floor below AOI", p.band.index);
            }
        }
    }

    #[test]
    fn resume_offset_skips_earlier_bands() {
        let aoi = bbox(0.0, 50.0, 1.0, 52.0);
        let plan = plan_bands(&aoi, None, 0.5, 3);
        let dispositions: Vec<_> = plan.iter().map(|p| p.disposition).collect();
        assert_eq!(
            dispositions,
            vec![
                BandDisposition::BeforeResumePoint,
                BandDisposition::BeforeResumePoint,
                BandDisposition::Process,
                BandDisposition::Process,
            ]
        );
    }

    #[test]
    fn bands_north_of_soil_data_are_skipped_and_plan_stops_at_soil_floor() {
        let aoi = bbox(0.0, 48.0, 1.0, 52.0);
        let soil = bbox(0.0, 49.2, 1.0, 50.8);
        let plan = plan_bands(&aoi, Some(&soil), 0.5, 0);
        // Bands: 52-51.5, 51.5-51, 51-50.5, 50.5-50, 50-49.5, 49.5-49 (reaches soil floor).
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[0].disposition, BandDisposition::AboveSoilAoi);
        assert_eq!(plan[1].disposition, BandDisposition::AboveSoilAoi);
        assert_eq!(plan[2].disposition, BandDisposition::Process);
        assert!(plan[5].band.lat_ll <= soil.lat_ll);
    }
}
