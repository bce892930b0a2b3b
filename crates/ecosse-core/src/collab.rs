//! Contracts for the readers and writers the pipeline delegates to.
//!
//! The core never decodes rasters or NetCDF files itself. Everything it needs
//! from the outside world comes through these traits; JSON-backed
//! implementations live in [`crate::fixtures`].

use std::collections::BTreeMap;
use std::ops::Range;

use crate::climate::{CellClimate, ClimateBlock, ClimateIndices, WeatherResource};
use crate::config::RunConfig;
use crate::coords::{BoundingBox, LatLon};
use crate::error::Result;
use crate::overlay::{LandUse, PlantInput};
use crate::site::SiteRecord;
use crate::soil::{MuGlobal, SoilRecords};

/// Global soil raster (mapping-unit grid plus the soil attribute database).
pub trait SoilRaster {
    /// Read the mapping-unit grid inside `bbox`, aggregated by `upscale`.
    /// `bbox` lies within `aoi`; see [`BoundingBox::contains_within`] for
    /// which edge cells belong to it. Returns the number of raster values read.
    fn read_cells_in_bbox(&mut self, bbox: &BoundingBox, aoi: &BoundingBox, upscale: u32) -> Result<usize>;

    /// Mapping units of the last read and how many cells each occupies.
    fn mapping_unit_occurrences(&self) -> BTreeMap<MuGlobal, usize>;

    /// One AOI record per cell of the last read.
    fn grid_cells(&self, upscale: u32) -> Vec<SiteRecord>;

    /// Every mapping unit present anywhere in the soil AOI.
    fn mapping_units(&self) -> Vec<MuGlobal>;

    /// Sub-soil records for the requested units.
    fn soil_records(&self, units: &[MuGlobal]) -> SoilRecords;

    /// Units the database flags as defective.
    fn bad_mapping_units(&self) -> &[MuGlobal];

    /// True extent of the soil AOI, when known.
    fn aoi_extent(&self) -> Option<BoundingBox>;
}

/// Historic and future monthly climate for a gridded dataset.
pub trait ClimateSource {
    fn resource(&self) -> WeatherResource;

    /// Spatial coverage limits of the dataset.
    fn coverage(&self) -> BoundingBox;

    /// First year of the future series.
    fn future_start_year(&self) -> i32;

    /// Grid index extents enclosing `bbox`; `None` when off the grid.
    fn resolve_indices(&self, bbox: &BoundingBox) -> Option<ClimateIndices>;

    fn fetch_future(&mut self, indices: &ClimateIndices, band: usize) -> Result<ClimateBlock>;

    fn fetch_historic(&mut self, indices: &ClimateIndices, band: usize) -> Result<ClimateBlock>;

    /// Per-cell slice of the fetched blocks, or `None` when the cell has no coverage.
    fn associate(&self, site: &SiteRecord, historic: &ClimateBlock, future: &ClimateBlock) -> Option<CellClimate>;
}

/// Land-use mask dataset. Opened once per band and closed when the returned
/// handle is dropped.
pub trait LandUseMask {
    fn open_band(&self, band: usize) -> Result<Box<dyn MaskDataset + '_>>;
}

pub trait MaskDataset {
    fn is_location_in_land_use(&self, loc: LatLon, land_use: LandUse, resol_deg: f64) -> bool;
}

/// Tabular yield map looked up by location.
pub trait YieldTable {
    fn lookup(&self, loc: LatLon) -> Option<f64>;
}

/// Plant inputs stored as a variable of a gridded dataset. Opened per band.
pub trait PlantInputNc {
    /// Variable selected for this run, e.g. `PlantInput05`.
    fn variable(&self) -> &str;

    fn open_band(&self, band: usize) -> Result<Box<dyn PlantInputDataset + '_>>;
}

pub trait PlantInputDataset {
    fn lookup(&self, loc: LatLon, variable: &str) -> Option<f64>;
}

/// Plant inputs per granular cell and year, from a CSV table.
pub trait PlantInputCsv {
    /// Yearly values for the cell starting at `start_year`.
    fn lookup(&self, gran_lat: i32, gran_lon: i32, start_year: i32) -> Option<Vec<f64>>;
}

/// Everything the writer needs to emit one cell's simulation inputs.
#[derive(Debug, Clone, Copy)]
pub struct CellContext<'a> {
    pub band: usize,
    pub site: &'a SiteRecord,
    pub soils: &'a SoilRecords,
    pub climate: &'a CellClimate,
    /// Month offsets of the simulation window in the future series.
    pub sim_months: &'a Range<usize>,
    pub plant_input: Option<&'a PlantInput>,
}

/// Per-cell simulation file writer. Failures are cell-local.
pub trait CellWriter {
    fn write_cell(&mut self, cfg: &RunConfig, cell: &CellContext<'_>) -> Result<()>;

    /// Flush and close anything still open. Called once, on every exit path.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
