//! JSON-backed collaborators.
//!
//! Small in-memory stand-ins for the soil raster, climate, mask and
//! plant-input readers. The binary loads them from the paths in
//! [`crate::config::InputFiles`]; tests build them inline.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::climate::{
    associate_climate, CellClimate, ClimateBlock, ClimateGrid, ClimateIndices, GridIndex, MonthlySeries,
    WeatherResource,
};
use crate::collab::{
    ClimateSource, LandUseMask, MaskDataset, PlantInputCsv, PlantInputDataset, PlantInputNc, SoilRaster, YieldTable,
};
use crate::coords::{BoundingBox, LatLon, GRANULARITY};
use crate::error::{PrepError, Result};
use crate::overlay::LandUse;
use crate::site::{Composition, SiteRecord};
use crate::soil::{MuGlobal, SoilRecords};

/// Read and deserialise a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| PrepError::resource(path, e))?;
    serde_json::from_str(&text).map_err(|source| PrepError::Json { path: path.to_path_buf(), source })
}

fn squared_distance(a: LatLon, b: LatLon) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    dlat * dlat + dlon * dlon
}

// ── Soil ────────────────────────────────────────────────────────────────────

fn default_cell_size() -> f64 {
    1.0 / GRANULARITY
}

/// One soil raster cell: centre and mapping-unit composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilCell {
    pub lat: f64,
    pub lon: f64,
    pub composition: Composition,
}

impl SoilCell {
    fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Soil raster held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoilFixture {
    /// True extent of the soil data.
    pub extent: Option<BoundingBox>,
    #[serde(default = "default_cell_size")]
    pub cell_size_deg: f64,
    #[serde(default)]
    pub bad_mapping_units: Vec<MuGlobal>,
    pub cells: Vec<SoilCell>,
    #[serde(default)]
    pub soil_records: SoilRecords,
    #[serde(skip)]
    selected: Vec<SoilCell>,
}

impl SoilFixture {
    pub fn new(cells: Vec<SoilCell>, soil_records: SoilRecords) -> Self {
        Self {
            extent: None,
            cell_size_deg: default_cell_size(),
            bad_mapping_units: Vec::new(),
            cells,
            soil_records,
            selected: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl SoilRaster for SoilFixture {
    fn read_cells_in_bbox(&mut self, bbox: &BoundingBox, aoi: &BoundingBox, _upscale: u32) -> Result<usize> {
        self.selected = self.cells.iter().filter(|c| bbox.contains_within(c.location(), aoi)).cloned().collect();
        debug!(cells = self.selected.len(), "soil cells read for {bbox}");
        Ok(self.selected.len())
    }

    fn mapping_unit_occurrences(&self) -> BTreeMap<MuGlobal, usize> {
        let mut counts = BTreeMap::new();
        for mu in self.selected.iter().flat_map(|c| c.composition.keys()) {
            *counts.entry(*mu).or_insert(0) += 1;
        }
        counts
    }

    fn grid_cells(&self, upscale: u32) -> Vec<SiteRecord> {
        let size = self.cell_size_deg * f64::from(upscale.max(1));
        self.selected
            .iter()
            .map(|c| {
                let loc = c.location();
                let (gran_lat, gran_lon) = loc.granular();
                SiteRecord {
                    gran_lat,
                    gran_lon,
                    lat: c.lat,
                    lon: c.lon,
                    area: BoundingBox::around(loc, size).area_km2(),
                    composition: c.composition.clone(),
                }
            })
            .collect()
    }

    fn mapping_units(&self) -> Vec<MuGlobal> {
        let mut units: Vec<MuGlobal> = self.cells.iter().flat_map(|c| c.composition.keys().copied()).collect();
        units.sort();
        units.dedup();
        units
    }

    fn soil_records(&self, units: &[MuGlobal]) -> SoilRecords {
        units
            .iter()
            .filter_map(|mu| self.soil_records.get(mu).map(|recs| (*mu, recs.clone())))
            .collect()
    }

    fn bad_mapping_units(&self) -> &[MuGlobal] {
        &self.bad_mapping_units
    }

    fn aoi_extent(&self) -> Option<BoundingBox> {
        self.extent
    }
}

// ── Climate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateCell {
    pub row: usize,
    pub col: usize,
    #[serde(default)]
    pub historic: MonthlySeries,
    #[serde(default)]
    pub future: MonthlySeries,
}

/// Gridded climate dataset held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateFixture {
    pub resource: WeatherResource,
    pub grid: ClimateGrid,
    pub future_start_year: i32,
    pub cells: Vec<ClimateCell>,
    #[serde(skip)]
    fetches: usize,
}

impl ClimateFixture {
    pub fn new(resource: WeatherResource, grid: ClimateGrid, future_start_year: i32, cells: Vec<ClimateCell>) -> Self {
        Self { resource, grid, future_start_year, cells, fetches: 0 }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// Number of block fetches served so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    fn fetch(&mut self, indices: &ClimateIndices, band: usize, pick: fn(&ClimateCell) -> &MonthlySeries) -> ClimateBlock {
        self.fetches += 1;
        let cells: BTreeMap<GridIndex, MonthlySeries> = self
            .cells
            .iter()
            .filter(|c| indices.contains((c.row, c.col)))
            .filter(|c| !pick(c).is_empty())
            .map(|c| ((c.row, c.col), pick(c).clone()))
            .collect();
        ClimateBlock { band, cells }
    }
}

impl ClimateSource for ClimateFixture {
    fn resource(&self) -> WeatherResource {
        self.resource
    }

    fn coverage(&self) -> BoundingBox {
        self.grid.extent()
    }

    fn future_start_year(&self) -> i32 {
        self.future_start_year
    }

    fn resolve_indices(&self, bbox: &BoundingBox) -> Option<ClimateIndices> {
        self.grid.indices_for_bbox(bbox)
    }

    fn fetch_future(&mut self, indices: &ClimateIndices, band: usize) -> Result<ClimateBlock> {
        Ok(self.fetch(indices, band, |c| &c.future))
    }

    fn fetch_historic(&mut self, indices: &ClimateIndices, band: usize) -> Result<ClimateBlock> {
        Ok(self.fetch(indices, band, |c| &c.historic))
    }

    fn associate(&self, site: &SiteRecord, historic: &ClimateBlock, future: &ClimateBlock) -> Option<CellClimate> {
        associate_climate(&self.grid, site, historic, future)
    }
}

// ── Land-use mask ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseRegion {
    pub bbox: BoundingBox,
    pub land_use: LandUse,
}

/// Land-use classes by region; the first region containing a location wins.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MaskFixture {
    pub regions: Vec<LandUseRegion>,
    /// Class of locations outside every region.
    #[serde(default)]
    pub fallback: Option<LandUse>,
    #[serde(skip)]
    opened: Cell<usize>,
    #[serde(skip)]
    closed: Cell<usize>,
}

impl MaskFixture {
    pub fn new(regions: Vec<LandUseRegion>) -> Self {
        Self { regions, ..Self::default() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// (opened, closed) per-band handle counts.
    pub fn handle_counts(&self) -> (usize, usize) {
        (self.opened.get(), self.closed.get())
    }

    fn class_at(&self, loc: LatLon) -> Option<LandUse> {
        self.regions.iter().find(|r| r.bbox.contains(loc)).map(|r| r.land_use).or(self.fallback)
    }
}

struct MaskBand<'a> {
    mask: &'a MaskFixture,
}

impl MaskDataset for MaskBand<'_> {
    fn is_location_in_land_use(&self, loc: LatLon, land_use: LandUse, _resol_deg: f64) -> bool {
        self.mask.class_at(loc).is_some_and(|class| land_use.matches(class))
    }
}

impl Drop for MaskBand<'_> {
    fn drop(&mut self) {
        self.mask.closed.set(self.mask.closed.get() + 1);
    }
}

impl LandUseMask for MaskFixture {
    fn open_band(&self, band: usize) -> Result<Box<dyn MaskDataset + '_>> {
        debug!(band, "opening land-use mask");
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(MaskBand { mask: self }))
    }
}

// ── Plant inputs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPoint {
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
}

/// Yield map; a location takes the value of its nearest point within
/// `max_distance_deg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldFixture {
    pub points: Vec<YieldPoint>,
    #[serde(default = "default_max_distance")]
    pub max_distance_deg: f64,
}

fn default_max_distance() -> f64 {
    0.5
}

fn nearest<'p, P>(points: &'p [P], loc: LatLon, max_distance_deg: f64, at: impl Fn(&P) -> LatLon) -> Option<&'p P> {
    let limit = max_distance_deg * max_distance_deg;
    points
        .iter()
        .map(|p| (squared_distance(at(p), loc), p))
        .filter(|(d, _)| *d <= limit)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
}

impl YieldFixture {
    pub fn new(points: Vec<YieldPoint>) -> Self {
        Self { points, max_distance_deg: default_max_distance() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl YieldTable for YieldFixture {
    fn lookup(&self, loc: LatLon) -> Option<f64> {
        nearest(&self.points, loc, self.max_distance_deg, |p| LatLon::new(p.lat, p.lon)).map(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantInputPoint {
    pub lat: f64,
    pub lon: f64,
    /// Variable name → value.
    pub values: BTreeMap<String, f64>,
}

/// Gridded plant-input variables.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlantInputNcFixture {
    #[serde(default)]
    pub variable: String,
    pub points: Vec<PlantInputPoint>,
    #[serde(default = "default_max_distance")]
    pub max_distance_deg: f64,
    #[serde(skip)]
    opened: Cell<usize>,
    #[serde(skip)]
    closed: Cell<usize>,
}

impl PlantInputNcFixture {
    pub fn new(variable: impl Into<String>, points: Vec<PlantInputPoint>) -> Self {
        Self { variable: variable.into(), points, max_distance_deg: default_max_distance(), ..Self::default() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// (opened, closed) per-band handle counts.
    pub fn handle_counts(&self) -> (usize, usize) {
        (self.opened.get(), self.closed.get())
    }
}

struct PlantInputBand<'a> {
    source: &'a PlantInputNcFixture,
}

impl PlantInputDataset for PlantInputBand<'_> {
    fn lookup(&self, loc: LatLon, variable: &str) -> Option<f64> {
        let src = self.source;
        nearest(&src.points, loc, src.max_distance_deg, |p| LatLon::new(p.lat, p.lon))
            .and_then(|p| p.values.get(variable).copied())
    }
}

impl Drop for PlantInputBand<'_> {
    fn drop(&mut self) {
        self.source.closed.set(self.source.closed.get() + 1);
    }
}

impl PlantInputNc for PlantInputNcFixture {
    fn variable(&self) -> &str {
        &self.variable
    }

    fn open_band(&self, band: usize) -> Result<Box<dyn PlantInputDataset + '_>> {
        debug!(band, variable = %self.variable, "opening plant input dataset");
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(PlantInputBand { source: self }))
    }
}

/// One row of a plant-input table: yearly values for a granular cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantInputRow {
    pub gran_lat: i32,
    pub gran_lon: i32,
    pub first_year: i32,
    pub values: Vec<f64>,
}

/// Plant inputs tabulated per granular cell and year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantInputCsvFixture {
    pub rows: Vec<PlantInputRow>,
}

impl PlantInputCsvFixture {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl PlantInputCsv for PlantInputCsvFixture {
    fn lookup(&self, gran_lat: i32, gran_lon: i32, start_year: i32) -> Option<Vec<f64>> {
        let row = self.rows.iter().find(|r| r.gran_lat == gran_lat && r.gran_lon == gran_lon)?;
        let offset = usize::try_from(start_year - row.first_year).ok()?;
        let values = row.values.get(offset..)?;
        (!values.is_empty()).then(|| values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn soil() -> SoilFixture {
        let cells = vec![
            SoilCell { lat: 50.25, lon: 10.1, composition: [(MuGlobal(7), 30.0), (MuGlobal(12), 70.0)].into() },
            SoilCell { lat: 50.0, lon: 10.2, composition: [(MuGlobal(7), 100.0)].into() },
            SoilCell { lat: 50.5, lon: 10.2, composition: [(MuGlobal(9), 100.0)].into() },
        ];
        SoilFixture::new(cells, SoilRecords::new())
    }

    #[test]
    fn soil_read_is_half_open() {
        let mut s = soil();
        let aoi = BoundingBox::new(10.0, 50.0, 10.5, 51.0).unwrap();
        let band = BoundingBox::new(10.0, 50.0, 10.5, 50.5).unwrap();
        assert_eq!(s.read_cells_in_bbox(&band, &aoi, 1).unwrap(), 2, "northern edge excluded, southern kept");

        let occ = s.mapping_unit_occurrences();
        assert_eq!(occ[&MuGlobal(7)], 2);
        assert_eq!(occ[&MuGlobal(12)], 1);
        assert!(!occ.contains_key(&MuGlobal(9)));

        let sites = s.grid_cells(1);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].location().granular(), (sites[0].gran_lat, sites[0].gran_lon));
        // A 30″ cell at 50°N is just over half a km².
        assert_relative_eq!(sites[0].area, 0.549, epsilon = 0.005);
        assert_eq!(s.mapping_units(), vec![MuGlobal(7), MuGlobal(9), MuGlobal(12)]);
    }

    #[test]
    fn soil_read_keeps_the_aoi_northern_edge() {
        let mut s = soil();
        let aoi = BoundingBox::new(10.0, 50.0, 10.5, 50.5).unwrap();
        assert_eq!(s.read_cells_in_bbox(&aoi, &aoi, 1).unwrap(), 3);
        assert_eq!(s.mapping_unit_occurrences()[&MuGlobal(9)], 1);
    }

    #[test]
    fn soil_fixture_parses_integer_keys() {
        let json = r#"{
            "cells": [{ "lat": 50.1, "lon": 10.1, "composition": { "7": 100.0 } }],
            "soil_records": { "7": [{ "metrics": [1.0, 2.0], "share": 100.0 }] },
            "bad_mapping_units": [3]
        }"#;
        let s: SoilFixture = serde_json::from_str(json).unwrap();
        assert_eq!(s.soil_records(&[MuGlobal(7), MuGlobal(8)]).len(), 1);
        assert_eq!(s.bad_mapping_units(), &[MuGlobal(3)]);
        assert_relative_eq!(s.cell_size_deg, 1.0 / 120.0);
    }

    #[test]
    fn climate_fetch_keeps_cells_inside_indices() {
        let grid = ClimateGrid { lon_min: 0.0, lat_min: 40.0, resol_deg: 0.5, nlons: 40, nlats: 40 };
        let series = MonthlySeries { precipitation: vec![1.0; 12], temperature: vec![2.0; 12] };
        let cells = vec![
            ClimateCell { row: 20, col: 20, historic: series.clone(), future: series.clone() },
            ClimateCell { row: 30, col: 20, historic: MonthlySeries::default(), future: series },
        ];
        let mut c = ClimateFixture::new(WeatherResource::Cru, grid, 2006, cells);
        let idx = c.resolve_indices(&BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap()).unwrap();
        let fut = c.fetch_future(&idx, 1).unwrap();
        assert_eq!(fut.cells.len(), 1);
        assert!(fut.get((20, 20)).is_some());

        let all = ClimateIndices { row_min: 0, row_max: 39, col_min: 0, col_max: 39 };
        let hist = c.fetch_historic(&all, 1).unwrap();
        assert_eq!(hist.cells.len(), 1, "empty historic series are not served");
        assert_eq!(c.fetches(), 2);
    }

    #[test]
    fn mask_handles_are_counted() {
        let region = LandUseRegion {
            bbox: BoundingBox::new(10.0, 50.0, 10.5, 50.2).unwrap(),
            land_use: LandUse::Forest,
        };
        let mask = MaskFixture::new(vec![region]);
        {
            let band = mask.open_band(1).unwrap();
            assert!(band.is_location_in_land_use(LatLon::new(50.1, 10.1), LandUse::Forest, 1.0 / 120.0));
            assert!(!band.is_location_in_land_use(LatLon::new(50.1, 10.1), LandUse::Cropland, 1.0 / 120.0));
            assert!(!band.is_location_in_land_use(LatLon::new(50.25, 10.1), LandUse::Forest, 1.0 / 120.0));
        }
        assert_eq!(mask.handle_counts(), (1, 1));
    }

    #[test]
    fn yield_lookup_takes_nearest_point_in_range() {
        let table = YieldFixture::new(vec![
            YieldPoint { lat: 50.0, lon: 10.0, value: 1.0 },
            YieldPoint { lat: 50.2, lon: 10.2, value: 2.0 },
        ]);
        assert_eq!(table.lookup(LatLon::new(50.15, 10.15)), Some(2.0));
        assert_eq!(table.lookup(LatLon::new(55.0, 10.0)), None);
    }

    #[test]
    fn csv_lookup_starts_at_requested_year() {
        let table = PlantInputCsvFixture {
            rows: vec![PlantInputRow { gran_lat: 10, gran_lon: 20, first_year: 2000, values: vec![1.0, 2.0, 3.0] }],
        };
        assert_eq!(table.lookup(10, 20, 2001), Some(vec![2.0, 3.0]));
        assert_eq!(table.lookup(10, 20, 1999), None);
        assert_eq!(table.lookup(10, 20, 2003), None);
        assert_eq!(table.lookup(11, 20, 2000), None);
    }
}
