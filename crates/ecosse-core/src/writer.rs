//! JSON per-cell simulation input writer.
//!
//! One file per AOI cell, `<sims_dir>/<study>/lat<gran_lat>_lon<gran_lon>.json`,
//! holding the cell's soils, the long-term historic monthly means used for
//! equilibrium, the simulation-window weather and any plant input.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::climate::window::slice_months;
use crate::climate::{Metric, MonthlySeries};
use crate::collab::{CellContext, CellWriter};
use crate::config::RunConfig;
use crate::error::{PrepError, Result};
use crate::overlay::PlantInput;
use crate::soil::{MuGlobal, SoilSubRecord};

#[derive(Serialize)]
struct SoilEntry<'a> {
    mu_global: MuGlobal,
    proportion: f64,
    sub_soils: &'a [SoilSubRecord],
}

#[derive(Serialize)]
struct WeatherDoc {
    /// Mean per calendar month over the historic period.
    historic_means: MonthlySeries,
    /// Monthly values over the simulation window.
    simulation: MonthlySeries,
}

#[derive(Serialize)]
struct CellDoc<'a> {
    band: usize,
    gran_lat: i32,
    gran_lon: i32,
    lat: f64,
    lon: f64,
    area_km2: f64,
    sim_start_year: i32,
    sim_end_year: i32,
    soils: Vec<SoilEntry<'a>>,
    weather: WeatherDoc,
    plant_input: Option<&'a PlantInput>,
}

fn means(series: &MonthlySeries) -> MonthlySeries {
    MonthlySeries {
        precipitation: series.monthly_means(Metric::Precipitation).to_vec(),
        temperature: series.monthly_means(Metric::Temperature).to_vec(),
    }
}

/// Writes one JSON document per cell under the run's study directory.
#[derive(Debug, Default)]
pub struct JsonCellWriter {
    dir: Option<PathBuf>,
    written: usize,
}

impl JsonCellWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// File name for a cell, from its granular coordinates.
    pub fn cell_file_name(gran_lat: i32, gran_lon: i32) -> String {
        format!("lat{gran_lat:05}_lon{gran_lon:05}.json")
    }

    fn ensure_dir(&mut self, cfg: &RunConfig) -> Result<&Path> {
        let dir = self.dir.get_or_insert_with(|| cfg.study_dir());
        fs::create_dir_all(&*dir).map_err(|e| PrepError::resource(&*dir, e))?;
        Ok(dir.as_path())
    }
}

impl CellWriter for JsonCellWriter {
    fn write_cell(&mut self, cfg: &RunConfig, cell: &CellContext<'_>) -> Result<()> {
        let site = cell.site;

        let mut soils = Vec::with_capacity(site.composition.len());
        for (mu, &proportion) in &site.composition {
            let sub_soils = cell
                .soils
                .get(mu)
                .ok_or_else(|| PrepError::Write(format!("no soil records for mapping unit {mu}")))?;
            soils.push(SoilEntry { mu_global: *mu, proportion, sub_soils });
        }

        let future = &cell.climate.future;
        let doc = CellDoc {
            band: cell.band,
            gran_lat: site.gran_lat,
            gran_lon: site.gran_lon,
            lat: site.lat,
            lon: site.lon,
            area_km2: site.area,
            sim_start_year: cfg.climate.sim_start_year,
            sim_end_year: cfg.climate.sim_end_year,
            soils,
            weather: WeatherDoc {
                historic_means: means(&cell.climate.historic),
                simulation: MonthlySeries {
                    precipitation: slice_months(&future.precipitation, cell.sim_months),
                    temperature: slice_months(&future.temperature, cell.sim_months),
                },
            },
            plant_input: cell.plant_input,
        };

        let path = self.ensure_dir(cfg)?.join(Self::cell_file_name(site.gran_lat, site.gran_lon));
        let json =
            serde_json::to_string_pretty(&doc).map_err(|source| PrepError::Json { path: path.clone(), source })?;
        fs::write(&path, json).map_err(|e| PrepError::resource(&path, e))?;
        debug!(path = %path.display(), "wrote cell inputs");
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(dir) = &self.dir {
            info!(dir = %dir.display(), files = self.written, "cell input files written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::CellClimate;
    use crate::coords::{BoundingBox, LatLon};
    use crate::site::SiteRecord;
    use crate::soil::SoilRecords;

    fn config(dir: &Path) -> RunConfig {
        let bbox = BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap();
        let mut cfg = RunConfig::new("demo", dir, bbox);
        cfg.climate.sim_start_year = 2016;
        cfg.climate.sim_end_year = 2016;
        cfg
    }

    fn site(mu: u32) -> SiteRecord {
        let (gran_lat, gran_lon) = LatLon::new(50.1, 10.1).granular();
        SiteRecord {
            gran_lat,
            gran_lon,
            lat: 50.1,
            lon: 10.1,
            area: 0.85,
            composition: [(MuGlobal(mu), 100.0)].into(),
        }
    }

    fn climate() -> CellClimate {
        CellClimate {
            historic: MonthlySeries { precipitation: vec![10.0; 24], temperature: vec![4.0; 24] },
            future: MonthlySeries {
                precipitation: (0..36).map(f64::from).collect(),
                temperature: vec![6.0; 36],
            },
        }
    }

    #[test]
    fn writes_one_document_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let soils: SoilRecords = [(MuGlobal(12), vec![SoilSubRecord::new(vec![1.0, 2.0], 100.0)])].into();
        let site = site(12);
        let climate = climate();
        let months = 12..24;
        let pi = PlantInput { kind: crate::overlay::PlantInputKind::YieldTable, start_year: None, values: vec![3.5] };

        let mut writer = JsonCellWriter::new();
        let cell = CellContext {
            band: 1,
            site: &site,
            soils: &soils,
            climate: &climate,
            sim_months: &months,
            plant_input: Some(&pi),
        };
        writer.write_cell(&cfg, &cell).unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.written(), 1);

        let path = cfg.study_dir().join(JsonCellWriter::cell_file_name(site.gran_lat, site.gran_lon));
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(v["soils"][0]["mu_global"], 12);
        assert_eq!(v["soils"][0]["sub_soils"][0]["share"], 100.0);
        assert_eq!(v["weather"]["simulation"]["precipitation"][0], 12.0);
        assert_eq!(v["weather"]["simulation"]["precipitation"].as_array().unwrap().len(), 12);
        assert_eq!(v["weather"]["historic_means"]["temperature"][5], 4.0);
        assert_eq!(v["plant_input"]["values"][0], 3.5);
    }

    #[test]
    fn missing_soil_records_fail_the_cell() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let soils = SoilRecords::new();
        let site = site(99);
        let climate = climate();
        let months = 0..12;

        let mut writer = JsonCellWriter::new();
        let cell = CellContext {
            band: 1,
            site: &site,
            soils: &soils,
            climate: &climate,
            sim_months: &months,
            plant_input: None,
        };
        let err = writer.write_cell(&cfg, &cell).unwrap_err();
        assert!(matches!(err, PrepError::Write(_)), "got {err:?}");
        assert_eq!(writer.written(), 0);
    }
}
