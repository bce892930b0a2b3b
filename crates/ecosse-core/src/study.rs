//! Study definition file written alongside the simulation inputs.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::climate::WeatherResource;
use crate::config::RunConfig;
use crate::coords::BoundingBox;
use crate::error::{PrepError, Result};
use crate::overlay::LandUse;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyDefinition {
    pub study: String,
    pub bbox: BoundingBox,
    pub area_km2: f64,
    pub land_use: LandUse,
    pub weather_resource: WeatherResource,
    /// Scenario label for CRU; the dataset name otherwise.
    pub climate_scenario: String,
    pub hist_start_year: i32,
    pub hist_end_year: i32,
    pub sim_start_year: i32,
    pub sim_end_year: i32,
    pub resolution_deg: f64,
    pub equil_mode: String,
    pub version: String,
}

impl StudyDefinition {
    pub fn from_config(cfg: &RunConfig) -> Self {
        let climate_scenario = match cfg.weather_resource {
            WeatherResource::Cru => cfg.climate.scenario.clone(),
            other => other.to_string(),
        };
        Self {
            study: cfg.study.clone(),
            bbox: cfg.bbox,
            area_km2: cfg.bbox.area_km2(),
            land_use: cfg.land_use,
            weather_resource: cfg.weather_resource,
            climate_scenario,
            hist_start_year: cfg.climate.hist_start_year,
            hist_end_year: cfg.climate.hist_end_year,
            sim_start_year: cfg.climate.sim_start_year,
            sim_end_year: cfg.climate.sim_end_year,
            resolution_deg: cfg.req_resol_deg * f64::from(cfg.req_resol_upscale),
            equil_mode: cfg.equil_mode.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Write `<sims_dir>/<study>_study_definition.txt` and return its path.
pub fn write_study_definition(cfg: &RunConfig) -> Result<PathBuf> {
    fs::create_dir_all(&cfg.sims_dir).map_err(|e| PrepError::resource(&cfg.sims_dir, e))?;
    let path = cfg.sims_dir.join(format!("{}_study_definition.txt", cfg.study));
    let json = serde_json::to_string_pretty(&StudyDefinition::from_config(cfg))
        .map_err(|source| PrepError::Json { path: path.clone(), source })?;
    fs::write(&path, json).map_err(|e| PrepError::resource(&path, e))?;
    info!(path = %path.display(), "wrote study definition file");
    Ok(path)
}
