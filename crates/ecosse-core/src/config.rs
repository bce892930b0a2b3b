//! Run configuration.
//!
//! One immutable [`RunConfig`] is built per run (from JSON, optionally with
//! command-line overrides) and passed by reference to every component.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::banding::DEFAULT_LAT_STEP;
use crate::climate::{SimWindow, WeatherResource};
use crate::coords::{BoundingBox, GRANULARITY};
use crate::error::{PrepError, Result};
use crate::overlay::LandUse;

/// Longest accepted progress interval in seconds: one day.
pub const MAX_PROGRESS_SECS: f64 = 86_400.0;

/// Climate periods and scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateSettings {
    pub hist_start_year: i32,
    pub hist_end_year: i32,
    /// Future scenario label, e.g. `rcp26`.
    pub scenario: String,
    pub sim_start_year: i32,
    pub sim_end_year: i32,
}

impl Default for ClimateSettings {
    fn default() -> Self {
        Self {
            hist_start_year: 1980,
            hist_end_year: 2005,
            scenario: "rcp26".to_string(),
            sim_start_year: 2006,
            sim_end_year: 2015,
        }
    }
}

impl ClimateSettings {
    pub fn sim_window(&self) -> SimWindow {
        SimWindow::new(self.sim_start_year, self.sim_end_year)
    }
}

/// Input dataset locations. Only the binary reads these; the library takes
/// already-opened collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFiles {
    pub soil: Option<PathBuf>,
    pub climate: Option<PathBuf>,
    pub land_use_mask: Option<PathBuf>,
    pub yield_table: Option<PathBuf>,
    pub plant_input_nc: Option<PathBuf>,
    /// Variable of `plant_input_nc` to use; empty disables the source.
    pub plant_input_variable: Option<String>,
    pub plant_input_csv: Option<PathBuf>,
}

/// Everything that parameterises one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub study: String,
    /// Directory receiving simulation inputs and tables.
    pub sims_dir: PathBuf,
    pub bbox: BoundingBox,
    #[serde(default = "default_weather_resource")]
    pub weather_resource: WeatherResource,
    #[serde(default)]
    pub climate: ClimateSettings,
    /// Band height in degrees of latitude.
    #[serde(default = "default_lat_step")]
    pub lat_step: f64,
    /// Soil raster aggregation factor; 1 = native 30″ cells.
    #[serde(default = "default_upscale")]
    pub req_resol_upscale: u32,
    /// Cell resolution in degrees used by the land-use mask lookup.
    #[serde(default = "default_resol_deg")]
    pub req_resol_deg: f64,
    /// Stop the whole run after this many completed cells.
    #[serde(default = "default_completed_max")]
    pub completed_max: usize,
    /// Resume from this 1-based band index; earlier bands are skipped.
    #[serde(default)]
    pub start_at_band: usize,
    #[serde(default = "default_true")]
    pub use_dominant_soil: bool,
    #[serde(default = "default_true")]
    pub use_highest_coverage: bool,
    #[serde(default)]
    pub land_use: LandUse,
    /// Minimum seconds between progress reports.
    #[serde(default = "default_progress_secs")]
    pub progress_interval_secs: f64,
    /// Equilibrium mode passed through to the study definition.
    #[serde(default = "default_equil_mode")]
    pub equil_mode: String,
    #[serde(default)]
    pub inputs: InputFiles,
}

fn default_weather_resource() -> WeatherResource {
    WeatherResource::Cru
}
fn default_lat_step() -> f64 {
    DEFAULT_LAT_STEP
}
fn default_upscale() -> u32 {
    1
}
fn default_resol_deg() -> f64 {
    1.0 / GRANULARITY
}
fn default_completed_max() -> usize {
    5_000_000
}
fn default_true() -> bool {
    true
}
fn default_progress_secs() -> f64 {
    10.0
}
fn default_equil_mode() -> String {
    "9.5".to_string()
}

impl RunConfig {
    /// Minimal configuration with defaults for everything but the essentials.
    pub fn new(study: impl Into<String>, sims_dir: impl Into<PathBuf>, bbox: BoundingBox) -> Self {
        Self {
            study: study.into(),
            sims_dir: sims_dir.into(),
            bbox,
            weather_resource: default_weather_resource(),
            climate: ClimateSettings::default(),
            lat_step: default_lat_step(),
            req_resol_upscale: default_upscale(),
            req_resol_deg: default_resol_deg(),
            completed_max: default_completed_max(),
            start_at_band: 0,
            use_dominant_soil: true,
            use_highest_coverage: true,
            land_use: LandUse::default(),
            progress_interval_secs: default_progress_secs(),
            equil_mode: default_equil_mode(),
            inputs: InputFiles::default(),
        }
    }

    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|source| PrepError::Json { path: origin.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PrepError::resource(path, e))?;
        Self::from_json_str(&text, path)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| PrepError::Json { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(|e| PrepError::resource(path, e))
    }

    /// Checks that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()?;
        if self.study.trim().is_empty() {
            return Err(PrepError::InvalidConfig("study name must not be empty".into()));
        }
        if !(self.lat_step.is_finite() && self.lat_step > 0.0) {
            return Err(PrepError::InvalidConfig(format!("lat_step must be positive, got {}", self.lat_step)));
        }
        if self.req_resol_upscale == 0 {
            return Err(PrepError::InvalidConfig("req_resol_upscale must be at least 1".into()));
        }
        if self.completed_max == 0 {
            return Err(PrepError::InvalidConfig("completed_max must be at least 1".into()));
        }
        let secs = self.progress_interval_secs;
        if !(secs.is_finite() && (0.0..=MAX_PROGRESS_SECS).contains(&secs)) {
            return Err(PrepError::InvalidConfig(format!(
                "progress_interval_secs must lie in 0..={MAX_PROGRESS_SECS}, got {secs}"
            )));
        }
        let c = &self.climate;
        if c.hist_start_year > c.hist_end_year {
            return Err(PrepError::InvalidConfig(format!(
                "historic start year {} is after end year {}",
                c.hist_start_year, c.hist_end_year
            )));
        }
        if c.sim_start_year > c.sim_end_year {
            return Err(PrepError::InvalidConfig(format!(
                "simulation start year {} is after end year {}",
                c.sim_start_year, c.sim_end_year
            )));
        }
        Ok(())
    }

    /// Unvalidated values saturate instead of panicking.
    pub fn progress_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.progress_interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Per-study output directory for simulation inputs.
    pub fn study_dir(&self) -> PathBuf {
        self.sims_dir.join(&self.study)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_picks_up_defaults() {
        let cfg = RunConfig::from_json_str(
            r#"{ "study": "demo", "sims_dir": "out", "bbox": [10.0, 50.0, 10.5, 50.3] }"#,
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(cfg.weather_resource, WeatherResource::Cru);
        assert_eq!(cfg.lat_step, DEFAULT_LAT_STEP);
        assert!(cfg.use_dominant_soil && cfg.use_highest_coverage);
        assert_eq!(cfg.land_use, LandUse::Forest);
        assert_eq!(cfg.climate.sim_window(), SimWindow::new(2006, 2015));
        assert_eq!(cfg.study_dir(), PathBuf::from("out/demo"));
    }

    #[test]
    fn inverted_bbox_fails_to_load() {
        let err = RunConfig::from_json_str(
            r#"{ "study": "demo", "sims_dir": "out", "bbox": [10.5, 50.0, 10.0, 50.3] }"#,
            Path::new("inline"),
        )
        .unwrap_err();
        assert!(matches!(err, PrepError::Json { .. }), "got {err:?}");
    }

    #[test]
    fn validation_catches_bad_values() {
        let bbox = BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap();
        let good = RunConfig::new("demo", "out", bbox);
        assert!(good.validate().is_ok());

        let mut cfg = good.clone();
        cfg.study = "  ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = good.clone();
        cfg.lat_step = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = good.clone();
        cfg.completed_max = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = good;
        cfg.climate.sim_start_year = 2030;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_progress_interval_is_a_config_error() {
        let err = RunConfig::from_json_str(
            r#"{ "study": "demo", "sims_dir": "out", "bbox": [10.0, 50.0, 10.5, 50.3],
                 "progress_interval_secs": 1e30 }"#,
            Path::new("inline"),
        )
        .unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig(_)), "got {err:?}");

        let bbox = BoundingBox::new(10.0, 50.0, 10.5, 50.3).unwrap();
        let mut cfg = RunConfig::new("demo", "out", bbox);
        cfg.progress_interval_secs = 1e30;
        assert_eq!(cfg.progress_interval(), Duration::MAX);
        cfg.progress_interval_secs = -1.0;
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.progress_interval(), Duration::ZERO);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let bbox = BoundingBox::new(-3.0, 55.0, -2.0, 56.5).unwrap();
        let mut cfg = RunConfig::new("scot", dir.path(), bbox);
        cfg.weather_resource = WeatherResource::Chess;
        cfg.start_at_band = 2;
        cfg.to_json_file(&path).unwrap();
        assert_eq!(RunConfig::from_json_file(&path).unwrap(), cfg);
    }
}
