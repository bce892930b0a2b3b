use std::path::PathBuf;

use thiserror::Error;

use crate::climate::WeatherResource;
use crate::coords::BoundingBox;

/// Run-fatal errors. Cell-local data gaps are never raised; they are
/// counted as [`crate::driver::SkipReason`]s instead.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("could not parse {field} value {value:?} as a coordinate")]
    BboxParse { field: &'static str, value: String },

    #[error("AOI {aoi} lies outside the {resource} coverage {coverage}")]
    OutsideCoverage {
        resource: WeatherResource,
        aoi: BoundingBox,
        coverage: BoundingBox,
    },

    #[error(
        "simulation start year {sim_start} must be the same as or later than \
         future dataset start year {dataset_start}"
    )]
    YearOrdering { sim_start: i32, dataset_start: i32 },

    #[error("weather-only export supports CRU weather only, got {0}")]
    UnsupportedResource(WeatherResource),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to open {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cell write failed: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, PrepError>;

impl PrepError {
    pub(crate) fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource { path: path.into(), source }
    }
}
