//! Soil/climate input preparation for gridded ECOSSE simulations.
//!
//! Splits an area of interest into latitude bands, simplifies soil records
//! and per-cell soil composition, attaches climate series and optional
//! overlays to each cell, and hands the result to a [`collab::CellWriter`].
//! A weather-only variant exports climate tables without simulation files.

pub mod banding;
pub mod climate;
pub mod collab;
pub mod config;
pub mod coords;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod overlay;
pub mod progress;
pub mod site;
pub mod soil;
pub mod study;
pub mod weather_only;
pub mod writer;

pub use config::RunConfig;
pub use coords::{BoundingBox, LatLon};
pub use driver::{BandedAoiDriver, Collaborators, RunOutcome, RunSummary, SkipReason};
pub use error::{PrepError, Result};
pub use weather_only::{ExportSummary, WeatherOnlyExporter};
pub use writer::JsonCellWriter;
