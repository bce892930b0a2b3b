//! Weather-only export: simulation-window climate per AOI cell as
//! tab-delimited tables, one file per metric.
//!
//! No banding, no soil simplification and no simulation files. The whole AOI
//! is read in one pass.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::climate::window::slice_months;
use crate::climate::{check_coverage, Metric, MonthlySeries, SimWindow, WeatherResource};
use crate::collab::{ClimateSource, SoilRaster};
use crate::config::RunConfig;
use crate::driver::{RunOutcome, SkipReason};
use crate::error::{PrepError, Result};
use crate::progress::{ProgressSink, ProgressSnapshot, ProgressThrottle, RunCounters};
use crate::site::SiteRecord;
use crate::soil::MuGlobal;

/// Leading columns of every weather table.
pub const HEADERS: [&str; 5] = ["latitude", "longitude", "mu_global", "gran_lat", "gran_lon"];

/// `<dir>/<study>_<metric>.txt`
pub fn table_path(dir: &Path, study: &str, metric: Metric) -> PathBuf {
    dir.join(format!("{study}_{}.txt", metric.short_name()))
}

// ── Tables ────────────────────────────────────────────────────────────────────

struct Table {
    metric: Metric,
    path: PathBuf,
    out: BufWriter<File>,
}

/// Open weather tables, one per metric. Buffered writers flush on drop; call
/// [`WeatherTables::finish`] to see flush errors.
pub struct WeatherTables {
    tables: Vec<Table>,
    n_months: usize,
    rows: usize,
}

impl WeatherTables {
    /// Create the tables and write their header rows.
    pub fn create(dir: &Path, study: &str, window: &SimWindow) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| PrepError::resource(dir, e))?;
        let header: Vec<String> =
            HEADERS.iter().map(|h| h.to_string()).chain(window.month_labels()).collect();
        let header = header.join("\t");

        let mut tables = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let path = table_path(dir, study, metric);
            let file = File::create(&path).map_err(|e| PrepError::resource(&path, e))?;
            let mut out = BufWriter::new(file);
            writeln!(out, "{header}").map_err(|e| PrepError::resource(&path, e))?;
            tables.push(Table { metric, path, out });
        }
        Ok(Self { tables, n_months: window.n_months(), rows: 0 })
    }

    /// Append one row per metric for `site`.
    pub fn append(&mut self, site: &SiteRecord, mu: MuGlobal, sim: &MonthlySeries) -> Result<()> {
        for t in &mut self.tables {
            let mut line = format!(
                "{:.5}\t{:.5}\t{}\t{}\t{}",
                site.lat, site.lon, mu, site.gran_lat, site.gran_lon
            );
            for v in sim.get(t.metric) {
                line.push('\t');
                line.push_str(&v.to_string());
            }
            writeln!(t.out, "{line}").map_err(|e| PrepError::resource(&t.path, e))?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn n_months(&self) -> usize {
        self.n_months
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and close every table, returning their paths.
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.tables.len());
        for mut t in self.tables {
            t.out.flush().map_err(|e| PrepError::resource(&t.path, e))?;
            paths.push(t.path);
        }
        Ok(paths)
    }
}

// ── Exporter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub outcome: RunOutcome,
    pub counters: RunCounters,
    pub files: Vec<PathBuf>,
}

pub struct WeatherOnlyExporter<'a> {
    cfg: &'a RunConfig,
    soil: &'a mut dyn SoilRaster,
    climate: &'a mut dyn ClimateSource,
    progress: &'a mut dyn ProgressSink,
}

impl<'a> WeatherOnlyExporter<'a> {
    pub fn new(
        cfg: &'a RunConfig,
        soil: &'a mut dyn SoilRaster,
        climate: &'a mut dyn ClimateSource,
        progress: &'a mut dyn ProgressSink,
    ) -> Self {
        Self { cfg, soil, climate, progress }
    }

    /// Write `<study>_precip.txt` and `<study>_tair.txt` into `sims_dir`.
    ///
    /// Every configuration check runs before the first file is created.
    pub fn run(mut self) -> Result<ExportSummary> {
        let cfg = self.cfg;
        cfg.validate()?;

        let resource = self.climate.resource();
        if resource != WeatherResource::Cru {
            return Err(PrepError::UnsupportedResource(resource));
        }
        let coverage = self.climate.coverage();
        check_coverage(resource, &cfg.bbox, &coverage)?;

        let window = cfg.climate.sim_window();
        let fut_start = self.climate.future_start_year();
        let months = window.month_range(fut_start)?;
        info!(sim_start = window.start_year, future_start = fut_start, "weather-only export");

        let indices = self
            .climate
            .resolve_indices(&cfg.bbox)
            .ok_or(PrepError::OutsideCoverage { resource, aoi: cfg.bbox, coverage })?;

        self.soil.read_cells_in_bbox(&cfg.bbox, &cfg.bbox, cfg.req_resol_upscale)?;
        let cells = self.soil.grid_cells(cfg.req_resol_upscale);

        self.progress.pump();
        let future = self.climate.fetch_future(&indices, 0)?;
        self.progress.pump();
        let historic = self.climate.fetch_historic(&indices, 0)?;

        let mut tables = WeatherTables::create(&cfg.sims_dir, &cfg.study, &window)?;
        let mut counters = RunCounters::default();
        let mut outcome = RunOutcome::Finished;
        let mut throttle = ProgressThrottle::new(cfg.progress_interval());

        for site in &cells {
            let skip = match self.climate.associate(site, &historic, &future) {
                None => {
                    warn!(lat = site.lat, lon = site.lon, "no weather data for cell");
                    Some(SkipReason::NoClimate)
                }
                Some(c) if c.historic.is_empty() => {
                    debug!(lat = site.lat, lon = site.lon, "no historic weather data for cell");
                    Some(SkipReason::NoHistoricClimate)
                }
                Some(c) => {
                    let sim = MonthlySeries {
                        precipitation: slice_months(&c.future.precipitation, &months),
                        temperature: slice_months(&c.future.temperature, &months),
                    };
                    if Metric::ALL.iter().any(|&m| sim.get(m).len() != tables.n_months()) {
                        warn!(lat = site.lat, lon = site.lon, "future series shorter than simulation window");
                        counters.warning_count += 1;
                        Some(SkipReason::NoClimate)
                    } else {
                        let mu = site.dominant_mu().unwrap_or(MuGlobal::UNDEFINED);
                        tables.append(site, mu, &sim)?;
                        None
                    }
                }
            };

            match skip {
                Some(_) => counters.skipped += 1,
                None => counters.completed += 1,
            }

            let snapshot = ProgressSnapshot {
                band: 0,
                completed: counters.completed,
                total: cells.len(),
                skipped: counters.skipped,
                warnings: counters.warning_count,
            };
            throttle.maybe_report(Instant::now(), &mut *self.progress, &snapshot);

            if counters.completed >= cfg.completed_max {
                info!(completed = counters.completed, "maximum number of cells reached, export stopped");
                outcome = RunOutcome::CapReached { completed: counters.completed };
                break;
            }
        }

        let rows = tables.rows();
        let files = tables.finish()?;
        info!(rows, skipped = counters.skipped, "weather-only export finished");
        Ok(ExportSummary { outcome, counters, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_carry_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let window = SimWindow::new(2020, 2020);
        let mut tables = WeatherTables::create(dir.path(), "demo", &window).unwrap();
        let site = SiteRecord {
            gran_lat: 4788,
            gran_lon: 22812,
            lat: 50.123456,
            lon: 10.1,
            area: 1.0,
            composition: Default::default(),
        };
        let sim = MonthlySeries { precipitation: vec![1.5; 12], temperature: vec![-2.0; 12] };
        tables.append(&site, MuGlobal(12), &sim).unwrap();
        let files = tables.finish().unwrap();
        assert_eq!(files.len(), 2);

        let precip = std::fs::read_to_string(table_path(dir.path(), "demo", Metric::Precipitation)).unwrap();
        let mut lines = precip.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(&header[..5], &HEADERS);
        assert_eq!(header[5], "2020-01");
        assert_eq!(header.len(), 5 + 12);

        let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(&row[..5], &["50.12346", "10.10000", "12", "4788", "22812"]);
        assert_eq!(row[5], "1.5");

        let tair = std::fs::read_to_string(table_path(dir.path(), "demo", Metric::Temperature)).unwrap();
        assert!(tair.lines().nth(1).unwrap().ends_with("\t-2"), "got {tair}");
    }
}
