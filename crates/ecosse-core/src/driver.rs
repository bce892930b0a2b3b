//! Banded AOI driver: runs the per-band, per-cell generation loop.
//!
//! ```text
//! Init → PerBandSetup → PerCellGeneration → BandComplete → NextBand … → Finished
//! ```
//!
//! Soil records are read and simplified once in `Init`. Each processed band
//! reads its own soil cells and climate blocks, which are dropped when the
//! band completes. The completed-cell cap applies to the whole run.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::banding::{plan_bands, Band, BandDisposition, PlannedBand};
use crate::climate::{check_coverage, ClimateBlock, ClimateIndices};
use crate::collab::{
    CellContext, CellWriter, ClimateSource, LandUseMask, MaskDataset, PlantInputCsv, PlantInputNc, SoilRaster,
    YieldTable,
};
use crate::config::RunConfig;
use crate::error::{PrepError, Result};
use crate::overlay::{BandPlantInputs, PlantInputPlan};
use crate::progress::{ProgressSink, ProgressSnapshot, ProgressThrottle, RunCounters};
use crate::site::{simplify_aoi, SiteRecord};
use crate::soil::{drop_bad_mapping_units, simplify_soil_records, MuGlobal, SoilRecords};
use crate::study::write_study_definition;

// ── Public types ──────────────────────────────────────────────────────────────

/// Readers and writers the driver works through.
pub struct Collaborators<'a> {
    pub soil: &'a mut dyn SoilRaster,
    pub climate: &'a mut dyn ClimateSource,
    pub mask: Option<&'a dyn LandUseMask>,
    pub yield_table: Option<&'a dyn YieldTable>,
    pub plant_input_nc: Option<&'a dyn PlantInputNc>,
    pub plant_input_csv: Option<&'a dyn PlantInputCsv>,
    pub writer: &'a mut dyn CellWriter,
    pub progress: &'a mut dyn ProgressSink,
}

/// Why a cell produced no simulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SkipReason {
    NoClimate,
    NoHistoricClimate,
    NoSoil,
    MaskedOut,
    WriteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every planned band was visited.
    Finished,
    /// The completed-cell cap stopped the run.
    CapReached { completed: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandSummary {
    pub band: Band,
    pub disposition: BandDisposition,
    /// Cells read from the soil raster for this band.
    pub cells: usize,
    pub counters: RunCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub counters: RunCounters,
    pub skip_reasons: BTreeMap<SkipReason, usize>,
    pub bands_visited: usize,
    pub bands_processed: usize,
    pub band_summaries: Vec<BandSummary>,
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Init,
    PerBandSetup,
    PerCellGeneration,
    BandComplete,
    NextBand,
    Finished,
}

/// Run-wide inputs resolved once in `Init`.
struct Prepared<'a> {
    soils: SoilRecords,
    excluded: Vec<MuGlobal>,
    aoi_indices: ClimateIndices,
    sim_months: Range<usize>,
    plant_input: PlantInputPlan<'a>,
    plan: Vec<PlannedBand>,
}

enum BandEnd {
    Complete,
    CapReached,
}

/// Band-local datasets. Dropped, and so closed, when the band ends.
struct BandData<'a> {
    cells: Vec<SiteRecord>,
    /// Cells dropped by the highest-coverage reduction for having no soil.
    soilless: usize,
    historic: ClimateBlock,
    future: ClimateBlock,
    mask: Option<Box<dyn MaskDataset + 'a>>,
    plant_input: BandPlantInputs<'a>,
}

pub struct BandedAoiDriver<'a> {
    cfg: &'a RunConfig,
    collab: Collaborators<'a>,
    state: RunState,
    totals: RunCounters,
    skip_reasons: BTreeMap<SkipReason, usize>,
    throttle: ProgressThrottle,
}

impl<'a> BandedAoiDriver<'a> {
    pub fn new(cfg: &'a RunConfig, collab: Collaborators<'a>) -> Self {
        Self {
            cfg,
            collab,
            state: RunState::Init,
            totals: RunCounters::default(),
            skip_reasons: BTreeMap::new(),
            throttle: ProgressThrottle::new(cfg.progress_interval()),
        }
    }

    /// Run every band. The writer is finalised on every exit path.
    pub fn run(mut self) -> Result<RunSummary> {
        let result = self.run_bands();
        let finished = self.collab.writer.finish();
        let summary = result?;
        finished?;
        Ok(summary)
    }

    fn enter(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "driver state");
        self.state = next;
    }

    fn run_bands(&mut self) -> Result<RunSummary> {
        let prep = self.init()?;

        let mut summary = RunSummary {
            outcome: RunOutcome::Finished,
            counters: RunCounters::default(),
            skip_reasons: BTreeMap::new(),
            bands_visited: 0,
            bands_processed: 0,
            band_summaries: Vec::with_capacity(prep.plan.len()),
        };

        for planned in &prep.plan {
            let band = planned.band;
            summary.bands_visited += 1;
            self.enter(RunState::PerBandSetup);

            if planned.disposition != BandDisposition::Process {
                info!(
                    band = band.index,
                    floor = band.lat_ll,
                    ceiling = band.lat_ur,
                    reason = ?planned.disposition,
                    "skipping band"
                );
                summary.band_summaries.push(BandSummary {
                    band,
                    disposition: planned.disposition,
                    cells: 0,
                    counters: RunCounters::default(),
                });
                self.enter(RunState::NextBand);
                continue;
            }

            let mut counters = RunCounters::default();
            let (cells, end) = self.process_band(&band, &prep, &mut counters)?;
            summary.bands_processed += 1;
            self.totals.add(&counters);

            info!(
                band = band.index,
                floor = band.lat_ll,
                ceiling = band.lat_ur,
                cells,
                completed = counters.completed,
                skipped = counters.skipped,
                soilless = counters.soilless,
                warnings = counters.warning_count,
                "band complete"
            );
            summary.band_summaries.push(BandSummary { band, disposition: planned.disposition, cells, counters });

            if let BandEnd::CapReached = end {
                info!(completed = self.totals.completed, "maximum number of cells reached, run stopped");
                summary.outcome = RunOutcome::CapReached { completed: self.totals.completed };
                break;
            }
            self.enter(RunState::NextBand);
        }

        self.enter(RunState::Finished);
        info!(
            completed = self.totals.completed,
            skipped = self.totals.skipped,
            soilless = self.totals.soilless,
            landuse_yes = self.totals.landuse_yes,
            landuse_no = self.totals.landuse_no,
            "run finished"
        );
        summary.counters = self.totals;
        summary.skip_reasons = self.skip_reasons.clone();
        Ok(summary)
    }

    // ── Init ──────────────────────────────────────────────────────────────────

    fn init(&mut self) -> Result<Prepared<'a>> {
        self.enter(RunState::Init);
        let cfg = self.cfg;
        cfg.validate()?;

        let climate = &*self.collab.climate;
        let coverage = climate.coverage();
        check_coverage(climate.resource(), &cfg.bbox, &coverage)?;
        let aoi_indices = climate.resolve_indices(&cfg.bbox).ok_or(PrepError::OutsideCoverage {
            resource: climate.resource(),
            aoi: cfg.bbox,
            coverage,
        })?;
        let sim_months = cfg.climate.sim_window().month_range(climate.future_start_year())?;

        let plant_input = PlantInputPlan::resolve(
            self.collab.yield_table,
            self.collab.plant_input_nc,
            self.collab.plant_input_csv,
        );
        if let Some(kind) = plant_input.kind() {
            info!(?kind, "plant input source selected");
        }

        let soil = &*self.collab.soil;
        let mut raw = soil.soil_records(&soil.mapping_units());
        let dropped = drop_bad_mapping_units(&mut raw, soil.bad_mapping_units());
        if dropped > 0 {
            info!(dropped, "removed bad mapping units");
        }
        let (soils, _stats) = simplify_soil_records(&raw, cfg.use_dominant_soil);
        let excluded = soil.bad_mapping_units().to_vec();

        let soil_extent = soil.aoi_extent();
        let plan = plan_bands(&cfg.bbox, soil_extent.as_ref(), cfg.lat_step, cfg.start_at_band);
        info!(bands = plan.len(), step = cfg.lat_step, "AOI {} split into latitude bands", cfg.bbox);

        write_study_definition(cfg)?;

        Ok(Prepared { soils, excluded, aoi_indices, sim_months, plant_input, plan })
    }

    // ── Per band ──────────────────────────────────────────────────────────────

    /// `None` when the band holds no soil data; nothing else is opened then.
    fn setup_band(&mut self, band: &Band, prep: &Prepared<'a>) -> Result<Option<BandData<'a>>> {
        let cfg = self.cfg;
        let bbox = band.bbox();

        let nvals = self.collab.soil.read_cells_in_bbox(&bbox, &cfg.bbox, cfg.req_resol_upscale)?;
        let units = self.collab.soil.mapping_unit_occurrences();
        info!(band = band.index, nvals, units = units.len(), "unique mapping units in band");
        if units.is_empty() {
            info!(band = band.index, "no soil data in band");
            return Ok(None);
        }

        let mut cells: Vec<SiteRecord> = self
            .collab
            .soil
            .grid_cells(cfg.req_resol_upscale)
            .into_iter()
            .map(|site| {
                let mut site = site.without_units(&prep.excluded);
                site.composition.retain(|mu, _| prep.soils.contains_key(mu));
                site
            })
            .collect();

        let mut soilless = 0;
        if cfg.use_highest_coverage {
            let reduced = simplify_aoi(band.index, cells);
            soilless = reduced.skipped;
            cells = reduced.cells;
        }

        let indices = self.collab.climate.resolve_indices(&bbox).unwrap_or(prep.aoi_indices);
        self.collab.progress.pump();
        let future = self.collab.climate.fetch_future(&indices, band.index)?;
        self.collab.progress.pump();
        let historic = self.collab.climate.fetch_historic(&indices, band.index)?;

        let mask = match self.collab.mask {
            Some(m) => Some(m.open_band(band.index)?),
            None => None,
        };
        let plant_input = prep.plant_input.open_band(band.index)?;

        Ok(Some(BandData { cells, soilless, historic, future, mask, plant_input }))
    }

    /// Returns the number of cells read and how the band ended.
    fn process_band(
        &mut self,
        band: &Band,
        prep: &Prepared<'a>,
        counters: &mut RunCounters,
    ) -> Result<(usize, BandEnd)> {
        let Some(data) = self.setup_band(band, prep)? else {
            self.enter(RunState::BandComplete);
            return Ok((0, BandEnd::Complete));
        };
        counters.soilless = data.soilless;
        self.skip_many(SkipReason::NoSoil, data.soilless);
        let ncells = data.cells.len() + data.soilless;

        self.enter(RunState::PerCellGeneration);
        let mut end = BandEnd::Complete;
        for site in &data.cells {
            if let Some(reason) = self.generate_cell(band, site, &data, prep, counters) {
                self.skip(reason, counters);
            }
            self.report_progress(band.index, ncells, counters);

            if self.totals.completed + counters.completed >= self.cfg.completed_max {
                end = BandEnd::CapReached;
                break;
            }
        }

        self.enter(RunState::BandComplete);
        drop(data);
        Ok((ncells, end))
    }

    fn generate_cell(
        &mut self,
        band: &Band,
        site: &SiteRecord,
        data: &BandData<'a>,
        prep: &Prepared<'a>,
        counters: &mut RunCounters,
    ) -> Option<SkipReason> {
        let cfg = self.cfg;
        if site.composition.is_empty() {
            return Some(SkipReason::NoSoil);
        }

        let Some(climate) = self.collab.climate.associate(site, &data.historic, &data.future) else {
            debug!(lat = site.lat, lon = site.lon, "no climate for cell");
            return Some(SkipReason::NoClimate);
        };
        if climate.historic.is_empty() {
            debug!(lat = site.lat, lon = site.lon, "no historic climate for cell");
            return Some(SkipReason::NoHistoricClimate);
        }

        if let Some(mask) = &data.mask {
            if mask.is_location_in_land_use(site.location(), cfg.land_use, cfg.req_resol_deg) {
                counters.landuse_yes += 1;
            } else {
                counters.landuse_no += 1;
                return Some(SkipReason::MaskedOut);
            }
        }

        let plant_input = data.plant_input.annotate(site, cfg.climate.sim_start_year);
        if prep.plant_input.kind().is_some() && plant_input.is_none() {
            warn!(lat = site.lat, lon = site.lon, "no plant input for cell");
            counters.warning_count += 1;
        }

        let cell = CellContext {
            band: band.index,
            site,
            soils: &prep.soils,
            climate: &climate,
            sim_months: &prep.sim_months,
            plant_input: plant_input.as_ref(),
        };
        if let Err(e) = self.collab.writer.write_cell(cfg, &cell) {
            warn!(lat = site.lat, lon = site.lon, error = %e, "could not write cell inputs");
            counters.warning_count += 1;
            return Some(SkipReason::WriteFailed);
        }

        counters.completed += 1;
        None
    }

    // ── Accounting ────────────────────────────────────────────────────────────

    fn skip(&mut self, reason: SkipReason, counters: &mut RunCounters) {
        *self.skip_reasons.entry(reason).or_insert(0) += 1;
        if reason == SkipReason::NoSoil {
            counters.soilless += 1;
        } else {
            counters.skipped += 1;
        }
    }

    fn skip_many(&mut self, reason: SkipReason, n: usize) {
        if n > 0 {
            *self.skip_reasons.entry(reason).or_insert(0) += n;
        }
    }

    fn report_progress(&mut self, band: usize, total: usize, counters: &RunCounters) {
        let snapshot = ProgressSnapshot {
            band,
            completed: self.totals.completed + counters.completed,
            total,
            skipped: self.totals.skipped + counters.skipped,
            warnings: self.totals.warning_count + counters.warning_count,
        };
        self.throttle.maybe_report(Instant::now(), &mut *self.collab.progress, &snapshot);
    }
}
