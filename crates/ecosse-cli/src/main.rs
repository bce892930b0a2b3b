/// Command-line front end: banded simulation-input generation, weather-only
/// export and band planning, driven by a JSON run configuration.
///
/// Input datasets are the JSON fixtures of `ecosse_core::fixtures`, located
/// through the `inputs` section of the run configuration. Relative paths are
/// resolved against the configuration file's directory.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecosse_core::banding::plan_bands;
use ecosse_core::collab::{LandUseMask, PlantInputCsv, PlantInputNc, SoilRaster, YieldTable};
use ecosse_core::fixtures::{
    ClimateFixture, MaskFixture, PlantInputCsvFixture, PlantInputNcFixture, SoilFixture, YieldFixture,
};
use ecosse_core::progress::LogProgress;
use ecosse_core::{BandedAoiDriver, Collaborators, JsonCellWriter, RunConfig, WeatherOnlyExporter};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ecosse", about = "Prepare gridded ECOSSE simulation inputs from soil and climate data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate per-cell simulation inputs band by band
    Sims(RunArgs),
    /// Export simulation-window weather tables only (CRU)
    Weather(RunArgs),
    /// Print the latitude band plan without processing anything
    Plan(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the study name
    #[arg(long)]
    study: Option<String>,

    /// Resume from this 1-based band index
    #[arg(long)]
    start_at_band: Option<usize>,

    /// Stop after this many completed cells
    #[arg(long)]
    max_cells: Option<usize>,
}

impl RunArgs {
    fn load_config(&self) -> Result<RunConfig> {
        let mut cfg = RunConfig::from_json_file(&self.config)
            .with_context(|| format!("Cannot load run configuration {}", self.config.display()))?;
        if let Some(study) = &self.study {
            cfg.study = study.clone();
        }
        if let Some(band) = self.start_at_band {
            cfg.start_at_band = band;
        }
        if let Some(max) = self.max_cells {
            cfg.completed_max = max;
        }
        cfg.validate().context("Invalid run configuration after command-line overrides")?;
        info!(study = %cfg.study, bbox = %cfg.bbox, config = %self.config.display(), "run configuration loaded");
        Ok(cfg)
    }

    fn base_dir(&self) -> PathBuf {
        self.config.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

// ── Input loading ────────────────────────────────────────────────────────────

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// Every dataset named in the configuration, loaded.
struct Inputs {
    soil: SoilFixture,
    climate: Option<ClimateFixture>,
    mask: Option<MaskFixture>,
    yield_table: Option<YieldFixture>,
    plant_input_nc: Option<PlantInputNcFixture>,
    plant_input_csv: Option<PlantInputCsvFixture>,
}

fn load_optional<T>(base: &Path, p: Option<&PathBuf>, load: fn(&Path) -> ecosse_core::Result<T>) -> Result<Option<T>> {
    p.map(|p| {
        let path = resolve(base, p);
        load(&path).with_context(|| format!("Cannot load {}", path.display()))
    })
    .transpose()
}

fn load_inputs(cfg: &RunConfig, base: &Path) -> Result<Inputs> {
    let files = &cfg.inputs;
    let Some(soil) = load_optional(base, files.soil.as_ref(), SoilFixture::load)? else {
        bail!("No soil dataset configured (inputs.soil)");
    };
    let mut plant_input_nc = load_optional(base, files.plant_input_nc.as_ref(), PlantInputNcFixture::load)?;
    if let (Some(nc), Some(var)) = (plant_input_nc.as_mut(), files.plant_input_variable.as_ref()) {
        nc.variable = var.clone();
    }
    Ok(Inputs {
        soil,
        climate: load_optional(base, files.climate.as_ref(), ClimateFixture::load)?,
        mask: load_optional(base, files.land_use_mask.as_ref(), MaskFixture::load)?,
        yield_table: load_optional(base, files.yield_table.as_ref(), YieldFixture::load)?,
        plant_input_nc,
        plant_input_csv: load_optional(base, files.plant_input_csv.as_ref(), PlantInputCsvFixture::load)?,
    })
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn run_sims(args: &RunArgs) -> Result<()> {
    let cfg = args.load_config()?;
    let mut inputs = load_inputs(&cfg, &args.base_dir())?;
    let Some(climate) = inputs.climate.as_mut() else {
        bail!("No climate dataset configured (inputs.climate)");
    };

    let mut writer = JsonCellWriter::new();
    let mut progress = LogProgress;
    let collab = Collaborators {
        soil: &mut inputs.soil,
        climate,
        mask: inputs.mask.as_ref().map(|m| m as &dyn LandUseMask),
        yield_table: inputs.yield_table.as_ref().map(|y| y as &dyn YieldTable),
        plant_input_nc: inputs.plant_input_nc.as_ref().map(|n| n as &dyn PlantInputNc),
        plant_input_csv: inputs.plant_input_csv.as_ref().map(|c| c as &dyn PlantInputCsv),
        writer: &mut writer,
        progress: &mut progress,
    };
    let summary = BandedAoiDriver::new(&cfg, collab).run().context("Simulation input generation failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_weather(args: &RunArgs) -> Result<()> {
    let cfg = args.load_config()?;
    let mut inputs = load_inputs(&cfg, &args.base_dir())?;
    let Some(climate) = inputs.climate.as_mut() else {
        bail!("No climate dataset configured (inputs.climate)");
    };

    let mut progress = LogProgress;
    let summary = WeatherOnlyExporter::new(&cfg, &mut inputs.soil, climate, &mut progress)
        .run()
        .context("Weather-only export failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_plan(args: &RunArgs) -> Result<()> {
    let cfg = args.load_config()?;
    let inputs = load_inputs(&cfg, &args.base_dir())?;
    let extent = inputs.soil.aoi_extent();
    let plan = plan_bands(&cfg.bbox, extent.as_ref(), cfg.lat_step, cfg.start_at_band);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Sims(args) => run_sims(args),
        Command::Weather(args) => run_weather(args),
        Command::Plan(args) => run_plan(args),
    }
}
