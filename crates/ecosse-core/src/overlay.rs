//! Optional per-cell overlays: land-use mask and plant-input annotation.
//!
//! Three plant-input sources exist (yield table, gridded variable, CSV
//! table). At most one is applied per run; the choice is made once in
//! [`PlantInputPlan::resolve`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collab::{PlantInputCsv, PlantInputDataset, PlantInputNc, YieldTable};
use crate::error::Result;
use crate::site::SiteRecord;

/// Land-use classes of the mask dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandUse {
    Cropland,
    Pasture,
    Other,
    #[default]
    Forest,
    Grassland,
    All,
}

impl LandUse {
    /// `All` matches every class.
    pub fn matches(self, other: LandUse) -> bool {
        self == LandUse::All || other == LandUse::All || self == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantInputKind {
    YieldTable,
    NcVariable,
    Csv,
}

/// Plant-input annotation attached to one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantInput {
    pub kind: PlantInputKind,
    /// First year of `values` for yearly series; `None` for a single value.
    pub start_year: Option<i32>,
    pub values: Vec<f64>,
}

/// The plant-input source selected for a run.
#[derive(Clone, Copy, Default)]
pub enum PlantInputPlan<'a> {
    #[default]
    None,
    YieldTable(&'a dyn YieldTable),
    NcVariable(&'a dyn PlantInputNc),
    Csv(&'a dyn PlantInputCsv),
}

impl<'a> PlantInputPlan<'a> {
    /// Pick the single source to apply.
    ///
    /// A gridded plant-input variable disables the yield table (with a
    /// warning). Otherwise precedence is yield table, gridded variable, CSV.
    pub fn resolve(
        yield_table: Option<&'a dyn YieldTable>,
        nc: Option<&'a dyn PlantInputNc>,
        csv: Option<&'a dyn PlantInputCsv>,
    ) -> Self {
        let nc = nc.filter(|n| !n.variable().is_empty());
        let yield_table = match (yield_table, nc) {
            (Some(_), Some(n)) => {
                warn!(variable = n.variable(), "plant input variable selected, yield map disabled");
                None
            }
            (y, _) => y,
        };

        match (yield_table, nc, csv) {
            (Some(y), _, _) => Self::YieldTable(y),
            (None, Some(n), _) => Self::NcVariable(n),
            (None, None, Some(c)) => Self::Csv(c),
            (None, None, None) => Self::None,
        }
    }

    pub fn kind(&self) -> Option<PlantInputKind> {
        match self {
            Self::None => None,
            Self::YieldTable(_) => Some(PlantInputKind::YieldTable),
            Self::NcVariable(_) => Some(PlantInputKind::NcVariable),
            Self::Csv(_) => Some(PlantInputKind::Csv),
        }
    }

    /// Open whatever per-band dataset the selected source needs.
    pub fn open_band(self, band: usize) -> Result<BandPlantInputs<'a>> {
        let dataset = match self {
            Self::NcVariable(nc) => Some(nc.open_band(band)?),
            _ => None,
        };
        Ok(BandPlantInputs { plan: self, dataset })
    }
}

/// Plant-input source with its per-band dataset open. Dropping it closes the
/// dataset.
pub struct BandPlantInputs<'a> {
    plan: PlantInputPlan<'a>,
    dataset: Option<Box<dyn PlantInputDataset + 'a>>,
}

impl BandPlantInputs<'_> {
    /// Build the annotation for `site`; `None` when the source has no value there.
    pub fn annotate(&self, site: &SiteRecord, start_year: i32) -> Option<PlantInput> {
        let loc = site.location();
        match self.plan {
            PlantInputPlan::None => None,
            PlantInputPlan::YieldTable(table) => table.lookup(loc).map(|y| PlantInput {
                kind: PlantInputKind::YieldTable,
                start_year: None,
                values: vec![y],
            }),
            PlantInputPlan::NcVariable(nc) => {
                let value = self.dataset.as_ref()?.lookup(loc, nc.variable())?;
                Some(PlantInput { kind: PlantInputKind::NcVariable, start_year: None, values: vec![value] })
            }
            PlantInputPlan::Csv(table) => table
                .lookup(site.gran_lat, site.gran_lon, start_year)
                .map(|values| PlantInput { kind: PlantInputKind::Csv, start_year: Some(start_year), values }),
        }
    }
}
