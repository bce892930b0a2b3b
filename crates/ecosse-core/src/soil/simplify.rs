//! Sub-soil simplification: duplicate collapsing and dominant-soil selection.

use tracing::info;

use super::{SoilRecords, SoilSubRecord};

/// Record counts reported after a simplification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub records_in: usize,
    pub records_out: usize,
    /// Sub-soils before duplicate collapsing.
    pub raw_sub_soils: usize,
    /// Sub-soils after duplicate collapsing, before dominant-soil selection.
    pub compressed_sub_soils: usize,
}

/// Collapse duplicate sub-soils within each mapping unit and, when
/// `use_dominant_soil` is set, reduce each unit to its dominant soil.
///
/// Duplicates are sub-soils with identical metrics; their shares are summed.
/// With `use_dominant_soil` every surviving unit maps to exactly one record
/// with a share of 100. Empty groups are dropped.
pub fn simplify_soil_records(records: &SoilRecords, use_dominant_soil: bool) -> (SoilRecords, SimplifyStats) {
    let mut stats = SimplifyStats { records_in: records.len(), ..Default::default() };
    let mut simplified = SoilRecords::new();

    for (&mu, group) in records {
        stats.raw_sub_soils += group.len();

        let mut group = match group.len() {
            0 => continue,
            1 => group.clone(),
            _ => collapse_duplicates(group),
        };
        stats.compressed_sub_soils += group.len();

        if use_dominant_soil {
            group = dominant_soil(group).into_iter().collect();
        }
        simplified.insert(mu, group);
    }

    stats.records_out = simplified.len();
    info!(
        records_in = stats.records_in,
        records_out = stats.records_out,
        raw_sub_soils = stats.raw_sub_soils,
        compressed_sub_soils = stats.compressed_sub_soils,
        "simplified soil records"
    );
    (simplified, stats)
}

/// Sort by metrics (share as tie-break, so the result does not depend on input
/// order) and merge runs of identical metrics by summing their shares.
fn collapse_duplicates(group: &[SoilSubRecord]) -> Vec<SoilSubRecord> {
    let mut sorted = group.to_vec();
    sorted.sort_by(|a, b| a.cmp_metrics(b).then(a.share.total_cmp(&b.share)));

    let mut out: Vec<SoilSubRecord> = Vec::with_capacity(sorted.len());
    for soil in sorted {
        match out.last_mut() {
            Some(prev) if prev.same_metrics(&soil) => prev.share += soil.share,
            _ => out.push(soil),
        }
    }
    out
}

/// Highest share wins; on a tie the first in metric order is kept.
fn dominant_soil(group: Vec<SoilSubRecord>) -> Option<SoilSubRecord> {
    let mut dom = group
        .into_iter()
        .reduce(|best, soil| if soil.share > best.share { soil } else { best })?;
    dom.share = 100.0;
    Some(dom)
}
