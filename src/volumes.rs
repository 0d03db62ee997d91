use crate::cell::CellFill;
use crate::collective::Collective;
use crate::error::{Result, TransportError};
use crate::geometry::Geometry;
use crate::ids::{CellId, MaterialId};
use crate::material::Material;
use crate::nuclide::NuclideTable;
use slotmap::SlotMap;
use std::collections::BTreeMap;
use tracing::info;

/// Total volumes and masses over every placement in the geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeReport {
    /// Multiplicity times single-instance volume, for cells with a known volume.
    pub cell_volumes: BTreeMap<CellId, f64>,
    pub material_volumes: BTreeMap<MaterialId, f64>,
    /// Grams.
    pub material_masses: BTreeMap<MaterialId, f64>,
}

/// Aggregate volumes from the multiplicities left by [`crate::cell_count::cell_count`].
///
/// Each material volume is accumulated by one rank only (its owner, or rank 0
/// for replicated materials) and then summed across ranks, so every rank ends
/// with the same report.
pub fn aggregate_volumes(
    geometry: &Geometry,
    materials: &SlotMap<MaterialId, Material>,
    nuclides: &NuclideTable,
    collective: &dyn Collective,
) -> Result<VolumeReport> {
    let rank = collective.rank();
    let mut report = VolumeReport::default();
    let mut local: BTreeMap<MaterialId, f64> = materials.keys().map(|id| (id, 0.0)).collect();

    for (id, cell) in geometry.cells() {
        let Some(volume) = cell.volume else { continue };
        let total = cell.multiplicity() as f64 * volume;
        report.cell_volumes.insert(id, total);

        if let CellFill::Material(m) = cell.fill {
            let material = material_of(materials, m)?;
            let accumulates = match material.owner_rank {
                Some(owner) => owner == rank,
                None => rank == 0,
            };
            if accumulates {
                *local.entry(m).or_insert(0.0) += total;
            }
        }
    }

    let mut values: Vec<f64> = local.values().copied().collect();
    collective.all_reduce_sum(&mut values)?;

    for (id, volume) in local.keys().copied().zip(values) {
        let mass = volume * material_of(materials, id)?.mass_density(nuclides)?;
        report.material_volumes.insert(id, volume);
        report.material_masses.insert(id, mass);
    }

    info!(
        cells = report.cell_volumes.len(),
        materials = report.material_volumes.len(),
        "Volumes aggregated"
    );
    Ok(report)
}

fn material_of(materials: &SlotMap<MaterialId, Material>, id: MaterialId) -> Result<&Material> {
    materials.get(id).ok_or_else(|| {
        TransportError::invalid_reference("material", format!("{:?} used by a cell", id))
    })
}
