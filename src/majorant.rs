use crate::collective::Collective;
use crate::context::ThreadContext;
use crate::error::{Result, TransportError};
use crate::grid::{EnergyGrid, Interpolation};
use crate::reaction::{ReactionDescriptor, TabulatedXs};
use crate::rng::LcgStream;
use crate::xs::CrossSectionEngine;
use std::sync::Arc;
use tracing::{debug, info};

/// Build the problem-wide delta-tracking majorant on `grid`.
///
/// Bin `i` holds the largest value any local material takes at either end of
/// `[E[i], E[i + 1]]`, so the histogram bounds every linearly interpolated total
/// whose data grid contains `grid`. Totals are taken at their upper envelope
/// (largest probability-table band), and materials with a temperature majorant
/// are bounded by it instead of their total. Only materials local to
/// `collective.rank()` contribute; bins are then maximised across ranks.
pub fn build_majorant(
    engine: &CrossSectionEngine<'_>,
    grid: Arc<EnergyGrid>,
    collective: &dyn Collective,
) -> Result<ReactionDescriptor> {
    let energies = grid.energies();
    let n = energies.len();
    let mut bins = vec![0.0; n];
    let rank = collective.rank();

    // Private context: the pass must not disturb any transport thread.
    let mut ctx = ThreadContext::new(usize::MAX, LcgStream::new(0));
    let mut used = 0usize;

    for (id, material) in engine.materials() {
        if !material.is_local(rank) {
            debug!("Skipping material '{}' owned by rank {:?}", material.name, material.owner_rank);
            continue;
        }
        let reaction = material
            .reactions
            .majorant
            .or(material.reactions.total)
            .ok_or_else(|| {
                TransportError::Configuration(format!(
                    "Material '{}' has no total cross section to bound",
                    material.name
                ))
            })?;
        if material.uses_tms() && material.reactions.majorant.is_none() && engine.settings().tms_enabled {
            return Err(TransportError::Configuration(format!(
                "Material '{}' uses TMS but has no temperature majorant",
                material.name
            )));
        }

        let mut pointwise = Vec::with_capacity(n);
        for &energy in energies {
            pointwise.push(engine.bounding_xs(reaction, energy, &mut ctx)?);
        }
        for i in 0..n {
            let right = if i + 1 < n { pointwise[i + 1] } else { pointwise[i] };
            bins[i] = f64::max(bins[i], pointwise[i].max(right));
        }
        used += 1;
        debug!("Material {:?} ('{}') added to majorant", id, material.name);
    }

    collective.all_reduce_max(&mut bins)?;
    info!(
        "Majorant built from {} local materials on {} points (rank {} of {})",
        used,
        n,
        collective.rank(),
        collective.size()
    );

    let table = TabulatedXs::new(grid, bins, Interpolation::Histogram)?;
    Ok(ReactionDescriptor::majorant("majorant", table))
}
