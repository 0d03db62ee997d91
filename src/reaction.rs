use crate::error::{Result, TransportError};
use crate::grid::{EnergyGrid, Interpolation};
use crate::ids::{MaterialId, NuclideId};
use crate::material::Material;
use crate::nuclide::{MicroReaction, MicroscopicData};
use std::sync::Arc;

/// Which macroscopic quantity a descriptor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Total,
    Absorption,
    Elastic,
    Fission,
    /// Material-wise majorant over the TMS temperature window.
    TemperatureMajorant,
    /// Problem-wide delta-tracking majorant.
    Majorant,
    /// Any other channel, by MT number.
    Partial(i32),
}

impl ReactionKind {
    pub fn is_majorant(self) -> bool {
        matches!(self, ReactionKind::Majorant | ReactionKind::TemperatureMajorant)
    }

    /// Poison equilibrium only changes these.
    pub fn takes_poison_correction(self) -> bool {
        matches!(self, ReactionKind::Total | ReactionKind::Absorption)
    }

    /// Iterated concentration search changes these.
    pub fn takes_search_correction(self) -> bool {
        matches!(
            self,
            ReactionKind::Total | ReactionKind::Absorption | ReactionKind::Majorant
        )
    }
}

/// One term `multiplier × N × σ(E)` of a macroscopic sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialEntry {
    pub reaction: MicroReaction,
    /// Index of the nuclide in the material composition (density lookup).
    pub constituent: usize,
    pub multiplier: f64,
    /// Energies outside `[emin, emax]` contribute nothing.
    pub emin: f64,
    pub emax: f64,
}

/// Precomputed values on the union grid.
#[derive(Debug, Clone)]
pub struct TabulatedXs {
    pub grid: Arc<EnergyGrid>,
    pub values: Vec<f64>,
    pub interpolation: Interpolation,
}

impl TabulatedXs {
    pub fn new(grid: Arc<EnergyGrid>, values: Vec<f64>, interpolation: Interpolation) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(TransportError::InvalidInput(format!(
                "Tabulated cross section has {} values for a grid of {} points",
                values.len(),
                grid.len()
            )));
        }
        Ok(TabulatedXs {
            grid,
            values,
            interpolation,
        })
    }

    #[inline]
    pub fn evaluate(&self, energy: f64) -> f64 {
        self.grid.interpolate(&self.values, energy, self.interpolation)
    }
}

/// Recipe for one macroscopic reaction of one material.
///
/// Entries are ordered by increasing lower window edge so that evaluation can
/// stop at the first entry whose window starts above the energy.
#[derive(Debug, Clone)]
pub struct ReactionDescriptor {
    pub name: String,
    pub kind: ReactionKind,
    /// `None` only for the problem-wide majorant, which is always tabulated.
    pub material: Option<MaterialId>,
    entries: Vec<PartialEntry>,
    pub table: Option<TabulatedXs>,
}

impl ReactionDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: ReactionKind,
        material: MaterialId,
        mut entries: Vec<PartialEntry>,
        table: Option<TabulatedXs>,
    ) -> Result<Self> {
        let name = name.into();
        for e in &entries {
            if !e.multiplier.is_finite() || !(e.emax >= e.emin) {
                return Err(TransportError::InvalidInput(format!(
                    "Descriptor '{}' has an entry with multiplier {} and window [{}, {}]",
                    name, e.multiplier, e.emin, e.emax
                )));
            }
        }
        entries.sort_by(|a, b| a.emin.total_cmp(&b.emin));
        Ok(ReactionDescriptor {
            name,
            kind,
            material: Some(material),
            entries,
            table,
        })
    }

    /// Problem-wide delta-tracking majorant over all materials.
    pub fn majorant(name: impl Into<String>, table: TabulatedXs) -> Self {
        ReactionDescriptor {
            name: name.into(),
            kind: ReactionKind::Majorant,
            material: None,
            entries: Vec::new(),
            table: Some(table),
        }
    }

    /// Build the entries for MT `mt` of every constituent of `material`, with
    /// each window starting at the channel threshold.
    pub fn for_material(
        name: impl Into<String>,
        kind: ReactionKind,
        material_id: MaterialId,
        material: &Material,
        mt: i32,
        data: &dyn MicroscopicData,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(material.composition().len());
        for (i, c) in material.composition().iter().enumerate() {
            let reaction = MicroReaction {
                nuclide: c.nuclide,
                mt,
            };
            let emin = data.threshold(reaction)?;
            if emin.is_infinite() {
                continue;
            }
            entries.push(PartialEntry {
                reaction,
                constituent: i,
                multiplier: 1.0,
                emin,
                emax: f64::INFINITY,
            });
        }
        Self::new(name, kind, material_id, entries, None)
    }

    pub fn entries(&self) -> &[PartialEntry] {
        &self.entries
    }

    pub fn with_table(mut self, table: TabulatedXs) -> Self {
        self.table = Some(table);
        self
    }

    pub fn nuclides(&self) -> impl Iterator<Item = NuclideId> + '_ {
        self.entries.iter().map(|e| e.reaction.nuclide)
    }
}
