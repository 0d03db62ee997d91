// Additive corrections applied on top of the plain macroscopic sums
use crate::context::BandDraws;
use crate::error::{Result, TransportError};
use crate::ids::{MaterialId, NuclideId};
use crate::material::Material;
use crate::nuclide::{MicroReaction, MicroscopicData, MT_ABSORPTION, MT_TOTAL};
use crate::reaction::{ReactionDescriptor, ReactionKind};
use std::collections::HashMap;

/// Everything a correction may look at for one evaluation.
pub struct CorrectionInput<'a> {
    pub descriptor: &'a ReactionDescriptor,
    pub material: Option<(MaterialId, &'a Material)>,
    pub energy: f64,
    pub collision_index: u64,
    pub data: &'a dyn MicroscopicData,
    /// Band uniforms already drawn by the calling thread for this collision.
    pub bands: &'a BandDraws,
    /// Evaluate the upper envelope of every sampled correction instead of one sample.
    pub bound: bool,
}

impl CorrectionInput<'_> {
    fn density(&self, constituent: usize) -> Result<f64> {
        let Some((_, material)) = self.material else {
            return Ok(0.0);
        };
        material
            .composition()
            .get(constituent)
            .map(|c| c.density)
            .ok_or_else(|| {
                TransportError::invalid_reference(
                    "constituent",
                    format!("{} in material '{}'", constituent, material.name),
                )
            })
    }
}

/// Hooks called by the cross-section engine after the base value is formed.
/// Each returns a value added to the macroscopic cross section.
pub trait XsCorrections: Send + Sync {
    fn poison_equilibrium(&self, _input: &CorrectionInput) -> Result<f64> {
        Ok(0.0)
    }

    fn concentration_search(&self, _input: &CorrectionInput) -> Result<f64> {
        Ok(0.0)
    }

    fn unresolved_resonance(&self, _input: &CorrectionInput) -> Result<f64> {
        Ok(0.0)
    }

    /// True when the corrected value of `kind` changes from one collision to
    /// the next at the same energy.
    fn varies_per_collision(&self, _kind: ReactionKind) -> bool {
        false
    }

    /// True when `nuclide` needs a band uniform drawn at every collision.
    fn samples_band(&self, _nuclide: NuclideId) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrections;

impl XsCorrections for NoCorrections {}

// MT number a correction reads for a descriptor kind.
fn channel_for(kind: ReactionKind) -> Option<i32> {
    match kind {
        ReactionKind::Total | ReactionKind::Majorant | ReactionKind::TemperatureMajorant => {
            Some(MT_TOTAL)
        }
        ReactionKind::Absorption => Some(MT_ABSORPTION),
        _ => None,
    }
}

/// Equilibrium concentrations of fission-product poisons (Xe-135, Sm-149)
/// that are not part of the nominal composition.
#[derive(Debug, Clone, Default)]
pub struct EquilibriumPoisons {
    by_material: HashMap<MaterialId, Vec<(NuclideId, f64)>>,
}

impl EquilibriumPoisons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_density(&mut self, material: MaterialId, nuclide: NuclideId, density: f64) -> Result<()> {
        if !(density >= 0.0) || !density.is_finite() {
            return Err(TransportError::InvalidInput(format!(
                "Poison density must be non-negative, got {}",
                density
            )));
        }
        let list = self.by_material.entry(material).or_default();
        match list.iter_mut().find(|(n, _)| *n == nuclide) {
            Some(entry) => entry.1 = density,
            None => list.push((nuclide, density)),
        }
        Ok(())
    }

    /// Set the equilibrium density from production and loss rates:
    /// `N = yield × fission_rate / (decay_constant + absorption_rate)`, where
    /// the absorption rate is per atom.
    pub fn update_equilibrium(
        &mut self,
        material: MaterialId,
        nuclide: NuclideId,
        cumulative_yield: f64,
        fission_rate: f64,
        decay_constant: f64,
        absorption_rate: f64,
    ) -> Result<f64> {
        let loss = decay_constant + absorption_rate;
        if !(loss > 0.0) {
            return Err(TransportError::InvalidInput(format!(
                "Poison loss rate must be positive, got {}",
                loss
            )));
        }
        let density = cumulative_yield * fission_rate / loss;
        self.set_density(material, nuclide, density)?;
        Ok(density)
    }

    pub fn density(&self, material: MaterialId, nuclide: NuclideId) -> Option<f64> {
        self.by_material
            .get(&material)?
            .iter()
            .find(|(n, _)| *n == nuclide)
            .map(|(_, d)| *d)
    }
}

impl XsCorrections for EquilibriumPoisons {
    fn poison_equilibrium(&self, input: &CorrectionInput) -> Result<f64> {
        let (Some((id, _)), Some(mt)) = (input.material, channel_for(input.descriptor.kind)) else {
            return Ok(0.0);
        };
        let Some(poisons) = self.by_material.get(&id) else {
            return Ok(0.0);
        };
        let mut sum = 0.0;
        for (nuclide, density) in poisons {
            let micro = input.data.micro_xs(MicroReaction { nuclide: *nuclide, mt }, input.energy)?;
            sum += density * micro;
        }
        Ok(sum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchTarget {
    pub nuclide: NuclideId,
    /// Change of atomic density (atoms/b-cm) found by the current iteration.
    pub adjustment: f64,
}

/// Iterated critical concentration search (e.g. soluble boron).
#[derive(Debug, Clone, Default)]
pub struct ConcentrationSearch {
    targets: HashMap<MaterialId, SearchTarget>,
}

impl ConcentrationSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(&mut self, material: MaterialId, nuclide: NuclideId) {
        self.targets.insert(
            material,
            SearchTarget {
                nuclide,
                adjustment: 0.0,
            },
        );
    }

    /// Between iterations only; caches must be invalidated afterwards.
    pub fn set_adjustment(&mut self, material: MaterialId, adjustment: f64) -> Result<()> {
        let target = self.targets.get_mut(&material).ok_or_else(|| {
            TransportError::invalid_reference("search target", format!("{:?}", material))
        })?;
        if !adjustment.is_finite() {
            return Err(TransportError::InvalidInput(format!(
                "Search adjustment must be finite, got {}",
                adjustment
            )));
        }
        target.adjustment = adjustment;
        Ok(())
    }

    pub fn target(&self, material: MaterialId) -> Option<&SearchTarget> {
        self.targets.get(&material)
    }
}

impl XsCorrections for ConcentrationSearch {
    fn concentration_search(&self, input: &CorrectionInput) -> Result<f64> {
        let Some(mt) = channel_for(input.descriptor.kind) else {
            return Ok(0.0);
        };
        if input.descriptor.kind == ReactionKind::Majorant {
            // the majorant only ever grows with the searched concentration
            let mut extra: f64 = 0.0;
            for target in self.targets.values() {
                if target.adjustment > 0.0 {
                    let micro = input
                        .data
                        .micro_xs(MicroReaction { nuclide: target.nuclide, mt }, input.energy)?;
                    extra = extra.max(target.adjustment * micro);
                }
            }
            return Ok(extra);
        }
        let Some((id, _)) = input.material else {
            return Ok(0.0);
        };
        let Some(target) = self.targets.get(&id) else {
            return Ok(0.0);
        };
        let micro = input
            .data
            .micro_xs(MicroReaction { nuclide: target.nuclide, mt }, input.energy)?;
        Ok(target.adjustment * micro)
    }
}

/// Probability table of one nuclide in the unresolved resonance range.
///
/// At each tabulated energy the bands have cumulative probabilities `cdf`
/// (ending at 1) and, per MT number, multiplicative factors on the smooth
/// cross section.
#[derive(Debug, Clone)]
pub struct ProbabilityTable {
    energies: Vec<f64>,
    cdf: Vec<Vec<f64>>,
    factors: HashMap<i32, Vec<Vec<f64>>>,
}

impl ProbabilityTable {
    pub fn new(
        energies: Vec<f64>,
        cdf: Vec<Vec<f64>>,
        factors: HashMap<i32, Vec<Vec<f64>>>,
    ) -> Result<Self> {
        let bad = |msg: &str| TransportError::InvalidInput(format!("Probability table: {}", msg));
        if energies.is_empty() || energies.windows(2).any(|w| w[1] <= w[0]) {
            return Err(bad("energies must be non-empty and strictly increasing"));
        }
        if cdf.len() != energies.len() {
            return Err(bad("one band distribution per energy required"));
        }
        for bands in &cdf {
            if bands.is_empty()
                || bands.windows(2).any(|w| w[1] < w[0])
                || (bands[bands.len() - 1] - 1.0).abs() > 1e-9
            {
                return Err(bad("band probabilities must be cumulative and end at 1"));
            }
        }
        for per_energy in factors.values() {
            if per_energy.len() != energies.len()
                || per_energy
                    .iter()
                    .zip(&cdf)
                    .any(|(f, c)| f.len() != c.len() || f.iter().any(|x| !(*x >= 0.0)))
            {
                return Err(bad("factors must match the band layout and be non-negative"));
            }
        }
        Ok(ProbabilityTable {
            energies,
            cdf,
            factors,
        })
    }

    fn interval(&self, energy: f64) -> Option<usize> {
        let n = self.energies.len();
        if energy < self.energies[0] || energy > self.energies[n - 1] {
            return None;
        }
        Some(self.energies.partition_point(|e| *e <= energy).saturating_sub(1))
    }

    /// Factor of band selected by `xi` in [0, 1), or `None` outside the table.
    pub fn sample_factor(&self, mt: i32, energy: f64, xi: f64) -> Option<f64> {
        let i = self.interval(energy)?;
        let factors = self.factors.get(&mt)?;
        let bands = &self.cdf[i];
        let band = bands.iter().position(|c| xi < *c).unwrap_or(bands.len() - 1);
        Some(factors[i][band])
    }

    /// Largest factor at `energy`, for majorants.
    pub fn max_factor(&self, mt: i32, energy: f64) -> Option<f64> {
        let i = self.interval(energy)?;
        self.factors
            .get(&mt)
            .map(|f| f[i].iter().copied().fold(0.0, f64::max))
    }
}

/// Unresolved resonance self-shielding by probability tables.
///
/// The band uniform is drawn by the engine from the thread's stream once per
/// nuclide and collision, so every reaction of a nuclide sees the same band.
#[derive(Debug, Clone, Default)]
pub struct UresCorrection {
    tables: HashMap<NuclideId, ProbabilityTable>,
}

impl UresCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, nuclide: NuclideId, table: ProbabilityTable) {
        self.tables.insert(nuclide, table);
    }
}

impl XsCorrections for UresCorrection {
    fn unresolved_resonance(&self, input: &CorrectionInput) -> Result<f64> {
        if self.tables.is_empty() {
            return Ok(0.0);
        }
        let majorant = input.bound || input.descriptor.kind.is_majorant();
        let mut delta = 0.0;
        for entry in input.descriptor.entries() {
            if input.energy < entry.emin {
                break;
            }
            if input.energy > entry.emax {
                continue;
            }
            let nuclide = entry.reaction.nuclide;
            let Some(table) = self.tables.get(&nuclide) else {
                continue;
            };
            let factor = if majorant {
                table
                    .max_factor(entry.reaction.mt, input.energy)
                    .map(|f| f.max(1.0))
            } else {
                let xi = input.bands.get(input.collision_index, nuclide).ok_or_else(|| {
                    TransportError::InvalidInput(format!(
                        "No probability-table band drawn for nuclide {:?} at collision {}",
                        nuclide, input.collision_index
                    ))
                })?;
                table.sample_factor(entry.reaction.mt, input.energy, xi)
            };
            let Some(factor) = factor else {
                continue;
            };
            let smooth = input.data.micro_xs(entry.reaction, input.energy)?;
            delta += entry.multiplier * input.density(entry.constituent)? * smooth * (factor - 1.0);
        }
        Ok(delta)
    }

    fn varies_per_collision(&self, kind: ReactionKind) -> bool {
        !self.tables.is_empty() && !kind.is_majorant()
    }

    fn samples_band(&self, nuclide: NuclideId) -> bool {
        self.tables.contains_key(&nuclide)
    }
}

/// The production set of corrections; absent parts contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct StandardCorrections {
    pub poisons: Option<EquilibriumPoisons>,
    pub search: Option<ConcentrationSearch>,
    pub ures: Option<UresCorrection>,
}

impl XsCorrections for StandardCorrections {
    fn poison_equilibrium(&self, input: &CorrectionInput) -> Result<f64> {
        self.poisons
            .as_ref()
            .map_or(Ok(0.0), |p| p.poison_equilibrium(input))
    }

    fn concentration_search(&self, input: &CorrectionInput) -> Result<f64> {
        self.search
            .as_ref()
            .map_or(Ok(0.0), |s| s.concentration_search(input))
    }

    fn unresolved_resonance(&self, input: &CorrectionInput) -> Result<f64> {
        self.ures
            .as_ref()
            .map_or(Ok(0.0), |u| u.unresolved_resonance(input))
    }

    fn varies_per_collision(&self, kind: ReactionKind) -> bool {
        self.ures
            .as_ref()
            .map_or(false, |u| u.varies_per_collision(kind))
    }

    fn samples_band(&self, nuclide: NuclideId) -> bool {
        self.ures.as_ref().map_or(false, |u| u.samples_band(nuclide))
    }
}
