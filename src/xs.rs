// Macroscopic cross sections evaluated on demand with per-thread memoization
use crate::cache::CacheKey;
use crate::config::Settings;
use crate::context::ThreadContext;
use crate::corrections::{CorrectionInput, NoCorrections, XsCorrections};
use crate::error::{Result, TransportError};
use crate::ids::{MaterialId, ReactionId};
use crate::material::Material;
use crate::nuclide::MicroscopicData;
use crate::reaction::ReactionDescriptor;
use crate::tracking::LocalCrossSection;
use slotmap::SlotMap;

static NO_CORRECTIONS: NoCorrections = NoCorrections;

/// Density and temperature fields supplied by an external solver.
pub trait DensityCoupling: Send + Sync {
    fn is_coupled(&self, material: MaterialId) -> bool;

    /// Multiplier on every atomic density of `material` at `position`.
    fn density_factor(&self, material: MaterialId, position: [f64; 3]) -> Result<f64>;

    /// Local temperature (K), if the solver provides one.
    fn temperature(&self, _material: MaterialId, _position: [f64; 3]) -> Option<f64> {
        None
    }
}

/// Evaluates `Σ(E)` for reaction descriptors.
///
/// Shared read-only by every worker; all mutable state (cache, random stream,
/// collision index) lives in the caller's [`ThreadContext`].
pub struct CrossSectionEngine<'a> {
    materials: &'a SlotMap<MaterialId, Material>,
    reactions: &'a SlotMap<ReactionId, ReactionDescriptor>,
    data: &'a dyn MicroscopicData,
    settings: Settings,
    coupling: Option<&'a dyn DensityCoupling>,
    corrections: &'a dyn XsCorrections,
}

impl<'a> CrossSectionEngine<'a> {
    pub fn new(
        materials: &'a SlotMap<MaterialId, Material>,
        reactions: &'a SlotMap<ReactionId, ReactionDescriptor>,
        data: &'a dyn MicroscopicData,
        settings: Settings,
    ) -> Self {
        CrossSectionEngine {
            materials,
            reactions,
            data,
            settings,
            coupling: None,
            corrections: &NO_CORRECTIONS,
        }
    }

    /// Engine using a snapshot of the process-wide [`Settings::global`].
    pub fn from_global(
        materials: &'a SlotMap<MaterialId, Material>,
        reactions: &'a SlotMap<ReactionId, ReactionDescriptor>,
        data: &'a dyn MicroscopicData,
    ) -> Self {
        let settings = Settings::global().clone();
        Self::new(materials, reactions, data, settings)
    }

    pub fn with_coupling(mut self, coupling: &'a dyn DensityCoupling) -> Self {
        self.coupling = Some(coupling);
        self
    }

    pub fn with_corrections(mut self, corrections: &'a dyn XsCorrections) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn data(&self) -> &dyn MicroscopicData {
        self.data
    }

    pub fn materials(&self) -> &SlotMap<MaterialId, Material> {
        self.materials
    }

    pub fn material(&self, id: MaterialId) -> Result<&Material> {
        self.materials
            .get(id)
            .ok_or_else(|| TransportError::invalid_reference("material", format!("{:?}", id)))
    }

    pub fn descriptor(&self, id: ReactionId) -> Result<&ReactionDescriptor> {
        self.reactions
            .get(id)
            .ok_or_else(|| TransportError::invalid_reference("reaction", format!("{:?}", id)))
    }

    /// Macroscopic cross section (1/cm) of `reaction` at `energy` (eV).
    ///
    /// Values that depend only on energy are memoized by energy; values that
    /// are resampled at every collision (target motion, coupled densities,
    /// probability tables) by the thread's collision index.
    pub fn macro_xs(&self, reaction: ReactionId, energy: f64, ctx: &mut ThreadContext) -> Result<f64> {
        self.evaluate(reaction, energy, ctx, false)
    }

    /// Upper bound of `Σ(E)` over everything resampled per collision.
    ///
    /// Probability-table corrections take their largest band factor. Target
    /// motion has no bound here; such materials need a temperature majorant.
    /// Bounds are not memoized.
    pub fn bounding_xs(&self, reaction: ReactionId, energy: f64, ctx: &mut ThreadContext) -> Result<f64> {
        self.evaluate(reaction, energy, ctx, true)
    }

    fn evaluate(&self, reaction: ReactionId, energy: f64, ctx: &mut ThreadContext, bound: bool) -> Result<f64> {
        if !(energy >= 0.0) || !energy.is_finite() {
            return Err(TransportError::InvalidInput(format!(
                "Cannot evaluate cross sections at E = {} eV",
                energy
            )));
        }
        let desc = self.descriptor(reaction)?;
        let material = match desc.material {
            Some(id) => Some((id, self.material(id)?)),
            None => None,
        };
        let kind = desc.kind;

        let tms_active = self.settings.tms_enabled
            && !kind.is_majorant()
            && material.map_or(false, |(_, m)| m.uses_tms());
        let coupled = match (self.coupling, material) {
            (Some(c), Some((id, _))) => c.is_coupled(id),
            _ => false,
        };
        let per_collision = tms_active
            || coupled
            || (self.settings.ures_enabled && self.corrections.varies_per_collision(kind));
        let key = if per_collision {
            CacheKey::collision(ctx.collision_index, energy)
        } else {
            CacheKey::energy(energy)
        };

        if bound && tms_active {
            return Err(TransportError::Configuration(format!(
                "'{}' is sampled with target motion and cannot be bounded pointwise",
                desc.name
            )));
        }
        if !bound {
            if let Some(value) = ctx.cache.get(reaction, key) {
                return Ok(value);
            }
        }

        let factor = match (coupled, self.coupling, material) {
            (true, Some(c), Some((id, _))) => c.density_factor(id, ctx.position)?,
            _ => 1.0,
        };

        let mut value = match (&desc.table, material) {
            (Some(table), _) if !tms_active => {
                let base = table.evaluate(energy);
                if kind.is_majorant() {
                    base
                } else {
                    base * factor
                }
            }
            (_, Some((id, m))) if tms_active => {
                let external = self
                    .coupling
                    .filter(|_| coupled)
                    .and_then(|c| c.temperature(id, ctx.position));
                let temperature = m.sampled_temperature(external);
                factor * self.doppler_sum(desc, m, energy, temperature, ctx)?
            }
            (_, Some((_, m))) => factor * self.partial_sum(desc, m, energy)?,
            (_, None) => {
                return Err(TransportError::InvalidInput(format!(
                    "Descriptor '{}' has neither a material nor a table",
                    desc.name
                )))
            }
        };

        let sample_bands = self.settings.ures_enabled && !bound && self.corrections.varies_per_collision(kind);
        if sample_bands {
            for entry in desc.entries() {
                if energy < entry.emin {
                    break;
                }
                if energy <= entry.emax && self.corrections.samples_band(entry.reaction.nuclide) {
                    ctx.band_uniform(entry.reaction.nuclide);
                }
            }
        }

        let input = CorrectionInput {
            descriptor: desc,
            material,
            energy,
            collision_index: ctx.collision_index,
            data: self.data,
            bands: &ctx.bands,
            bound,
        };
        if kind.takes_poison_correction() {
            value += self.corrections.poison_equilibrium(&input)?;
        }
        if kind.takes_search_correction() {
            value += self.corrections.concentration_search(&input)?;
        }
        if self.settings.ures_enabled {
            value += self.corrections.unresolved_resonance(&input)?;
        }

        if !(value >= 0.0) || !value.is_finite() {
            return Err(TransportError::NegativeCrossSection {
                reaction: desc.name.clone(),
                material: material.map_or_else(|| "<majorant>".to_string(), |(_, m)| m.name.clone()),
                energy,
                value,
            });
        }

        if !bound {
            ctx.cache.store(reaction, key, value);
        }
        Ok(value)
    }

    /// Total macroscopic cross section of a material.
    pub fn total_xs(&self, material: MaterialId, energy: f64, ctx: &mut ThreadContext) -> Result<f64> {
        let m = self.material(material)?;
        let total = m.reactions.total.ok_or_else(|| {
            TransportError::Configuration(format!("Material '{}' has no total cross section", m.name))
        })?;
        self.macro_xs(total, energy, ctx)
    }

    // Σ multiplier × N × σ(E) over entries, stopping at the first threshold above E.
    fn partial_sum(&self, desc: &ReactionDescriptor, material: &Material, energy: f64) -> Result<f64> {
        let mut sum = 0.0;
        for entry in desc.entries() {
            if energy < entry.emin {
                break;
            }
            if energy > entry.emax {
                continue;
            }
            let density = constituent_density(material, entry.constituent)?;
            sum += entry.multiplier * density * self.data.micro_xs(entry.reaction, energy)?;
        }
        Ok(sum)
    }

    fn doppler_sum(
        &self,
        desc: &ReactionDescriptor,
        material: &Material,
        energy: f64,
        temperature: f64,
        ctx: &mut ThreadContext,
    ) -> Result<f64> {
        let mut sum = 0.0;
        for entry in desc.entries() {
            if energy < entry.emin {
                break;
            }
            if energy > entry.emax {
                continue;
            }
            let density = constituent_density(material, entry.constituent)?;
            let micro =
                self.data
                    .micro_xs_doppler(entry.reaction, energy, temperature, ctx.rng.as_mut())?;
            sum += entry.multiplier * density * micro;
        }
        Ok(sum)
    }
}

fn constituent_density(material: &Material, constituent: usize) -> Result<f64> {
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

impl LocalCrossSection for CrossSectionEngine<'_> {
    fn local_total(
        &self,
        material: Option<MaterialId>,
        energy: f64,
        ctx: &mut ThreadContext,
    ) -> Result<f64> {
        match material {
            Some(m) => self.total_xs(m, energy, ctx),
            None => Ok(0.0),
        }
    }

    fn material_label(&self, material: MaterialId) -> String {
        self.materials
            .get(material)
            .map_or_else(|| format!("{:?}", material), |m| m.name.clone())
    }
}
