use crate::error::{Result, TransportError};
use crate::ids::{NuclideId, ReactionId};
use crate::nuclide::NuclideTable;

/// Avogadro's number scaled to atoms per barn-cm per (mol/cm3).
const AVOGADRO_BARN: f64 = 0.602214076;
/// Neutron mass in atomic mass units.
const NEUTRON_MASS_AMU: f64 = 1.00866491588;

/// One nuclide of a composition with its atomic density (atoms/b-cm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constituent {
    pub nuclide: NuclideId,
    pub density: f64,
}

/// How the material's temperature enters the cross sections.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TemperatureTreatment {
    /// Data are used as tabulated (pre-broadened).
    #[default]
    Tabulated,
    /// On-the-fly target motion sampling within a temperature window (K).
    Tms { t_min: f64, t_max: f64 },
}

/// Keys of the descriptors a material needs during tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialReactions {
    pub total: Option<ReactionId>,
    pub absorption: Option<ReactionId>,
    pub elastic: Option<ReactionId>,
    pub fission: Option<ReactionId>,
    /// Temperature majorant used by delta tracking through TMS materials.
    pub majorant: Option<ReactionId>,
}

/// A material: composition plus the little persistent state tracking needs.
///
/// Macroscopic cross sections are never stored here; they are always evaluated
/// on demand by [`crate::xs::CrossSectionEngine`] and memoized per thread.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub material_id: Option<u32>,
    composition: Vec<Constituent>,
    /// Temperature in K.
    pub temperature: f64,
    pub treatment: TemperatureTreatment,
    pub reactions: MaterialReactions,
    /// Owning rank under domain decomposition; `None` means replicated everywhere.
    pub owner_rank: Option<u32>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Material {
            name: name.into(),
            material_id: None,
            composition: Vec::new(),
            temperature: 293.6,
            treatment: TemperatureTreatment::Tabulated,
            reactions: MaterialReactions::default(),
            owner_rank: None,
        }
    }

    pub fn with_id(name: impl Into<String>, material_id: u32) -> Self {
        let mut material = Self::new(name);
        material.material_id = Some(material_id);
        material
    }

    /// Add or replace a nuclide's atomic density (atoms/b-cm).
    pub fn add_nuclide(&mut self, nuclide: NuclideId, density: f64) -> Result<()> {
        if !(density >= 0.0) || !density.is_finite() {
            return Err(TransportError::InvalidInput(format!(
                "Atomic density of a nuclide in material '{}' must be non-negative, got {}",
                self.name, density
            )));
        }
        match self.composition.iter_mut().find(|c| c.nuclide == nuclide) {
            Some(existing) => existing.density = density,
            None => self.composition.push(Constituent { nuclide, density }),
        }
        Ok(())
    }

    pub fn composition(&self) -> &[Constituent] {
        &self.composition
    }

    /// Position of `nuclide` in the composition, used by descriptor entries.
    pub fn constituent_index(&self, nuclide: NuclideId) -> Option<usize> {
        self.composition.iter().position(|c| c.nuclide == nuclide)
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        if !(temperature >= 0.0) {
            return Err(TransportError::InvalidInput(format!(
                "Temperature of material '{}' must be non-negative, got {}",
                self.name, temperature
            )));
        }
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_tms(&mut self, t_min: f64, t_max: f64) -> Result<()> {
        if !(t_min >= 0.0) || !(t_max >= t_min) {
            return Err(TransportError::InvalidInput(format!(
                "Invalid TMS window [{}, {}] for material '{}'",
                t_min, t_max, self.name
            )));
        }
        self.treatment = TemperatureTreatment::Tms { t_min, t_max };
        Ok(())
    }

    pub fn uses_tms(&self) -> bool {
        matches!(self.treatment, TemperatureTreatment::Tms { .. })
    }

    /// Temperature to broaden to at a collision. An externally supplied value
    /// wins over the nominal one; both are clamped into the TMS window.
    pub fn sampled_temperature(&self, external: Option<f64>) -> f64 {
        let t = external.unwrap_or(self.temperature);
        match self.treatment {
            TemperatureTreatment::Tms { t_min, t_max } => t.clamp(t_min, t_max),
            TemperatureTreatment::Tabulated => t,
        }
    }

    /// False when another rank owns this material.
    pub fn is_local(&self, rank: u32) -> bool {
        self.owner_rank.map_or(true, |owner| owner == rank)
    }

    pub fn total_atom_density(&self) -> f64 {
        self.composition.iter().map(|c| c.density).sum()
    }

    /// Mass density in g/cm3 from the atomic densities.
    pub fn mass_density(&self, nuclides: &NuclideTable) -> Result<f64> {
        let mut rho = 0.0;
        for c in &self.composition {
            let awr = nuclides.nuclide(c.nuclide)?.atomic_weight_ratio;
            rho += c.density * awr * NEUTRON_MASS_AMU / AVOGADRO_BARN;
        }
        Ok(rho)
    }
}
