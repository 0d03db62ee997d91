// Microscopic nuclide data on a shared union energy grid
use crate::error::{Result, TransportError};
use crate::grid::EnergyGrid;
use crate::ids::NuclideId;
use crate::rng::UniformSource;
use nalgebra::Vector3;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Boltzmann constant in eV/K
pub const K_BOLTZMANN: f64 = 8.617333262e-5;

pub const MT_TOTAL: i32 = 1;
pub const MT_ELASTIC: i32 = 2;
pub const MT_FISSION: i32 = 18;
pub const MT_ABSORPTION: i32 = 101;
pub const MT_CAPTURE: i32 = 102;

/// A microscopic reaction channel of one nuclide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MicroReaction {
    pub nuclide: NuclideId,
    pub mt: i32,
}

/// Source of microscopic cross sections, read-only during transport.
///
/// Implementations are shared by every worker thread; anything random (the
/// Doppler variant) draws from the caller's stream.
pub trait MicroscopicData: Send + Sync {
    /// Microscopic cross section (barns) at the data temperature.
    fn micro_xs(&self, reaction: MicroReaction, energy: f64) -> Result<f64>;

    /// Microscopic cross section seen by a neutron colliding with a target in
    /// thermal motion at `temperature` (K). One random sample per call.
    fn micro_xs_doppler(
        &self,
        reaction: MicroReaction,
        energy: f64,
        temperature: f64,
        rng: &mut dyn UniformSource,
    ) -> Result<f64>;

    /// Lowest energy at which the channel is non-zero.
    fn threshold(&self, reaction: MicroReaction) -> Result<f64>;
}

/// Channel tabulated from `threshold_idx` to the end of the union grid.
#[derive(Debug, Clone)]
pub struct NuclideReaction {
    pub mt: i32,
    pub threshold_idx: usize,
    pub cross_section: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Nuclide {
    pub name: String,
    /// Target mass over neutron mass.
    pub atomic_weight_ratio: f64,
    /// Temperature (K) the tabulated data were broadened to.
    pub temperature: f64,
    pub reactions: HashMap<i32, NuclideReaction>,
}

/// All nuclides of a problem, tabulated on one union grid.
#[derive(Debug, Clone)]
pub struct NuclideTable {
    grid: Arc<EnergyGrid>,
    nuclides: SlotMap<NuclideId, Nuclide>,
    by_name: HashMap<String, NuclideId>,
}

impl NuclideTable {
    pub fn new(grid: Arc<EnergyGrid>) -> Self {
        NuclideTable {
            grid,
            nuclides: SlotMap::with_key(),
            by_name: HashMap::new(),
        }
    }

    pub fn grid(&self) -> &Arc<EnergyGrid> {
        &self.grid
    }

    pub fn add_nuclide(
        &mut self,
        name: impl Into<String>,
        atomic_weight_ratio: f64,
        temperature: f64,
    ) -> Result<NuclideId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(TransportError::InvalidInput(format!(
                "Nuclide '{}' already present",
                name
            )));
        }
        if !(atomic_weight_ratio > 0.0) || !(temperature >= 0.0) {
            return Err(TransportError::InvalidInput(format!(
                "Nuclide '{}' needs positive AWR and non-negative temperature",
                name
            )));
        }
        let id = self.nuclides.insert(Nuclide {
            name: name.clone(),
            atomic_weight_ratio,
            temperature,
            reactions: HashMap::new(),
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn nuclide(&self, id: NuclideId) -> Result<&Nuclide> {
        self.nuclides
            .get(id)
            .ok_or_else(|| TransportError::invalid_reference("nuclide", format!("{:?}", id)))
    }

    pub fn id_of(&self, name: &str) -> Option<NuclideId> {
        self.by_name.get(name).copied()
    }

    /// Store a channel already tabulated on the union grid from `threshold_idx`.
    pub fn set_reaction(
        &mut self,
        nuclide: NuclideId,
        mt: i32,
        threshold_idx: usize,
        cross_section: Vec<f64>,
    ) -> Result<()> {
        let expected = self.grid.len().saturating_sub(threshold_idx);
        if threshold_idx >= self.grid.len() || cross_section.len() != expected {
            return Err(TransportError::InvalidInput(format!(
                "MT {} needs {} values from threshold index {}, got {}",
                mt,
                expected,
                threshold_idx,
                cross_section.len()
            )));
        }
        if cross_section.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(TransportError::InvalidInput(format!(
                "MT {} contains negative or non-finite values",
                mt
            )));
        }
        let entry = self
            .nuclides
            .get_mut(nuclide)
            .ok_or_else(|| TransportError::invalid_reference("nuclide", format!("{:?}", nuclide)))?;
        entry.reactions.insert(
            mt,
            NuclideReaction {
                mt,
                threshold_idx,
                cross_section,
            },
        );
        Ok(())
    }

    /// Interpolate pointwise data onto the union grid; points below the first
    /// pointwise energy are dropped and set the threshold.
    pub fn set_reaction_pointwise(
        &mut self,
        nuclide: NuclideId,
        mt: i32,
        energies: &[f64],
        cross_section: &[f64],
    ) -> Result<()> {
        if energies.is_empty() || energies.len() != cross_section.len() {
            return Err(TransportError::InvalidInput(format!(
                "MT {} pointwise data has mismatched lengths",
                mt
            )));
        }
        let union = self.grid.energies();
        let threshold_idx = union.partition_point(|e| *e < energies[0]);
        if threshold_idx >= union.len() {
            return Err(TransportError::InvalidInput(format!(
                "MT {} threshold {} lies above the union grid",
                mt, energies[0]
            )));
        }
        let values = union[threshold_idx..]
            .iter()
            .map(|&e| interpolate_pointwise(energies, cross_section, e))
            .collect();
        self.set_reaction(nuclide, mt, threshold_idx, values)
    }

    fn channel(&self, reaction: MicroReaction) -> Result<(&Nuclide, Option<&NuclideReaction>)> {
        let nuclide = self.nuclide(reaction.nuclide)?;
        Ok((nuclide, nuclide.reactions.get(&reaction.mt)))
    }

    fn lookup(&self, channel: &NuclideReaction, energy: f64) -> f64 {
        self.grid
            .interpolate_from(channel.threshold_idx, &channel.cross_section, energy)
    }
}

// Lin-lin interpolation of pointwise data, clamped to the end values.
fn interpolate_pointwise(x: &[f64], y: &[f64], x_new: f64) -> f64 {
    let n = x.len();
    if n == 1 || x_new <= x[0] {
        return y[0];
    }
    if x_new >= x[n - 1] {
        return y[n - 1];
    }
    let i = x.partition_point(|v| *v <= x_new) - 1;
    y[i] + (x_new - x[i]) * (y[i + 1] - y[i]) / (x[i + 1] - x[i])
}

// Standard normal deviate by Box-Muller.
fn sample_normal(rng: &mut dyn UniformSource) -> f64 {
    let u1 = 1.0 - rng.uniform();
    let u2 = rng.uniform();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl MicroscopicData for NuclideTable {
    fn micro_xs(&self, reaction: MicroReaction, energy: f64) -> Result<f64> {
        let (_, channel) = self.channel(reaction)?;
        Ok(channel.map_or(0.0, |c| self.lookup(c, energy)))
    }

    /// Target-motion sampling: draw a Maxwellian target velocity at the
    /// temperature above the data temperature, evaluate the 0 K-style table at
    /// the relative energy and weight by relative over lab speed.
    fn micro_xs_doppler(
        &self,
        reaction: MicroReaction,
        energy: f64,
        temperature: f64,
        rng: &mut dyn UniformSource,
    ) -> Result<f64> {
        let (nuclide, channel) = self.channel(reaction)?;
        let Some(channel) = channel else {
            return Ok(0.0);
        };
        let delta_t = temperature - nuclide.temperature;
        if delta_t <= 0.0 || energy <= 0.0 {
            return Ok(self.lookup(channel, energy));
        }

        // Speeds in sqrt(eV) with E = v^2 for the neutron; target mass is AWR
        // times larger so each velocity component has variance kT / (2 AWR).
        let sigma = (K_BOLTZMANN * delta_t / (2.0 * nuclide.atomic_weight_ratio)).sqrt();
        let v_target = Vector3::new(
            sigma * sample_normal(rng),
            sigma * sample_normal(rng),
            sigma * sample_normal(rng),
        );
        let v_neutron = Vector3::new(0.0, 0.0, energy.sqrt());
        let v_rel = (v_neutron - v_target).norm();
        let e_rel = v_rel * v_rel;

        Ok(self.lookup(channel, e_rel) * v_rel / v_neutron.z)
    }

    fn threshold(&self, reaction: MicroReaction) -> Result<f64> {
        let (_, channel) = self.channel(reaction)?;
        Ok(channel.map_or(f64::INFINITY, |c| self.grid.energies()[c.threshold_idx]))
    }
}
