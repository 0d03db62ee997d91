use crate::error::{Result, TransportError};
use crate::ids::CellId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleType {
    #[default]
    Neutron,
    Photon,
}

/// Phase-space state of the particle being tracked.
#[derive(Debug, Clone)]
pub struct ParticleState {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    /// Energy in eV.
    pub energy: f64,
    pub particle_type: ParticleType,
    /// Cell found at the last location, `None` once the particle has escaped.
    pub cell: Option<CellId>,
    /// Run the next step in near-surface (or delta-tracking) mode.
    pub force_near_surface: bool,
}

impl ParticleState {
    pub fn new(position: [f64; 3], direction: [f64; 3], energy: f64) -> Self {
        Self {
            position,
            direction,
            energy,
            particle_type: ParticleType::Neutron,
            cell: None,
            force_near_surface: false,
        }
    }

    #[inline]
    pub fn advance(&mut self, distance: f64) {
        for i in 0..3 {
            self.position[i] += distance * self.direction[i];
        }
    }

    /// Reject directions that are not unit vectors and non-finite coordinates.
    pub fn validate(&self) -> Result<()> {
        let [u, v, w] = self.direction;
        let norm2 = u * u + v * v + w * w;
        if !norm2.is_finite() || (norm2 - 1.0).abs() > 1e-5 {
            return Err(TransportError::InvalidDirection { u, v, w });
        }
        let [x, y, z] = self.position;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(TransportError::NonFinitePosition { x, y, z });
        }
        if !(self.energy > 0.0) || !self.energy.is_finite() {
            return Err(TransportError::InvalidInput(format!(
                "Particle energy must be positive and finite, got {}",
                self.energy
            )));
        }
        Ok(())
    }
}
