// Union energy grid and the interpolation rules used by tabulated cross sections
use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};

/// How tabulated values between grid points are reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    /// Lin-lin between the bracketing points.
    Linear,
    /// Left-hand value over the whole bin. Used for temperature majorants, which
    /// are tabulated as the bin maximum and must bound rather than average.
    Histogram,
}

/// Strictly increasing energy grid (eV) shared by every nuclide and table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyGrid {
    energies: Vec<f64>,
}

impl EnergyGrid {
    pub fn new(energies: Vec<f64>) -> Result<Self> {
        if energies.len() < 2 {
            return Err(TransportError::InvalidInput(format!(
                "Energy grid needs at least two points, got {}",
                energies.len()
            )));
        }
        if energies.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return Err(TransportError::InvalidInput(
                "Energy grid contains negative or non-finite values".to_string(),
            ));
        }
        if energies.windows(2).any(|w| w[1] <= w[0]) {
            return Err(TransportError::InvalidInput(
                "Energy grid must be strictly increasing".to_string(),
            ));
        }
        Ok(EnergyGrid { energies })
    }

    /// Log-spaced grid with `points` points between `emin` and `emax`.
    pub fn log_spaced(emin: f64, emax: f64, points: usize) -> Result<Self> {
        if !(emin > 0.0) || !(emax > emin) || points < 2 {
            return Err(TransportError::InvalidInput(format!(
                "Cannot build log grid from {} to {} with {} points",
                emin, emax, points
            )));
        }
        let step = (emax / emin).ln() / (points - 1) as f64;
        let mut energies: Vec<f64> = (0..points).map(|i| emin * (step * i as f64).exp()).collect();
        energies[points - 1] = emax;
        Self::new(energies)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.energies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    #[inline]
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    #[inline]
    pub fn first(&self) -> f64 {
        self.energies[0]
    }

    #[inline]
    pub fn last(&self) -> f64 {
        self.energies[self.energies.len() - 1]
    }

    /// Index `i` with `E[i] <= energy < E[i + 1]`, or `n - 1` when `energy` sits
    /// exactly on the last point. `None` outside the tabulated range.
    pub fn find_interval(&self, energy: f64) -> Option<usize> {
        let n = self.energies.len();
        if !(energy >= self.energies[0]) || energy > self.energies[n - 1] {
            return None;
        }
        if energy == self.energies[n - 1] {
            return Some(n - 1);
        }
        // largest i with E[i] <= energy
        let mut low = 0usize;
        let mut high = n - 1;
        while high - low > 1 {
            let mid = (low + high) >> 1;
            if self.energies[mid] <= energy {
                low = mid;
            } else {
                high = mid;
            }
        }
        Some(low)
    }

    /// Interpolate `values` (one per grid point) at `energy`.
    ///
    /// Returns 0 outside the grid. The final point never reads past the last
    /// index: it returns its own value unchanged.
    pub fn interpolate(&self, values: &[f64], energy: f64, mode: Interpolation) -> f64 {
        debug_assert_eq!(values.len(), self.energies.len());
        let Some(i) = self.find_interval(energy) else {
            return 0.0;
        };
        if i + 1 >= self.energies.len() {
            return values[i];
        }
        match mode {
            Interpolation::Histogram => values[i],
            Interpolation::Linear => {
                let e0 = self.energies[i];
                let e1 = self.energies[i + 1];
                values[i] + (energy - e0) * (values[i + 1] - values[i]) / (e1 - e0)
            }
        }
    }

    /// Interpolate a reaction that starts at `threshold_idx` on this grid; below the
    /// threshold the value is zero.
    pub fn interpolate_from(&self, threshold_idx: usize, values: &[f64], energy: f64) -> f64 {
        let Some(i) = self.find_interval(energy) else {
            return 0.0;
        };
        if i < threshold_idx {
            return 0.0;
        }
        let k = i - threshold_idx;
        if k >= values.len() {
            return 0.0;
        }
        if k + 1 >= values.len() || i + 1 >= self.energies.len() {
            return values[k];
        }
        let e0 = self.energies[i];
        let e1 = self.energies[i + 1];
        values[k] + (energy - e0) * (values[k + 1] - values[k]) / (e1 - e0)
    }
}
