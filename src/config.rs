// Run-wide tracking and cross-section settings
use crate::error::{Result, TransportError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

// Process-wide default settings, cloned into kernels and engines at setup time
pub static SETTINGS: Lazy<Mutex<Settings>> = Lazy::new(|| Mutex::new(Settings::default()));

/// What happens when a real collision is sampled in a cell without material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoidCollisionPolicy {
    /// Always a fatal error.
    #[default]
    Fatal,
    /// Fatal in exact surface tracking; logged and demoted to a virtual collision
    /// when the step runs in near-surface mode.
    DemoteInNearSurface,
}

/// Tracking and cross-section settings shared read-only by all worker threads.
///
/// Every field has a default so a JSON document only needs to name what it
/// overrides. A single global instance lives in [`SETTINGS`]; obtain it with
/// [`Settings::global`] and clone it into the kernel before transport starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Lower bound on the sampling cross section in surface tracking (1/cm).
    pub min_sampling_xs: f64,
    /// Distance a particle is pushed past a crossed surface (cm).
    pub surface_extrapolation: f64,
    /// Safety margin subtracted from boundary distances in near-surface mode (cm).
    pub near_surface_margin: f64,
    /// Run every surface-tracking step in near-surface mode (solid-model geometries).
    pub solid_near_surface: bool,
    /// Number of geometry errors per thread tolerated before aborting.
    pub max_geometry_errors: u64,
    pub void_collision_policy: VoidCollisionPolicy,
    /// Local-to-majorant ratio at or above which the hybrid step uses delta tracking.
    pub delta_tracking_threshold: f64,
    /// Universe nesting depth treated as a cyclic geometry.
    pub max_universe_depth: usize,
    pub tms_enabled: bool,
    pub ures_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            min_sampling_xs: 1e-3,
            surface_extrapolation: 1e-8,
            near_surface_margin: 1e-6,
            solid_near_surface: false,
            max_geometry_errors: 10_000,
            void_collision_policy: VoidCollisionPolicy::Fatal,
            delta_tracking_threshold: 0.9,
            max_universe_depth: 1000,
            tms_enabled: true,
            ures_enabled: true,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document, filling unspecified fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| TransportError::Configuration(format!("Invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make tracking ill-defined.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_sampling_xs > 0.0) || !self.min_sampling_xs.is_finite() {
            return Err(TransportError::Configuration(format!(
                "min_sampling_xs must be positive and finite, got {}",
                self.min_sampling_xs
            )));
        }
        if !(self.surface_extrapolation > 0.0) {
            return Err(TransportError::Configuration(format!(
                "surface_extrapolation must be positive, got {}",
                self.surface_extrapolation
            )));
        }
        if self.near_surface_margin < 0.0 {
            return Err(TransportError::Configuration(format!(
                "near_surface_margin cannot be negative, got {}",
                self.near_surface_margin
            )));
        }
        if !(0.0..=1.0).contains(&self.delta_tracking_threshold) {
            return Err(TransportError::Configuration(format!(
                "delta_tracking_threshold must lie in [0, 1], got {}",
                self.delta_tracking_threshold
            )));
        }
        if self.max_universe_depth == 0 {
            return Err(TransportError::Configuration(
                "max_universe_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the global settings instance
    pub fn global() -> MutexGuard<'static, Self> {
        SETTINGS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the global settings after validating them.
    pub fn set_global(settings: Settings) -> Result<()> {
        settings.validate()?;
        *Self::global() = settings;
        Ok(())
    }
}
