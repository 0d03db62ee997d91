use thiserror::Error;

/// Every fatal condition raised by the transport kernel.
///
/// Contract violations and configuration errors terminate the run. Geometry
/// imprecision is absorbed by the tracking kernel and only surfaces here once the
/// per-thread error count passes the configured tolerance.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    // Contract violations
    #[error("Invalid {entity} reference: {detail}")]
    InvalidReference { entity: &'static str, detail: String },

    #[error("Direction cosines ({u}, {v}, {w}) are not a unit vector")]
    InvalidDirection { u: f64, v: f64, w: f64 },

    #[error("Non-finite coordinates ({x}, {y}, {z})")]
    NonFinitePosition { x: f64, y: f64, z: f64 },

    #[error("Invalid cross section {name} = {value}")]
    InvalidCrossSection { name: &'static str, value: f64 },

    #[error("Reaction '{reaction}' evaluated to {value} at E = {energy:e} eV in material '{material}'")]
    NegativeCrossSection {
        reaction: String,
        material: String,
        energy: f64,
        value: f64,
    },

    #[error("Majorant {majorant} below local total {total} at E = {energy:e} eV in material '{material}'")]
    MajorantTooSmall {
        material: String,
        energy: f64,
        majorant: f64,
        total: f64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("Universe '{universe}' exceeds the nesting depth limit of {limit} (path: {})", .path.join(" -> "))]
    UniverseDepthExceeded {
        universe: String,
        limit: usize,
        path: Vec<String>,
    },

    #[error("Pebble type {pebble_type} in pebble bed '{universe}' has count {count}, expected at least 1")]
    InvalidPebbleCount {
        universe: String,
        pebble_type: usize,
        count: u64,
    },

    #[error("Cell '{cell}' is owned by mesh/solid universe '{universe}' but has a fill")]
    FilledMeshCell { cell: String, universe: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Tracking failures
    #[error("Geometry error count {count} exceeds tolerance {limit} (last at ({x}, {y}, {z}))")]
    GeometryToleranceExceeded {
        count: u64,
        limit: u64,
        x: f64,
        y: f64,
        z: f64,
    },

    #[error("Collision in void cell '{cell}' at ({x}, {y}, {z})")]
    VoidCollision { cell: String, x: f64, y: f64, z: f64 },
}

impl TransportError {
    pub(crate) fn invalid_reference(entity: &'static str, detail: impl Into<String>) -> Self {
        TransportError::InvalidReference {
            entity,
            detail: detail.into(),
        }
    }

    /// True for errors caused by the geometry/material definition rather than a
    /// broken caller contract.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TransportError::UniverseDepthExceeded { .. }
                | TransportError::InvalidPebbleCount { .. }
                | TransportError::FilledMeshCell { .. }
                | TransportError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
