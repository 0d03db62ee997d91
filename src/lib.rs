// Core types first, then the modules that build on them
mod error;
mod ids;

pub mod cache;
pub mod cell;
pub mod cell_count;
pub mod collective;
pub mod config;
pub mod context;
pub mod corrections;
pub mod geometry;
pub mod grid;
pub mod majorant;
pub mod material;
pub mod nuclide;
pub mod particle;
pub mod reaction;
pub mod region;
pub mod rng;
pub mod surface;
pub mod tracking;
pub mod universe;
pub mod volumes;
pub mod xs;

pub use error::{Result, TransportError};
pub use ids::{CellId, MaterialId, NuclideId, ReactionId, UniverseId};

pub use cache::{CacheKey, XsCache};
pub use cell::{Cell, CellFill};
pub use cell_count::cell_count;
pub use collective::{Collective, SingleProcess};
pub use config::{Settings, VoidCollisionPolicy};
pub use context::{BandDraws, ThreadContext};
pub use corrections::{
    ConcentrationSearch, CorrectionInput, EquilibriumPoisons, NoCorrections, ProbabilityTable,
    StandardCorrections, UresCorrection, XsCorrections,
};
pub use geometry::{BoundaryOracle, CellLocator, Geometry, GeometryBuilder, Location};
pub use grid::{EnergyGrid, Interpolation};
pub use majorant::build_majorant;
pub use material::{Material, MaterialReactions, TemperatureTreatment};
pub use nuclide::{MicroReaction, MicroscopicData, NuclideTable};
pub use particle::{ParticleState, ParticleType};
pub use reaction::{PartialEntry, ReactionDescriptor, ReactionKind, TabulatedXs};
pub use region::Region;
pub use rng::{LcgStream, RandSource, ReplayStream, UniformSource};
pub use surface::Surface;
pub use tracking::{LocalCrossSection, StepOutcome, StepResult, TrackingKernel};
pub use universe::{
    ClusterRing, Lattice, LatticeKind, PebbleBed, PebbleType, SolidModel, SolidUniverse, Universe,
    UniverseKind,
};
pub use volumes::{aggregate_volumes, VolumeReport};
pub use xs::{CrossSectionEngine, DensityCoupling};
