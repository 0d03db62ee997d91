use crate::ids::{MaterialId, UniverseId};
use crate::region::Region;
use std::sync::atomic::{AtomicU64, Ordering};

/// What occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFill {
    Material(MaterialId),
    Universe(UniverseId),
    Void,
}

/// A placement of a material, a fill universe or void inside a universe.
///
/// The multiplicity counter is written only by [`crate::cell_count::cell_count`]
/// during the single-threaded setup phase and read freely afterwards.
#[derive(Debug)]
pub struct Cell {
    pub cell_id: Option<u32>,
    pub name: String,
    /// `None` covers all space; used for mesh elements and background cells.
    pub region: Option<Region>,
    pub fill: CellFill,
    /// Offset subtracted from coordinates before entering a fill universe.
    pub translation: [f64; 3],
    /// Volume of a single instance (cm3), when known.
    pub volume: Option<f64>,
    multiplicity: AtomicU64,
}

impl Cell {
    pub fn new(name: impl Into<String>, region: Option<Region>, fill: CellFill) -> Self {
        Cell {
            cell_id: None,
            name: name.into(),
            region,
            fill,
            translation: [0.0; 3],
            volume: None,
            multiplicity: AtomicU64::new(0),
        }
    }

    pub fn material(name: impl Into<String>, region: Region, material: MaterialId) -> Self {
        Self::new(name, Some(region), CellFill::Material(material))
    }

    pub fn filled(name: impl Into<String>, region: Option<Region>, universe: UniverseId) -> Self {
        Self::new(name, region, CellFill::Universe(universe))
    }

    pub fn void(name: impl Into<String>, region: Region) -> Self {
        Self::new(name, Some(region), CellFill::Void)
    }

    pub fn with_id(mut self, cell_id: u32) -> Self {
        self.cell_id = Some(cell_id);
        self
    }

    pub fn with_translation(mut self, translation: [f64; 3]) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn contains(&self, point: [f64; 3], direction: [f64; 3]) -> bool {
        self.region
            .as_ref()
            .map_or(true, |region| region.contains(point, direction))
    }

    pub fn distance_to_boundary(&self, point: [f64; 3], direction: [f64; 3]) -> f64 {
        self.region
            .as_ref()
            .map_or(f64::INFINITY, |region| region.distance_to_boundary(point, direction))
    }

    pub fn material_id(&self) -> Option<MaterialId> {
        match self.fill {
            CellFill::Material(m) => Some(m),
            _ => None,
        }
    }

    /// Number of placements of this cell in the geometry.
    pub fn multiplicity(&self) -> u64 {
        self.multiplicity.load(Ordering::Relaxed)
    }

    pub(crate) fn add_multiplicity(&self, n: u64) {
        self.multiplicity.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn reset_multiplicity(&self) {
        self.multiplicity.store(0, Ordering::Relaxed);
    }

    /// Label used in diagnostics.
    pub fn label(&self) -> String {
        match self.cell_id {
            Some(id) => format!("{} (id {})", self.name, id),
            None => self.name.clone(),
        }
    }
}
