use crate::cell::{Cell, CellFill};
use crate::config::Settings;
use crate::error::{Result, TransportError};
use crate::ids::{CellId, MaterialId, UniverseId};
use crate::universe::{Universe, UniverseKind};
use slotmap::SlotMap;
use std::collections::HashSet;
use tracing::info;

/// Result of a point location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Lowest-level (material or void) cell.
    pub cell: CellId,
    pub material: Option<MaterialId>,
    /// The point was resolved through a mesh or STL universe.
    pub in_solid: bool,
    /// Number of universe levels walked.
    pub depth: usize,
}

/// Point-to-cell resolution consumed by the tracking kernel.
pub trait CellLocator: Send + Sync {
    /// `None` when the point lies outside the geometry or in an undefined region.
    fn locate(&self, position: [f64; 3], direction: [f64; 3]) -> Result<Option<Location>>;

    fn cell_label(&self, cell: CellId) -> String {
        format!("{:?}", cell)
    }
}

/// Distance to the nearest boundary of the current cell along a direction.
pub trait BoundaryOracle: Send + Sync {
    fn nearest_boundary(&self, position: [f64; 3], direction: [f64; 3]) -> Result<f64>;
}

/// Universe DAG with its cells, read-only during transport.
#[derive(Debug)]
pub struct Geometry {
    universes: SlotMap<UniverseId, Universe>,
    cells: SlotMap<CellId, Cell>,
    root: UniverseId,
    max_depth: usize,
}

#[derive(Debug)]
pub struct GeometryBuilder {
    universes: SlotMap<UniverseId, Universe>,
    cells: SlotMap<CellId, Cell>,
    max_depth: usize,
}

impl Default for GeometryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        GeometryBuilder {
            universes: SlotMap::with_key(),
            cells: SlotMap::with_key(),
            max_depth: settings.max_universe_depth,
        }
    }

    pub fn max_universe_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit;
        self
    }

    pub fn add_cell(&mut self, cell: Cell) -> CellId {
        self.cells.insert(cell)
    }

    pub fn add_universe(&mut self, name: impl Into<String>, kind: UniverseKind) -> UniverseId {
        self.universes.insert(Universe::new(name, kind))
    }

    /// Change a cell's fill after creation, e.g. to close a loop of fills.
    pub fn set_fill(&mut self, cell: CellId, fill: CellFill) -> Result<()> {
        let entry = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| TransportError::invalid_reference("cell", format!("{:?}", cell)))?;
        entry.fill = fill;
        Ok(())
    }

    /// Validate every key and user id and freeze the geometry.
    pub fn build(self, root: UniverseId) -> Result<Geometry> {
        if !self.universes.contains_key(root) {
            return Err(TransportError::Configuration(format!(
                "Root universe {:?} does not exist",
                root
            )));
        }
        if self.max_depth == 0 {
            return Err(TransportError::Configuration(
                "max_universe_depth must be at least 1".to_string(),
            ));
        }

        let mut used_cell_ids = HashSet::new();
        for cell in self.cells.values() {
            if let Some(id) = cell.cell_id {
                if !used_cell_ids.insert(id) {
                    return Err(TransportError::Configuration(format!(
                        "Duplicate cell_id {} found. All cell IDs must be unique.",
                        id
                    )));
                }
            }
            if let CellFill::Universe(u) = cell.fill {
                self.check_universe(u, &cell.name)?;
            }
        }

        for universe in self.universes.values() {
            let name = universe.name.as_str();
            match &universe.kind {
                UniverseKind::Nest(cells) | UniverseKind::CellComplex(cells) => {
                    for c in cells {
                        self.check_cell(*c, name)?;
                    }
                }
                UniverseKind::Lattice(lattice) => {
                    let expected = lattice.kind.slot_count();
                    if lattice.slots.len() != expected {
                        return Err(TransportError::Configuration(format!(
                            "Lattice '{}' has {} slots, expected {}",
                            name,
                            lattice.slots.len(),
                            expected
                        )));
                    }
                    for u in lattice.slots.iter().flatten() {
                        self.check_universe(*u, name)?;
                    }
                }
                UniverseKind::PebbleBed(bed) => {
                    self.check_universe(bed.background, name)?;
                    for pebble in &bed.types {
                        self.check_universe(pebble.universe, name)?;
                        if !(pebble.radius > 0.0) {
                            return Err(TransportError::Configuration(format!(
                                "Pebble bed '{}' has a pebble type with radius {}",
                                name, pebble.radius
                            )));
                        }
                    }
                }
                UniverseKind::UnstructuredMesh(solid) | UniverseKind::StlSolid(solid) => {
                    self.check_universe(solid.background, name)?;
                    if solid.owners.len() != solid.model.element_count() {
                        return Err(TransportError::Configuration(format!(
                            "Solid universe '{}' maps {} owners onto {} elements",
                            name,
                            solid.owners.len(),
                            solid.model.element_count()
                        )));
                    }
                    for c in &solid.owners {
                        self.check_cell(*c, name)?;
                    }
                }
            }
        }

        info!(
            universes = self.universes.len(),
            cells = self.cells.len(),
            "Geometry built"
        );

        Ok(Geometry {
            universes: self.universes,
            cells: self.cells,
            root,
            max_depth: self.max_depth,
        })
    }

    fn check_universe(&self, u: UniverseId, owner: &str) -> Result<()> {
        if self.universes.contains_key(u) {
            Ok(())
        } else {
            Err(TransportError::Configuration(format!(
                "'{}' refers to an unknown universe {:?}",
                owner, u
            )))
        }
    }

    fn check_cell(&self, c: CellId, owner: &str) -> Result<()> {
        if self.cells.contains_key(c) {
            Ok(())
        } else {
            Err(TransportError::Configuration(format!(
                "'{}' refers to an unknown cell {:?}",
                owner, c
            )))
        }
    }
}

// Outcome of one walk down the universe tree.
struct Walk {
    location: Option<Location>,
    distance: f64,
}

impl Walk {
    fn undefined(distance: f64) -> Self {
        Walk {
            location: None,
            distance,
        }
    }
}

impl Geometry {
    pub fn root(&self) -> UniverseId {
        self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell> {
        self.cells
            .get(id)
            .ok_or_else(|| TransportError::invalid_reference("cell", format!("{:?}", id)))
    }

    pub fn universe(&self, id: UniverseId) -> Result<&Universe> {
        self.universes
            .get(id)
            .ok_or_else(|| TransportError::invalid_reference("universe", format!("{:?}", id)))
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter()
    }

    pub fn universes(&self) -> impl Iterator<Item = (UniverseId, &Universe)> {
        self.universes.iter()
    }

    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cells
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id)
    }

    /// Zero every multiplicity and instance counter before a fresh count.
    pub fn reset_counters(&self) {
        for cell in self.cells.values() {
            cell.reset_multiplicity();
        }
        for universe in self.universes.values() {
            universe.reset_instances();
        }
    }

    /// Depth-limit error naming `offending` and the full visiting path.
    pub(crate) fn depth_error(&self, offending: UniverseId, path: &[UniverseId]) -> TransportError {
        let name = |u: &UniverseId| {
            self.universes
                .get(*u)
                .map_or_else(|| format!("{:?}", u), |x| x.name.clone())
        };
        TransportError::UniverseDepthExceeded {
            universe: name(&offending),
            limit: self.max_depth,
            path: path.iter().chain(std::iter::once(&offending)).map(name).collect(),
        }
    }

    // Walk from the root to the material level, optionally accumulating the
    // smallest boundary distance over all levels.
    fn walk(&self, position: [f64; 3], direction: [f64; 3], want_distance: bool) -> Result<Walk> {
        let mut universe_id = self.root;
        let mut p = position;
        let mut distance = f64::INFINITY;
        let mut in_solid = false;
        let mut path: Vec<UniverseId> = Vec::new();

        loop {
            if path.len() >= self.max_depth {
                return Err(self.depth_error(universe_id, &path));
            }
            path.push(universe_id);
            let universe = self.universe(universe_id)?;

            let cell_id = match &universe.kind {
                UniverseKind::Nest(cells) | UniverseKind::CellComplex(cells) => {
                    let mut found = None;
                    for c in cells {
                        if self.cell(*c)?.contains(p, direction) {
                            found = Some(*c);
                            break;
                        }
                    }
                    let Some(c) = found else {
                        return Ok(Walk::undefined(distance));
                    };
                    if want_distance {
                        distance = distance.min(self.cell(c)?.distance_to_boundary(p, direction));
                    }
                    c
                }
                UniverseKind::Lattice(lattice) => {
                    let Some((slot, local)) = lattice.locate_slot(p, direction) else {
                        return Ok(Walk::undefined(distance));
                    };
                    if want_distance {
                        distance = distance.min(lattice.distance_in_slot(slot, p, direction));
                    }
                    match lattice.slots[slot] {
                        Some(next) => {
                            universe_id = next;
                            p = local;
                            continue;
                        }
                        None => return Ok(Walk::undefined(distance)),
                    }
                }
                UniverseKind::PebbleBed(bed) => match bed.locate(p, direction) {
                    Some((t, _, local)) => {
                        if want_distance {
                            let r = bed.types[t].radius;
                            let sphere = crate::surface::Surface::sphere(0.0, 0.0, 0.0, r);
                            if let Some(d) = sphere.distance_to_surface(local, direction) {
                                distance = distance.min(d);
                            }
                        }
                        universe_id = bed.types[t].universe;
                        p = local;
                        continue;
                    }
                    None => {
                        if want_distance {
                            distance = distance.min(bed.distance_to_pebbles(p, direction));
                        }
                        universe_id = bed.background;
                        continue;
                    }
                },
                UniverseKind::UnstructuredMesh(solid) | UniverseKind::StlSolid(solid) => {
                    in_solid = true;
                    if want_distance {
                        distance = distance.min(solid.model.distance_to_boundary(p, direction));
                    }
                    match solid.model.locate_element(p, direction) {
                        Some(e) => *solid.owners.get(e).ok_or_else(|| {
                            TransportError::invalid_reference("mesh element", e.to_string())
                        })?,
                        None => {
                            universe_id = solid.background;
                            continue;
                        }
                    }
                }
            };

            let cell = self.cell(cell_id)?;
            let material = match cell.fill {
                CellFill::Material(m) => Some(m),
                CellFill::Void => None,
                CellFill::Universe(next) => {
                    if matches!(
                        universe.kind,
                        UniverseKind::UnstructuredMesh(_) | UniverseKind::StlSolid(_)
                    ) {
                        return Err(TransportError::FilledMeshCell {
                            cell: cell.label(),
                            universe: universe.name.clone(),
                        });
                    }
                    universe_id = next;
                    p = [
                        p[0] - cell.translation[0],
                        p[1] - cell.translation[1],
                        p[2] - cell.translation[2],
                    ];
                    continue;
                }
            };
            return Ok(Walk {
                location: Some(Location {
                    cell: cell_id,
                    material,
                    in_solid,
                    depth: path.len(),
                }),
                distance,
            });
        }
    }
}

impl CellLocator for Geometry {
    fn locate(&self, position: [f64; 3], direction: [f64; 3]) -> Result<Option<Location>> {
        Ok(self.walk(position, direction, false)?.location)
    }

    fn cell_label(&self, cell: CellId) -> String {
        self.cells
            .get(cell)
            .map_or_else(|| format!("{:?}", cell), |c| c.label())
    }
}

impl BoundaryOracle for Geometry {
    fn nearest_boundary(&self, position: [f64; 3], direction: [f64; 3]) -> Result<f64> {
        Ok(self.walk(position, direction, true)?.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::surface::Surface;
    use crate::universe::{Lattice, LatticeKind};
    use std::sync::Arc;

    const UX: [f64; 3] = [1.0, 0.0, 0.0];

    fn material_key() -> MaterialId {
        let mut map: SlotMap<MaterialId, ()> = SlotMap::with_key();
        map.insert(())
    }

    #[test]
    fn test_locate_through_lattice() {
        let m = material_key();
        let mut b = GeometryBuilder::new();
        let pin_surface = Arc::new(Surface::z_cylinder(0.0, 0.0, 0.4));
        let fuel = b.add_cell(Cell::material("fuel", Region::below(&pin_surface), m));
        let water = b.add_cell(Cell::void("water", Region::above(&pin_surface)));
        let pin = b.add_universe("pin", UniverseKind::Nest(vec![fuel, water]));
        let lattice = b.add_universe(
            "lattice",
            UniverseKind::Lattice(Lattice {
                kind: LatticeKind::Square {
                    origin: [0.0, 0.0],
                    pitch: 1.0,
                    nx: 2,
                    ny: 2,
                },
                slots: vec![Some(pin); 4],
            }),
        );
        let bx = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 100.0));
        let outer = b.add_cell(Cell::filled("core", Some(Region::below(&bx)), lattice).with_id(1));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![outer]));
        let g = b.build(root).unwrap();

        let loc = g.locate([0.5, 0.5, 0.0], UX).unwrap().unwrap();
        assert_eq!(loc.cell, fuel);
        assert_eq!(loc.material, Some(m));
        assert_eq!(loc.depth, 3);
        assert!(!loc.in_solid);
        let loc = g.locate([0.95, 0.95, 0.0], UX).unwrap().unwrap();
        assert_eq!(loc.cell, water);
        assert_eq!(loc.material, None);

        // pin centred at 0.5: fuel edge at 0.9, slot edge at 1.0
        let d = g.nearest_boundary([0.5, 0.5, 0.0], UX).unwrap();
        assert!((d - 0.4).abs() < 1e-12);
        // lattice ends at x = 1, inside the core sphere
        assert!(g.locate([1.5, 0.0, 0.0], UX).unwrap().is_none());
        assert_eq!(g.cell_label(outer), "core (id 1)");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut b = GeometryBuilder::new();
        let mut other = GeometryBuilder::new();
        let foreign = other.add_cell(Cell::new("x", None, CellFill::Void));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![foreign]));
        let err = b.build(root).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_cell_ids_rejected() {
        let mut b = GeometryBuilder::new();
        let a = b.add_cell(Cell::new("a", None, CellFill::Void).with_id(3));
        let c = b.add_cell(Cell::new("c", None, CellFill::Void).with_id(3));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![a, c]));
        assert!(b.build(root).unwrap_err().to_string().contains("Duplicate cell_id 3"));
    }

    #[test]
    fn test_cyclic_fill_hits_depth_limit() {
        let mut b = GeometryBuilder::new().max_universe_depth(8);
        let cell = b.add_cell(Cell::new("loop", None, CellFill::Void));
        let u = b.add_universe("self", UniverseKind::CellComplex(vec![cell]));
        b.set_fill(cell, CellFill::Universe(u)).unwrap();
        let g = b.build(u).unwrap();
        match g.locate([0.0; 3], UX) {
            Err(TransportError::UniverseDepthExceeded { universe, limit, path }) => {
                assert_eq!(universe, "self");
                assert_eq!(limit, 8);
                assert_eq!(path.len(), 9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_translation_applied_to_fill() {
        let m = material_key();
        let mut b = GeometryBuilder::new();
        let ball = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0));
        let inner = b.add_cell(Cell::material("ball", Region::below(&ball), m));
        let rest = b.add_cell(Cell::void("rest", Region::above(&ball)));
        let u = b.add_universe("ball", UniverseKind::CellComplex(vec![inner, rest]));
        let holder = b.add_cell(Cell::filled("holder", None, u).with_translation([10.0, 0.0, 0.0]));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![holder]));
        let g = b.build(root).unwrap();
        assert_eq!(g.locate([10.5, 0.0, 0.0], UX).unwrap().unwrap().cell, inner);
        assert_eq!(g.locate([0.0, 0.0, 0.0], UX).unwrap().unwrap().cell, rest);
        let d = g.nearest_boundary([10.0, 0.0, 0.0], UX).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
    }
}
