// Placement multiplicities by recursive traversal of the universe DAG
use crate::cell::CellFill;
use crate::error::{Result, TransportError};
use crate::geometry::Geometry;
use crate::ids::{CellId, UniverseId};
use crate::universe::UniverseKind;
use tracing::{debug, info};

/// Add the number of placements of every cell reachable from `root` to its
/// multiplicity counter.
///
/// A cell reached through nested universes is counted once per placement: the
/// product of the replication factors (lattice slots, pebble counts) along the
/// path. Counters accumulate, so call [`Geometry::reset_counters`] before a
/// fresh count. Paths deeper than the geometry's depth limit are reported as a
/// cyclic definition.
pub fn cell_count(geometry: &Geometry, root: UniverseId) -> Result<()> {
    let mut path = Vec::new();
    count_universe(geometry, root, 1, &mut path)?;
    info!(
        root = %geometry.universe(root)?.name,
        cells = geometry.cells().count(),
        "Cell multiplicities counted"
    );
    Ok(())
}

fn count_universe(
    geometry: &Geometry,
    id: UniverseId,
    add: u64,
    path: &mut Vec<UniverseId>,
) -> Result<()> {
    let universe = geometry.universe(id)?;
    if path.len() >= geometry.max_depth() {
        return Err(geometry.depth_error(id, path));
    }
    path.push(id);
    debug!(universe = %universe.name, kind = universe.kind.label(), add, "Counting universe");

    match &universe.kind {
        UniverseKind::Nest(cells) => {
            for cell in cells {
                count_cell(geometry, *cell, add, path)?;
            }
            universe.add_instance();
        }
        UniverseKind::CellComplex(cells) => {
            for cell in cells {
                count_cell(geometry, *cell, add, path)?;
            }
        }
        UniverseKind::Lattice(lattice) => {
            for slot in lattice.slots.iter().flatten() {
                count_universe(geometry, *slot, add, path)?;
            }
        }
        UniverseKind::PebbleBed(bed) => {
            count_universe(geometry, bed.background, add, path)?;
            for (pebble_type, pebble) in bed.types.iter().enumerate() {
                let count = pebble.count();
                if count < 1 {
                    return Err(TransportError::InvalidPebbleCount {
                        universe: universe.name.clone(),
                        pebble_type,
                        count,
                    });
                }
                count_universe(geometry, pebble.universe, add.saturating_mul(count), path)?;
            }
        }
        UniverseKind::UnstructuredMesh(solid) | UniverseKind::StlSolid(solid) => {
            count_universe(geometry, solid.background, add, path)?;
            for owner in &solid.owners {
                let cell = geometry.cell(*owner)?;
                if matches!(cell.fill, CellFill::Universe(_)) {
                    return Err(TransportError::FilledMeshCell {
                        cell: cell.label(),
                        universe: universe.name.clone(),
                    });
                }
                cell.add_multiplicity(1);
            }
        }
    }

    path.pop();
    Ok(())
}

fn count_cell(geometry: &Geometry, id: CellId, add: u64, path: &mut Vec<UniverseId>) -> Result<()> {
    let cell = geometry.cell(id)?;
    cell.add_multiplicity(add);
    if let CellFill::Universe(fill) = cell.fill {
        count_universe(geometry, fill, add, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::geometry::GeometryBuilder;

    #[test]
    fn test_single_cell() {
        let mut b = GeometryBuilder::new();
        let c = b.add_cell(Cell::new("only", None, CellFill::Void));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![c]));
        let g = b.build(root).unwrap();
        cell_count(&g, root).unwrap();
        assert_eq!(g.cell(c).unwrap().multiplicity(), 1);
    }

    #[test]
    fn test_shared_universe_counted_per_placement() {
        let mut b = GeometryBuilder::new();
        let inner = b.add_cell(Cell::new("inner", None, CellFill::Void));
        let shared = b.add_universe("shared", UniverseKind::Nest(vec![inner]));
        let a = b.add_cell(Cell::filled("a", None, shared));
        let c = b.add_cell(Cell::filled("c", None, shared));
        let root = b.add_universe("root", UniverseKind::CellComplex(vec![a, c]));
        let g = b.build(root).unwrap();
        cell_count(&g, root).unwrap();
        assert_eq!(g.cell(inner).unwrap().multiplicity(), 2);
        assert_eq!(g.universe(shared).unwrap().instances(), 2);
    }

    #[test]
    fn test_cycle_reports_path() {
        let mut b = GeometryBuilder::new().max_universe_depth(4);
        let c1 = b.add_cell(Cell::new("c1", None, CellFill::Void));
        let c2 = b.add_cell(Cell::new("c2", None, CellFill::Void));
        let u1 = b.add_universe("u1", UniverseKind::CellComplex(vec![c1]));
        let u2 = b.add_universe("u2", UniverseKind::CellComplex(vec![c2]));
        b.set_fill(c1, CellFill::Universe(u2)).unwrap();
        b.set_fill(c2, CellFill::Universe(u1)).unwrap();
        let g = b.build(u1).unwrap();
        let err = cell_count(&g, u1).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("u1 -> u2 -> u1 -> u2 -> u1"));
    }
}
