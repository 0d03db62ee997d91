// Universe kinds and the per-kind point location rules
use crate::ids::{CellId, UniverseId};
use crate::surface::Surface;
use std::f64::consts::PI;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const SQRT3_2: f64 = 0.866_025_403_784_438_6;

/// Caller-supplied solid model (unstructured mesh or STL solids).
///
/// Element `i` belongs to the cell at `owners[i]` of the enclosing
/// [`SolidUniverse`]; points in no element fall through to the background.
pub trait SolidModel: Send + Sync + Debug {
    fn element_count(&self) -> usize;

    fn locate_element(&self, point: [f64; 3], direction: [f64; 3]) -> Option<usize>;

    /// Distance to the nearest element face along `direction`, or infinity.
    fn distance_to_boundary(&self, point: [f64; 3], direction: [f64; 3]) -> f64;
}

#[derive(Debug, Clone)]
pub struct SolidUniverse {
    pub model: Arc<dyn SolidModel>,
    pub owners: Vec<CellId>,
    pub background: UniverseId,
}

/// One ring of a circular cluster lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRing {
    /// Radius of the member centres.
    pub radius: f64,
    /// Radial extent of the ring's sectors.
    pub inner: f64,
    pub outer: f64,
    /// Angle of the first member (radians).
    pub theta0: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LatticeKind {
    /// `nx` by `ny` square cells of side `pitch`, centred on `origin`,
    /// slots stored row by row from the lower-left corner.
    Square {
        origin: [f64; 2],
        pitch: f64,
        nx: usize,
        ny: usize,
    },
    /// `n` by `n` rhombic array of hexagons (flat-to-flat `pitch`, flat sides
    /// facing ±x) centred on `origin`.
    Hex { origin: [f64; 2], pitch: f64, n: usize },
    /// Rings of members around `origin`; slots stored ring by ring.
    Cluster {
        origin: [f64; 2],
        rings: Vec<ClusterRing>,
    },
}

impl LatticeKind {
    pub fn slot_count(&self) -> usize {
        match self {
            LatticeKind::Square { nx, ny, .. } => nx * ny,
            LatticeKind::Hex { n, .. } => n * n,
            LatticeKind::Cluster { rings, .. } => rings.iter().map(|r| r.count).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lattice {
    pub kind: LatticeKind,
    pub slots: Vec<Option<UniverseId>>,
}

impl Lattice {
    /// Slot containing `point` and the point in the slot's own frame.
    pub fn locate_slot(&self, point: [f64; 3], direction: [f64; 3]) -> Option<(usize, [f64; 3])> {
        match &self.kind {
            LatticeKind::Square {
                origin,
                pitch,
                nx,
                ny,
            } => {
                let ix = square_index(point[0] - origin[0], direction[0], *pitch, *nx)?;
                let iy = square_index(point[1] - origin[1], direction[1], *pitch, *ny)?;
                let slot = iy * nx + ix;
                let centre = self.slot_centre(slot)?;
                Some((slot, [point[0] - centre[0], point[1] - centre[1], point[2]]))
            }
            LatticeKind::Hex { origin, pitch, n } => {
                // nudge along the flight direction so ties go to the cell ahead
                let x = point[0] - origin[0] + 1e-10 * direction[0];
                let y = point[1] - origin[1] + 1e-10 * direction[1];
                let c = (*n as f64 - 1.0) / 2.0;
                let jf = y / (pitch * SQRT3_2) + c;
                let i_f = (x - (jf - c) * pitch / 2.0) / pitch + c;
                let (i0, j0) = (i_f.round() as i64, jf.round() as i64);
                let mut best: Option<(usize, f64)> = None;
                for dj in -1..=1 {
                    for di in -1..=1 {
                        let (i, j) = (i0 + di, j0 + dj);
                        if i < 0 || j < 0 || i >= *n as i64 || j >= *n as i64 {
                            continue;
                        }
                        let slot = j as usize * n + i as usize;
                        let (cx, cy) = hex_centre(i as usize, j as usize, *pitch, c);
                        let d2 = (x - cx).powi(2) + (y - cy).powi(2);
                        if best.map_or(true, |(_, b)| d2 < b) {
                            best = Some((slot, d2));
                        }
                    }
                }
                let (slot, _) = best?;
                // reject points beyond the outer hexagon edge
                let centre = self.slot_centre(slot)?;
                let local = [point[0] - centre[0], point[1] - centre[1], point[2]];
                if hex_normals()
                    .iter()
                    .any(|nrm| nrm[0] * local[0] + nrm[1] * local[1] > pitch / 2.0 + 1e-9)
                {
                    return None;
                }
                Some((slot, local))
            }
            LatticeKind::Cluster { origin, rings } => {
                let x = point[0] - origin[0];
                let y = point[1] - origin[1];
                let r = (x * x + y * y).sqrt();
                let mut first = 0usize;
                for ring in rings {
                    if r >= ring.inner && r < ring.outer && ring.count > 0 {
                        let width = 2.0 * PI / ring.count as f64;
                        let phi = (y.atan2(x) - ring.theta0 + width / 2.0).rem_euclid(2.0 * PI);
                        let sector = ((phi / width).floor() as usize).min(ring.count - 1);
                        let angle = ring.theta0 + sector as f64 * width;
                        let (cx, cy) = (ring.radius * angle.cos(), ring.radius * angle.sin());
                        return Some((first + sector, [x - cx, y - cy, point[2]]));
                    }
                    first += ring.count;
                }
                None
            }
        }
    }

    /// Centre of `slot` in the lattice's parent frame.
    pub fn slot_centre(&self, slot: usize) -> Option<[f64; 2]> {
        match &self.kind {
            LatticeKind::Square {
                origin,
                pitch,
                nx,
                ny,
            } => {
                if slot >= nx * ny {
                    return None;
                }
                let (ix, iy) = (slot % nx, slot / nx);
                Some([
                    origin[0] + (ix as f64 + 0.5 - *nx as f64 / 2.0) * pitch,
                    origin[1] + (iy as f64 + 0.5 - *ny as f64 / 2.0) * pitch,
                ])
            }
            LatticeKind::Hex { origin, pitch, n } => {
                if slot >= n * n {
                    return None;
                }
                let c = (*n as f64 - 1.0) / 2.0;
                let (cx, cy) = hex_centre(slot % n, slot / n, *pitch, c);
                Some([origin[0] + cx, origin[1] + cy])
            }
            LatticeKind::Cluster { origin, rings } => {
                let mut first = 0usize;
                for ring in rings {
                    if slot < first + ring.count {
                        let width = 2.0 * PI / ring.count as f64;
                        let angle = ring.theta0 + (slot - first) as f64 * width;
                        return Some([
                            origin[0] + ring.radius * angle.cos(),
                            origin[1] + ring.radius * angle.sin(),
                        ]);
                    }
                    first += ring.count;
                }
                None
            }
        }
    }

    /// Distance to the edge of `slot` from `point` (parent frame).
    pub fn distance_in_slot(&self, slot: usize, point: [f64; 3], direction: [f64; 3]) -> f64 {
        let Some(centre) = self.slot_centre(slot) else {
            return 0.0;
        };
        let local = [point[0] - centre[0], point[1] - centre[1]];
        match &self.kind {
            LatticeKind::Square { pitch, .. } => {
                let half = pitch / 2.0;
                axis_exit(local[0], direction[0], half).min(axis_exit(local[1], direction[1], half))
            }
            LatticeKind::Hex { pitch, .. } => {
                let mut best = f64::INFINITY;
                for nrm in hex_normals() {
                    let along = nrm[0] * direction[0] + nrm[1] * direction[1];
                    if along > 0.0 {
                        let t = (pitch / 2.0 - (nrm[0] * local[0] + nrm[1] * local[1])) / along;
                        best = best.min(t.max(0.0));
                    }
                }
                best
            }
            LatticeKind::Cluster { origin, rings } => {
                let Some((ring, _)) = ring_of_slot(rings, slot) else {
                    return 0.0;
                };
                let p = [point[0], point[1], point[2]];
                let mut best = f64::INFINITY;
                for radius in [ring.inner, ring.outer] {
                    if radius > 0.0 {
                        let cyl = Surface::z_cylinder(origin[0], origin[1], radius);
                        if let Some(d) = cyl.distance_to_surface(p, direction) {
                            best = best.min(d);
                        }
                    }
                }
                if ring.count > 1 {
                    let width = 2.0 * PI / ring.count as f64;
                    let angle = (centre[1] - origin[1]).atan2(centre[0] - origin[0]);
                    for edge in [angle - width / 2.0, angle + width / 2.0] {
                        let plane = Surface::plane(-edge.sin(), edge.cos(), 0.0, -edge.sin() * origin[0] + edge.cos() * origin[1]);
                        if let Some(d) = plane.distance_to_surface(p, direction) {
                            best = best.min(d);
                        }
                    }
                }
                best
            }
        }
    }
}

fn square_index(offset: f64, u: f64, pitch: f64, n: usize) -> Option<usize> {
    let f = offset / pitch + n as f64 / 2.0;
    let mut i = f.floor();
    if f == i && u < 0.0 {
        i -= 1.0;
    }
    if i < 0.0 || i >= n as f64 {
        None
    } else {
        Some(i as usize)
    }
}

fn axis_exit(x: f64, u: f64, half: f64) -> f64 {
    if u > 0.0 {
        ((half - x) / u).max(0.0)
    } else if u < 0.0 {
        ((-half - x) / u).max(0.0)
    } else {
        f64::INFINITY
    }
}

fn hex_centre(i: usize, j: usize, pitch: f64, c: f64) -> (f64, f64) {
    let (di, dj) = (i as f64 - c, j as f64 - c);
    ((di + dj / 2.0) * pitch, dj * pitch * SQRT3_2)
}

fn hex_normals() -> [[f64; 2]; 6] {
    let mut normals = [[0.0; 2]; 6];
    for (k, nrm) in normals.iter_mut().enumerate() {
        let a = k as f64 * PI / 3.0;
        *nrm = [a.cos(), a.sin()];
    }
    normals
}

fn ring_of_slot(rings: &[ClusterRing], slot: usize) -> Option<(&ClusterRing, usize)> {
    let mut first = 0usize;
    for ring in rings {
        if slot < first + ring.count {
            return Some((ring, slot - first));
        }
        first += ring.count;
    }
    None
}

#[derive(Debug, Clone)]
pub struct PebbleType {
    pub universe: UniverseId,
    pub radius: f64,
    pub centres: Vec<[f64; 3]>,
}

impl PebbleType {
    pub fn count(&self) -> u64 {
        self.centres.len() as u64
    }
}

/// Explicit pebble positions inside a background universe.
#[derive(Debug, Clone)]
pub struct PebbleBed {
    pub background: UniverseId,
    pub types: Vec<PebbleType>,
}

impl PebbleBed {
    /// Pebble type and the point relative to the pebble centre, if inside one.
    pub fn locate(&self, point: [f64; 3], direction: [f64; 3]) -> Option<(usize, usize, [f64; 3])> {
        for (t, pebble) in self.types.iter().enumerate() {
            for (k, c) in pebble.centres.iter().enumerate() {
                let local = [point[0] - c[0], point[1] - c[1], point[2] - c[2]];
                let sphere = Surface::sphere(0.0, 0.0, 0.0, pebble.radius);
                if !sphere.sense(local, direction) {
                    return Some((t, k, local));
                }
            }
        }
        None
    }

    pub fn distance_to_pebbles(&self, point: [f64; 3], direction: [f64; 3]) -> f64 {
        let mut best = f64::INFINITY;
        for pebble in &self.types {
            for c in &pebble.centres {
                let sphere = Surface::sphere(c[0], c[1], c[2], pebble.radius);
                if let Some(d) = sphere.distance_to_surface(point, direction) {
                    best = best.min(d);
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
pub enum UniverseKind {
    /// Concentric regions; the first cell containing the point wins.
    Nest(Vec<CellId>),
    CellComplex(Vec<CellId>),
    Lattice(Lattice),
    PebbleBed(PebbleBed),
    UnstructuredMesh(SolidUniverse),
    StlSolid(SolidUniverse),
}

impl UniverseKind {
    pub fn label(&self) -> &'static str {
        match self {
            UniverseKind::Nest(_) => "nest",
            UniverseKind::CellComplex(_) => "cell complex",
            UniverseKind::Lattice(_) => "lattice",
            UniverseKind::PebbleBed(_) => "pebble bed",
            UniverseKind::UnstructuredMesh(_) => "unstructured mesh",
            UniverseKind::StlSolid(_) => "STL solid",
        }
    }
}

#[derive(Debug)]
pub struct Universe {
    pub name: String,
    pub kind: UniverseKind,
    instances: AtomicU64,
}

impl Universe {
    pub fn new(name: impl Into<String>, kind: UniverseKind) -> Self {
        Universe {
            name: name.into(),
            kind,
            instances: AtomicU64::new(0),
        }
    }

    /// Times a nest universe was visited by cell counting.
    pub fn instances(&self) -> u64 {
        self.instances.load(Ordering::Relaxed)
    }

    pub(crate) fn add_instance(&self) {
        self.instances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset_instances(&self) {
        self.instances.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn some_universe() -> UniverseId {
        let mut map: SlotMap<UniverseId, ()> = SlotMap::with_key();
        map.insert(())
    }

    fn square(nx: usize, ny: usize) -> Lattice {
        let u = some_universe();
        Lattice {
            kind: LatticeKind::Square {
                origin: [0.0, 0.0],
                pitch: 2.0,
                nx,
                ny,
            },
            slots: vec![Some(u); nx * ny],
        }
    }

    #[test]
    fn test_square_locate() {
        let lat = square(3, 2);
        // lower-left slot spans x in [-3, -1], y in [-2, 0]
        let (slot, local) = lat.locate_slot([-2.5, -0.5, 4.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(slot, 0);
        assert!((local[0] + 0.5).abs() < 1e-12 && (local[1] - 0.5).abs() < 1e-12);
        assert_eq!(local[2], 4.0);
        let (slot, _) = lat.locate_slot([2.0, 1.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(slot, 5);
        assert!(lat.locate_slot([3.5, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_square_edge_follows_direction() {
        let lat = square(2, 1);
        let (ahead, _) = lat.locate_slot([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        let (behind, _) = lat.locate_slot([0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]).unwrap();
        assert_eq!((ahead, behind), (1, 0));
    }

    #[test]
    fn test_square_slot_distance() {
        let lat = square(2, 2);
        let d = lat.distance_in_slot(0, [-1.0, -1.0, 0.0], [1.0, 0.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-12);
        let d = lat.distance_in_slot(0, [-1.0, -1.0, 0.0], [0.0, 0.0, 1.0]);
        assert_eq!(d, f64::INFINITY);
    }

    #[test]
    fn test_hex_centre_slot() {
        let u = some_universe();
        let lat = Lattice {
            kind: LatticeKind::Hex {
                origin: [0.0, 0.0],
                pitch: 1.0,
                n: 3,
            },
            slots: vec![Some(u); 9],
        };
        let (slot, local) = lat.locate_slot([0.1, 0.1, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(slot, 4);
        assert!((local[0] - 0.1).abs() < 1e-12);
        // flat side facing +x at half a pitch
        let d = lat.distance_in_slot(4, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        assert!((d - 0.5).abs() < 1e-12);
        let (right, _) = lat.locate_slot([0.9, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(right, 5);
        assert!(lat.locate_slot([10.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_cluster_rings() {
        let u = some_universe();
        let lat = Lattice {
            kind: LatticeKind::Cluster {
                origin: [0.0, 0.0],
                rings: vec![
                    ClusterRing {
                        radius: 0.0,
                        inner: 0.0,
                        outer: 1.0,
                        theta0: 0.0,
                        count: 1,
                    },
                    ClusterRing {
                        radius: 2.0,
                        inner: 1.0,
                        outer: 3.0,
                        theta0: 0.0,
                        count: 4,
                    },
                ],
            },
            slots: vec![Some(u); 5],
        };
        assert_eq!(lat.kind.slot_count(), 5);
        let (slot, _) = lat.locate_slot([0.2, 0.1, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(slot, 0);
        let (slot, local) = lat.locate_slot([0.0, 2.1, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(slot, 2);
        assert!(local[0].abs() < 1e-12 && (local[1] - 0.1).abs() < 1e-12);
        // radially outward from the member at +x hits the outer ring edge
        let d = lat.distance_in_slot(1, [2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-12);
        assert!(lat.locate_slot([5.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_pebble_locate() {
        let u = some_universe();
        let bed = PebbleBed {
            background: u,
            types: vec![PebbleType {
                universe: u,
                radius: 1.0,
                centres: vec![[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]],
            }],
        };
        let (t, k, local) = bed.locate([5.5, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!((t, k), (0, 1));
        assert!((local[0] - 0.5).abs() < 1e-12);
        assert!(bed.locate([2.5, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
        let d = bed.distance_to_pebbles([2.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        assert!((d - 1.5).abs() < 1e-12);
    }
}
