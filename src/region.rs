use crate::surface::Surface;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum HalfspaceType {
    Above(Arc<Surface>),
    Below(Arc<Surface>),
}

/// Boolean combination of halfspaces.
#[derive(Debug, Clone)]
pub enum RegionExpr {
    Halfspace(HalfspaceType),
    Union(Box<RegionExpr>, Box<RegionExpr>),
    Intersection(Box<RegionExpr>, Box<RegionExpr>),
    Complement(Box<RegionExpr>),
}

#[derive(Debug, Clone)]
pub struct Region {
    pub expr: RegionExpr,
}

impl Region {
    pub fn new_from_halfspace(halfspace_type: HalfspaceType) -> Self {
        Region {
            expr: RegionExpr::Halfspace(halfspace_type),
        }
    }

    pub fn above(surface: &Arc<Surface>) -> Self {
        Self::new_from_halfspace(HalfspaceType::Above(surface.clone()))
    }

    pub fn below(surface: &Arc<Surface>) -> Self {
        Self::new_from_halfspace(HalfspaceType::Below(surface.clone()))
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Region {
            expr: RegionExpr::Intersection(
                Box::new(self.expr.clone()),
                Box::new(other.expr.clone()),
            ),
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        Region {
            expr: RegionExpr::Union(Box::new(self.expr.clone()), Box::new(other.expr.clone())),
        }
    }

    pub fn complement(&self) -> Self {
        Region {
            expr: RegionExpr::Complement(Box::new(self.expr.clone())),
        }
    }

    /// Point membership; `direction` decides points lying exactly on a surface.
    pub fn contains(&self, point: [f64; 3], direction: [f64; 3]) -> bool {
        self.expr.contains(point, direction)
    }

    /// Every surface referenced by the region, once per occurrence.
    pub fn surfaces(&self) -> Vec<Arc<Surface>> {
        fn collect(expr: &RegionExpr, surfaces: &mut Vec<Arc<Surface>>) {
            match expr {
                RegionExpr::Halfspace(HalfspaceType::Above(s))
                | RegionExpr::Halfspace(HalfspaceType::Below(s)) => surfaces.push(s.clone()),
                RegionExpr::Union(a, b) | RegionExpr::Intersection(a, b) => {
                    collect(a, surfaces);
                    collect(b, surfaces);
                }
                RegionExpr::Complement(inner) => collect(inner, surfaces),
            }
        }
        let mut result = Vec::new();
        collect(&self.expr, &mut result);
        result
    }

    /// Lower bound on the distance to leave the region: the nearest
    /// intersection with any of its surfaces.
    pub fn distance_to_boundary(&self, point: [f64; 3], direction: [f64; 3]) -> f64 {
        fn walk(expr: &RegionExpr, p: [f64; 3], u: [f64; 3], best: &mut f64) {
            match expr {
                RegionExpr::Halfspace(HalfspaceType::Above(s))
                | RegionExpr::Halfspace(HalfspaceType::Below(s)) => {
                    if let Some(d) = s.distance_to_surface(p, u) {
                        if d < *best {
                            *best = d;
                        }
                    }
                }
                RegionExpr::Union(a, b) | RegionExpr::Intersection(a, b) => {
                    walk(a, p, u, best);
                    walk(b, p, u, best);
                }
                RegionExpr::Complement(inner) => walk(inner, p, u, best),
            }
        }
        let mut best = f64::INFINITY;
        walk(&self.expr, point, direction, &mut best);
        best
    }
}

impl RegionExpr {
    pub fn contains(&self, point: [f64; 3], direction: [f64; 3]) -> bool {
        match self {
            RegionExpr::Halfspace(HalfspaceType::Above(surf)) => surf.sense(point, direction),
            RegionExpr::Halfspace(HalfspaceType::Below(surf)) => !surf.sense(point, direction),
            RegionExpr::Union(a, b) => a.contains(point, direction) || b.contains(point, direction),
            RegionExpr::Intersection(a, b) => {
                a.contains(point, direction) && b.contains(point, direction)
            }
            RegionExpr::Complement(inner) => !inner.contains(point, direction),
        }
    }
}
