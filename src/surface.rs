/// Quadric surfaces used by cell regions.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub surface_id: Option<usize>,
    pub kind: SurfaceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceKind {
    /// a x + b y + c z = d
    Plane { a: f64, b: f64, c: f64, d: f64 },
    Sphere { x0: f64, y0: f64, z0: f64, radius: f64 },
    /// Infinite cylinder around a unit axis through `origin`.
    Cylinder {
        axis: [f64; 3],
        origin: [f64; 3],
        radius: f64,
    },
}

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

// Smallest root of a t^2 + b t + c = 0 that lies ahead of the point.
fn smallest_positive_root(a: f64, b: f64, c: f64) -> Option<f64> {
    if a.abs() < 1e-12 {
        return None;
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    if t1 > 1e-12 {
        Some(t1)
    } else if t2 > 1e-12 {
        Some(t2)
    } else {
        None
    }
}

impl Surface {
    pub fn new(surface_id: Option<usize>, kind: SurfaceKind) -> Self {
        Surface { surface_id, kind }
    }

    pub fn plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self::new(None, SurfaceKind::Plane { a, b, c, d })
    }

    pub fn x_plane(x0: f64) -> Self {
        Self::plane(1.0, 0.0, 0.0, x0)
    }

    pub fn y_plane(y0: f64) -> Self {
        Self::plane(0.0, 1.0, 0.0, y0)
    }

    pub fn z_plane(z0: f64) -> Self {
        Self::plane(0.0, 0.0, 1.0, z0)
    }

    pub fn sphere(x0: f64, y0: f64, z0: f64, radius: f64) -> Self {
        Self::new(None, SurfaceKind::Sphere { x0, y0, z0, radius })
    }

    /// Cylinder parallel to the z axis centred at (x0, y0).
    pub fn z_cylinder(x0: f64, y0: f64, radius: f64) -> Self {
        Self::new(
            None,
            SurfaceKind::Cylinder {
                axis: [0.0, 0.0, 1.0],
                origin: [x0, y0, 0.0],
                radius,
            },
        )
    }

    pub fn with_id(mut self, surface_id: usize) -> Self {
        self.surface_id = Some(surface_id);
        self
    }

    /// Signed surface function: negative inside (below), positive outside (above).
    pub fn evaluate(&self, point: [f64; 3]) -> f64 {
        match &self.kind {
            SurfaceKind::Plane { a, b, c, d } => a * point[0] + b * point[1] + c * point[2] - d,
            SurfaceKind::Sphere { x0, y0, z0, radius } => {
                let r = sub(point, [*x0, *y0, *z0]);
                dot(r, r).sqrt() - radius
            }
            SurfaceKind::Cylinder {
                axis,
                origin,
                radius,
            } => {
                let v = sub(point, *origin);
                let along = dot(v, *axis);
                let m = [
                    v[0] - along * axis[0],
                    v[1] - along * axis[1],
                    v[2] - along * axis[2],
                ];
                dot(m, m).sqrt() - radius
            }
        }
    }

    /// Outward (towards positive sense) normal at `point`, not normalised.
    pub fn normal(&self, point: [f64; 3]) -> [f64; 3] {
        match &self.kind {
            SurfaceKind::Plane { a, b, c, .. } => [*a, *b, *c],
            SurfaceKind::Sphere { x0, y0, z0, .. } => sub(point, [*x0, *y0, *z0]),
            SurfaceKind::Cylinder { axis, origin, .. } => {
                let v = sub(point, *origin);
                let along = dot(v, *axis);
                [
                    v[0] - along * axis[0],
                    v[1] - along * axis[1],
                    v[2] - along * axis[2],
                ]
            }
        }
    }

    /// True when `point` is on the positive side. A point lying exactly on the
    /// surface takes the side `direction` is heading into.
    pub fn sense(&self, point: [f64; 3], direction: [f64; 3]) -> bool {
        let f = self.evaluate(point);
        if f != 0.0 {
            return f > 0.0;
        }
        dot(self.normal(point), direction) > 0.0
    }

    /// Distance along `direction` to the next intersection ahead of `point`.
    pub fn distance_to_surface(&self, point: [f64; 3], direction: [f64; 3]) -> Option<f64> {
        match &self.kind {
            SurfaceKind::Plane { a, b, c, d } => {
                let denom = a * direction[0] + b * direction[1] + c * direction[2];
                if denom.abs() < 1e-12 {
                    return None;
                }
                let t = (d - (a * point[0] + b * point[1] + c * point[2])) / denom;
                if t > 0.0 {
                    Some(t)
                } else {
                    None
                }
            }
            SurfaceKind::Sphere { x0, y0, z0, radius } => {
                let oc = sub(point, [*x0, *y0, *z0]);
                let a = dot(direction, direction);
                let b = 2.0 * dot(oc, direction);
                let c = dot(oc, oc) - radius * radius;
                smallest_positive_root(a, b, c)
            }
            SurfaceKind::Cylinder {
                axis,
                origin,
                radius,
            } => {
                let v_dot_a = dot(direction, *axis);
                let d = [
                    direction[0] - v_dot_a * axis[0],
                    direction[1] - v_dot_a * axis[1],
                    direction[2] - v_dot_a * axis[2],
                ];
                let delta = sub(point, *origin);
                let delta_dot_a = dot(delta, *axis);
                let m = [
                    delta[0] - delta_dot_a * axis[0],
                    delta[1] - delta_dot_a * axis[1],
                    delta[2] - delta_dot_a * axis[2],
                ];
                smallest_positive_root(dot(d, d), 2.0 * dot(d, m), dot(m, m) - radius * radius)
            }
        }
    }
}
