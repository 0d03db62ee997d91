use crate::config::{Settings, VoidCollisionPolicy};
use crate::context::ThreadContext;
use crate::error::{Result, TransportError};
use crate::geometry::{BoundaryOracle, CellLocator, Location};
use crate::ids::{CellId, MaterialId};
use crate::particle::ParticleState;
use tracing::{debug, error, warn};

/// Local total cross section of whatever material occupies the particle's cell.
pub trait LocalCrossSection {
    /// Macroscopic total at `energy`; `None` is a void cell and yields zero.
    fn local_total(
        &self,
        material: Option<MaterialId>,
        energy: f64,
        ctx: &mut ThreadContext,
    ) -> Result<f64>;

    fn material_label(&self, material: MaterialId) -> String {
        format!("{:?}", material)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    SurfaceCrossing,
    VirtualCollision,
    RealCollision,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    /// Cell at the end of the step, `None` once the particle has left the geometry.
    pub new_cell: Option<CellId>,
    pub path_length: f64,
    /// Cross section the path length was sampled with; zero for forced virtual collisions.
    pub sampled_xs: f64,
}

impl StepResult {
    pub fn escaped(&self) -> bool {
        self.outcome == StepOutcome::SurfaceCrossing && self.new_cell.is_none()
    }
}

/// Moves particles one event at a time through a geometry.
///
/// [`TrackingKernel::move_step`] is surface tracking with a lower bound on the
/// sampling cross section, [`TrackingKernel::delta_step`] is pure delta tracking
/// against a majorant, and [`TrackingKernel::step`] picks between the two.
pub struct TrackingKernel<'g, G: ?Sized> {
    geometry: &'g G,
    settings: Settings,
}

#[inline]
fn sample_distance(xs: f64, ctx: &mut ThreadContext) -> f64 {
    let u = ctx.uniform();
    let u = if u > 0.0 { u } else { f64::MIN_POSITIVE };
    -u.ln() / xs
}

impl<'g, G: CellLocator + BoundaryOracle + ?Sized> TrackingKernel<'g, G> {
    /// Kernel over `geometry`; the settings are validated once here.
    pub fn new(geometry: &'g G, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(TrackingKernel { geometry, settings })
    }

    /// Kernel using a snapshot of the process-wide [`Settings::global`].
    pub fn from_global(geometry: &'g G) -> Result<Self> {
        let settings = Settings::global().clone();
        Self::new(geometry, settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn geometry(&self) -> &'g G {
        self.geometry
    }

    /// One surface-tracking step.
    ///
    /// The path length is sampled with `max(xs_total, xs_min)`, never below the
    /// configured `min_sampling_xs`, and the collision
    /// is accepted as real with probability `xs_total / xs`. A cell change found
    /// after a straight move inside one cell is counted as a geometry error and
    /// turned into a virtual collision with the next step forced into
    /// near-surface mode.
    pub fn move_step(
        &self,
        particle: &mut ParticleState,
        xs_total: f64,
        xs_min: f64,
        ctx: &mut ThreadContext,
    ) -> Result<StepResult> {
        particle.validate()?;
        if !(xs_total >= 0.0) || !xs_total.is_finite() {
            return Err(TransportError::InvalidCrossSection {
                name: "xs_total",
                value: xs_total,
            });
        }
        if !(xs_min > 0.0) || !xs_min.is_finite() {
            return Err(TransportError::InvalidCrossSection {
                name: "xs_min",
                value: xs_min,
            });
        }

        let near_surface =
            std::mem::take(&mut particle.force_near_surface) || self.settings.solid_near_surface;

        ctx.next_collision();
        ctx.position = particle.position;
        let xs = xs_total.max(xs_min).max(self.settings.min_sampling_xs);
        let l = sample_distance(xs, ctx);

        let Some(start) = self.geometry.locate(particle.position, particle.direction)? else {
            debug!(
                "Particle at {:?} is outside the geometry at the start of the step",
                particle.position
            );
            return Ok(self.outside(particle, xs));
        };

        let mut d = self
            .geometry
            .nearest_boundary(particle.position, particle.direction)?;
        if near_surface {
            d = (d - self.settings.near_surface_margin).max(0.0);
        }

        if l < d {
            particle.advance(l);
            ctx.position = particle.position;
            let here = self.geometry.locate(particle.position, particle.direction)?;

            let here = match here {
                Some(loc) if loc.cell == start.cell => loc,
                None if start.in_solid => {
                    // Undefined point inside a mesh is not an error.
                    return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(start.cell), l, xs));
                }
                other => {
                    return self.geometry_error(particle, ctx, &start, other.map(|loc| loc.cell), l);
                }
            };

            if here.material.is_none() && here.in_solid {
                return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(here.cell), l, xs));
            }

            if ctx.uniform() < xs_total / xs {
                if here.material.is_none() {
                    return self.void_collision(particle, &here, near_surface, l, xs);
                }
                return Ok(self.finish(particle, StepOutcome::RealCollision, Some(here.cell), l, xs));
            }
            return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(here.cell), l, xs));
        }

        if near_surface {
            particle.advance(d);
            particle.force_near_surface = true;
            return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(start.cell), d, 0.0));
        }

        let path = d + self.settings.surface_extrapolation;
        particle.advance(path);
        ctx.position = particle.position;
        let next = self.geometry.locate(particle.position, particle.direction)?;
        if next.is_none() {
            debug!("Particle escaped at {:?}", particle.position);
        }
        Ok(self.finish(
            particle,
            StepOutcome::SurfaceCrossing,
            next.map(|loc| loc.cell),
            path,
            xs,
        ))
    }

    /// One delta-tracking step against `majorant`.
    ///
    /// The local cross section is only evaluated at the tentative collision site.
    /// As in surface tracking, landing on an undefined point after starting
    /// inside a mesh or STL solid is a virtual collision, not an escape.
    pub fn delta_step(
        &self,
        particle: &mut ParticleState,
        majorant: f64,
        xs: &dyn LocalCrossSection,
        ctx: &mut ThreadContext,
    ) -> Result<StepResult> {
        particle.validate()?;
        let Some(start) = self.geometry.locate(particle.position, particle.direction)? else {
            return Ok(self.outside(particle, majorant));
        };
        self.delta_from(particle, &start, majorant, xs, ctx)
    }

    fn delta_from(
        &self,
        particle: &mut ParticleState,
        start: &Location,
        majorant: f64,
        xs: &dyn LocalCrossSection,
        ctx: &mut ThreadContext,
    ) -> Result<StepResult> {
        if !(majorant > 0.0) || !majorant.is_finite() {
            return Err(TransportError::InvalidCrossSection {
                name: "majorant",
                value: majorant,
            });
        }
        particle.force_near_surface = false;

        ctx.next_collision();
        let l = sample_distance(majorant, ctx);
        particle.advance(l);
        ctx.position = particle.position;

        let here = match self.geometry.locate(particle.position, particle.direction)? {
            Some(loc) => loc,
            None if start.in_solid => {
                return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(start.cell), l, majorant));
            }
            None => {
                debug!("Particle escaped at {:?}", particle.position);
                return Ok(self.finish(particle, StepOutcome::SurfaceCrossing, None, l, majorant));
            }
        };

        let local = xs.local_total(here.material, particle.energy, ctx)?;
        if local > majorant * (1.0 + 1e-9) {
            let material = here
                .material
                .map_or_else(|| "void".to_string(), |m| xs.material_label(m));
            return Err(TransportError::MajorantTooSmall {
                material,
                energy: particle.energy,
                majorant,
                total: local,
            });
        }

        let outcome = if ctx.uniform() < local / majorant {
            StepOutcome::RealCollision
        } else {
            StepOutcome::VirtualCollision
        };
        Ok(self.finish(particle, outcome, Some(here.cell), l, majorant))
    }

    /// Hybrid step: delta tracking where the local total is close to the
    /// majorant (or after a geometry error), surface tracking elsewhere.
    ///
    /// A zero `majorant` disables delta tracking.
    pub fn step(
        &self,
        particle: &mut ParticleState,
        majorant: f64,
        xs_min: f64,
        xs: &dyn LocalCrossSection,
        ctx: &mut ThreadContext,
    ) -> Result<StepResult> {
        if particle.force_near_surface && majorant > 0.0 {
            return self.delta_step(particle, majorant, xs, ctx);
        }

        particle.validate()?;
        ctx.position = particle.position;
        let Some(start) = self.geometry.locate(particle.position, particle.direction)? else {
            return Ok(self.outside(particle, majorant));
        };
        let local = xs.local_total(start.material, particle.energy, ctx)?;

        if majorant > 0.0 && local / majorant >= self.settings.delta_tracking_threshold {
            return self.delta_from(particle, &start, majorant, xs, ctx);
        }
        self.move_step(particle, local, xs_min, ctx)
    }

    // Zero-length escape for a particle that starts outside the geometry.
    fn outside(&self, particle: &mut ParticleState, sampled_xs: f64) -> StepResult {
        particle.cell = None;
        StepResult {
            outcome: StepOutcome::SurfaceCrossing,
            new_cell: None,
            path_length: 0.0,
            sampled_xs,
        }
    }

    fn finish(
        &self,
        particle: &mut ParticleState,
        outcome: StepOutcome,
        new_cell: Option<CellId>,
        path_length: f64,
        sampled_xs: f64,
    ) -> StepResult {
        particle.cell = new_cell;
        StepResult {
            outcome,
            new_cell,
            path_length,
            sampled_xs,
        }
    }

    fn geometry_error(
        &self,
        particle: &mut ParticleState,
        ctx: &mut ThreadContext,
        start: &Location,
        found: Option<CellId>,
        path_length: f64,
    ) -> Result<StepResult> {
        ctx.geometry_errors += 1;
        let [x, y, z] = particle.position;
        let found_label = found.map_or_else(|| "nothing".to_string(), |c| self.geometry.cell_label(c));

        if ctx.geometry_errors > self.settings.max_geometry_errors {
            error!(
                "Thread {}: too many geometry errors ({}), last at ({}, {}, {})",
                ctx.thread_id, ctx.geometry_errors, x, y, z
            );
            return Err(TransportError::GeometryToleranceExceeded {
                count: ctx.geometry_errors,
                limit: self.settings.max_geometry_errors,
                x,
                y,
                z,
            });
        }
        warn!(
            "Thread {}: moved from {} into {} without crossing a boundary at ({}, {}, {})",
            ctx.thread_id,
            self.geometry.cell_label(start.cell),
            found_label,
            x,
            y,
            z
        );

        particle.force_near_surface = true;
        Ok(self.finish(particle, StepOutcome::VirtualCollision, found, path_length, 0.0))
    }

    fn void_collision(
        &self,
        particle: &mut ParticleState,
        here: &Location,
        near_surface: bool,
        path_length: f64,
        xs: f64,
    ) -> Result<StepResult> {
        let [x, y, z] = particle.position;
        if near_surface && self.settings.void_collision_policy == VoidCollisionPolicy::DemoteInNearSurface {
            warn!(
                "Collision in void cell {} at ({}, {}, {}) treated as virtual",
                self.geometry.cell_label(here.cell),
                x,
                y,
                z
            );
            return Ok(self.finish(particle, StepOutcome::VirtualCollision, Some(here.cell), path_length, xs));
        }
        let cell = self.geometry.cell_label(here.cell);
        error!("Collision in void cell {} at ({}, {}, {})", cell, x, y, z);
        Err(TransportError::VoidCollision { cell, x, y, z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellFill};
    use crate::geometry::{Geometry, GeometryBuilder};
    use crate::region::Region;
    use crate::rng::ReplayStream;
    use crate::surface::Surface;
    use crate::universe::UniverseKind;
    use slotmap::SlotMap;
    use std::sync::Arc;

    struct ConstXs(SlotMap<MaterialId, f64>);

    impl LocalCrossSection for ConstXs {
        fn local_total(&self, material: Option<MaterialId>, _energy: f64, _ctx: &mut ThreadContext) -> Result<f64> {
            Ok(material.and_then(|m| self.0.get(m).copied()).unwrap_or(0.0))
        }
    }

    /// Void cell for x < 0 and a material cell for 0 <= x < 10.
    fn void_then_material(xs: f64) -> (Geometry, ConstXs) {
        let mut table = SlotMap::with_key();
        let m = table.insert(xs);
        let x0 = Arc::new(Surface::x_plane(0.0));
        let x10 = Arc::new(Surface::x_plane(10.0));
        let xm10 = Arc::new(Surface::x_plane(-10.0));

        let mut builder = GeometryBuilder::new();
        let void = builder.add_cell(Cell::void("gap", Region::above(&xm10).intersection(&Region::below(&x0))));
        let fuel = builder.add_cell(Cell::material(
            "fuel",
            Region::above(&x0).intersection(&Region::below(&x10)),
            m,
        ));
        let root = builder.add_universe("root", UniverseKind::CellComplex(vec![void, fuel]));
        (builder.build(root).unwrap(), ConstXs(table))
    }

    #[test]
    fn test_infinite_medium_always_collides() {
        let mut builder = GeometryBuilder::new();
        let mut table: SlotMap<MaterialId, f64> = SlotMap::with_key();
        let m = table.insert(1.0);
        let cell = builder.add_cell(Cell::new("all", None, CellFill::Material(m)));
        let root = builder.add_universe("root", UniverseKind::CellComplex(vec![cell]));
        let geometry = builder.build(root).unwrap();
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();

        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.5, 0.1]));
        let mut p = ParticleState::new([0.0; 3], [0.0, 0.0, 1.0], 1e6);
        let r = kernel.move_step(&mut p, 1.0, 0.5, &mut ctx).unwrap();
        assert_eq!(r.outcome, StepOutcome::RealCollision);
        assert!((r.path_length - 2f64.ln()).abs() < 1e-12);
        assert_eq!(r.new_cell, Some(cell));
        assert_eq!(ctx.collision_index, 1);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let (geometry, _) = void_then_material(1.0);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
        let mut ctx = ThreadContext::seeded(0, 1);

        let mut p = ParticleState::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        assert!(matches!(
            kernel.move_step(&mut p, 1.0, 0.0, &mut ctx),
            Err(TransportError::InvalidCrossSection { name: "xs_min", .. })
        ));
        assert!(matches!(
            kernel.move_step(&mut p, f64::NAN, 1.0, &mut ctx),
            Err(TransportError::InvalidCrossSection { name: "xs_total", .. })
        ));
        let mut bad = ParticleState::new([1.0, 0.0, 0.0], [0.5, 0.0, 0.0], 1.0);
        assert!(matches!(
            kernel.move_step(&mut bad, 1.0, 1.0, &mut ctx),
            Err(TransportError::InvalidDirection { .. })
        ));
    }

    #[test]
    fn test_void_collision_is_fatal_in_exact_mode() {
        let (geometry, _) = void_then_material(1.0);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.9, 0.0]));
        let mut p = ParticleState::new([-5.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let err = kernel.move_step(&mut p, 1.0, 1.0, &mut ctx).unwrap_err();
        assert!(matches!(err, TransportError::VoidCollision { ref cell, .. } if cell == "gap"));
    }

    #[test]
    fn test_void_collision_demoted_in_near_surface_mode() {
        let (geometry, _) = void_then_material(1.0);
        let settings = Settings {
            void_collision_policy: VoidCollisionPolicy::DemoteInNearSurface,
            ..Settings::default()
        };
        let kernel = TrackingKernel::new(&geometry, settings).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.9, 0.0]));

        let mut p = ParticleState::new([-5.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        p.force_near_surface = true;
        let r = kernel.move_step(&mut p, 1.0, 1.0, &mut ctx).unwrap();
        assert_eq!(r.outcome, StepOutcome::VirtualCollision);
        assert!(!p.force_near_surface);

        // exact mode still fails under the same policy
        let mut q = ParticleState::new([-5.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.9, 0.0]));
        assert!(kernel.move_step(&mut q, 1.0, 1.0, &mut ctx).is_err());
    }

    #[test]
    fn test_near_surface_stops_short_of_boundary() {
        let (geometry, _) = void_then_material(1.0);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![1e-6]));
        let mut p = ParticleState::new([5.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        p.force_near_surface = true;

        let r = kernel.move_step(&mut p, 1.0, 1.0, &mut ctx).unwrap();
        assert_eq!(r.outcome, StepOutcome::VirtualCollision);
        assert_eq!(r.sampled_xs, 0.0);
        assert!(p.force_near_surface);
        assert!(p.position[0] < 10.0);
        assert!((p.position[0] - (10.0 - 1e-6)).abs() < 1e-9);
    }

    #[test]
    fn test_delta_step_rejects_small_majorant() {
        let (geometry, xs) = void_then_material(2.0);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.5, 0.5]));
        let mut p = ParticleState::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let err = kernel.delta_step(&mut p, 1.0, &xs, &mut ctx).unwrap_err();
        assert!(matches!(err, TransportError::MajorantTooSmall { total, .. } if total == 2.0));
    }

    #[test]
    fn test_hybrid_switches_on_threshold() {
        let (geometry, xs) = void_then_material(0.95);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();

        // 0.95 / 1.0 is above the default threshold: delta tracking samples with the majorant.
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.5, 0.99]));
        let mut p = ParticleState::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let r = kernel.step(&mut p, 1.0, 0.1, &xs, &mut ctx).unwrap();
        assert_eq!(r.sampled_xs, 1.0);
        assert_eq!(r.outcome, StepOutcome::VirtualCollision);

        // against a loose majorant the step falls back to surface tracking
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.5, 0.5]));
        let mut p = ParticleState::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let r = kernel.step(&mut p, 10.0, 0.1, &xs, &mut ctx).unwrap();
        assert_eq!(r.sampled_xs, 0.95);
        assert_eq!(r.outcome, StepOutcome::RealCollision);
    }

    #[test]
    fn test_escape_reports_no_cell() {
        let (geometry, _) = void_then_material(1.0);
        let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![1e-30]));
        let mut p = ParticleState::new([9.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let r = kernel.move_step(&mut p, 1.0, 1.0, &mut ctx).unwrap();
        assert!(r.escaped());
        assert!(p.cell.is_none());
        assert!((r.path_length - (1.0 + 1e-8)).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_settings_rejected_at_construction() {
        let (geometry, _) = void_then_material(1.0);
        let settings = Settings {
            surface_extrapolation: 0.0,
            ..Settings::default()
        };
        let err = TrackingKernel::new(&geometry, settings).err().unwrap();
        assert!(err.is_configuration());
        assert!(TrackingKernel::from_global(&geometry).is_ok());
    }

    #[test]
    fn test_configured_minimum_bounds_sampling_xs() {
        let (geometry, _) = void_then_material(1.0);
        let settings = Settings {
            min_sampling_xs: 2.0,
            ..Settings::default()
        };
        let kernel = TrackingKernel::new(&geometry, settings).unwrap();
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.5, 0.9]));
        let mut p = ParticleState::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        let r = kernel.move_step(&mut p, 1.0, 0.5, &mut ctx).unwrap();
        assert_eq!(r.sampled_xs, 2.0);
        assert!((r.path_length - 2f64.ln() / 2.0).abs() < 1e-12);
        assert_eq!(r.outcome, StepOutcome::VirtualCollision);
    }
}
