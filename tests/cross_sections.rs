// Macroscopic cross sections end to end: tables, caching across threads,
// probability-table corrections and a hybrid-tracking run on a built majorant.

use mctrack::geometry::GeometryBuilder;
use mctrack::nuclide::MT_TOTAL;
use mctrack::{
    build_majorant, Cell, CrossSectionEngine, EnergyGrid, Interpolation, LcgStream, Material, MaterialId,
    NuclideTable, ParticleState, ProbabilityTable, ReactionDescriptor, ReactionId, ReactionKind, Region,
    Settings, SingleProcess, StandardCorrections, StepOutcome, Surface, TabulatedXs, ThreadContext,
    TrackingKernel, UniverseKind, UresCorrection,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;

struct Library {
    data: NuclideTable,
    materials: SlotMap<MaterialId, Material>,
    reactions: SlotMap<ReactionId, ReactionDescriptor>,
    fuel: MaterialId,
    water: MaterialId,
}

fn add_material(lib: &mut Library, material: Material) -> MaterialId {
    let id = lib.materials.insert(material);
    let total = ReactionDescriptor::for_material(
        "total",
        ReactionKind::Total,
        id,
        &lib.materials[id],
        MT_TOTAL,
        &lib.data,
    )
    .unwrap();
    lib.materials[id].reactions.total = Some(lib.reactions.insert(total));
    id
}

/// Fuel: 0.02 U238 + 0.01 H1, water: 0.06 H1, on the grid 1, 10, 100, 1000 eV.
fn library() -> Library {
    let grid = Arc::new(EnergyGrid::new(vec![1.0, 10.0, 100.0, 1000.0]).unwrap());
    let mut data = NuclideTable::new(grid);
    let h1 = data.add_nuclide("H1", 0.99917, 293.6).unwrap();
    let u238 = data.add_nuclide("U238", 236.0058, 293.6).unwrap();
    data.set_reaction(h1, MT_TOTAL, 0, vec![20.0; 4]).unwrap();
    data.set_reaction(u238, MT_TOTAL, 0, vec![10.0, 50.0, 15.0, 30.0]).unwrap();

    let mut lib = Library {
        data,
        materials: SlotMap::with_key(),
        reactions: SlotMap::with_key(),
        fuel: MaterialId::default(),
        water: MaterialId::default(),
    };
    let mut fuel = Material::with_id("fuel", 1);
    fuel.add_nuclide(u238, 0.02).unwrap();
    fuel.add_nuclide(h1, 0.01).unwrap();
    let mut water = Material::with_id("water", 2);
    water.add_nuclide(h1, 0.06).unwrap();
    lib.fuel = add_material(&mut lib, fuel);
    lib.water = add_material(&mut lib, water);
    lib
}

#[test]
fn test_grid_points_and_last_bin() {
    let mut lib = library();
    let grid = lib.data.grid().clone();
    let values = vec![3.0, 7.0, 2.0, 5.0];
    let table = TabulatedXs::new(grid.clone(), values.clone(), Interpolation::Linear).unwrap();
    let tabulated = lib.reactions.insert(
        ReactionDescriptor::new("tabulated", ReactionKind::Total, lib.fuel, Vec::new(), Some(table)).unwrap(),
    );
    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default());
    let mut ctx = ThreadContext::seeded(0, 1);

    for (e, v) in grid.energies().iter().zip(&values) {
        assert_eq!(engine.macro_xs(tabulated, *e, &mut ctx).unwrap(), *v);
    }
    assert_eq!(engine.macro_xs(tabulated, 1000.0, &mut ctx).unwrap(), 5.0);
    assert_eq!(engine.macro_xs(tabulated, 1000.5, &mut ctx).unwrap(), 0.0);

    // partial sums: 0.02 σ(U238) + 0.01 σ(H1)
    let expected = [0.4, 1.2, 0.5, 0.8];
    for (e, v) in grid.energies().iter().zip(expected) {
        let total = engine.total_xs(lib.fuel, *e, &mut ctx).unwrap();
        assert!((total - v).abs() < 1e-14, "E = {}: {}", e, total);
    }
}

#[test]
fn test_threads_keep_private_caches() {
    let lib = library();
    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default());
    let engine = &engine;

    let results: Vec<(u64, (u64, u64))> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                scope.spawn(move || {
                    let mut ctx = ThreadContext::seeded(t, 42);
                    let a = engine.total_xs(lib.fuel, 5.0, &mut ctx).unwrap();
                    let b = engine.total_xs(lib.fuel, 5.0, &mut ctx).unwrap();
                    assert_eq!(a.to_bits(), b.to_bits());
                    (a.to_bits(), ctx.cache.stats())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (bits, stats) in &results {
        assert_eq!(*bits, results[0].0);
        assert_eq!(*stats, (1, 1));
    }
}

/// U238 bands with factors 0.5 and 1.5 at equal odds between 2 and 200 eV.
fn ures_corrections(lib: &Library) -> StandardCorrections {
    let u238 = lib.data.id_of("U238").unwrap();
    let mut factors = HashMap::new();
    factors.insert(MT_TOTAL, vec![vec![0.5, 1.5], vec![0.5, 1.5]]);
    let table = ProbabilityTable::new(vec![2.0, 200.0], vec![vec![0.5, 1.0], vec![0.5, 1.0]], factors).unwrap();
    let mut ures = UresCorrection::new();
    ures.insert(u238, table);
    StandardCorrections {
        ures: Some(ures),
        ..Default::default()
    }
}

#[test]
fn test_probability_tables_resampled_per_collision() {
    let lib = library();
    let corrections = ures_corrections(&lib);
    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default())
        .with_corrections(&corrections);

    // σ(U238, 5 eV) = 10 + 40 × 4 / 9
    let smooth = 0.02 * (10.0 + 40.0 * 4.0 / 9.0) + 0.2;
    let shift = 0.5 * 0.02 * (10.0 + 40.0 * 4.0 / 9.0);
    let mut ctx = ThreadContext::seeded(0, 8);
    let mut low = 0;
    let mut high = 0;
    for _ in 0..64 {
        ctx.next_collision();
        let v = engine.total_xs(lib.fuel, 5.0, &mut ctx).unwrap();
        assert_eq!(engine.total_xs(lib.fuel, 5.0, &mut ctx).unwrap().to_bits(), v.to_bits());
        if (v - (smooth - shift)).abs() < 1e-12 {
            low += 1;
        } else {
            assert!((v - (smooth + shift)).abs() < 1e-12, "unexpected value {}", v);
            high += 1;
        }
    }
    assert!(low > 0 && high > 0);

    // outside the unresolved range the smooth value is untouched
    assert!((engine.total_xs(lib.fuel, 1.0, &mut ctx).unwrap() - 0.4).abs() < 1e-14);
}

#[test]
fn test_ures_bands_follow_thread_stream() {
    let lib = library();
    let corrections = ures_corrections(&lib);
    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default())
        .with_corrections(&corrections);

    let history = |mut ctx: ThreadContext| -> Vec<u64> {
        (0..64)
            .map(|_| {
                ctx.next_collision();
                engine.total_xs(lib.fuel, 50.0, &mut ctx).unwrap().to_bits()
            })
            .collect()
    };
    let first = history(ThreadContext::seeded(0, 1));
    assert_eq!(first, history(ThreadContext::seeded(0, 1)));
    assert_ne!(first, history(ThreadContext::seeded(1, 999)));
    assert_ne!(first, history(ThreadContext::seeded(0, 2)));
}

#[test]
fn test_majorant_bounds_sampled_ures_totals() {
    let lib = library();
    let corrections = ures_corrections(&lib);
    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default())
        .with_corrections(&corrections);
    let majorant = build_majorant(&engine, lib.data.grid().clone(), &SingleProcess).unwrap();
    let table = majorant.table.as_ref().unwrap();

    // fuel at 10 eV on the high band: 0.02 × 50 × 1.5 + 0.01 × 20
    let expected = [1.7, 1.7, 1.2, 1.2];
    for (bin, v) in table.values.iter().zip(expected) {
        assert!((bin - v).abs() < 1e-12, "bins {:?}", table.values);
    }

    let mut ctx = ThreadContext::seeded(2, 31);
    for _ in 0..200 {
        ctx.next_collision();
        for e in [1.0, 5.0, 10.0, 50.0, 100.0, 150.0, 199.0, 500.0, 1000.0] {
            let total = engine.total_xs(lib.fuel, e, &mut ctx).unwrap();
            assert!(total <= table.evaluate(e) + 1e-12, "E = {}: {} above {}", e, total, table.evaluate(e));
        }
    }
}

#[test]
fn test_hybrid_tracking_on_built_majorant() {
    let mut lib = library();
    let majorant = {
        let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default());
        build_majorant(&engine, lib.data.grid().clone(), &SingleProcess).unwrap()
    };
    assert_eq!(majorant.table.as_ref().unwrap().values, vec![1.2; 4]);
    let majorant = lib.reactions.insert(majorant);

    let inner = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 2.0));
    let outer = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 10.0));
    let mut builder = GeometryBuilder::new();
    let pellet = builder.add_cell(Cell::material("pellet", Region::below(&inner), lib.fuel).with_id(1));
    let pool = builder.add_cell(
        Cell::material("pool", Region::above(&inner).intersection(&Region::below(&outer)), lib.water).with_id(2),
    );
    let root = builder.add_universe("root", UniverseKind::Nest(vec![pellet, pool]));
    let geometry = builder.build(root).unwrap();

    let engine = CrossSectionEngine::new(&lib.materials, &lib.reactions, &lib.data, Settings::default());
    let kernel = TrackingKernel::new(&geometry, Settings::default()).unwrap();
    let mut ctx = ThreadContext::new(0, LcgStream::for_stream(11, 0));
    let mut rng = StdRng::seed_from_u64(7);

    let mut delta_steps = 0;
    let mut surface_steps = 0;
    let mut escapes = 0;
    for _ in 0..200 {
        let mut p = ParticleState::new([0.0; 3], [0.0, 0.0, 1.0], 5.0);
        for _ in 0..5000 {
            let m = engine.macro_xs(majorant, p.energy, &mut ctx).unwrap();
            assert!((m - 1.2).abs() < 1e-12);
            let r = kernel.step(&mut p, m, 0.01, &engine, &mut ctx).unwrap();
            if r.sampled_xs == m {
                delta_steps += 1;
            } else {
                surface_steps += 1;
            }
            if r.escaped() {
                escapes += 1;
                break;
            }
            if r.outcome == StepOutcome::RealCollision {
                let mu: f64 = 2.0 * rng.gen::<f64>() - 1.0;
                let phi = 2.0 * std::f64::consts::PI * rng.gen::<f64>();
                let s = (1.0 - mu * mu).sqrt();
                p.direction = [s * phi.cos(), s * phi.sin(), mu];
            }
        }
    }
    assert!(delta_steps > 0);
    assert!(surface_steps > 0);
    assert_eq!(escapes, 200);
    assert_eq!(ctx.geometry_errors, 0);
}
