use crate::cache::XsCache;
use crate::ids::NuclideId;
use crate::rng::{LcgStream, UniformSource};

/// Probability-table band uniforms drawn for the current collision, one per nuclide.
#[derive(Debug, Clone, Default)]
pub struct BandDraws {
    collision: u64,
    drawn: Vec<(NuclideId, f64)>,
}

impl BandDraws {
    pub fn get(&self, collision: u64, nuclide: NuclideId) -> Option<f64> {
        if self.collision != collision {
            return None;
        }
        self.drawn.iter().find(|(n, _)| *n == nuclide).map(|(_, xi)| *xi)
    }
}

/// State owned by one worker thread for the whole run.
pub struct ThreadContext {
    pub thread_id: usize,
    pub rng: Box<dyn UniformSource>,
    pub cache: XsCache,
    /// Incremented at every sampled collision point, real or virtual.
    pub collision_index: u64,
    /// Geometry errors absorbed so far on this thread.
    pub geometry_errors: u64,
    /// Position of the current event, for density-coupling lookups.
    pub position: [f64; 3],
    pub bands: BandDraws,
}

impl ThreadContext {
    pub fn new(thread_id: usize, rng: impl UniformSource + 'static) -> Self {
        ThreadContext {
            thread_id,
            rng: Box::new(rng),
            cache: XsCache::new(),
            collision_index: 0,
            geometry_errors: 0,
            position: [0.0; 3],
            bands: BandDraws::default(),
        }
    }

    /// Context with an independent stream derived from the run seed.
    pub fn seeded(thread_id: usize, seed: u64) -> Self {
        Self::new(thread_id, LcgStream::for_stream(seed, thread_id as u64))
    }

    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.uniform()
    }

    #[inline]
    pub fn next_collision(&mut self) -> u64 {
        self.collision_index += 1;
        self.collision_index
    }

    /// Band uniform of `nuclide` at the current collision, drawn from this
    /// thread's stream the first time it is asked for.
    pub fn band_uniform(&mut self, nuclide: NuclideId) -> f64 {
        if self.bands.collision != self.collision_index {
            self.bands.collision = self.collision_index;
            self.bands.drawn.clear();
        }
        if let Some(xi) = self.bands.get(self.collision_index, nuclide) {
            return xi;
        }
        let xi = self.rng.uniform();
        self.bands.drawn.push((nuclide, xi));
        xi
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("thread_id", &self.thread_id)
            .field("collision_index", &self.collision_index)
            .field("geometry_errors", &self.geometry_errors)
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ReplayStream;

    #[test]
    fn test_collision_index_is_monotonic() {
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.25]));
        assert_eq!(ctx.next_collision(), 1);
        assert_eq!(ctx.next_collision(), 2);
        assert_eq!(ctx.uniform(), 0.25);
    }

    #[test]
    fn test_seeded_threads_differ() {
        let mut a = ThreadContext::seeded(0, 42);
        let mut b = ThreadContext::seeded(1, 42);
        assert_ne!(a.uniform(), b.uniform());
    }

    #[test]
    fn test_band_drawn_once_per_collision() {
        let mut map: slotmap::SlotMap<NuclideId, ()> = slotmap::SlotMap::with_key();
        let u = map.insert(());
        let pu = map.insert(());
        let mut ctx = ThreadContext::new(0, ReplayStream::new(vec![0.1, 0.2, 0.3]));
        ctx.next_collision();
        assert_eq!(ctx.band_uniform(u), 0.1);
        assert_eq!(ctx.band_uniform(pu), 0.2);
        assert_eq!(ctx.band_uniform(u), 0.1);
        assert_eq!(ctx.bands.get(1, pu), Some(0.2));

        ctx.next_collision();
        assert_eq!(ctx.bands.get(2, u), None);
        assert_eq!(ctx.band_uniform(u), 0.3);
    }
}
