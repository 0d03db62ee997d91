use crate::ids::ReactionId;
use std::collections::HashMap;

/// What a memoized value is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    /// Bit pattern of the energy; deterministic reactions.
    Energy(u64),
    /// Collision index and energy; values that are resampled at every collision.
    Collision { index: u64, energy: u64 },
}

impl CacheKey {
    #[inline]
    pub fn energy(energy: f64) -> Self {
        CacheKey::Energy(energy.to_bits())
    }

    #[inline]
    pub fn collision(index: u64, energy: f64) -> Self {
        CacheKey::Collision {
            index,
            energy: energy.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: CacheKey,
    generation: u64,
    value: f64,
}

/// Per-thread memo of the last macroscopic value of each reaction.
///
/// Never shared between threads. [`XsCache::invalidate`] retires every entry at
/// once by advancing the generation, e.g. after material densities change.
#[derive(Debug, Default, Clone)]
pub struct XsCache {
    entries: HashMap<ReactionId, Entry>,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl XsCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&mut self, reaction: ReactionId, key: CacheKey) -> Option<f64> {
        match self.entries.get(&reaction) {
            Some(e) if e.key == key && e.generation == self.generation => {
                self.hits += 1;
                Some(e.value)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    #[inline]
    pub fn store(&mut self, reaction: ReactionId, key: CacheKey, value: f64) {
        self.entries.insert(
            reaction,
            Entry {
                key,
                generation: self.generation,
                value,
            },
        );
    }

    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn reaction() -> ReactionId {
        let mut map: SlotMap<ReactionId, ()> = SlotMap::with_key();
        map.insert(())
    }

    #[test]
    fn test_hit_requires_same_key() {
        let r = reaction();
        let mut cache = XsCache::new();
        assert_eq!(cache.get(r, CacheKey::energy(1.0)), None);
        cache.store(r, CacheKey::energy(1.0), 4.5);
        assert_eq!(cache.get(r, CacheKey::energy(1.0)), Some(4.5));
        assert_eq!(cache.get(r, CacheKey::energy(1.0 + f64::EPSILON)), None);
        assert_eq!(cache.get(r, CacheKey::collision(0, 1.0)), None);
        assert_eq!(cache.stats(), (1, 3));
    }

    #[test]
    fn test_invalidate_retires_entries() {
        let r = reaction();
        let mut cache = XsCache::new();
        cache.store(r, CacheKey::collision(7, 2.0), 2.0);
        cache.invalidate();
        assert_eq!(cache.get(r, CacheKey::collision(7, 2.0)), None);
        cache.store(r, CacheKey::collision(7, 2.0), 3.0);
        assert_eq!(cache.get(r, CacheKey::collision(7, 2.0)), Some(3.0));
        assert_eq!(cache.generation(), 1);
    }
}
