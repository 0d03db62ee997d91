// Per-thread uniform random streams consumed by the kernel.
//
// The generator is the PCG-RXS-M-XS permutation over a 64-bit LCG used by
// OpenMC's random_lcg.cpp; streams are separated by seeding each one from a
// splitmix64 hash of (seed, stream id).

use rand::{RngCore, SeedableRng};

const PRN_MULT: u64 = 6364136223846793005;
const PRN_ADD: u64 = 1442695040888963407;

/// Opaque uniform sampler on [0, 1).
///
/// One instance per worker thread; the kernel never shares a stream.
pub trait UniformSource: Send {
    fn uniform(&mut self) -> f64;
}

/// Fast 8-byte-state stream suitable for one thread or one history.
#[derive(Clone, Copy, Debug)]
pub struct LcgStream {
    state: u64,
}

#[inline]
pub(crate) fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

impl LcgStream {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Independent stream `stream` derived from a run seed, e.g. one per thread id.
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        Self {
            state: splitmix64(seed ^ splitmix64(stream.wrapping_add(1))),
        }
    }

    #[inline(always)]
    fn advance(&mut self) -> u64 {
        self.state = PRN_MULT.wrapping_mul(self.state).wrapping_add(PRN_ADD);
        let word = ((self.state >> ((self.state >> 59) + 5)) ^ self.state)
            .wrapping_mul(12605985483714917081);
        (word >> 43) ^ word
    }

    /// Restart the stream (e.g. per history for reproducibility).
    #[inline]
    pub fn reseed(&mut self, seed: u64) {
        self.state = seed;
    }
}

impl UniformSource for LcgStream {
    #[inline(always)]
    fn uniform(&mut self) -> f64 {
        // ldexp(x, -64)
        (self.advance() as f64) * 5.421010862427522e-20
    }
}

impl SeedableRng for LcgStream {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}

impl RngCore for LcgStream {
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        (self.advance() >> 32) as u32
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.advance()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.advance().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Replays a fixed list of uniforms, then repeats the last one.
///
/// Used to drive the kernel through documented literal sequences.
#[derive(Clone, Debug)]
pub struct ReplayStream {
    values: Vec<f64>,
    next: usize,
}

impl ReplayStream {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, next: 0 }
    }

    /// Number of values consumed so far.
    pub fn consumed(&self) -> usize {
        self.next
    }
}

impl UniformSource for ReplayStream {
    fn uniform(&mut self) -> f64 {
        let value = match self.values.get(self.next) {
            Some(v) => *v,
            None => self.values.last().copied().unwrap_or(0.5),
        };
        self.next += 1;
        value
    }
}

/// Adapter so any `rand::Rng` can feed the kernel.
pub struct RandSource<R: RngCore + Send>(pub R);

impl<R: RngCore + Send> UniformSource for RandSource<R> {
    fn uniform(&mut self) -> f64 {
        use rand::Rng;
        self.0.gen::<f64>()
    }
}
