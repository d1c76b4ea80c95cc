//! Per-thread sample sequences.
//!
//! A [`Sampler`] is re-seeded for every pixel sample from the pixel index and
//! the pass number, so the values a pixel sees do not depend on which thread
//! (or which machine) renders it. Each render thread owns exactly one.

use cray_core::SamplerKind;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

const PRIMES: [u32; 6] = [2, 3, 5, 7, 11, 13];

/// Largest f32 below 1.0.
const ONE_MINUS_EPSILON: f32 = 0.99999994;

#[derive(Debug, Clone)]
pub struct Sampler {
    kind: SamplerKind,
    pass: u32,
    max_passes: u32,
    /// Per-pixel scramble added to the low discrepancy sequences.
    offset: f32,
    dimension: usize,
    rng: Xoshiro256PlusPlus,
}

impl Sampler {
    pub fn new(kind: SamplerKind) -> Self {
        Self {
            kind,
            pass: 0,
            max_passes: 1,
            offset: 0.0,
            dimension: 0,
            rng: Xoshiro256PlusPlus::seed_from_u64(0),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    /// Start the sequence for sample `pass` (0-based) of `pixel_index`.
    pub fn init(&mut self, pass: u32, max_passes: u32, pixel_index: u32) {
        self.pass = pass;
        self.max_passes = max_passes.max(1);
        self.dimension = 0;
        match self.kind {
            SamplerKind::Halton | SamplerKind::Hammersley => {
                self.offset = uint_to_unit_real(hash(pixel_index));
            }
            SamplerKind::Random => {
                let seed = (pixel_index as u64) * (self.max_passes as u64) + pass as u64;
                self.rng = Xoshiro256PlusPlus::seed_from_u64(hash64(seed));
            }
        }
    }

    /// Next value in `[0, 1)`.
    pub fn dimension(&mut self) -> f32 {
        let value = match self.kind {
            SamplerKind::Random => self.rng.gen::<f32>(),
            SamplerKind::Halton => {
                let prime = PRIMES[self.dimension % PRIMES.len()];
                wrap_add(radical_inverse(self.pass, prime), self.offset)
            }
            SamplerKind::Hammersley => {
                let v = if self.dimension == 0 {
                    self.pass as f32 / self.max_passes as f32
                } else {
                    radical_inverse(self.pass, PRIMES[(self.dimension - 1) % PRIMES.len()])
                };
                wrap_add(v, self.offset)
            }
        };
        self.dimension += 1;
        value
    }
}

/// Van der Corput radical inverse of `i` in base `base`.
pub fn radical_inverse(mut i: u32, base: u32) -> f32 {
    let inv_base = 1.0 / base as f32;
    let mut inv_bi = inv_base;
    let mut result = 0.0f32;
    while i > 0 {
        let digit = i % base;
        result += digit as f32 * inv_bi;
        i /= base;
        inv_bi *= inv_base;
    }
    result.min(ONE_MINUS_EPSILON)
}

/// Add two values in `[0, 1)` and wrap back into the range.
#[inline]
fn wrap_add(u: f32, v: f32) -> f32 {
    let sum = u + v;
    let wrapped = if sum >= 1.0 { sum - 1.0 } else { sum };
    wrapped.clamp(0.0, ONE_MINUS_EPSILON)
}

/// Thomas Wang style integer hash.
pub fn hash(mut x: u32) -> u32 {
    x = (x ^ 12345391).wrapping_mul(2654435769);
    x ^= (x << 6) ^ (x >> 26);
    x = x.wrapping_mul(2654435769);
    x = x.wrapping_add((x << 5) ^ (x >> 12));
    x
}

/// SplitMix64 finalizer.
pub fn hash64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Map the top 23 bits of `v` onto `[0, 1)`.
#[inline]
fn uint_to_unit_real(v: u32) -> f32 {
    f32::from_bits((v >> 9) | 0x3f80_0000) - 1.0
}
