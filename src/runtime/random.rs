//! Seeded randomness for RANDOM search and seed bookkeeping.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

pub fn gen_seed() -> u64 {
    let mut seed = [0u8; 8];
    rand_core::OsRng.fill_bytes(&mut seed);
    u64::from_le_bytes(seed)
}

pub fn rng_from_seed(seed: u64) -> ChaCha20Rng {
    let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
    let mut seed32 = [0u8; 32];
    seed32.copy_from_slice(&seed_bytes[..32]);
    ChaCha20Rng::from_seed(seed32)
}

/// Deterministic source of uniform choices.
#[derive(Debug, Clone)]
pub struct Rand {
    seed: u64,
    rng: ChaCha20Rng,
}

impl Rand {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: rng_from_seed(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform index in `0..n`; `n` must be positive.
    pub fn below(&mut self, n: usize) -> usize {
        (self.rng.next_u64() as usize) % n.max(1)
    }

    /// Uniform value in `[low, high)`; returns `low` for an empty range.
    pub fn range_i64(&mut self, low: i64, high: i64) -> i64 {
        let span = (i128::from(high) - i128::from(low)).max(1) as u128;
        let off = u128::from(self.rng.next_u64()) % span;
        (i128::from(low) + off as i128) as i64
    }

    pub fn next_bool(&mut self) -> bool {
        self.rng.next_u64() & 1 == 1
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.below(items.len());
        items.get(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Rand::new(42);
        let mut b = Rand::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn ranges_stay_in_bounds() {
        let mut r = Rand::new(7);
        for _ in 0..200 {
            let v = r.range_i64(-3, 4);
            assert!((-3..4).contains(&v));
            assert!(r.below(5) < 5);
        }
        assert_eq!(r.range_i64(i64::MIN, i64::MIN + 1), i64::MIN);
    }
}
