//! Parameterised universal hash family.
//!
//! `hash(x) = (alpha * x + beta) mod P` over a large fixed prime, with byte
//! strings folded as a polynomial in `alpha`. A [`LinearHashBuilder`] samples
//! independent `(alpha, beta)` pairs from a seeded PRNG so every filter build
//! is reproducible.

use rand::rngs::StdRng;
use rand::Rng;

/// The fixed modulus of the family. Roughly 2^41.4, so products against a
/// 31-bit multiplier need 128-bit intermediates.
pub const LARGE_PRIME: u64 = 2_932_031_007_403;

/// One sampled member of the linear hash family.
#[derive(Clone, Copy, Debug)]
pub struct LinearHash {
    alpha: u64,
    beta: u64,
}

impl LinearHash {
    /// Builds a hash function from explicit parameters.
    pub fn new(alpha: u64, beta: u64) -> Self {
        Self {
            alpha: alpha % LARGE_PRIME,
            beta: beta % LARGE_PRIME,
        }
    }

    /// Hashes an integer already reduced into `[0, P)`.
    #[inline]
    fn mix(&self, value: u64) -> u64 {
        ((u128::from(value) * u128::from(self.alpha) + u128::from(self.beta))
            % u128::from(LARGE_PRIME)) as u64
    }

    /// Hashes a byte string as a polynomial with base `alpha`:
    /// `sum(c_i * alpha^i) mod P`, then folds `beta` in.
    pub fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let p = u128::from(LARGE_PRIME);
        let mut hash: u128 = 0;
        let mut pow: u128 = 1;
        for &c in bytes {
            hash = (hash + u128::from(c) * pow) % p;
            pow = (pow * u128::from(self.alpha)) % p;
        }
        self.mix(hash as u64)
    }
}

/// Samples fresh `(alpha, beta)` pairs from a pseudorandom source.
///
/// `alpha` is drawn from `[1, i32::MAX)` and `beta` from `[0, i32::MAX)`,
/// mirroring the classic Carter–Wegman construction.
#[derive(Debug, Default)]
pub struct LinearHashBuilder;

impl LinearHashBuilder {
    /// Draws one hash function.
    pub fn sample(&self, rng: &mut StdRng) -> LinearHash {
        let alpha = rng.gen_range(1..i32::MAX) as u64;
        let beta = rng.gen_range(0..i32::MAX) as u64;
        LinearHash::new(alpha, beta)
    }
}

/// Keys the linear family can digest.
///
/// Implementations must be deterministic: the same value against the same
/// `LinearHash` always produces the same digest. That determinism is what
/// makes the no-false-negative guarantee of every filter hold.
pub trait LinearHashable {
    /// Hashes `self` with the supplied family member.
    fn hash_with(&self, hasher: &LinearHash) -> u64;
}

impl LinearHashable for i32 {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.mix((i64::from(*self)).rem_euclid(LARGE_PRIME as i64) as u64)
    }
}

impl LinearHashable for u32 {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.mix(u64::from(*self) % LARGE_PRIME)
    }
}

impl LinearHashable for u64 {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.mix(*self % LARGE_PRIME)
    }
}

impl LinearHashable for String {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.hash_bytes(self.as_bytes())
    }
}

impl LinearHashable for &str {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.hash_bytes(self.as_bytes())
    }
}

impl LinearHashable for Vec<u8> {
    #[inline]
    fn hash_with(&self, hasher: &LinearHash) -> u64 {
        hasher.hash_bytes(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn deterministic_per_instance() {
        let h = LinearHash::new(48_271, 12_345);
        assert_eq!(1_000_000i32.hash_with(&h), 1_000_000i32.hash_with(&h));
        assert_eq!("abacaba".hash_with(&h), "abacaba".hash_with(&h));
    }

    #[test]
    fn negative_integers_reduce_into_range() {
        let h = LinearHash::new(3, 0);
        let digest = (-17i32).hash_with(&h);
        assert!(digest < LARGE_PRIME);
        assert_ne!(digest, 17i32.hash_with(&h));
    }

    #[test]
    fn builder_is_reproducible() {
        let builder = LinearHashBuilder;
        let mut a = StdRng::seed_from_u64(1111);
        let mut b = StdRng::seed_from_u64(1111);
        for _ in 0..8 {
            let ha = builder.sample(&mut a);
            let hb = builder.sample(&mut b);
            assert_eq!(42i32.hash_with(&ha), 42i32.hash_with(&hb));
        }
    }

    #[test]
    fn distinct_instances_disagree_somewhere() {
        let builder = LinearHashBuilder;
        let mut rng = StdRng::seed_from_u64(9);
        let h1 = builder.sample(&mut rng);
        let h2 = builder.sample(&mut rng);
        let collisions = (0..1_000i32)
            .filter(|x| x.hash_with(&h1) == x.hash_with(&h2))
            .count();
        assert!(collisions < 10);
    }

    #[test]
    fn string_hash_depends_on_order() {
        let h = LinearHash::new(257, 99);
        assert_ne!("ab".hash_with(&h), "ba".hash_with(&h));
    }
}
