//! Classic k-hash Bloom filter over a flat bit array.

use std::marker::PhantomData;

use bitvec::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;
use crate::hash::{LinearHash, LinearHashBuilder, LinearHashable};
use crate::Filter;

/// Configuration for [`BloomFilter`].
#[derive(Clone, Copy, Debug)]
pub struct BloomConfig {
    /// Number of bits in the filter array.
    pub bits: usize,
    /// Number of independent hash functions.
    pub hash_count: usize,
    /// Seed for sampling the hash functions.
    pub seed: u64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            bits: 8_000_000,
            hash_count: 6,
            seed: 228,
        }
    }
}

/// A k-hash bitset filter. Immutable once built; supports no deletion.
pub struct BloomFilter<T> {
    bits: BitVec<u64, Lsb0>,
    hashes: Vec<LinearHash>,
    used_bits: usize,
    _marker: PhantomData<T>,
}

impl<T: LinearHashable> BloomFilter<T> {
    /// Creates an empty filter with `config.hash_count` freshly sampled
    /// hash functions.
    pub fn new(config: BloomConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let builder = LinearHashBuilder;
        let hashes = (0..config.hash_count)
            .map(|_| builder.sample(&mut rng))
            .collect();
        Self {
            bits: bitvec![u64, Lsb0; 0; config.bits],
            hashes,
            used_bits: 0,
            _marker: PhantomData,
        }
    }

    /// Sets the k bits of `value`. Re-adding a value changes nothing.
    pub fn add(&mut self, value: &T) {
        for hash in &self.hashes {
            let index = (value.hash_with(hash) % self.bits.len() as u64) as usize;
            if !self.bits[index] {
                self.used_bits += 1;
                self.bits.set(index, true);
            }
        }
    }
}

impl<T: LinearHashable> Filter<T> for BloomFilter<T> {
    fn build(&mut self, values: &[T]) -> Result<()> {
        for value in values {
            self.add(value);
        }
        Ok(())
    }

    fn find(&self, value: &T) -> bool {
        self.hashes.iter().all(|hash| {
            let index = (value.hash_with(hash) % self.bits.len() as u64) as usize;
            self.bits[index]
        })
    }

    fn hash_table_size_bits(&self) -> Option<usize> {
        Some(self.bits.len())
    }

    fn used_space_bits(&self) -> Option<usize> {
        Some(self.used_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn no_false_negatives() {
        let mut rng = StdRng::seed_from_u64(5);
        let values: Vec<i32> = (0..10_000).map(|_| rng.gen()).collect();
        let mut filter = BloomFilter::new(BloomConfig {
            bits: 200_000,
            ..BloomConfig::default()
        });
        filter.build(&values).unwrap();
        for value in &values {
            assert!(filter.find(value));
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut rng = StdRng::seed_from_u64(6);
        let values: Vec<i32> = (0..10_000).map(|_| rng.gen_range(0..50_000_000)).collect();
        let mut filter = BloomFilter::new(BloomConfig {
            bits: 200_000,
            ..BloomConfig::default()
        });
        filter.build(&values).unwrap();

        // Disjoint query range, so every hit is a false positive. With
        // m/n = 20 and k = 6 the expected rate is a fraction of a percent.
        let false_positives = (0..20_000)
            .map(|_| rng.gen_range(50_000_000..100_000_000))
            .filter(|q| filter.find(q))
            .count();
        assert!(
            false_positives < 400,
            "false positive count too high: {false_positives}"
        );
    }

    #[test]
    fn duplicate_adds_do_not_regrow_used_space() {
        let mut filter: BloomFilter<i32> = BloomFilter::new(BloomConfig {
            bits: 1_024,
            ..BloomConfig::default()
        });
        filter.add(&7);
        let used = filter.used_space_bits().unwrap();
        assert!(used >= 1 && used <= 6);
        filter.add(&7);
        assert_eq!(filter.used_space_bits().unwrap(), used);
    }

    #[test]
    fn reported_table_size_is_bit_count() {
        let filter: BloomFilter<String> = BloomFilter::new(BloomConfig {
            bits: 4_096,
            ..BloomConfig::default()
        });
        assert_eq!(filter.hash_table_size_bits(), Some(4_096));
        assert_eq!(filter.used_space_bits(), Some(0));
    }
}
