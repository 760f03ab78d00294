//! Partial-key cuckoo filter.
//!
//! Fingerprints live in a [`PackedVector`] of `bucket_count * bucket_size`
//! slots. A stored key occupies one slot in its primary bucket or in the
//! alternate bucket derived from the fingerprint alone, so either bucket can
//! recompute the other during eviction chains. The alternate-bucket rule is
//! the only thing the vacuum filter changes, so it is factored into
//! [`AlternatePolicy`] and the table itself is shared.

use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{FilterError, Result};
use crate::hash::{LinearHash, LinearHashBuilder, LinearHashable};
use crate::packed::PackedVector;
use crate::Filter;

/// Maps a bucket and a fingerprint to the partner bucket.
///
/// Implementations must be involutions: `alternate(alternate(b, fp), fp)`
/// must return `b`, otherwise eviction chains lose track of keys.
pub trait AlternatePolicy {
    fn alternate(
        &self,
        bucket: usize,
        fingerprint: u32,
        hash: &LinearHash,
        bucket_count: usize,
    ) -> usize;
}

/// The classic cuckoo rule: `bucket XOR h(fingerprint)`, valid when the
/// bucket count is a power of two.
#[derive(Clone, Copy, Debug, Default)]
pub struct XorPolicy;

impl AlternatePolicy for XorPolicy {
    #[inline]
    fn alternate(
        &self,
        bucket: usize,
        fingerprint: u32,
        hash: &LinearHash,
        bucket_count: usize,
    ) -> usize {
        let h = (fingerprint.hash_with(hash) % bucket_count as u64) as usize;
        (bucket ^ h) % bucket_count
    }
}

/// Configuration for [`CuckooFilter`].
#[derive(Clone, Copy, Debug)]
pub struct CuckooConfig {
    /// Upper bound on the bucket count; rounded down to a power of two.
    pub max_buckets: usize,
    /// Slots per bucket.
    pub bucket_size: usize,
    /// Fingerprint width in bits.
    pub fingerprint_bits: usize,
    /// Eviction budget per insertion.
    pub max_kicks: usize,
    /// Seed for hash sampling and eviction choices.
    pub seed: u64,
}

impl Default for CuckooConfig {
    fn default() -> Self {
        Self {
            max_buckets: 1 << 18,
            bucket_size: 4,
            fingerprint_bits: 8,
            max_kicks: 500,
            seed: 1111,
        }
    }
}

/// Shared fingerprint table used by both the cuckoo and vacuum filters.
pub(crate) struct CuckooTable<T> {
    slots: PackedVector,
    bucket_hash: LinearHash,
    alt_hash: LinearHash,
    fingerprint_hash: LinearHash,
    rng: StdRng,
    bucket_count: usize,
    bucket_size: usize,
    fingerprint_bits: usize,
    /// All-ones value of the fingerprint width; marks an empty slot.
    empty_slot: u32,
    max_kicks: usize,
    stored: usize,
    used_space_bits: usize,
    _marker: PhantomData<T>,
}

impl<T: LinearHashable> CuckooTable<T> {
    pub(crate) fn new(
        bucket_count: usize,
        bucket_size: usize,
        fingerprint_bits: usize,
        max_kicks: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let builder = LinearHashBuilder;
        let bucket_hash = builder.sample(&mut rng);
        let alt_hash = builder.sample(&mut rng);
        let fingerprint_hash = builder.sample(&mut rng);

        let empty_slot = (((1u64 << fingerprint_bits) - 1) & 0xFFFF_FFFF) as u32;
        let mut slots = PackedVector::new(bucket_count * bucket_size, fingerprint_bits);
        for i in 0..slots.len() {
            slots.set(i, empty_slot);
        }

        Self {
            slots,
            bucket_hash,
            alt_hash,
            fingerprint_hash,
            rng,
            bucket_count,
            bucket_size,
            fingerprint_bits,
            empty_slot,
            max_kicks,
            stored: 0,
            used_space_bits: 0,
            _marker: PhantomData,
        }
    }

    /// Fingerprint reduced modulo `2^f - 1`, so the empty sentinel can never
    /// be produced by a real key.
    #[inline]
    fn fingerprint(&self, value: &T) -> u32 {
        (value.hash_with(&self.fingerprint_hash) % u64::from(self.empty_slot)) as u32
    }

    #[inline]
    fn primary_bucket(&self, value: &T) -> usize {
        (value.hash_with(&self.bucket_hash) % self.bucket_count as u64) as usize
    }

    #[inline]
    fn slot(&self, bucket: usize, index: usize) -> u32 {
        self.slots.get(bucket * self.bucket_size + index)
    }

    #[inline]
    fn set_slot(&mut self, bucket: usize, index: usize, value: u32) {
        self.slots.set(bucket * self.bucket_size + index, value);
    }

    fn bucket_contains(&self, fingerprint: u32, bucket: usize) -> bool {
        (0..self.bucket_size).any(|i| self.slot(bucket, i) == fingerprint)
    }

    /// Places `fingerprint` into the first free slot of `bucket`, or no-ops
    /// when an equal fingerprint is already stored there.
    fn try_place(&mut self, fingerprint: u32, bucket: usize) -> bool {
        for i in 0..self.bucket_size {
            let current = self.slot(bucket, i);
            if current == fingerprint {
                self.stored += 1;
                return true;
            }
            if current == self.empty_slot {
                self.set_slot(bucket, i, fingerprint);
                self.stored += 1;
                self.used_space_bits += self.fingerprint_bits;
                return true;
            }
        }
        false
    }

    pub(crate) fn insert<P: AlternatePolicy>(&mut self, value: &T, policy: &P) -> Result<()> {
        let fingerprint = self.fingerprint(value);
        let first = self.primary_bucket(value);
        let second = policy.alternate(first, fingerprint, &self.alt_hash, self.bucket_count);

        if self.try_place(fingerprint, first) || self.try_place(fingerprint, second) {
            return Ok(());
        }

        let mut fingerprint = fingerprint;
        let mut bucket = if self.rng.gen_range(0..2) == 1 {
            second
        } else {
            first
        };
        for _ in 0..self.max_kicks {
            let victim = self.rng.gen_range(0..self.bucket_size);
            let evicted = self.slot(bucket, victim);
            self.set_slot(bucket, victim, fingerprint);
            fingerprint = evicted;
            bucket = policy.alternate(bucket, fingerprint, &self.alt_hash, self.bucket_count);
            if self.try_place(fingerprint, bucket) {
                return Ok(());
            }
        }

        Err(FilterError::InsertionFailure {
            occupancy: self.stored,
        })
    }

    pub(crate) fn contains<P: AlternatePolicy>(&self, value: &T, policy: &P) -> bool {
        let fingerprint = self.fingerprint(value);
        let first = self.primary_bucket(value);
        if self.bucket_contains(fingerprint, first) {
            return true;
        }
        let second = policy.alternate(first, fingerprint, &self.alt_hash, self.bucket_count);
        self.bucket_contains(fingerprint, second)
    }

    #[inline]
    pub(crate) fn size_bits(&self) -> usize {
        self.slots.bits_size()
    }

    #[inline]
    pub(crate) fn used_space_bits(&self) -> usize {
        self.used_space_bits
    }
}

/// Partial-key cuckoo filter with two candidate buckets per key.
pub struct CuckooFilter<T> {
    table: CuckooTable<T>,
    policy: XorPolicy,
}

impl<T: LinearHashable> CuckooFilter<T> {
    /// Creates an empty filter. The bucket count is the largest power of two
    /// not exceeding `config.max_buckets`.
    pub fn new(config: CuckooConfig) -> Result<Self> {
        if config.max_buckets == 0 || config.bucket_size == 0 {
            return Err(FilterError::InvalidConfig(
                "bucket count and bucket size must be positive",
            ));
        }
        if config.fingerprint_bits == 0 || config.fingerprint_bits > 32 {
            return Err(FilterError::InvalidConfig(
                "fingerprint width must be between 1 and 32 bits",
            ));
        }
        let bucket_count = floor_power_of_two(config.max_buckets);
        if bucket_count != config.max_buckets {
            debug!(
                requested = config.max_buckets,
                bucket_count, "bucket count rounded down to a power of two"
            );
        }
        Ok(Self {
            table: CuckooTable::new(
                bucket_count,
                config.bucket_size,
                config.fingerprint_bits,
                config.max_kicks,
                config.seed,
            ),
            policy: XorPolicy,
        })
    }

    /// Inserts a single value, evicting up to `max_kicks` fingerprints.
    pub fn add(&mut self, value: &T) -> Result<()> {
        self.table.insert(value, &self.policy)
    }
}

impl<T: LinearHashable> Filter<T> for CuckooFilter<T> {
    fn build(&mut self, values: &[T]) -> Result<()> {
        for value in values {
            self.add(value)?;
        }
        Ok(())
    }

    fn find(&self, value: &T) -> bool {
        self.table.contains(value, &self.policy)
    }

    fn hash_table_size_bits(&self) -> Option<usize> {
        Some(self.table.size_bits())
    }

    fn used_space_bits(&self) -> Option<usize> {
        Some(self.table.used_space_bits())
    }
}

pub(crate) fn floor_power_of_two(max: usize) -> usize {
    let mut count = 1;
    while count * 2 <= max {
        count *= 2;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CuckooConfig {
        CuckooConfig {
            max_buckets: 1 << 14,
            fingerprint_bits: 12,
            ..CuckooConfig::default()
        }
    }

    #[test]
    fn alternate_bucket_is_an_involution() {
        let mut rng = StdRng::seed_from_u64(77);
        let hash = LinearHashBuilder.sample(&mut rng);
        let policy = XorPolicy;
        for _ in 0..1_000 {
            let bucket_count = 1usize << rng.gen_range(4..18);
            let bucket = rng.gen_range(0..bucket_count);
            let fingerprint = rng.gen_range(0..255u32);
            let alt = policy.alternate(bucket, fingerprint, &hash, bucket_count);
            assert!(alt < bucket_count);
            assert_eq!(
                policy.alternate(alt, fingerprint, &hash, bucket_count),
                bucket
            );
        }
    }

    #[test]
    fn bucket_count_rounds_down_to_power_of_two() {
        assert_eq!(floor_power_of_two(1), 1);
        assert_eq!(floor_power_of_two(2), 2);
        assert_eq!(floor_power_of_two(3), 2);
        assert_eq!(floor_power_of_two(1_000_000), 1 << 19);
        assert_eq!(floor_power_of_two(1 << 18), 1 << 18);
    }

    #[test]
    fn no_false_negatives() {
        let mut rng = StdRng::seed_from_u64(11);
        let values: Vec<i32> = (0..40_000).map(|_| rng.gen_range(0..100_000_000)).collect();
        let mut filter = CuckooFilter::new(small_config()).unwrap();
        filter.build(&values).unwrap();
        for value in &values {
            assert!(filter.find(value), "missing value {value}");
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut rng = StdRng::seed_from_u64(12);
        let values: Vec<i32> = (0..40_000).map(|_| rng.gen_range(0..100_000_000)).collect();
        let mut filter = CuckooFilter::new(small_config()).unwrap();
        filter.build(&values).unwrap();

        let queries = 40_000;
        let false_positives = (0..queries)
            .map(|_| rng.gen_range(100_000_000..200_000_000))
            .filter(|q| filter.find(q))
            .count();
        // 12-bit fingerprints at ~60% load should sit well under 1%.
        assert!(
            false_positives < queries / 100,
            "false positive count too high: {false_positives}"
        );
    }

    #[test]
    fn duplicates_do_not_grow_used_space() {
        let mut filter = CuckooFilter::new(small_config()).unwrap();
        filter.add(&42).unwrap();
        let used = filter.used_space_bits().unwrap();
        filter.add(&42).unwrap();
        assert_eq!(filter.used_space_bits().unwrap(), used);
    }

    #[test]
    fn exhausted_kicks_fail_gracefully() {
        // One bucket whose alternate is itself: the eviction chain can never
        // make progress and must stop at the kick budget.
        let mut filter: CuckooFilter<i32> = CuckooFilter::new(CuckooConfig {
            max_buckets: 1,
            bucket_size: 2,
            max_kicks: 50,
            ..CuckooConfig::default()
        })
        .unwrap();
        let mut failed = None;
        for value in 0..64 {
            if let Err(err) = filter.add(&value) {
                failed = Some(err);
                break;
            }
        }
        match failed {
            Some(FilterError::InsertionFailure { occupancy }) => assert!(occupancy >= 2),
            other => panic!("expected insertion failure, got {other:?}"),
        }
    }
}
