//! Vacuum filter: a cuckoo table with per-fingerprint alternate ranges.
//!
//! The table, eviction protocol, and lookup are shared with
//! [`CuckooFilter`](crate::CuckooFilter); only the alternate-bucket rule
//! differs. Small tables reflect the bucket index around the fingerprint
//! hash, which tolerates a non-power-of-two bucket count. Large tables XOR
//! within a bounded per-fingerprint range so the two candidate buckets stay
//! physically close, which is what buys the higher load factor at size.

use tracing::debug;

use crate::cuckoo::{floor_power_of_two, AlternatePolicy, CuckooTable};
use crate::error::{FilterError, Result};
use crate::hash::{LinearHash, LinearHashable};
use crate::Filter;

/// Bucket counts at or below this use the reflected alternate rule.
const SMALL_TABLE_THRESHOLD: usize = 1 << 18;
/// The alternate-range selection is tuned for 4-slot buckets.
const BUCKET_SIZE: usize = 4;
const TARGET_LOAD_FACTOR: f64 = 0.95;

/// Configuration for [`VacuumFilter`].
#[derive(Clone, Copy, Debug)]
pub struct VacuumConfig {
    /// Number of items the filter is sized for.
    pub expected_items: usize,
    /// Fingerprint width in bits.
    pub fingerprint_bits: usize,
    /// Eviction budget per insertion.
    pub max_kicks: usize,
    /// Seed for hash sampling and eviction choices.
    pub seed: u64,
}

impl VacuumConfig {
    /// Defaults for an expected item count.
    pub fn for_items(expected_items: usize) -> Self {
        Self {
            expected_items,
            fingerprint_bits: 8,
            max_kicks: 500,
            seed: 1111,
        }
    }
}

/// Alternate-bucket rule of the vacuum filter.
#[derive(Clone, Copy, Debug)]
pub struct RangedPolicy {
    ranges: [usize; BUCKET_SIZE],
    small: bool,
}

impl AlternatePolicy for RangedPolicy {
    #[inline]
    fn alternate(
        &self,
        bucket: usize,
        fingerprint: u32,
        hash: &LinearHash,
        bucket_count: usize,
    ) -> usize {
        let h = fingerprint.hash_with(hash);
        if self.small {
            // Reflection keeps both candidates inside an arbitrary bucket
            // count, not just powers of two.
            let a = (h % bucket_count as u64) as usize;
            let d = (bucket + bucket_count - a) % bucket_count;
            (bucket_count - 1 - d + a) % bucket_count
        } else {
            let range = self.ranges[fingerprint as usize % self.ranges.len()];
            let offset = (h % range as u64) as usize;
            // bucket_count is a multiple of every range, so the XOR cannot
            // escape the table.
            (bucket ^ offset) % bucket_count
        }
    }
}

/// Cuckoo-protocol filter reaching ~0.95 load factor at size.
pub struct VacuumFilter<T> {
    table: CuckooTable<T>,
    policy: RangedPolicy,
}

impl<T: LinearHashable> VacuumFilter<T> {
    /// Sizes the table for `config.expected_items` and selects the
    /// alternate ranges.
    pub fn new(config: VacuumConfig) -> Result<Self> {
        if config.expected_items == 0 {
            return Err(FilterError::InvalidConfig(
                "expected item count must be positive",
            ));
        }
        if config.fingerprint_bits == 0 || config.fingerprint_bits > 32 {
            return Err(FilterError::InvalidConfig(
                "fingerprint width must be between 1 and 32 bits",
            ));
        }

        let ranges = alternate_ranges(config.expected_items);
        debug!(?ranges, "selected vacuum alternate ranges");

        let target =
            (config.expected_items as f64 / (BUCKET_SIZE as f64 * TARGET_LOAD_FACTOR)).ceil()
                as usize;
        let bucket_count = if target <= SMALL_TABLE_THRESHOLD {
            floor_power_of_two(target) * 2
        } else {
            // Round down to a multiple of the largest alternate range; every
            // range is a power of two, so all of them then divide the count.
            let max_range = ranges.iter().copied().max().unwrap_or(1);
            let rounded = max_range * (target / max_range);
            let rounded = if rounded == 0 { max_range } else { rounded };
            debug!(
                target,
                bucket_count = rounded,
                "bucket count rounded to a multiple of the largest range"
            );
            rounded
        };

        Ok(Self {
            table: CuckooTable::new(
                bucket_count,
                BUCKET_SIZE,
                config.fingerprint_bits,
                config.max_kicks,
                config.seed,
            ),
            policy: RangedPolicy {
                ranges,
                small: bucket_count <= SMALL_TABLE_THRESHOLD,
            },
        })
    }

    /// Inserts a single value.
    pub fn add(&mut self, value: &T) -> Result<()> {
        self.table.insert(value, &self.policy)
    }
}

impl<T: LinearHashable> Filter<T> for VacuumFilter<T> {
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

/// Expected maximum chunk load for `items` spread over `chunks` chunks.
fn estimated_max_load(items: f64, chunks: f64) -> f64 {
    items / chunks + 1.5 * (2.0 * items * chunks.ln() / chunks).sqrt()
}

fn load_factor_test(items: usize, coefficient: f64, range: usize) -> bool {
    let slots_per_chunk = BUCKET_SIZE as f64 * TARGET_LOAD_FACTOR * range as f64;
    let chunks = (items as f64 / slots_per_chunk).ceil().max(1.0);
    let buckets = range as f64 * chunks;
    let inserted = BUCKET_SIZE as f64 * coefficient * buckets * TARGET_LOAD_FACTOR;
    estimated_max_load(inserted, chunks) < 0.97 * (BUCKET_SIZE * range) as f64
}

fn range_selection(items: usize, coefficient: f64) -> usize {
    let mut range = 1;
    while !load_factor_test(items, coefficient, range) {
        range *= 2;
    }
    range
}

/// Power-of-two alternate ranges for occupancy coefficients
/// 1, 0.75, 0.5, 0.25, with the last entry doubled.
fn alternate_ranges(items: usize) -> [usize; BUCKET_SIZE] {
    let mut ranges = [0usize; BUCKET_SIZE];
    for (i, slot) in ranges.iter_mut().enumerate() {
        *slot = range_selection(items, 1.0 - i as f64 / BUCKET_SIZE as f64);
    }
    ranges[BUCKET_SIZE - 1] *= 2;
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::LinearHashBuilder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn ranges_are_powers_of_two_and_descending() {
        let ranges = alternate_ranges(1_000_000);
        for (i, &range) in ranges.iter().enumerate() {
            assert!(range.is_power_of_two(), "range {i} = {range}");
        }
        // Larger occupancy coefficients need larger ranges.
        assert!(ranges[0] >= ranges[1] && ranges[1] >= ranges[2]);
    }

    #[test]
    fn reflected_alternate_is_an_involution() {
        let mut rng = StdRng::seed_from_u64(3);
        let hash = LinearHashBuilder.sample(&mut rng);
        let policy = RangedPolicy {
            ranges: [1, 1, 1, 1],
            small: true,
        };
        for _ in 0..1_000 {
            // Reflection must hold for non-power-of-two counts too.
            let bucket_count = rng.gen_range(3usize..100_000);
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
    fn ranged_alternate_is_an_involution() {
        let mut rng = StdRng::seed_from_u64(4);
        let hash = LinearHashBuilder.sample(&mut rng);
        let ranges = [2_048usize, 1_024, 512, 512];
        let policy = RangedPolicy {
            ranges,
            small: false,
        };
        // A multiple of the largest range, as the builder guarantees.
        let bucket_count = ranges[0] * 161;
        for _ in 0..1_000 {
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
    fn builds_at_high_load_without_false_negatives() {
        let mut rng = StdRng::seed_from_u64(21);
        let values: Vec<i32> = (0..60_000).map(|_| rng.gen_range(0..500_000_000)).collect();
        let mut filter = VacuumFilter::new(VacuumConfig::for_items(values.len())).unwrap();
        filter.build(&values).unwrap();
        for value in &values {
            assert!(filter.find(value), "missing value {value}");
        }

        let false_positives = (0..60_000)
            .map(|_| rng.gen_range(500_000_000..1_000_000_000))
            .filter(|q| filter.find(q))
            .count();
        // 8-bit fingerprints: comparable to the cuckoo filter, a few percent.
        assert!(
            false_positives < 60_000 * 6 / 100,
            "false positive count too high: {false_positives}"
        );
    }

    #[test]
    fn zero_expected_items_is_rejected() {
        assert!(matches!(
            VacuumFilter::<i32>::new(VacuumConfig::for_items(0)),
            Err(FilterError::InvalidConfig(_))
        ));
    }
}
