//! Static xor filter built by 3-hash peeling.
//!
//! The table is split into three equal ranges; hash `j` maps a key into
//! range `j`. Construction peels the induced 3-hypergraph: repeatedly take a
//! slot touched by exactly one remaining key, record the pair, and remove
//! the key. A peel order exists with high probability once the table holds
//! ~1.23 slots per key plus a constant tail, so failures are handled by
//! resampling all three hash functions a bounded number of times.

use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::error::{FilterError, Result};
use crate::hash::{LinearHash, LinearHashBuilder, LinearHashable};
use crate::packed::PackedVector;
use crate::Filter;

const HASH_COUNT: usize = 3;

/// Configuration for [`XorFilter`].
#[derive(Clone, Copy, Debug)]
pub struct XorConfig {
    /// Fingerprint width in bits.
    pub fingerprint_bits: usize,
    /// Slots allocated per key.
    pub size_coefficient: f64,
    /// Constant slots added on top, defending the peeling tail.
    pub extra_slots: usize,
    /// Hash reseeds attempted before giving up.
    pub max_reseeds: usize,
    /// Seed for hash sampling.
    pub seed: u64,
}

impl Default for XorConfig {
    fn default() -> Self {
        Self {
            fingerprint_bits: 8,
            size_coefficient: 1.23,
            extra_slots: 32,
            max_reseeds: 50,
            seed: 2941,
        }
    }
}

/// Immutable 3-hash xor filter. After a successful build, the XOR of the
/// three slots of every inserted key equals its fingerprint.
pub struct XorFilter<T> {
    table: PackedVector,
    hashes: [LinearHash; HASH_COUNT],
    fingerprint_hash: LinearHash,
    config: XorConfig,
    rng: StdRng,
    used_slots: usize,
    _marker: PhantomData<T>,
}

impl<T: LinearHashable + Eq + Hash> XorFilter<T> {
    /// Creates an unbuilt filter; `build` must run before queries.
    pub fn new(config: XorConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let builder = LinearHashBuilder;
        let fingerprint_hash = builder.sample(&mut rng);
        let hashes = [
            builder.sample(&mut rng),
            builder.sample(&mut rng),
            builder.sample(&mut rng),
        ];
        Self {
            table: PackedVector::default(),
            hashes,
            fingerprint_hash,
            config,
            rng,
            used_slots: 0,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn fingerprint(&self, value: &T) -> u32 {
        let modulus = 1u64 << self.config.fingerprint_bits;
        (value.hash_with(&self.fingerprint_hash) % modulus) as u32
    }

    #[inline]
    fn slot_of(&self, value: &T, function: usize, range: usize) -> usize {
        function * range + (value.hash_with(&self.hashes[function]) % range as u64) as usize
    }

    fn try_peel(&self, keys: &[&T], range: usize, table_size: usize) -> (Vec<(usize, usize)>, usize) {
        let slots: Vec<[usize; HASH_COUNT]> = keys
            .iter()
            .map(|key| {
                [
                    self.slot_of(key, 0, range),
                    self.slot_of(key, 1, range),
                    self.slot_of(key, 2, range),
                ]
            })
            .collect();

        // Degree count plus XOR of incident key indices per slot: a slot of
        // degree one names its key directly.
        let mut degrees = vec![0u32; table_size];
        let mut key_masks = vec![0usize; table_size];
        for (key_index, key_slots) in slots.iter().enumerate() {
            for &slot in key_slots {
                degrees[slot] += 1;
                key_masks[slot] ^= key_index;
            }
        }
        let used_slots = degrees.iter().filter(|&&d| d > 0).count();

        let mut queue: Vec<usize> = (0..table_size).filter(|&s| degrees[s] == 1).collect();
        let mut order = Vec::with_capacity(keys.len());
        while let Some(slot) = queue.pop() {
            if degrees[slot] != 1 {
                continue;
            }
            let key_index = key_masks[slot];
            order.push((key_index, slot));
            for &touched in &slots[key_index] {
                degrees[touched] -= 1;
                key_masks[touched] ^= key_index;
                if degrees[touched] == 1 {
                    queue.push(touched);
                }
            }
        }
        (order, used_slots)
    }
}

impl<T: LinearHashable + Eq + Hash> Filter<T> for XorFilter<T> {
    fn build(&mut self, values: &[T]) -> Result<()> {
        let mut seen = HashSet::with_capacity(values.len());
        let keys: Vec<&T> = values.iter().filter(|value| seen.insert(*value)).collect();

        let table_size = (self.config.size_coefficient * keys.len() as f64).ceil() as usize
            + self.config.extra_slots;
        let range = table_size / HASH_COUNT;
        if !keys.is_empty() && range == 0 {
            return Err(FilterError::InvalidConfig(
                "xor table too small for any key",
            ));
        }

        self.used_slots = 0;
        if keys.is_empty() {
            self.table = PackedVector::default();
            return Ok(());
        }
        self.table = PackedVector::new(table_size, self.config.fingerprint_bits);

        let builder = LinearHashBuilder;
        for attempt in 0..self.config.max_reseeds {
            if attempt > 0 {
                warn!(attempt, "xor filter peeling failed, resampling hashes");
                self.hashes = [
                    builder.sample(&mut self.rng),
                    builder.sample(&mut self.rng),
                    builder.sample(&mut self.rng),
                ];
            }

            let (order, used_slots) = self.try_peel(&keys, range, table_size);
            if order.len() != keys.len() {
                continue;
            }
            self.used_slots = used_slots;

            // Assign in reverse peel order: a slot is written exactly once,
            // after every slot that depends on it.
            for &(key_index, slot) in order.iter().rev() {
                let key = keys[key_index];
                let mut value = self.fingerprint(key);
                for function in 0..HASH_COUNT {
                    let s = self.slot_of(key, function, range);
                    if s != slot {
                        value ^= self.table.get(s);
                    }
                }
                self.table.set(slot, value);
            }
            return Ok(());
        }

        Err(FilterError::BuildFailure {
            attempts: self.config.max_reseeds,
        })
    }

    fn find(&self, value: &T) -> bool {
        let range = self.table.len() / HASH_COUNT;
        if range == 0 {
            return false;
        }
        let mut folded = 0u32;
        for function in 0..HASH_COUNT {
            folded ^= self.table.get(self.slot_of(value, function, range));
        }
        folded == self.fingerprint(value)
    }

    fn hash_table_size_bits(&self) -> Option<usize> {
        Some(self.table.bits_size())
    }

    fn used_space_bits(&self) -> Option<usize> {
        Some(self.used_slots * self.config.fingerprint_bits)
    }
}
