//! Succinct bitvector with rank and select support.
//!
//! After construction a single linear pass records, per 256-bit aggregate
//! block, the popcount of everything before it, and per 32-bit basic block
//! the popcount inside the enclosing aggregate block. A second pass samples
//! the position of every 256th set bit. The counters live in [`PackedVector`]s
//! sized just wide enough for their maxima, which keeps the auxiliary
//! overhead to a few percent of the raw bits.

use bitvec::prelude::*;

use crate::packed::PackedVector;

const AGGREGATE_STEP: usize = 256;
const BASIC_BLOCK: usize = 32;
const SELECT_STEP: usize = 256;

/// A frozen bitstring with O(1) rank and sampled select.
#[derive(Clone, Debug, Default)]
pub struct BitVector {
    data: BitVec<u64, Lsb0>,
    aggregates: PackedVector,
    blocks: PackedVector,
    select_stats: PackedVector,
    ones: usize,
}

impl BitVector {
    /// Freezes `data` and builds the rank/select acceleration structures.
    pub fn new(data: BitVec<u64, Lsb0>) -> Self {
        let mut this = Self {
            data,
            ..Self::default()
        };
        if !this.data.is_empty() {
            this.init_blocks();
            this.init_select_stats();
        }
        this
    }

    /// Number of raw bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the vector holds no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reads bit `index`.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.data[index]
    }

    /// Total number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.ones
    }

    /// Raw bits plus every auxiliary structure, in bits.
    pub fn size_bits(&self) -> usize {
        self.data.len()
            + self.aggregates.bits_size()
            + self.blocks.bits_size()
            + self.select_stats.bits_size()
    }

    /// Number of set bits in `[0, pos]`. Positions past the end count the
    /// whole vector.
    pub fn rank(&self, pos: usize) -> usize {
        if self.data.is_empty() {
            return 0;
        }
        let pos = pos.min(self.data.len() - 1);
        let aggregate = pos / AGGREGATE_STEP;
        let block = pos / BASIC_BLOCK;

        let mut rank = if aggregate > 0 {
            self.aggregates.get(aggregate - 1) as usize
        } else {
            0
        };
        for i in aggregate * AGGREGATE_STEP / BASIC_BLOCK..block {
            rank += self.blocks.get(i) as usize;
        }
        for i in block * BASIC_BLOCK..=pos {
            if self.data[i] {
                rank += 1;
            }
        }
        rank
    }

    /// Position of the `i`-th set bit, 1-indexed, or `None` when fewer than
    /// `i` bits are set.
    pub fn select(&self, i: usize) -> Option<usize> {
        if i == 0 || i > self.ones {
            return None;
        }
        let sample = i / SELECT_STEP;
        let mut count = sample * SELECT_STEP;
        let mut pos: isize = if sample > 0 {
            self.select_stats.get(sample - 1) as isize
        } else {
            -1
        };

        // Skip whole aggregate blocks that still fall short of i.
        let mut aggregate = (pos.max(0) as usize) / AGGREGATE_STEP;
        while aggregate < self.aggregates.len() {
            let below = self.aggregates.get(aggregate) as usize;
            if below < i {
                count = below;
                pos = ((aggregate + 1) * AGGREGATE_STEP) as isize - 1;
                aggregate += 1;
            } else {
                break;
            }
        }

        while count < i {
            pos += 1;
            if pos as usize >= self.data.len() {
                return None;
            }
            if self.data[pos as usize] {
                count += 1;
            }
        }
        Some(pos as usize)
    }

    fn init_blocks(&mut self) {
        let n = self.data.len();
        let aggregate_count = n.div_ceil(AGGREGATE_STEP);
        let block_count = n.div_ceil(BASIC_BLOCK);
        self.aggregates = PackedVector::new(aggregate_count, counter_width(n));
        self.blocks = PackedVector::new(block_count, counter_width(BASIC_BLOCK + 1));

        let mut ones = 0usize;
        let mut block_ones = 0u32;
        for i in 0..n {
            if i > 0 && i % AGGREGATE_STEP == 0 {
                self.aggregates.set(i / AGGREGATE_STEP - 1, ones as u32);
            }
            if i > 0 && i % BASIC_BLOCK == 0 {
                self.blocks.set(i / BASIC_BLOCK - 1, block_ones);
                block_ones = 0;
            }
            if self.data[i] {
                ones += 1;
                block_ones += 1;
            }
        }
        self.aggregates.set(aggregate_count - 1, ones as u32);
        self.blocks.set(block_count - 1, block_ones);
        self.ones = ones;
    }

    fn init_select_stats(&mut self) {
        let sample_count = self.ones / SELECT_STEP;
        self.select_stats = PackedVector::new(sample_count, counter_width(self.data.len()));

        let mut pos: isize = -1;
        let mut seen = 0usize;
        for sample in 0..sample_count {
            while seen < SELECT_STEP * (sample + 1) {
                pos += 1;
                if self.data[pos as usize] {
                    seen += 1;
                }
            }
            self.select_stats.set(sample, pos as u32);
        }
    }
}

/// Bits needed to store any count up to `max`, rounded up to a nibble.
fn counter_width(max: usize) -> usize {
    let bits = (usize::BITS - max.leading_zeros()).max(1) as usize;
    bits.div_ceil(4) * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn vector_of(bits: &[bool]) -> BitVector {
        BitVector::new(bits.iter().copied().collect())
    }

    #[test]
    fn empty_input() {
        let v = BitVector::new(BitVec::new());
        assert_eq!(v.rank(0), 0);
        assert_eq!(v.rank(1_000_000), 0);
        assert_eq!(v.select(1), None);
    }

    #[test]
    fn small_patterns() {
        let v = vector_of(&[true, false, true, true, false]);
        assert_eq!(v.rank(0), 1);
        assert_eq!(v.rank(1), 1);
        assert_eq!(v.rank(3), 3);
        assert_eq!(v.rank(4), 3);
        assert_eq!(v.select(1), Some(0));
        assert_eq!(v.select(2), Some(2));
        assert_eq!(v.select(3), Some(3));
        assert_eq!(v.select(4), None);
    }

    #[test]
    fn all_ones_aggregate_boundary() {
        // Exactly one aggregate block, fully set: the counters must hold the
        // count 256 without truncation.
        let bits = vec![true; 256];
        let v = vector_of(&bits);
        assert_eq!(v.rank(255), 256);
        assert_eq!(v.select(256), Some(255));
        assert_eq!(v.select(1), Some(0));
        assert_eq!(v.select(257), None);
    }

    #[test]
    fn rank_select_duality_random() {
        let mut rng = StdRng::seed_from_u64(31);
        let bits: Vec<bool> = (0..4_096).map(|_| rng.gen_bool(0.37)).collect();
        let v = vector_of(&bits);

        let ones = bits.iter().filter(|&&b| b).count();
        assert_eq!(v.count_ones(), ones);

        let mut expected = 0usize;
        for (pos, &bit) in bits.iter().enumerate() {
            if bit {
                expected += 1;
            }
            assert_eq!(v.rank(pos), expected, "rank at {pos}");
        }
        for i in 1..=ones {
            let pos = v.select(i).expect("select within popcount");
            assert!(bits[pos], "selected position must hold a set bit");
            assert_eq!(v.rank(pos), i, "rank(select({i}))");
        }
        for pos in 0..bits.len() {
            let r = v.rank(pos);
            if r > 0 {
                assert!(v.select(r).unwrap() <= pos);
            }
        }
        assert_eq!(v.select(ones + 1), None);
    }

    #[test]
    fn sparse_bits_across_many_blocks() {
        // One set bit every 511 positions exercises the sampled select
        // start and the aggregate skip.
        let bits: Vec<bool> = (0..40_000).map(|i| i % 511 == 0).collect();
        let v = vector_of(&bits);
        let ones = v.count_ones();
        for i in 1..=ones {
            assert_eq!(v.select(i), Some((i - 1) * 511));
        }
    }
}
