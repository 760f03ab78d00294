//! Succinct Range Filter: approximate membership with range and prefix
//! queries over a LOUDS-encoded trie.
//!
//! Keys are converted to order-preserving byte strings, sorted, truncated at
//! their first distinguishing byte, and laid out level by level. Lookups
//! walk the trie; what remains of a key past its leaf is checked against the
//! configured suffix variant.

mod encode;
mod suffix;
mod trie;

pub use encode::{BytesConverter, Converter, IntConverter};
pub use suffix::{SuffixType, ANY_BYTE, TERMINATOR};

use rayon::slice::ParallelSliceMut;

use crate::error::Result;
use crate::{Filter, RangeFilter};
use trie::SuccinctTrie;

/// Runs of at least this common prefix length are prefix-cut candidates.
const MIN_CUT_PREFIX: usize = 3;

/// Configuration for [`SuccinctRangeFilter`].
#[derive(Clone, Copy, Debug)]
pub struct SurfConfig {
    /// What leaves store about the rest of their key.
    pub suffix_type: SuffixType,
    /// Hash suffix width in bits (real suffixes are always one byte).
    pub suffix_bits: usize,
    /// When positive, keys longer than this are truncated to it and their
    /// leaves match any continuation.
    pub fix_length: usize,
    /// When positive (and the suffix is not a hash), deep shared prefixes
    /// are cut if the saved bytes exceed `threshold * prefix_len^2`.
    pub cut_gain_threshold: f64,
}

impl Default for SurfConfig {
    fn default() -> Self {
        Self {
            suffix_type: SuffixType::Hash,
            suffix_bits: 8,
            fix_length: 0,
            cut_gain_threshold: 0.0,
        }
    }
}

/// Approximate set with point, prefix, and range membership queries.
///
/// Built once from a batch of keys, then immutable. False positives are
/// possible at a rate set by the suffix variant; false negatives are not.
pub struct SuccinctRangeFilter<T, C> {
    trie: SuccinctTrie,
    config: SurfConfig,
    converter: C,
    _marker: std::marker::PhantomData<T>,
}

impl<T, C: Converter<T>> SuccinctRangeFilter<T, C> {
    /// Creates an empty filter around an explicit key converter.
    pub fn with_converter(config: SurfConfig, converter: C) -> Self {
        Self {
            trie: SuccinctTrie::default(),
            config,
            converter,
            _marker: std::marker::PhantomData,
        }
    }
}

impl SuccinctRangeFilter<i32, IntConverter> {
    /// Filter over signed 32-bit integers.
    pub fn for_ints(config: SurfConfig) -> Self {
        Self::with_converter(config, IntConverter)
    }
}

impl SuccinctRangeFilter<String, BytesConverter> {
    /// Filter over strings in byte order.
    pub fn for_strings(config: SurfConfig) -> Self {
        Self::with_converter(config, BytesConverter)
    }
}

impl<T, C: Converter<T>> Filter<T> for SuccinctRangeFilter<T, C> {
    fn build(&mut self, values: &[T]) -> Result<()> {
        let mut keys: Vec<Vec<u8>> = values.iter().map(|v| self.converter.encode(v)).collect();
        keys.par_sort_unstable();
        keys.dedup();
        let mut wildcard = vec![false; keys.len()];

        let use_any = self.config.fix_length > 0 || self.config.cut_gain_threshold > 0.0;

        let max_len = keys.iter().map(Vec::len).max().unwrap_or(0);
        if self.config.fix_length > 0 && max_len > self.config.fix_length {
            truncate_to_fixed_length(&mut keys, &mut wildcard, self.config.fix_length);
        }

        if self.config.cut_gain_threshold > 0.0 && self.config.suffix_type != SuffixType::Hash {
            apply_prefix_cut(&mut keys, &mut wildcard, self.config.cut_gain_threshold);
        }

        // Force a leaf wherever a key is a strict prefix of its successor.
        let mut terminated = false;
        for i in 1..keys.len() {
            let strict_prefix = keys[i - 1].len() < keys[i].len()
                && keys[i][..keys[i - 1].len()] == keys[i - 1][..];
            if strict_prefix {
                keys[i - 1].push(TERMINATOR);
                terminated = true;
            }
        }

        self.trie = SuccinctTrie::build(
            &keys,
            &wildcard,
            self.config.suffix_type,
            self.config.suffix_bits,
            use_any,
            terminated,
        )?;
        Ok(())
    }

    fn find(&self, value: &T) -> bool {
        self.trie.find(&self.converter.encode(value))
    }

    fn hash_table_size_bits(&self) -> Option<usize> {
        Some(self.trie.size_bits())
    }

    fn used_space_bits(&self) -> Option<usize> {
        Some(self.trie.size_bits())
    }
}

impl<T, C: Converter<T>> RangeFilter<T> for SuccinctRangeFilter<T, C> {
    /// True when some stored key may lie in `[lo, hi]`.
    fn find_range(&self, lo: &T, hi: &T) -> bool {
        let lo_bytes = self.converter.encode(lo);
        let hi_bytes = self.converter.encode(hi);
        if lo_bytes == hi_bytes {
            return self.trie.find(&lo_bytes);
        }
        match self.trie.lower_bound(&lo_bytes) {
            Some(successor) => successor <= hi_bytes,
            None => false,
        }
    }

    fn find_prefix(&self, prefix: &[u8]) -> bool {
        self.trie.find_prefix(prefix)
    }
}

/// Cuts keys down to `fix_length` bytes, marking the cut ones as wildcard
/// leaves, and merges the duplicates the truncation creates.
fn truncate_to_fixed_length(keys: &mut Vec<Vec<u8>>, wildcard: &mut Vec<bool>, fix_length: usize) {
    for (key, flag) in keys.iter_mut().zip(wildcard.iter_mut()) {
        if key.len() > fix_length {
            key.truncate(fix_length);
            *flag = true;
        }
    }
    merge_duplicates(keys, wildcard);
}

/// Truncates runs of consecutive keys sharing a deep common prefix to that
/// prefix plus two bytes, when the saved bytes beat `threshold * lcp^2` and
/// the truncations stay distinct. Trades false-positive rate for size.
fn apply_prefix_cut(keys: &mut Vec<Vec<u8>>, wildcard: &mut Vec<bool>, threshold: f64) {
    let mut i = 0;
    let mut cut_runs = 0usize;
    while i < keys.len() {
        let mut j = i + 1;
        let mut run_lcp = usize::MAX;
        while j < keys.len() {
            let lcp = common_prefix_len(&keys[j - 1], &keys[j]);
            if lcp < MIN_CUT_PREFIX {
                break;
            }
            run_lcp = run_lcp.min(lcp);
            j += 1;
        }

        if j - i >= 2 {
            let cut = run_lcp + 2;
            let saved: usize = keys[i..j]
                .iter()
                .map(|k| k.len().saturating_sub(cut))
                .sum();
            let distinct = keys[i..j].windows(2).all(|pair| {
                let a = &pair[0][..pair[0].len().min(cut)];
                let b = &pair[1][..pair[1].len().min(cut)];
                a != b
            });
            if distinct && saved as f64 > threshold * (run_lcp * run_lcp) as f64 {
                for k in i..j {
                    if keys[k].len() > cut {
                        keys[k].truncate(cut);
                        wildcard[k] = true;
                    }
                }
                cut_runs += 1;
            }
        }
        i = j.max(i + 1);
    }
    if cut_runs > 0 {
        tracing::debug!(cut_runs, "prefix cut truncated shared-prefix runs");
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Collapses adjacent equal keys, OR-ing their wildcard flags.
fn merge_duplicates(keys: &mut Vec<Vec<u8>>, wildcard: &mut Vec<bool>) {
    let mut write = 0usize;
    for read in 0..keys.len() {
        if write > 0 && keys[read] == keys[write - 1] {
            wildcard[write - 1] |= wildcard[read];
        } else {
            keys.swap(write, read);
            wildcard.swap(write, read);
            write += 1;
        }
    }
    keys.truncate(write);
    wildcard.truncate(write);
}
