//! Level-order succinct trie (LOUDS-DE) over sorted byte strings.
//!
//! Nodes are emitted level by level across all keys: `labels[i]` holds node
//! `i`'s byte, `has_child[i]` marks internal nodes, and `louds[i]` marks the
//! first child of each parent. Rank over `has_child` and select over `louds`
//! connect a parent to its child group; a leaf's suffix slot index is its
//! position minus the internal nodes before it.

use bitvec::prelude::*;

use crate::bitvector::BitVector;
use crate::error::Result;
use crate::surf::suffix::{SuffixType, SuffixVector, ANY_BYTE, TERMINATOR};

#[derive(Debug, Default)]
pub(crate) struct SuccinctTrie {
    labels: Vec<u8>,
    has_child: BitVector,
    louds: BitVector,
    suffixes: SuffixVector,
    /// Whether any terminator byte was inserted during the build. Only then
    /// does a 0xFF label carry end-of-key meaning; in fixed-width tries it
    /// is an ordinary byte.
    terminated: bool,
}

/// True when `a[0..=pos]` and `b[0..=pos]` exist and are equal.
fn share_prefix(a: &[u8], b: &[u8], pos: usize) -> bool {
    a.len() > pos && b.len() > pos && a[..=pos] == b[..=pos]
}

impl SuccinctTrie {
    /// Builds the trie from sorted, de-duplicated keys. `wildcard[i]` marks
    /// keys whose tail was truncated away; their leaves store the wildcard
    /// suffix instead of real data.
    pub(crate) fn build(
        keys: &[Vec<u8>],
        wildcard: &[bool],
        suffix_type: SuffixType,
        suffix_bits: usize,
        use_any: bool,
        terminated: bool,
    ) -> Result<Self> {
        debug_assert_eq!(keys.len(), wildcard.len());

        let mut labels: Vec<u8> = Vec::new();
        let mut has_child: BitVec<u64, Lsb0> = BitVec::new();
        let mut louds: BitVec<u64, Lsb0> = BitVec::new();
        let mut suffixes = SuffixVector::new(suffix_type, keys.len(), suffix_bits, use_any);
        let mut done = vec![false; keys.len()];

        let add_suffix =
            |suffixes: &mut SuffixVector, index: usize, depth: usize| -> Result<()> {
                if wildcard[index] {
                    suffixes.add_any()
                } else {
                    suffixes.add(&keys[index], depth);
                    Ok(())
                }
            };

        let mut depth = 0;
        let mut advanced = true;
        while advanced {
            advanced = false;
            for i in 0..keys.len() {
                if done[i] || depth >= keys[i].len() {
                    continue;
                }
                advanced = true;

                // A node is emitted once per distinct prefix; later keys
                // sharing it only extend its has_child bit.
                if i == 0 || !share_prefix(&keys[i - 1], &keys[i], depth) {
                    labels.push(keys[i][depth]);
                    has_child.push(false);
                    let first_child =
                        i == 0 || !(depth == 0 || share_prefix(&keys[i - 1], &keys[i], depth - 1));
                    louds.push(first_child);
                    if i + 1 == keys.len() || !share_prefix(&keys[i], &keys[i + 1], depth) {
                        add_suffix(&mut suffixes, i, depth)?;
                        done[i] = true;
                    }
                }
                if !done[i] {
                    if depth + 1 < keys[i].len() {
                        let last = has_child.len() - 1;
                        has_child.set(last, true);
                    } else {
                        add_suffix(&mut suffixes, i, depth)?;
                        done[i] = true;
                    }
                }
            }
            depth += 1;
        }

        Ok(Self {
            labels,
            has_child: BitVector::new(has_child),
            louds: BitVector::new(louds),
            suffixes,
            terminated,
        })
    }

    /// Raw trie size: label bytes plus both bitvectors (with their rank and
    /// select structures) plus the suffix slots.
    pub(crate) fn size_bits(&self) -> usize {
        self.labels.len() * 8
            + self.has_child.size_bits()
            + self.louds.size_bits()
            + self.suffixes.bits_size()
    }

    #[inline]
    fn leaf_index(&self, pos: usize) -> usize {
        pos - self.has_child.rank(pos)
    }

    /// First child of `parent`, or `None` for leaves. The virtual root
    /// (`None`) owns the first sibling group.
    fn move_to_children(&self, parent: Option<usize>) -> Option<usize> {
        match parent {
            None => {
                if self.labels.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Some(p) => {
                if !self.has_child.get(p) {
                    return None;
                }
                self.louds.select(self.has_child.rank(p) + 1)
            }
        }
    }

    /// Parent of `child`, or `None` inside the root sibling group.
    fn move_to_parent(&self, child: usize) -> Option<usize> {
        let group = self.louds.rank(child);
        if group <= 1 {
            return None;
        }
        self.has_child.select(group - 1)
    }

    /// Scans the sibling group starting at `start` for `target`; with
    /// `lower_bound`, the first label above `target` also matches. A
    /// terminator label never satisfies the "above" test: it marks
    /// end-of-key and orders below every byte.
    fn find_child(&self, start: usize, target: u8, lower_bound: bool) -> Option<usize> {
        for i in start..self.labels.len() {
            if i > start && self.louds.get(i) {
                return None;
            }
            let label = self.labels[i];
            if label == target
                || (lower_bound && label > target && !(self.terminated && label == TERMINATOR))
            {
                return Some(i);
            }
        }
        None
    }

    fn go(&self, from: Option<usize>, target: u8, lower_bound: bool) -> Option<usize> {
        let start = self.move_to_children(from)?;
        self.find_child(start, target, lower_bound)
    }

    /// Point lookup over the encoded key.
    pub(crate) fn find(&self, key: &[u8]) -> bool {
        if self.labels.is_empty() {
            return false;
        }
        let mut pos: Option<usize> = None;
        for (idx, &byte) in key.iter().enumerate() {
            pos = self.go(pos, byte, false);
            match pos {
                None => return false,
                Some(p) if !self.has_child.get(p) => {
                    return self.suffixes.matches(key, idx, self.leaf_index(p));
                }
                _ => {}
            }
        }
        // Key consumed on an internal path: it is present iff a terminator
        // child closes it.
        self.go(pos, TERMINATOR, false).is_some()
    }

    /// True when some stored key starts with `prefix`.
    pub(crate) fn find_prefix(&self, prefix: &[u8]) -> bool {
        if self.labels.is_empty() {
            return false;
        }
        let mut pos: Option<usize> = None;
        for (idx, &byte) in prefix.iter().enumerate() {
            if let Some(p) = pos {
                if !self.has_child.get(p) {
                    // The stored key ends inside the prefix; with real
                    // suffixes the next prefix byte must match the stored
                    // remainder.
                    return self.suffixes.kind() != SuffixType::Real
                        || self.suffixes.matches(prefix, idx - 1, self.leaf_index(p));
                }
            }
            pos = self.go(pos, byte, false);
            if pos.is_none() {
                return false;
            }
        }
        pos.is_some()
    }

    /// Encoded form of the smallest stored key `>= key`, or `None` when no
    /// stored key is at or above it. May under-approximate (never skips a
    /// stored key), which keeps range queries free of false negatives.
    pub(crate) fn lower_bound(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.labels.is_empty() {
            return None;
        }
        let mut pos: Option<usize> = None;
        let mut idx = 0usize;
        let mut exact = true;

        loop {
            if let Some(p) = pos {
                if !self.has_child.get(p) {
                    break;
                }
            }
            if exact {
                if idx == key.len() {
                    break;
                }
                match self.go(pos, key[idx], true) {
                    Some(next) => {
                        if self.labels[next] != key[idx] {
                            exact = false;
                        }
                        pos = Some(next);
                    }
                    None => {
                        // No sibling at or above this byte: the successor is
                        // the leftmost key of the next subtree to the right.
                        pos = Some(self.move_to_next(pos?)?);
                        exact = false;
                    }
                }
            } else {
                pos = self.move_to_children(pos);
                pos?;
            }
            idx += 1;
        }

        if exact {
            // Every stored byte matched: some stored key extends (or equals)
            // the query, so the query itself is a safe lower bound.
            return Some(key.to_vec());
        }
        Some(self.reconstruct(pos?))
    }

    /// Ascends from `pos` until a right sibling exists and returns it.
    fn move_to_next(&self, mut pos: usize) -> Option<usize> {
        loop {
            let next = pos + 1;
            if next < self.labels.len() && !self.louds.get(next) {
                return Some(next);
            }
            pos = self.move_to_parent(pos)?;
        }
    }

    /// Rebuilds the key ending at `leaf` by walking parents, skipping the
    /// terminator, and appending a stored real suffix byte when one exists.
    fn reconstruct(&self, leaf: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut node = Some(leaf);
        while let Some(p) = node {
            let label = self.labels[p];
            if !(self.terminated && label == TERMINATOR) {
                bytes.push(label);
            }
            node = self.move_to_parent(p);
        }
        bytes.reverse();

        if self.suffixes.kind() == SuffixType::Real {
            if let Ok(stored) = self.suffixes.get(self.leaf_index(leaf)) {
                let byte = stored as u8;
                if byte != TERMINATOR && byte != ANY_BYTE {
                    bytes.push(byte);
                }
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_plain(keys: &[&[u8]], suffix_type: SuffixType) -> SuccinctTrie {
        let mut encoded: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        encoded.sort_unstable();
        encoded.dedup();
        let mut terminated = false;
        for i in 1..encoded.len() {
            let prefix = encoded[i - 1].len() < encoded[i].len()
                && encoded[i][..encoded[i - 1].len()] == encoded[i - 1][..];
            if prefix {
                encoded[i - 1].push(TERMINATOR);
                terminated = true;
            }
        }
        let wildcard = vec![false; encoded.len()];
        SuccinctTrie::build(&encoded, &wildcard, suffix_type, 8, false, terminated).unwrap()
    }

    #[test]
    fn level_order_layout_of_word_sample() {
        let trie = build_plain(&[&b"far"[..], b"fas", b"fast", b"fat"], SuffixType::Real);
        assert_eq!(trie.labels, vec![b'f', b'a', b'r', b's', b't', TERMINATOR, b't']);
        assert!(trie.terminated);
        assert!(trie.find(b"far"));
        assert!(trie.find(b"fas"));
        assert!(trie.find(b"fast"));
        assert!(trie.find(b"fat"));
        assert!(!trie.find(b"fan"));
        assert!(!trie.find(b"fa"));
        assert!(!trie.find(b"fasts"));
    }

    #[test]
    fn single_key_of_length_one() {
        let trie = build_plain(&[&b"a"[..]], SuffixType::Real);
        assert!(trie.find(b"a"));
        assert!(!trie.find(b"b"));
        assert!(!trie.find(b"aa"));
        assert!(!trie.find(b""));
        assert_eq!(trie.lower_bound(b"a"), Some(b"a".to_vec()));
        assert_eq!(trie.lower_bound(b"b"), None);
    }

    #[test]
    fn prefix_queries() {
        let trie = build_plain(
            &[&b"sigma"[..], b"sigint", b"sigkek", b"sigu"],
            SuffixType::Real,
        );
        for prefix in [&b"s"[..], b"si", b"sig", b"sigm", b"sigma", b"sigi"] {
            assert!(trie.find_prefix(prefix), "prefix {prefix:?}");
        }
        assert!(!trie.find_prefix(b"g"));
        assert!(!trie.find_prefix(b"signature"));
        assert!(!trie.find_prefix(b"sigusigu"));
    }

    #[test]
    fn lower_bound_walks_to_next_subtree() {
        let trie = build_plain(&[&b"far"[..], b"fas", b"fast", b"fat"], SuffixType::Real);
        assert_eq!(trie.lower_bound(b"fab"), Some(b"far".to_vec()));
        // An exact walk that dies at a leaf keeps the query as a safe bound.
        assert_eq!(trie.lower_bound(b"fare"), Some(b"fare".to_vec()));
        assert_eq!(trie.lower_bound(b"fat"), Some(b"fat".to_vec()));
        assert_eq!(trie.lower_bound(b"fy"), None);
        assert_eq!(trie.lower_bound(b"z"), None);
    }

    #[test]
    fn terminator_orders_below_real_labels() {
        // "fas" must sort before "fast": a lower-bound scan may not treat
        // the terminator child as a greater sibling.
        let trie = build_plain(&[&b"fas"[..], b"fast"], SuffixType::Real);
        assert_eq!(trie.lower_bound(b"fasa"), Some(b"fast".to_vec()));
        assert!(trie.find(b"fas"));
        assert!(trie.find(b"fast"));
    }

    #[test]
    fn empty_trie() {
        let trie = build_plain(&[], SuffixType::Hash);
        assert!(!trie.find(b"a"));
        assert!(!trie.find_prefix(b"a"));
        assert_eq!(trie.lower_bound(b"a"), None);
    }
}
