//! Order-preserving key encodings.
//!
//! The trie stores byte strings; a [`Converter`] maps keys to bytes such
//! that lexicographic order on the output equals the key type's own order.

/// Maps keys of type `T` to lexicographically ordered byte strings.
pub trait Converter<T> {
    fn encode(&self, value: &T) -> Vec<u8>;
}

/// Encodes `i32` as big-endian bytes with the sign bit flipped, so two's
/// complement order becomes unsigned byte order.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntConverter;

impl Converter<i32> for IntConverter {
    #[inline]
    fn encode(&self, value: &i32) -> Vec<u8> {
        ((*value as u32) ^ 0x8000_0000).to_be_bytes().to_vec()
    }
}

/// Identity encoding for values that already are byte strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesConverter;

impl Converter<String> for BytesConverter {
    #[inline]
    fn encode(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }
}

impl Converter<Vec<u8>> for BytesConverter {
    #[inline]
    fn encode(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }
}
