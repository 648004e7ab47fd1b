use serde::{Deserialize, Serialize};

use crate::err::StoreError;

/**
 * Fixed-width unsigned values packed into 64-bit words, lowest bits first.
 * A value never spans two words: each word holds `64 / bits_per_value` values and the
 * remaining high bits stay zero.
 *
 * A width of zero is allowed and stores nothing; every value reads as `0`.
 */
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackedArray {
    len: usize,
    bits_per_value: usize,
    data: Vec<u64>,
}

/// Number of values one word holds at the given width. Zero for width zero.
pub fn values_per_word(bits_per_value: usize) -> usize {
    if bits_per_value == 0 {
        0
    } else {
        64 / bits_per_value
    }
}

/// Number of words needed to hold `len` values at the given width.
pub fn words_needed(len: usize, bits_per_value: usize) -> usize {
    match values_per_word(bits_per_value) {
        0 => 0,
        per_word => len.div_ceil(per_word),
    }
}

impl PackedArray {
    /// # Panics
    /// Panics if `bits_per_value > 32`.
    pub fn new(len: usize, bits_per_value: usize) -> Self {
        assert!(bits_per_value <= 32, "{bits_per_value} bits per value is too wide");
        Self {
            len,
            bits_per_value,
            data: vec![0; words_needed(len, bits_per_value)],
        }
    }

    /// Wraps words produced elsewhere, checking that there are exactly as many as the layout needs.
    pub fn from_words(len: usize, bits_per_value: usize, data: Vec<u64>) -> Result<Self, StoreError> {
        if bits_per_value > 32 {
            return Err(StoreError::Any(format!(
                "{bits_per_value} bits per value is too wide"
            )));
        }
        let expected = words_needed(len, bits_per_value);
        if data.len() != expected {
            return Err(StoreError::MalformedSection {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            len,
            bits_per_value,
            data,
        })
    }

    pub(crate) fn from_packed(len: usize, bits_per_value: usize, data: Vec<u64>) -> Self {
        debug_assert_eq!(data.len(), words_needed(len, bits_per_value));
        Self {
            len,
            bits_per_value,
            data,
        }
    }

    /// Packs `values` into the front of `words`, returning how many words were written.
    /// Bits of `values` above the width are discarded.
    ///
    /// # Panics
    /// Panics if `words` is shorter than [`words_needed`].
    pub fn pack_into(bits_per_value: usize, values: &[u32], words: &mut [u64]) -> usize {
        let per_word = values_per_word(bits_per_value);
        if per_word == 0 {
            return 0;
        }
        let needed = words_needed(values.len(), bits_per_value);
        assert!(
            words.len() >= needed,
            "scratch holds {} words, {} needed",
            words.len(),
            needed
        );
        let mask = mask(bits_per_value);
        for (word, chunk) in words.iter_mut().zip(values.chunks(per_word)) {
            let mut packed = 0u64;
            for (slot, value) in chunk.iter().enumerate() {
                packed |= (*value as u64 & mask) << (slot * bits_per_value);
            }
            *word = packed;
        }
        needed
    }

    pub fn from_raw(bits_per_value: usize, values: &[u32]) -> Self {
        let mut array = Self::new(values.len(), bits_per_value);
        Self::pack_into(bits_per_value, values, &mut array.data);
        array
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits_per_value(&self) -> usize {
        self.bits_per_value
    }

    pub fn max_value(&self) -> u64 {
        mask(self.bits_per_value)
    }

    pub fn words(&self) -> &[u64] {
        &self.data
    }

    fn locate(&self, index: usize) -> (usize, usize) {
        let per_word = values_per_word(self.bits_per_value);
        (index / per_word, (index % per_word) * self.bits_per_value)
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        if index >= self.len {
            return None;
        }
        if self.bits_per_value == 0 {
            return Some(0);
        }
        let (word, shift) = self.locate(index);
        Some((self.data[word] >> shift) & self.max_value())
    }

    /// # Panics
    /// Panics if `index` is out of bounds or `value` does not fit the width.
    pub fn set(&mut self, index: usize, value: u64) {
        assert!(index < self.len, "index {index} out of bounds for {} values", self.len);
        assert!(
            value <= self.max_value(),
            "value {value} does not fit {} bits",
            self.bits_per_value
        );
        if self.bits_per_value == 0 {
            return;
        }
        let (word, shift) = self.locate(index);
        self.data[word] &= !(self.max_value() << shift);
        self.data[word] |= value << shift;
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }
}

fn mask(bits_per_value: usize) -> u64 {
    if bits_per_value == 0 {
        0
    } else {
        u64::MAX >> (64 - bits_per_value)
    }
}
