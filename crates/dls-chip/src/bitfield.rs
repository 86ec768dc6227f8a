//! Table-driven register sub-field packing.
//!
//! Multi-field registers are described by one `const` [`Field`] per
//! sub-field: the index of the word it lives in, its LSB offset and its
//! width. Packing and unpacking are plain shift/mask operations on `u32`
//! words, so nothing depends on host byte order or struct layout.

use crate::Word;

/// Location of one sub-field inside a multi-word register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Index of the word holding the field.
    pub word: usize,
    /// Bit offset of the field's LSB within the word.
    pub offset: u32,
    /// Width in bits (1..=32).
    pub width: u32,
}

impl Field {
    /// Describe a field. Invalid geometry fails at compile time in `const` tables.
    #[must_use]
    pub const fn new(word: usize, offset: u32, width: u32) -> Self {
        assert!(width >= 1 && width <= 32, "field width must be 1..=32");
        assert!(offset + width <= 32, "field exceeds word boundary");
        Self { word, offset, width }
    }

    /// A field spanning a whole word.
    #[must_use]
    pub const fn word(word: usize) -> Self {
        Self::new(word, 0, 32)
    }

    /// Unshifted mask covering `width` bits.
    #[must_use]
    pub const fn mask(&self) -> Word {
        if self.width == 32 {
            Word::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Largest value the field can hold.
    #[must_use]
    pub const fn max_value(&self) -> Word {
        self.mask()
    }

    /// Write `value` into the field. Bits above `width` are discarded, so
    /// callers pass values already checked against their bounded type.
    pub fn insert(&self, words: &mut [Word], value: Word) {
        debug_assert!(value <= self.mask(), "value {value:#x} wider than field");
        let mask = self.mask() << self.offset;
        let w = &mut words[self.word];
        *w = (*w & !mask) | ((value << self.offset) & mask);
    }

    /// Write a flag.
    pub fn insert_bool(&self, words: &mut [Word], value: bool) {
        self.insert(words, Word::from(value));
    }

    /// Read the field.
    #[must_use]
    pub fn extract(&self, words: &[Word]) -> Word {
        (words[self.word] >> self.offset) & self.mask()
    }

    /// Read a flag (any nonzero value is `true`).
    #[must_use]
    pub fn extract_bool(&self, words: &[Word]) -> bool {
        self.extract(words) != 0
    }
}

/// Position of the single set bit in a hot-bit word.
///
/// Returns `None` if the word is zero or has more than one bit set.
#[must_use]
pub const fn hot_bit_position(word: Word) -> Option<u32> {
    if word.count_ones() == 1 {
        Some(word.trailing_zeros())
    } else {
        None
    }
}
