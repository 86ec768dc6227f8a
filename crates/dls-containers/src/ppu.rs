//! Embedded plasticity processor (PPU): memory and control/status registers.

use crate::error::Result;
use crate::leaf::{expect_words, LeafConfig};
use crate::traversal::{composite_container, Composite, Node, NodeMut};
use dls_chip::bitfield::Field;
use dls_chip::coord::{
    AnyCoordinate, PpuControlRegisterOnDls, PpuMemoryOnDls, PpuMemoryWordOnDls,
    PpuStatusRegisterOnDls,
};
use dls_chip::regs::{PPU_CONTROL, PPU_MEMORY_BASE, PPU_STATUS};
use dls_chip::{iter_all, ranged_value, Address, Coordinate, Word};

ranged_value!(
    /// Raw content of one PPU memory word.
    PpuMemoryWordValue, u32, u32::MAX
);

/// One word of PPU memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuMemoryWord {
    /// Stored word.
    pub value: PpuMemoryWordValue,
}

impl PpuMemoryWord {
    /// Word holding `value`.
    pub const fn new(value: PpuMemoryWordValue) -> Self {
        Self { value }
    }
}

impl LeafConfig for PpuMemoryWord {
    type Coordinate = PpuMemoryWordOnDls;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, coord: PpuMemoryWordOnDls) -> Vec<Address> {
        vec![PPU_MEMORY_BASE + Address::from(coord.value())]
    }

    fn encode(&self) -> Vec<Word> {
        vec![self.value.value()]
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("PpuMemoryWord", 1, words)?;
        self.value = PpuMemoryWordValue::new_const(words[0]);
        Ok(())
    }
}

/// The whole PPU memory, 4096 words.
#[derive(Debug, Clone)]
pub struct PpuMemory {
    words: Vec<PpuMemoryWord>,
}

impl Default for PpuMemory {
    fn default() -> Self {
        Self {
            words: vec![PpuMemoryWord::default(); PpuMemoryWordOnDls::SIZE],
        }
    }
}

impl PpuMemory {
    /// Memory image from raw words. Missing trailing words are zero.
    ///
    /// # Errors
    ///
    /// Returns an error if `words` is larger than the memory.
    pub fn from_words(words: &[Word]) -> Result<Self> {
        if words.len() > PpuMemoryWordOnDls::SIZE {
            return Err(crate::ConfigError::word_count(
                "PpuMemory",
                PpuMemoryWordOnDls::SIZE,
                words.len(),
            ));
        }
        let mut memory = Self::default();
        for (slot, &w) in memory.words.iter_mut().zip(words) {
            slot.value = PpuMemoryWordValue::new_const(w);
        }
        Ok(memory)
    }

    /// Memory image as raw words.
    pub fn to_words(&self) -> Vec<Word> {
        self.words.iter().map(|w| w.value.value()).collect()
    }

    /// One word.
    pub fn get(&self, coord: PpuMemoryWordOnDls) -> PpuMemoryWord {
        self.words[coord.to_enum()]
    }

    /// Overwrite one word.
    pub fn set(&mut self, coord: PpuMemoryWordOnDls, word: PpuMemoryWord) {
        self.words[coord.to_enum()] = word;
    }
}

impl Composite for PpuMemory {
    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(AnyCoordinate, Node<'a>)) {
        for (coord, word) in iter_all::<PpuMemoryWordOnDls>().zip(&self.words) {
            f(coord.into(), Node::Leaf(word));
        }
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>)) {
        for (coord, word) in iter_all::<PpuMemoryWordOnDls>().zip(&mut self.words) {
            f(coord.into(), NodeMut::Leaf(word));
        }
    }
}

composite_container!(PpuMemory, PpuMemoryOnDls);

const INHIBIT_RESET: Field = Field::new(0, 0, 1);
const FORCE_CLOCK_ON: Field = Field::new(0, 1, 1);
const FORCE_CLOCK_OFF: Field = Field::new(0, 2, 1);
const SLEEP: Field = Field::new(0, 0, 1);

/// PPU control register. The PPU runs while `inhibit_reset` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuControlRegister {
    /// Release the PPU from reset.
    pub inhibit_reset: bool,
    /// Keep the PPU clock running.
    pub force_clock_on: bool,
    /// Gate the PPU clock.
    pub force_clock_off: bool,
}

impl LeafConfig for PpuControlRegister {
    type Coordinate = PpuControlRegisterOnDls;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: PpuControlRegisterOnDls) -> Vec<Address> {
        vec![PPU_CONTROL]
    }

    fn encode(&self) -> Vec<Word> {
        let mut words = vec![0];
        INHIBIT_RESET.insert_bool(&mut words, self.inhibit_reset);
        FORCE_CLOCK_ON.insert_bool(&mut words, self.force_clock_on);
        FORCE_CLOCK_OFF.insert_bool(&mut words, self.force_clock_off);
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("PpuControlRegister", 1, words)?;
        *self = Self {
            inhibit_reset: INHIBIT_RESET.extract_bool(words),
            force_clock_on: FORCE_CLOCK_ON.extract_bool(words),
            force_clock_off: FORCE_CLOCK_OFF.extract_bool(words),
        };
        Ok(())
    }
}

/// PPU status register. Read-only: only obtainable by reading the chip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuStatusRegister {
    sleep: bool,
}

impl PpuStatusRegister {
    /// Status as it would be read back.
    pub const fn new(sleep: bool) -> Self {
        Self { sleep }
    }

    /// The PPU has executed its sleep instruction.
    pub const fn sleep(&self) -> bool {
        self.sleep
    }
}

impl LeafConfig for PpuStatusRegister {
    type Coordinate = PpuStatusRegisterOnDls;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: PpuStatusRegisterOnDls) -> Vec<Address> {
        vec![PPU_STATUS]
    }

    fn encode(&self) -> Vec<Word> {
        let mut words = vec![0];
        SLEEP.insert_bool(&mut words, self.sleep);
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("PpuStatusRegister", 1, words)?;
        self.sleep = SLEEP.extract_bool(words);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitors;

    #[test]
    fn memory_addresses_are_contiguous() {
        let addresses = visitors::collect_addresses(PpuMemoryOnDls, &PpuMemory::default()).unwrap();
        assert_eq!(addresses.len(), 4096);
        assert_eq!(addresses[0], 0x0200_0000);
        assert_eq!(addresses[4095], 0x0200_0fff);
    }

    #[test]
    fn memory_from_words_pads_with_zero() {
        let memory = PpuMemory::from_words(&[0xdead_beef, 1]).unwrap();
        let words = memory.to_words();
        assert_eq!(words.len(), 4096);
        assert_eq!(&words[..3], &[0xdead_beef, 1, 0]);
        assert!(PpuMemory::from_words(&vec![0; 4097]).is_err());
    }

    #[test]
    fn memory_decode_replaces_content() {
        let mut memory = PpuMemory::default();
        let image: Vec<Word> = (0..4096).collect();
        visitors::decode_words(&mut memory, &image).unwrap();
        assert_eq!(memory.get(PpuMemoryWordOnDls::new_const(17)).value.value(), 17);
        assert!(visitors::decode_words(&mut memory, &image[..10]).is_err());
    }

    #[test]
    fn control_register_bits() {
        let reg = PpuControlRegister {
            inhibit_reset: true,
            force_clock_on: false,
            force_clock_off: true,
        };
        assert_eq!(reg.encode(), vec![0b101]);
        let mut decoded = PpuControlRegister::default();
        decoded.decode(&[0b101]).unwrap();
        assert_eq!(decoded, reg);
    }

    #[test]
    fn status_register_is_read_back() {
        let mut status = PpuStatusRegister::default();
        assert!(!status.sleep());
        status.decode(&[1]).unwrap();
        assert!(status.sleep());
        assert_eq!(status, PpuStatusRegister::new(true));
    }
}
