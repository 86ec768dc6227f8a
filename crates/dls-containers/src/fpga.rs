//! FPGA sequencer registers: execute flag, program/result pointers and the
//! read-only status words written back by the sequencer.

use crate::error::Result;
use crate::leaf::{expect_words, LeafConfig};
use dls_chip::coord::Unique;
use dls_chip::regs::{self, exception};
use dls_chip::{Address, Word};
use std::fmt;

/// FPGA control word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FpgaControl {
    /// Start the sequencer. Cleared by the FPGA once the program halts.
    pub execute: bool,
}

impl LeafConfig for FpgaControl {
    type Coordinate = Unique;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: Unique) -> Vec<Address> {
        vec![regs::FPGA_CONTROL]
    }

    fn encode(&self) -> Vec<Word> {
        vec![if self.execute { regs::control::EXECUTE } else { 0 }]
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("FpgaControl", 1, words)?;
        self.execute = words[0] & regs::control::EXECUTE != 0;
        Ok(())
    }
}

macro_rules! pointer_register {
    ($(#[$meta:meta])* $name:ident, $address:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw register value.
            pub const fn value(self) -> u32 {
                self.0
            }
        }

        impl LeafConfig for $name {
            type Coordinate = Unique;
            const CONFIG_SIZE_IN_WORDS: usize = 1;

            fn addresses(&self, _coord: Unique) -> Vec<Address> {
                vec![$address]
            }

            fn encode(&self) -> Vec<Word> {
                vec![self.0]
            }

            fn decode(&mut self, words: &[Word]) -> Result<()> {
                expect_words(stringify!($name), 1, words)?;
                self.0 = words[0];
                Ok(())
            }
        }
    };
}

pointer_register!(
    /// SDRAM byte address of the staged program.
    ProgramAddress, regs::PROGRAM_ADDRESS
);
pointer_register!(
    /// Length of the staged program in bytes.
    ProgramSize, regs::PROGRAM_SIZE
);
pointer_register!(
    /// SDRAM byte offset results are written to.
    ResultAddress, regs::RESULT_ADDRESS
);

/// Number of result bytes of the last run. Read-only; `None` until read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultSize {
    value: Option<u32>,
}

impl ResultSize {
    /// Value as it would be read back.
    pub const fn new(value: u32) -> Self {
        Self { value: Some(value) }
    }

    /// Bytes, if the register has been read.
    pub const fn value(&self) -> Option<u32> {
        self.value
    }
}

impl LeafConfig for ResultSize {
    type Coordinate = Unique;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: Unique) -> Vec<Address> {
        vec![regs::RESULT_SIZE]
    }

    fn encode(&self) -> Vec<Word> {
        vec![self.value.unwrap_or(0)]
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("ResultSize", 1, words)?;
        self.value = Some(words[0]);
        Ok(())
    }
}

/// FPGA exception register. Read-only; `None` until read.
///
/// Any nonzero payload means the sequencer stopped on an error. The payload
/// is kept verbatim so unknown bits survive into error reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FpgaException {
    value: Option<u32>,
}

const EXCEPTION_NAMES: [(u32, &str); 4] = [
    (exception::PROGRAM_OVERRUN, "program overrun"),
    (exception::RESULT_OVERFLOW, "result overflow"),
    (exception::ILLEGAL_INSTRUCTION, "illegal instruction"),
    (exception::READ_TIMEOUT, "read timeout"),
];

impl FpgaException {
    /// Value as it would be read back.
    pub const fn new(raw: u32) -> Self {
        Self { value: Some(raw) }
    }

    /// Raw payload, if the register has been read.
    pub const fn raw(&self) -> Option<u32> {
        self.value
    }

    /// True if the register was read and holds an exception.
    pub const fn is_raised(&self) -> bool {
        matches!(self.value, Some(v) if v != 0)
    }
}

impl fmt::Display for FpgaException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(raw) = self.value else {
            return write!(f, "exception register not read");
        };
        if raw == 0 {
            return write!(f, "no exception");
        }
        write!(f, "{raw:#010x}")?;
        let names: Vec<&str> = EXCEPTION_NAMES
            .iter()
            .filter(|(bit, _)| raw & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        if !names.is_empty() {
            write!(f, " ({})", names.join(", "))?;
        }
        Ok(())
    }
}

impl LeafConfig for FpgaException {
    type Coordinate = Unique;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: Unique) -> Vec<Address> {
        vec![regs::EXCEPTION]
    }

    fn encode(&self) -> Vec<Word> {
        vec![self.value.unwrap_or(0)]
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("FpgaException", 1, words)?;
        self.value = Some(words[0]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_execute_bit() {
        assert_eq!(FpgaControl { execute: true }.encode(), vec![1]);
        let mut c = FpgaControl::default();
        c.decode(&[1]).unwrap();
        assert!(c.execute);
    }

    #[test]
    fn pointer_registers_have_distinct_addresses() {
        assert_eq!(ProgramAddress(0).addresses(Unique), vec![regs::PROGRAM_ADDRESS]);
        assert_eq!(ProgramSize(0).addresses(Unique), vec![regs::PROGRAM_SIZE]);
        assert_eq!(ResultAddress(0).addresses(Unique), vec![regs::RESULT_ADDRESS]);
    }

    #[test]
    fn result_size_is_unset_until_read() {
        let mut size = ResultSize::default();
        assert_eq!(size.value(), None);
        size.decode(&[128]).unwrap();
        assert_eq!(size.value(), Some(128));
    }

    #[test]
    fn exception_display_names_known_bits() {
        let e = FpgaException::new(exception::ILLEGAL_INSTRUCTION | 0x100);
        assert!(e.is_raised());
        assert_eq!(e.to_string(), "0x00000104 (illegal instruction)");
        assert_eq!(FpgaException::new(0).to_string(), "no exception");
        assert!(!FpgaException::default().is_raised());
    }
}
