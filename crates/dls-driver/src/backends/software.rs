// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated board) transport
//!
//! Emulates the FPGA side of the control channel in memory:
//!
//! ```text
//! write_words ──► OCP register file ──► execute bit set?
//!                                            │
//!                  SDRAM program region ◄────┤ run sequencer
//!                                            ▼
//!                  chip register file    result stream ──► SDRAM result window
//! ```
//!
//! The sequencer interprets the staged program: chip writes land in a
//! register map, each read is answered with a `Write` echo carrying the
//! stored value, timing instructions are echoed so the decoder can follow
//! the clock, and fire instructions come back as recorded spikes when the
//! FPGA configuration has `loopback_to_dls` set. How long the execute bit
//! stays set is configurable so that polling and timeouts can be tested
//! without hardware.

use crate::error::{DlsError, Result};
use crate::transport::Transport;
use bytes::Bytes;
use dls_chip::instruction::{Instruction, InstructionReader};
use dls_chip::regs::{self, control, exception, fpga_config, sdram};
use dls_chip::{Address, Word};
use std::collections::HashMap;
use tracing::{debug, warn};

/// When the simulated sequencer clears the execute bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Completion {
    /// Cleared before the first poll.
    #[default]
    Immediate,
    /// Cleared after this many reads of the control register.
    AfterPolls(u32),
    /// Never cleared; models a hung sequencer.
    Never,
}

/// In-memory board.
#[derive(Debug, Default)]
pub struct SoftwareTransport {
    registers: HashMap<Address, Word>,
    chip: HashMap<Address, Word>,
    program: Vec<u8>,
    results: Vec<u8>,
    completion: Completion,
    busy: Option<Completion>,
    executions: usize,
}

impl SoftwareTransport {
    /// Fresh board: all registers zero, execution completes immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long executions keep the execute bit set.
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    /// Current value of an OCP register.
    pub fn register(&self, address: Address) -> Word {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Current value of a chip register, if ever written.
    pub fn chip_register(&self, address: Address) -> Option<Word> {
        self.chip.get(&address).copied()
    }

    /// Preload a chip register, e.g. a read-only status word.
    pub fn set_chip_register(&mut self, address: Address, word: Word) {
        self.chip.insert(address, word);
    }

    /// Number of programs started.
    pub fn executions(&self) -> usize {
        self.executions
    }

    fn start_execution(&mut self) {
        self.executions += 1;
        let config = self.register(regs::FPGA_CONFIG);
        if config & fpga_config::DLS_RESET != 0 {
            warn!("execute while chip is held in reset, sequencer hangs");
            self.busy = Some(Completion::Never);
            return;
        }

        let start = self.register(regs::PROGRAM_ADDRESS) as usize;
        let size = self.register(regs::PROGRAM_SIZE) as usize;
        let end = (start + size).min(self.program.len());
        let program = self.program.get(start..end).unwrap_or(&[]).to_vec();
        let loopback = config & fpga_config::LOOPBACK_TO_DLS != 0;

        let mut out = Vec::new();
        let mut raised = 0;
        let mut halted = false;
        for instruction in InstructionReader::new(&program) {
            let instruction = match instruction {
                Ok(i) => i,
                Err(e) => {
                    warn!(error = %e, "sequencer stopped on illegal instruction");
                    raised |= exception::ILLEGAL_INSTRUCTION;
                    break;
                }
            };
            match instruction {
                Instruction::Halt => {
                    halted = true;
                    break;
                }
                Instruction::SetTime(_) | Instruction::WaitUntil(_) | Instruction::WaitFor(_) => {
                    instruction.encode_into(&mut out);
                }
                Instruction::Write { address, data } => {
                    self.chip.insert(address, data);
                }
                Instruction::Read { address } => {
                    let data = self.chip.get(&address).copied().unwrap_or(0);
                    Instruction::Write { address, data }.encode_into(&mut out);
                }
                Instruction::Fire(_) | Instruction::FireOne(_) => {
                    if loopback {
                        instruction.encode_into(&mut out);
                    }
                }
            }
        }
        if !halted && raised == 0 {
            raised |= exception::PROGRAM_OVERRUN;
        }
        Instruction::Halt.encode_into(&mut out);

        let result_offset = self.register(regs::RESULT_ADDRESS) as usize;
        if self.results.len() < result_offset + out.len() {
            self.results.resize(result_offset + out.len(), 0);
        }
        self.results[result_offset..result_offset + out.len()].copy_from_slice(&out);

        #[allow(clippy::cast_possible_truncation)]
        self.registers.insert(regs::RESULT_SIZE, out.len() as Word);
        self.registers.insert(regs::EXCEPTION, raised);
        debug!(
            program_bytes = program.len(),
            result_bytes = out.len(),
            exception = raised,
            "simulated execution finished"
        );

        self.busy = Some(self.completion);
        self.poll_control();
    }

    /// Advance the busy countdown by one control register read.
    fn poll_control(&mut self) {
        let done = match self.busy {
            None => return,
            Some(Completion::Immediate | Completion::AfterPolls(0)) => true,
            Some(Completion::AfterPolls(n)) => {
                self.busy = Some(Completion::AfterPolls(n - 1));
                false
            }
            Some(Completion::Never) => false,
        };
        if done {
            self.busy = None;
            let control_word = self.register(regs::FPGA_CONTROL) & !control::EXECUTE;
            self.registers.insert(regs::FPGA_CONTROL, control_word);
        }
    }
}

fn copy_padded(region: &[u8], offset: usize, size: usize) -> Bytes {
    let mut out = vec![0; size];
    if offset < region.len() {
        let n = size.min(region.len() - offset);
        out[..n].copy_from_slice(&region[offset..offset + n]);
    }
    Bytes::from(out)
}

impl Transport for SoftwareTransport {
    fn write_words(&mut self, addresses: &[Address], words: &[Word]) -> Result<()> {
        if addresses.len() != words.len() {
            return Err(DlsError::transport(format!(
                "{} addresses for {} words",
                addresses.len(),
                words.len()
            )));
        }
        for (&address, &word) in addresses.iter().zip(words) {
            self.registers.insert(address, word);
            if address == regs::FPGA_CONTROL && word & control::EXECUTE != 0 {
                self.start_execution();
            }
        }
        Ok(())
    }

    fn read_words(&mut self, addresses: &[Address]) -> Result<Vec<Word>> {
        Ok(addresses
            .iter()
            .map(|&address| {
                let word = self.register(address);
                if address == regs::FPGA_CONTROL {
                    self.poll_control();
                }
                word
            })
            .collect())
    }

    fn block_write(&mut self, address: Address, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.max_block_size() {
            return Err(DlsError::transport(format!(
                "block of {} bytes exceeds {}",
                bytes.len(),
                self.max_block_size()
            )));
        }
        if address >= sdram::RESULT_WINDOW {
            return Err(DlsError::transport(format!(
                "block write into result window at {address:#x}"
            )));
        }
        let offset = (address - sdram::PROGRAM_BASE) as usize;
        if self.program.len() < offset + bytes.len() {
            self.program.resize(offset + bytes.len(), 0);
        }
        self.program[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_block(&mut self, address: Address, size: usize) -> Result<Bytes> {
        if address >= sdram::RESULT_WINDOW {
            let offset = (address - sdram::RESULT_WINDOW) as usize;
            Ok(copy_padded(&self.results, offset, size))
        } else {
            let offset = (address - sdram::PROGRAM_BASE) as usize;
            Ok(copy_padded(&self.program, offset, size))
        }
    }

    fn max_block_size(&self) -> usize {
        sdram::MAX_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(t: &mut SoftwareTransport, instructions: &[Instruction]) {
        let mut bytes = Vec::new();
        for i in instructions {
            i.encode_into(&mut bytes);
        }
        t.block_write(0, &bytes).unwrap();
        t.write_words(
            &[regs::PROGRAM_ADDRESS, regs::PROGRAM_SIZE, regs::RESULT_ADDRESS],
            &[0, bytes.len() as Word, 0],
        )
        .unwrap();
    }

    fn execute(t: &mut SoftwareTransport) {
        t.write_words(&[regs::FPGA_CONTROL], &[control::EXECUTE]).unwrap();
    }

    fn results(t: &mut SoftwareTransport) -> Vec<Instruction> {
        let size = t.register(regs::RESULT_SIZE) as usize;
        let bytes = t.read_block(sdram::RESULT_WINDOW, size).unwrap();
        InstructionReader::new(&bytes).map(|i| i.unwrap()).collect()
    }

    #[test]
    fn reads_are_answered_with_write_echoes() {
        let mut t = SoftwareTransport::new();
        stage(
            &mut t,
            &[
                Instruction::Write { address: 0x10, data: 42 },
                Instruction::Read { address: 0x10 },
                Instruction::Halt,
            ],
        );
        execute(&mut t);
        assert_eq!(t.chip_register(0x10), Some(42));
        assert_eq!(
            results(&mut t),
            vec![Instruction::Write { address: 0x10, data: 42 }, Instruction::Halt]
        );
        assert_eq!(t.register(regs::EXCEPTION), 0);
        assert_eq!(t.register(regs::FPGA_CONTROL) & control::EXECUTE, 0);
    }

    #[test]
    fn fire_is_only_echoed_with_loopback() {
        let program = [Instruction::WaitFor(3), Instruction::Fire(1), Instruction::Halt];

        let mut t = SoftwareTransport::new();
        stage(&mut t, &program);
        execute(&mut t);
        assert_eq!(results(&mut t), vec![Instruction::WaitFor(3), Instruction::Halt]);

        t.write_words(&[regs::FPGA_CONFIG], &[fpga_config::LOOPBACK_TO_DLS]).unwrap();
        execute(&mut t);
        assert_eq!(results(&mut t), program.to_vec());
        assert_eq!(t.executions(), 2);
    }

    #[test]
    fn missing_halt_raises_overrun() {
        let mut t = SoftwareTransport::new();
        stage(&mut t, &[Instruction::WaitFor(1)]);
        execute(&mut t);
        assert_eq!(t.register(regs::EXCEPTION), exception::PROGRAM_OVERRUN);
    }

    #[test]
    fn execute_bit_clears_after_configured_polls() {
        let mut t = SoftwareTransport::new().with_completion(Completion::AfterPolls(2));
        stage(&mut t, &[Instruction::Halt]);
        execute(&mut t);
        let mut polls = 0;
        while t.read_words(&[regs::FPGA_CONTROL]).unwrap()[0] & control::EXECUTE != 0 {
            polls += 1;
            assert!(polls < 10);
        }
        assert_eq!(polls, 2);
    }

    #[test]
    fn block_write_into_result_window_is_rejected() {
        let mut t = SoftwareTransport::new();
        assert!(t.block_write(sdram::RESULT_WINDOW, &[0]).is_err());
    }
}
