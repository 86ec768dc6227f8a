//! Result stream decoder.
//!
//! The sequencer reports everything that happened during a run in the same
//! instruction encoding the host compiles programs with:
//!
//! | Instruction | Meaning in the result stream |
//! |-------------|------------------------------|
//! | `Write` | answer to a `Read`; the data word is the value read |
//! | `SetTime` / `WaitUntil` | clock set to an absolute time |
//! | `WaitFor` | clock advanced |
//! | `Fire` / `FireOne` | recorded spikes, mirrored neuron mapping |
//! | `Halt` | end of results; trailing bytes are padding |
//!
//! The clock wraps like the hardware counter and may move backward if the
//! program set it backward; spikes carry whatever time is current.

use crate::error::{DlsError, Result};
use crate::playback::{neuron_for_bit, PlaybackProgram};
use dls_chip::coord::NeuronOnDls;
use dls_chip::instruction::{Instruction, InstructionReader, FIRE_VECTOR_WIDTH};
use dls_chip::{HardwareTime, Word};
use std::fmt;
use std::path::Path;
use tracing::{debug, trace};

/// Spike recorded from a neuron during a run.
///
/// Ordered by time, then neuron.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordedSpike {
    /// Clock value when the spike was reported.
    pub time: HardwareTime,
    /// Spiking neuron.
    pub neuron: NeuronOnDls,
}

impl RecordedSpike {
    /// Spike of `neuron` at `time`.
    pub const fn new(time: HardwareTime, neuron: NeuronOnDls) -> Self {
        Self { time, neuron }
    }
}

impl fmt::Display for RecordedSpike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordedSpike(t={}, neuron={})", self.time, self.neuron.value())
    }
}

/// Everything decoded from one result stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackResult {
    /// Values answered by reads, in arrival order.
    pub read_words: Vec<Word>,
    /// Recorded spikes, in stream order.
    pub spikes: Vec<RecordedSpike>,
}

/// Decode a raw result stream.
///
/// # Errors
///
/// Returns error on an unknown opcode or a truncated instruction.
pub fn decode_result(bytes: &[u8]) -> Result<PlaybackResult> {
    let mut result = PlaybackResult::default();
    let mut time: HardwareTime = 0;
    let mut reader = InstructionReader::new(bytes);

    for instruction in reader.by_ref() {
        match instruction? {
            Instruction::Halt => break,
            Instruction::SetTime(t) | Instruction::WaitUntil(t) => time = t,
            Instruction::WaitFor(delta) => time = time.wrapping_add(delta),
            Instruction::Write { data, .. } => result.read_words.push(data),
            Instruction::Fire(vector) => {
                for bit in (0..FIRE_VECTOR_WIDTH).rev() {
                    if vector & (1 << bit) == 0 {
                        continue;
                    }
                    if let Some(neuron) = neuron_for_bit(bit) {
                        result.spikes.push(RecordedSpike::new(time, neuron));
                    }
                }
            }
            Instruction::FireOne(index) => {
                let neuron = neuron_for_bit(u32::from(index)).ok_or_else(|| {
                    DlsError::protocol(format!("fire index {index} out of range"))
                })?;
                result.spikes.push(RecordedSpike::new(time, neuron));
            }
            Instruction::Read { address } => {
                trace!(address = format_args!("{address:#x}"), "read echo in result stream");
            }
        }
    }

    debug!(
        bytes = bytes.len(),
        consumed = reader.position(),
        reads = result.read_words.len(),
        spikes = result.spikes.len(),
        "decoded result stream"
    );
    Ok(result)
}

/// Decode a raw result stream and attach it to `program`.
///
/// # Errors
///
/// See [`decode_result`]; `program` is left untouched on error.
pub fn decode_result_bytes(bytes: &[u8], program: &mut PlaybackProgram) -> Result<()> {
    let result = decode_result(bytes)?;
    program.set_result(result);
    Ok(())
}

/// Decode a result dump from a file.
///
/// # Errors
///
/// Returns error if the file cannot be read or does not decode.
pub fn decode_result_file(path: impl AsRef<Path>) -> Result<PlaybackResult> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_result(&bytes)
}
