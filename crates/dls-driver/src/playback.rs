//! Playback program builder, compiled programs and read tickets.
//!
//! A builder accumulates timed instructions against a logical clock. Writes
//! and reads of containers expand into one instruction per register word,
//! in traversal order, at the current time. `done()` freezes the stream
//! into a [`PlaybackProgram`] with a fresh serial number.
//!
//! ```
//! use dls_chip::coord::CapMemCellOnDls;
//! use dls_containers::{CapMemCell, CapMemCellValue};
//! use dls_driver::PlaybackProgramBuilder;
//!
//! let mut builder = PlaybackProgramBuilder::new();
//! let cell = CapMemCellOnDls::default();
//! builder.write(cell, &CapMemCell::new(CapMemCellValue::new_const(7))).unwrap();
//! builder.wait_for(100);
//! let ticket = builder.read::<CapMemCell>(cell).unwrap();
//! builder.halt();
//! let program = builder.done();
//!
//! // no results before the program has been run
//! assert!(program.get(&ticket).is_err());
//! ```

use crate::decoder::{PlaybackResult, RecordedSpike};
use crate::error::{DlsError, Result};
use bytes::Bytes;
use dls_chip::coord::{NeuronOnDls, SynapseDriverOnDls};
use dls_chip::instruction::{Instruction, FIRE_VECTOR_WIDTH};
use dls_chip::regs::sdram;
use dls_chip::{Coordinate, HardwareTime, Word};
use dls_containers::{visitors, Chip, Container, SynapseAddress};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Cycles the CapMem needs to settle after a full chip write.
pub const CAPMEM_SETTLE_CYCLES: HardwareTime = 2_000_000;

/// Identity of a compiled program, used to match results to programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerialNumber(u64);

impl SerialNumber {
    /// Never assigned to a program; marks "nothing transferred".
    pub const INVALID: Self = Self(0);

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// True for every serial except [`SerialNumber::INVALID`].
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bit of `index` in a fire vector. Bit `p` addresses source `31 - p`.
pub(crate) const fn mirrored(index: u16) -> u32 {
    FIRE_VECTOR_WIDTH - 1 - index as u32
}

/// Spike injected by a program into a synapse driver row.
///
/// Ordered by time, then source address, then driver row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackSpike {
    /// Time at which the spike is played back.
    pub time: HardwareTime,
    /// Synapse address carried by the spike.
    pub source_address: SynapseAddress,
    /// Driver row receiving the spike.
    pub synapse_driver: SynapseDriverOnDls,
}

impl PlaybackSpike {
    /// Spike at `time` into `synapse_driver`.
    pub const fn new(
        time: HardwareTime,
        source_address: SynapseAddress,
        synapse_driver: SynapseDriverOnDls,
    ) -> Self {
        Self {
            time,
            source_address,
            synapse_driver,
        }
    }
}

/// Handle to the words of one `read` in a program's results.
pub struct PlaybackProgramTicket<C: Container> {
    serial: SerialNumber,
    coord: C::Coordinate,
    offset: usize,
    len: usize,
    _container: PhantomData<fn() -> C>,
}

impl<C: Container> PlaybackProgramTicket<C> {
    /// Serial of the program this ticket belongs to.
    pub fn serial_number(&self) -> SerialNumber {
        self.serial
    }

    /// Coordinate that was read.
    pub fn coordinate(&self) -> C::Coordinate {
        self.coord
    }
}

impl<C: Container> Clone for PlaybackProgramTicket<C> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            coord: self.coord,
            offset: self.offset,
            len: self.len,
            _container: PhantomData,
        }
    }
}

impl<C: Container> fmt::Debug for PlaybackProgramTicket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackProgramTicket")
            .field("serial", &self.serial)
            .field("coord", &self.coord)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Accumulates instructions for one program.
#[derive(Debug)]
pub struct PlaybackProgramBuilder {
    serial: SerialNumber,
    time: HardwareTime,
    instructions: Vec<Instruction>,
    read_words: usize,
}

impl Default for PlaybackProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackProgramBuilder {
    /// Empty builder; the program it produces gets a fresh serial.
    pub fn new() -> Self {
        Self {
            serial: SerialNumber::next(),
            time: 0,
            instructions: Vec::new(),
            read_words: 0,
        }
    }

    /// Current logical time.
    pub fn time(&self) -> HardwareTime {
        self.time
    }

    /// Jump the clock to `t`. Jumping backward is allowed.
    pub fn set_time(&mut self, t: HardwareTime) {
        self.time = t;
        self.instructions.push(Instruction::SetTime(t));
    }

    /// Wait until the clock reaches `t`.
    ///
    /// If `t` is already in the past the sequencer does not wait; the
    /// builder's clock still follows `t`, as the decoder's will.
    pub fn wait_until(&mut self, t: HardwareTime) {
        if t < self.time {
            debug!(target = t, now = self.time, "wait_until into the past");
        }
        self.time = t;
        self.instructions.push(Instruction::WaitUntil(t));
    }

    /// Advance the clock by `delta` cycles.
    pub fn wait_for(&mut self, delta: HardwareTime) {
        self.time = self.time.wrapping_add(delta);
        self.instructions.push(Instruction::WaitFor(delta));
    }

    /// Write `config` at `coord`, one instruction per word.
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be flattened.
    pub fn write<C: Container>(&mut self, coord: C::Coordinate, config: &C) -> Result<()> {
        let addresses = visitors::collect_addresses(coord, config)?;
        let words = visitors::collect_words(config);
        self.instructions.extend(
            addresses
                .into_iter()
                .zip(words)
                .map(|(address, data)| Instruction::Write { address, data }),
        );
        Ok(())
    }

    /// Read the container at `coord`, one instruction per word.
    ///
    /// The returned ticket yields the value once the program has run.
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be flattened.
    pub fn read<C: Container + Default>(
        &mut self,
        coord: C::Coordinate,
    ) -> Result<PlaybackProgramTicket<C>> {
        let addresses = visitors::collect_addresses(coord, &C::default())?;
        let ticket = PlaybackProgramTicket {
            serial: self.serial,
            coord,
            offset: self.read_words,
            len: addresses.len(),
            _container: PhantomData,
        };
        self.read_words += addresses.len();
        self.instructions
            .extend(addresses.into_iter().map(|address| Instruction::Read { address }));
        Ok(ticket)
    }

    /// Fire a raw vector; bit `p` fires source `31 - p`.
    pub fn fire(&mut self, vector: u32) {
        self.instructions.push(Instruction::Fire(vector));
    }

    /// Fire one synapse driver row.
    pub fn fire_one(&mut self, row: SynapseDriverOnDls) {
        #[allow(clippy::cast_possible_truncation)]
        let index = mirrored(row.value()) as u8;
        self.instructions.push(Instruction::FireOne(index));
    }

    /// Fire several rows at once.
    pub fn fire_rows(&mut self, rows: impl IntoIterator<Item = SynapseDriverOnDls>) {
        let vector = rows
            .into_iter()
            .fold(0, |v, row| v | (1 << mirrored(row.value())));
        self.fire(vector);
    }

    /// Play spikes back in time order; spikes sharing a time fire together.
    pub fn play_spikes(&mut self, spikes: &[PlaybackSpike]) {
        let mut sorted = spikes.to_vec();
        sorted.sort_unstable();
        for group in sorted.chunk_by(|a, b| a.time == b.time) {
            self.wait_until(group[0].time);
            if let [single] = group {
                self.fire_one(single.synapse_driver);
            } else {
                self.fire_rows(group.iter().map(|s| s.synapse_driver));
            }
        }
    }

    /// Terminate the program. Repeated calls emit a single halt.
    pub fn halt(&mut self) {
        if self.instructions.last() != Some(&Instruction::Halt) {
            self.instructions.push(Instruction::Halt);
        }
    }

    /// True if nothing has been added since the last `done()`.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Freeze into a program and reset to an empty builder with a new serial.
    ///
    /// A trailing halt is appended if missing. Tickets issued so far belong
    /// to the returned program.
    pub fn done(&mut self) -> PlaybackProgram {
        self.halt();
        let builder = std::mem::take(self);
        let mut bytes = Vec::with_capacity(
            builder.instructions.iter().map(Instruction::encoded_len).sum(),
        );
        for instruction in &builder.instructions {
            instruction.encode_into(&mut bytes);
        }
        debug!(
            serial = %builder.serial,
            instructions = builder.instructions.len(),
            bytes = bytes.len(),
            "compiled playback program"
        );
        PlaybackProgram {
            serial: builder.serial,
            instructions: Bytes::from(bytes),
            expected_read_words: builder.read_words,
            end_time: builder.time,
            result: None,
        }
    }
}

/// A compiled, immutable instruction stream plus the results of running it.
#[derive(Debug, Clone)]
pub struct PlaybackProgram {
    serial: SerialNumber,
    instructions: Bytes,
    expected_read_words: usize,
    end_time: HardwareTime,
    result: Option<PlaybackResult>,
}

impl PlaybackProgram {
    /// Identity of this program.
    pub fn serial_number(&self) -> SerialNumber {
        self.serial
    }

    /// The whole compiled stream.
    pub fn instruction_bytes(&self) -> &Bytes {
        &self.instructions
    }

    /// The compiled stream cut into SDRAM staging blocks.
    pub fn instruction_byte_blocks(&self) -> impl Iterator<Item = Bytes> + '_ {
        staging_blocks(&self.instructions, sdram::BLOCK_SIZE)
    }

    /// Logical clock value after the last instruction.
    pub fn end_time(&self) -> HardwareTime {
        self.end_time
    }

    /// Wall-clock estimate of a run, given the sequencer's cycle period.
    pub fn expected_runtime(&self, cycle: Duration) -> Duration {
        cycle.saturating_mul(self.end_time)
    }

    /// Number of words the program's reads will produce.
    pub fn expected_read_words(&self) -> usize {
        self.expected_read_words
    }

    /// True once results have been attached.
    pub fn has_results(&self) -> bool {
        self.result.is_some()
    }

    /// Attach decoded results, replacing earlier ones.
    pub fn set_result(&mut self, result: PlaybackResult) {
        if result.read_words.len() != self.expected_read_words {
            debug!(
                serial = %self.serial,
                expected = self.expected_read_words,
                got = result.read_words.len(),
                "read word count differs from program"
            );
        }
        self.result = Some(result);
    }

    fn result(&self) -> Result<&PlaybackResult> {
        self.result.as_ref().ok_or_else(|| {
            DlsError::usage(format!("program {} has no results yet", self.serial))
        })
    }

    /// All words answered by reads, in program order.
    ///
    /// # Errors
    ///
    /// Returns a usage error before results are attached.
    pub fn read_words(&self) -> Result<&[Word]> {
        Ok(&self.result()?.read_words)
    }

    /// Spikes recorded during the run, in stream order.
    ///
    /// # Errors
    ///
    /// Returns a usage error before results are attached.
    pub fn spikes(&self) -> Result<&[RecordedSpike]> {
        Ok(&self.result()?.spikes)
    }

    /// Value read through `ticket`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the ticket belongs to another program or no
    /// results are attached, and a protocol error if the results are too
    /// short or do not decode.
    pub fn get<C: Container + Default>(&self, ticket: &PlaybackProgramTicket<C>) -> Result<C> {
        if ticket.serial != self.serial {
            return Err(DlsError::usage(format!(
                "ticket of program {} used on program {}",
                ticket.serial, self.serial
            )));
        }
        let words = &self.result()?.read_words;
        let slice = words
            .get(ticket.offset..ticket.offset + ticket.len)
            .ok_or_else(|| {
                DlsError::protocol(format!(
                    "result holds {} read words, ticket needs {}..{}",
                    words.len(),
                    ticket.offset,
                    ticket.offset + ticket.len
                ))
            })?;
        let mut value = C::default();
        visitors::decode_words(&mut value, slice)?;
        Ok(value)
    }
}

/// Zero-copy slices of `bytes`, at most `block` bytes each.
pub(crate) fn staging_blocks(bytes: &Bytes, block: usize) -> impl Iterator<Item = Bytes> + '_ {
    let block = block.max(1);
    (0..bytes.len()).step_by(block).map(move |start| {
        let end = (start + block).min(bytes.len());
        bytes.slice(start..end)
    })
}

/// Program that writes `chip`, lets the CapMem settle and halts.
///
/// # Errors
///
/// Returns error if the chip cannot be flattened.
pub fn get_configure_program(chip: &Chip) -> Result<PlaybackProgram> {
    let mut builder = PlaybackProgramBuilder::new();
    builder.set_time(0);
    builder.write(dls_chip::coord::Unique, chip)?;
    builder.wait_for(CAPMEM_SETTLE_CYCLES);
    builder.halt();
    Ok(builder.done())
}

/// Neuron whose spike a fire bit `p` reports.
pub(crate) fn neuron_for_bit(bit: u32) -> Option<NeuronOnDls> {
    let index = FIRE_VECTOR_WIDTH.checked_sub(1)?.checked_sub(bit)?;
    NeuronOnDls::from_enum(index as usize).ok()
}
