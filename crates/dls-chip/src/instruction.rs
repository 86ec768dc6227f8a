//! Playback instruction encoding.
//!
//! The FPGA sequencer executes a byte stream of variable-length
//! instructions: one opcode byte followed by a big-endian payload. The same
//! encoding is used in both directions: the host compiles programs with it,
//! and the sequencer reports read answers, timing and recorded spikes with
//! it in the result stream.
//!
//! | Opcode | Instruction | Payload |
//! |-------|-------------|---------|
//! | `0x00` | Halt | – |
//! | `0x01` | SetTime | u32 |
//! | `0x02` | WaitUntil | u32 |
//! | `0x03` | WaitFor | u8, value < 128 |
//! | `0x04` | WaitFor | u16 |
//! | `0x05` | WaitFor | u32 |
//! | `0x06` | Write | u32 address, u32 data |
//! | `0x07` | Read | u32 address |
//! | `0x08` | Fire | u32 bit vector |
//! | `0x09` | FireOne | u8 index |

use crate::{Address, HardwareTime, Word};
use bytes::{Buf, BufMut};
use thiserror::Error;

/// Opcode bytes.
pub mod opcode {
    /// Stop the sequencer.
    pub const HALT: u8 = 0x00;
    /// Set the sequencer clock.
    pub const SET_TIME: u8 = 0x01;
    /// Wait until an absolute time.
    pub const WAIT_UNTIL: u8 = 0x02;
    /// Relative wait, 7-bit payload.
    pub const WAIT_FOR_7: u8 = 0x03;
    /// Relative wait, 16-bit payload.
    pub const WAIT_FOR_16: u8 = 0x04;
    /// Relative wait, 32-bit payload.
    pub const WAIT_FOR_32: u8 = 0x05;
    /// Register write (or read answer in the result stream).
    pub const WRITE: u8 = 0x06;
    /// Register read request.
    pub const READ: u8 = 0x07;
    /// Fire a set of spike sources.
    pub const FIRE: u8 = 0x08;
    /// Fire a single spike source.
    pub const FIRE_ONE: u8 = 0x09;
}

/// Width of the fire bit vector. Bit `p` addresses source `FIRE_VECTOR_WIDTH - 1 - p`.
pub const FIRE_VECTOR_WIDTH: u32 = 32;

/// Errors while reading an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InstructionDecodeError {
    /// Byte is not a known opcode.
    #[error("unknown opcode {opcode:#04x} at byte {offset}")]
    UnknownOpcode {
        /// Offending byte.
        opcode: u8,
        /// Position in the stream.
        offset: usize,
    },

    /// Stream ended inside an instruction payload.
    #[error("truncated instruction {opcode:#04x} at byte {offset}: need {needed} payload bytes, have {available}")]
    Truncated {
        /// Opcode of the incomplete instruction.
        opcode: u8,
        /// Position of the opcode.
        offset: usize,
        /// Payload bytes required.
        needed: usize,
        /// Payload bytes left in the stream.
        available: usize,
    },

    /// Payload byte outside the range its opcode allows.
    #[error("malformed payload {payload:#04x} for instruction {opcode:#04x} at byte {offset}")]
    MalformedPayload {
        /// Opcode of the instruction.
        opcode: u8,
        /// Position of the opcode.
        offset: usize,
        /// Rejected payload byte.
        payload: u8,
    },
}

/// One playback instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Terminate the program.
    Halt,
    /// Jump the sequencer clock to an absolute time.
    SetTime(HardwareTime),
    /// Block until the clock reaches an absolute time.
    WaitUntil(HardwareTime),
    /// Block for a number of clock cycles.
    WaitFor(HardwareTime),
    /// Write `data` to `address`.
    Write {
        /// Target register.
        address: Address,
        /// Data word.
        data: Word,
    },
    /// Read `address`; answered with a `Write` in the result stream.
    Read {
        /// Source register.
        address: Address,
    },
    /// Fire every source whose mirrored bit is set.
    Fire(u32),
    /// Fire one source by mirrored index.
    FireOne(u8),
}

impl Instruction {
    /// Opcode byte this instruction encodes to.
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        match self {
            Self::Halt => opcode::HALT,
            Self::SetTime(_) => opcode::SET_TIME,
            Self::WaitUntil(_) => opcode::WAIT_UNTIL,
            Self::WaitFor(t) if *t < 0x80 => opcode::WAIT_FOR_7,
            Self::WaitFor(t) if *t <= 0xFFFF => opcode::WAIT_FOR_16,
            Self::WaitFor(_) => opcode::WAIT_FOR_32,
            Self::Write { .. } => opcode::WRITE,
            Self::Read { .. } => opcode::READ,
            Self::Fire(_) => opcode::FIRE,
            Self::FireOne(_) => opcode::FIRE_ONE,
        }
    }

    /// Encoded length in bytes, opcode included.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        1 + payload_len(self.opcode())
    }

    /// Append the encoding to `out`. `WaitFor` uses the narrowest form.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u8(self.opcode());
        match *self {
            Self::Halt => {}
            Self::SetTime(t) | Self::WaitUntil(t) | Self::Fire(t) => out.put_u32(t),
            Self::WaitFor(t) => match self.opcode() {
                opcode::WAIT_FOR_7 => out.put_u8(t as u8),
                opcode::WAIT_FOR_16 => out.put_u16(t as u16),
                _ => out.put_u32(t),
            },
            Self::Write { address, data } => {
                out.put_u32(address);
                out.put_u32(data);
            }
            Self::Read { address } => out.put_u32(address),
            Self::FireOne(index) => out.put_u8(index),
        }
    }

    /// Encode into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

/// Payload length for `op`; zero for unknown opcodes.
const fn payload_len(op: u8) -> usize {
    match op {
        opcode::SET_TIME
        | opcode::WAIT_UNTIL
        | opcode::WAIT_FOR_32
        | opcode::READ
        | opcode::FIRE => 4,
        opcode::WAIT_FOR_7 | opcode::FIRE_ONE => 1,
        opcode::WAIT_FOR_16 => 2,
        opcode::WRITE => 8,
        _ => 0,
    }
}

/// Streaming reader over an encoded instruction stream.
///
/// Yields instructions in stream order; after the first error it yields
/// nothing more.
#[derive(Debug, Clone)]
pub struct InstructionReader<'a> {
    rest: &'a [u8],
    len: usize,
}

impl<'a> InstructionReader<'a> {
    /// Read from `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self {
            rest: bytes,
            len: bytes.len(),
        }
    }

    /// Byte offset of the next instruction.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.len - self.rest.len()
    }

    fn read_one(&mut self) -> Result<Instruction, InstructionDecodeError> {
        let offset = Self::position(self);
        let mut buf = self.rest;
        let op = buf.get_u8();
        let known = matches!(
            op,
            opcode::HALT
                | opcode::SET_TIME
                | opcode::WAIT_UNTIL
                | opcode::WAIT_FOR_7
                | opcode::WAIT_FOR_16
                | opcode::WAIT_FOR_32
                | opcode::WRITE
                | opcode::READ
                | opcode::FIRE
                | opcode::FIRE_ONE
        );
        if !known {
            return Err(InstructionDecodeError::UnknownOpcode { opcode: op, offset });
        }

        let needed = payload_len(op);
        if buf.remaining() < needed {
            return Err(InstructionDecodeError::Truncated {
                opcode: op,
                offset,
                needed,
                available: buf.remaining(),
            });
        }

        let instruction = match op {
            opcode::HALT => Instruction::Halt,
            opcode::SET_TIME => Instruction::SetTime(buf.get_u32()),
            opcode::WAIT_UNTIL => Instruction::WaitUntil(buf.get_u32()),
            opcode::WAIT_FOR_7 => {
                let payload = buf.get_u8();
                if payload & 0x80 != 0 {
                    return Err(InstructionDecodeError::MalformedPayload {
                        opcode: op,
                        offset,
                        payload,
                    });
                }
                Instruction::WaitFor(HardwareTime::from(payload))
            }
            opcode::WAIT_FOR_16 => Instruction::WaitFor(HardwareTime::from(buf.get_u16())),
            opcode::WAIT_FOR_32 => Instruction::WaitFor(buf.get_u32()),
            opcode::WRITE => {
                let address = buf.get_u32();
                Instruction::Write {
                    address,
                    data: buf.get_u32(),
                }
            }
            opcode::READ => Instruction::Read { address: buf.get_u32() },
            opcode::FIRE => Instruction::Fire(buf.get_u32()),
            _ => Instruction::FireOne(buf.get_u8()),
        };
        self.rest = buf;
        Ok(instruction)
    }
}

impl Iterator for InstructionReader<'_> {
    type Item = Result<Instruction, InstructionDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let item = self.read_one();
        if item.is_err() {
            self.rest = &[];
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_picks_narrowest_encoding() {
        assert_eq!(Instruction::WaitFor(100).to_bytes(), vec![opcode::WAIT_FOR_7, 100]);
        assert_eq!(
            Instruction::WaitFor(1000).to_bytes(),
            vec![opcode::WAIT_FOR_16, 0x03, 0xE8]
        );
        assert_eq!(Instruction::WaitFor(2_000_000).encoded_len(), 5);
    }

    #[test]
    fn write_is_big_endian() {
        let bytes = Instruction::Write { address: 0x1800_0001, data: 7 }.to_bytes();
        assert_eq!(bytes, vec![0x06, 0x18, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn reader_decodes_mixed_stream() {
        let program = [
            Instruction::SetTime(0),
            Instruction::Write { address: 0x10, data: 0xFF },
            Instruction::WaitFor(100),
            Instruction::Fire(1 << 3),
            Instruction::FireOne(2),
            Instruction::Read { address: 0x20 },
            Instruction::WaitUntil(5000),
            Instruction::Halt,
        ];
        let mut bytes = Vec::new();
        for i in &program {
            i.encode_into(&mut bytes);
        }
        let decoded: Vec<Instruction> = InstructionReader::new(&bytes)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn unknown_opcode_stops_the_reader() {
        let bytes = [opcode::HALT, 0xEE, opcode::HALT];
        let mut reader = InstructionReader::new(&bytes);
        assert_eq!(reader.next(), Some(Ok(Instruction::Halt)));
        assert_eq!(
            reader.next(),
            Some(Err(InstructionDecodeError::UnknownOpcode { opcode: 0xEE, offset: 1 }))
        );
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn truncated_payload_is_reported() {
        let bytes = [opcode::WRITE, 0, 0, 0];
        let err = InstructionReader::new(&bytes).next().unwrap().unwrap_err();
        assert_eq!(
            err,
            InstructionDecodeError::Truncated { opcode: opcode::WRITE, offset: 0, needed: 8, available: 3 }
        );
    }

    #[test]
    fn wait_for_7_rejects_high_bit() {
        let bytes = [opcode::HALT, opcode::WAIT_FOR_7, 0x80, opcode::HALT];
        let mut reader = InstructionReader::new(&bytes);
        assert_eq!(reader.next(), Some(Ok(Instruction::Halt)));
        assert_eq!(
            reader.next(),
            Some(Err(InstructionDecodeError::MalformedPayload {
                opcode: opcode::WAIT_FOR_7,
                offset: 1,
                payload: 0x80,
            }))
        );
        assert_eq!(reader.next(), None);
        assert_eq!(reader.position(), bytes.len());
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let bytes = Instruction::Write { address: 1, data: 2 }.to_bytes();
        let mut reader = InstructionReader::new(&bytes);
        assert_eq!(reader.position(), 0);
        reader.next().unwrap().unwrap();
        assert_eq!(reader.position(), 9);
    }
}
