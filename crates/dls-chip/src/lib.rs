//! Silicon model for the DLS v2 neuromorphic chip and its FPGA board.
//!
//! This crate has **no hardware access**. It models what the control channel
//! sees: coordinates of physical locations, bounded register values, the
//! bit-field packing used by multi-field registers, the chip and board
//! address map, and the byte encoding of playback instructions.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`coord`] | Enumerable coordinates (CapMem cells, neurons, DACs, PPU words) |
//! | [`rant`] | Bounded integer newtypes that reject out-of-range values |
//! | [`bitfield`] | Table-driven shift/mask packing of register sub-fields |
//! | [`regs`] | Chip and FPGA register addresses, SDRAM layout |
//! | [`instruction`] | Playback instruction opcodes, encoder and stream reader |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bitfield;
pub mod coord;
pub mod instruction;
pub mod rant;
pub mod regs;

/// Address on the control channel (chip or FPGA register space).
pub type Address = u32;

/// Data word on the control channel.
pub type Word = u32;

/// Sequencer time in FPGA clock cycles.
pub type HardwareTime = u32;

pub use coord::{iter_all, Coordinate};
pub use rant::RangeError;
