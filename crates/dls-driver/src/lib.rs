//! Playback programs and execution control for DLS v2 boards.
//!
//! # Layers
//!
//! ```text
//! PlaybackProgramBuilder ──done()──► PlaybackProgram ──┐
//!                                                      │ transfer / execute / fetch
//! Board, Chip (dls-containers) ──configure_static──► BoardControl<T: Transport>
//!                                                      │
//!                                     result bytes ◄───┘──► decoder ──► reads, spikes
//! ```
//!
//! # Quick start
//!
//! ```
//! use dls_chip::coord::CapMemCellOnDls;
//! use dls_containers::{Board, CapMemCell, Chip};
//! use dls_driver::{BoardControl, PlaybackProgramBuilder, SoftwareTransport};
//!
//! # fn main() -> dls_driver::Result<()> {
//! let mut control = BoardControl::open(SoftwareTransport::new())?;
//!
//! let mut builder = PlaybackProgramBuilder::new();
//! let ticket = builder.read::<CapMemCell>(CapMemCellOnDls::default())?;
//! builder.halt();
//! let mut program = builder.done();
//!
//! control.run_experiment(&Board::default(), &Chip::default(), &mut program)?;
//! assert_eq!(program.get(&ticket)?.value.value(), 300);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
mod control;
mod decoder;
mod discovery;
mod error;
mod playback;
mod transport;

pub use backends::{Completion, SoftwareTransport};
pub use control::{BoardControl, ExecuteConfig, ExecutionState};
pub use decoder::{decode_result, decode_result_bytes, decode_result_file, PlaybackResult, RecordedSpike};
pub use discovery::{
    available_board_usb_serial_numbers, default_board_usb_serial_number, parse_serial_list,
    BOARD_VAR, SLURM_BOARDS_VAR,
};
pub use error::{DlsError, Result};
pub use playback::{
    get_configure_program, PlaybackProgram, PlaybackProgramBuilder, PlaybackProgramTicket,
    PlaybackSpike, SerialNumber, CAPMEM_SETTLE_CYCLES,
};
pub use transport::{ocp_read, ocp_write, Transport};
