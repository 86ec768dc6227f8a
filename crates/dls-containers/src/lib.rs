//! Typed configuration containers for DLS v2.
//!
//! Each hardware register block is a *leaf* ([`LeafConfig`]): a value
//! object with a fixed word count, an address derivation from its
//! coordinate and a bit-exact `encode`/`decode` pair. *Composites*
//! ([`CapMem`], [`PpuMemory`], [`Chip`], [`Board`]) own leaves and other
//! composites and take part in preorder traversal only.
//!
//! ```text
//! Board                         Chip
//! ├── Dac (Dac12)               ├── CapMem
//! ├── Dac (Dac25)               │   └── CapMemCell × 792
//! ├── FpgaConfig                ├── CapMemConfig
//! └── SpikeRouter               ├── PpuMemory
//!                               │   └── PpuMemoryWord × 4096
//!                               └── PpuControlRegister
//! ```
//!
//! The traversal order is the single source of truth for flattening a
//! container into addresses and words, and for structural equality.
//!
//! ```
//! use dls_chip::coord::CapMemOnDls;
//! use dls_containers::{visitors, CapMem};
//!
//! let capmem = CapMem::default();
//! let addresses = visitors::collect_addresses(CapMemOnDls, &capmem).unwrap();
//! let words = visitors::collect_words(&capmem);
//! assert_eq!(addresses.len(), words.len());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod board;
mod capmem;
mod chip;
mod error;
mod fpga;
mod leaf;
mod ppu;
pub mod traversal;
pub mod visitors;

pub use board::{
    Board, BoardParameter, Dac, DacValue, FpgaConfig, SpikeRouter, SqueezeDelay, SynapseAddress,
    TargetRows, TgCtrl,
};
pub use capmem::{
    BoostA, BoostB, BoostFactor, CapMem, CapMemCell, CapMemCellValue, CapMemConfig,
    CurrentCellRes, IOutSelect, LevelShifterBias, OutAmpBias, PauseCounter, PrescalePause,
    PrescaleRamp, PulseA, PulseB, SourceFollowerBias, SubCounter, VGlobalBias, VRefSelect,
};
pub use chip::Chip;
pub use error::{ConfigError, Result};
pub use fpga::{FpgaControl, FpgaException, ProgramAddress, ProgramSize, ResultAddress, ResultSize};
pub use leaf::{DynLeaf, LeafConfig};
pub use ppu::{PpuControlRegister, PpuMemory, PpuMemoryWord, PpuMemoryWordValue, PpuStatusRegister};
pub use traversal::{visit_preorder, visit_preorder_mut, Composite, Container, Node, NodeMut};
