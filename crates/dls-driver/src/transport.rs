//! The control channel seam.
//!
//! A [`Transport`] moves two kinds of traffic: single register words on the
//! OCP bus (FPGA and board registers) and byte blocks to and from the board
//! SDRAM (playback programs and their results). Chip registers are never
//! touched directly; they are reached through playback programs.

use crate::error::Result;
use bytes::Bytes;
use dls_chip::{Address, Word};
use dls_containers::{visitors, Container};
use std::fmt::Debug;

/// Physical or simulated connection to one board.
pub trait Transport: Debug + Send {
    /// Write `words[i]` to `addresses[i]`, in order.
    ///
    /// # Errors
    ///
    /// Returns error if the lengths differ or the write fails.
    fn write_words(&mut self, addresses: &[Address], words: &[Word]) -> Result<()>;

    /// Read one word per address, in order.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn read_words(&mut self, addresses: &[Address]) -> Result<Vec<Word>>;

    /// Write a byte block to SDRAM at `address`.
    ///
    /// # Errors
    ///
    /// Returns error if the block is larger than [`Transport::max_block_size`]
    /// or the write fails.
    fn block_write(&mut self, address: Address, bytes: &[u8]) -> Result<()>;

    /// Read `size` bytes of SDRAM starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn read_block(&mut self, address: Address, size: usize) -> Result<Bytes>;

    /// Largest block a single SDRAM transfer can move.
    fn max_block_size(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_words(&mut self, addresses: &[Address], words: &[Word]) -> Result<()> {
        (**self).write_words(addresses, words)
    }

    fn read_words(&mut self, addresses: &[Address]) -> Result<Vec<Word>> {
        (**self).read_words(addresses)
    }

    fn block_write(&mut self, address: Address, bytes: &[u8]) -> Result<()> {
        (**self).block_write(address, bytes)
    }

    fn read_block(&mut self, address: Address, size: usize) -> Result<Bytes> {
        (**self).read_block(address, size)
    }

    fn max_block_size(&self) -> usize {
        (**self).max_block_size()
    }
}

/// Write a board-level container over the OCP bus.
///
/// # Errors
///
/// Returns error if the container cannot be flattened or the write fails.
pub fn ocp_write<T, C>(transport: &mut T, coord: C::Coordinate, config: &C) -> Result<()>
where
    T: Transport + ?Sized,
    C: Container,
{
    let addresses = visitors::collect_addresses(coord, config)?;
    let words = visitors::collect_words(config);
    transport.write_words(&addresses, &words)
}

/// Read a board-level container over the OCP bus.
///
/// # Errors
///
/// Returns error if the read fails or the words do not decode.
pub fn ocp_read<T, C>(transport: &mut T, coord: C::Coordinate) -> Result<C>
where
    T: Transport + ?Sized,
    C: Container + Default,
{
    let mut config = C::default();
    let addresses = visitors::collect_addresses(coord, &config)?;
    let words = transport.read_words(&addresses)?;
    visitors::decode_words(&mut config, &words)?;
    Ok(config)
}
