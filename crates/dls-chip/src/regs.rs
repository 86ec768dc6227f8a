//! Register map for the DLS v2 chip and its FPGA ("Flyspi") board.
//!
//! Two address spaces share the control channel:
//!
//! ```text
//! Chip space (reached through the playback sequencer)
//!   0x0200_0000  PPU memory, 4096 words
//!   0x0202_0000  PPU control register
//!   0x0202_0001  PPU status register          (read-only)
//!   0x1800_0000  CapMem cells, base + 32 * column + row
//!   0x1801_0000  CapMem configuration, 10 contiguous words
//!
//! FPGA space (OCP register access, written directly by the host)
//!   0x8000       FPGA configuration (reset lines, link setup)
//!   0x8001       control, bit 0 = execute
//!   0x8002..04   program base, program size, result base
//!   0x8005       result size                  (read-only)
//!   0x8006       exception register           (read-only)
//!   0x8020..60   spike router, 65 words
//!   0x8100       DAC12, 9 words
//!   0x8110       DAC25, 9 words
//! ```

use crate::Address;

// ── Chip: CapMem ─────────────────────────────────────────────────────────────

/// First CapMem cell.
pub const CAPMEM_CELL_BASE: Address = 0x1800_0000;
/// Address distance between two CapMem columns.
pub const CAPMEM_ROW_STRIDE: Address = 32;
/// First word of the CapMem configuration block.
pub const CAPMEM_CONFIG_BASE: Address = 0x1801_0000;

// ── Chip: PPU ────────────────────────────────────────────────────────────────

/// First PPU memory word.
pub const PPU_MEMORY_BASE: Address = 0x0200_0000;
/// PPU control register.
pub const PPU_CONTROL: Address = 0x0202_0000;
/// PPU status register.
pub const PPU_STATUS: Address = 0x0202_0001;

// ── FPGA ─────────────────────────────────────────────────────────────────────

/// FPGA configuration word.
pub const FPGA_CONFIG: Address = 0x8000;
/// FPGA control word (execute flag).
pub const FPGA_CONTROL: Address = 0x8001;
/// SDRAM byte address of the staged playback program.
pub const PROGRAM_ADDRESS: Address = 0x8002;
/// Size of the staged playback program in bytes.
pub const PROGRAM_SIZE: Address = 0x8003;
/// SDRAM byte offset the sequencer writes results to.
pub const RESULT_ADDRESS: Address = 0x8004;
/// Number of result bytes produced by the last execution.
pub const RESULT_SIZE: Address = 0x8005;
/// FPGA exception register; zero when no exception is pending.
pub const EXCEPTION: Address = 0x8006;

/// First spike router word.
pub const SPIKE_ROUTER_BASE: Address = 0x8020;

/// First word of the 1.2 V DAC block.
pub const DAC12_BASE: Address = 0x8100;
/// First word of the 2.5 V DAC block.
pub const DAC25_BASE: Address = 0x8110;

// ── SDRAM layout ─────────────────────────────────────────────────────────────

/// SDRAM layout used for program staging and result readback.
pub mod sdram {
    use crate::Address;

    /// Where programs are staged.
    pub const PROGRAM_BASE: Address = 0;
    /// Where results are placed, relative to [`RESULT_WINDOW`].
    pub const RESULT_BASE: Address = 0;
    /// Read window offset for the result region.
    pub const RESULT_WINDOW: Address = 0x0800_0000;
    /// Staging block size in bytes.
    pub const BLOCK_SIZE: usize = 4096;
    /// Largest transfer the SDRAM channel can serve (128 MiB).
    pub const MAX_SIZE: usize = 0x0800_0000;
}

// ── Bit definitions ──────────────────────────────────────────────────────────

/// FPGA configuration word bits.
pub mod fpga_config {
    /// Hold the chip in reset.
    pub const DLS_RESET: u32 = 1 << 0;
    /// FPGA soft reset.
    pub const SOFT_RESET: u32 = 1 << 1;
    /// Trace/generator control, 6 bits.
    pub const TG_CTRL_SHIFT: u32 = 2;
    /// Route recorded spikes through the spike router.
    pub const ENABLE_SPIKE_ROUTER: u32 = 1 << 8;
    /// Input phase select.
    pub const I_PHASE_SEL: u32 = 1 << 9;
    /// Output phase select.
    pub const O_PHASE_SEL: u32 = 1 << 10;
    /// Link training.
    pub const TRAIN: u32 = 1 << 11;
    /// Transceiver enable.
    pub const TXRX_EN: u32 = 1 << 12;
    /// LVDS receiver enable.
    pub const EN_LVDS_RX: u32 = 1 << 13;
    /// Analog power enable.
    pub const ANALOG_POWER_EN: u32 = 1 << 14;
    /// Loop fired spikes straight back into the recorded stream.
    pub const LOOPBACK_TO_DLS: u32 = 1 << 15;
}

/// FPGA control word bits.
pub mod control {
    /// Start the sequencer; cleared by hardware when the program halts.
    pub const EXECUTE: u32 = 1 << 0;
}

/// Exception register bits.
pub mod exception {
    /// Sequencer read past the end of the staged program.
    pub const PROGRAM_OVERRUN: u32 = 1 << 0;
    /// Result region overflowed.
    pub const RESULT_OVERFLOW: u32 = 1 << 1;
    /// Unknown opcode in the playback stream.
    pub const ILLEGAL_INSTRUCTION: u32 = 1 << 2;
    /// Chip did not answer a read.
    pub const READ_TIMEOUT: u32 = 1 << 3;
}

/// First word written to each DAC (reference and power-up command).
pub const DAC_SETUP_COMMAND: u32 = 0x0000_8001;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpga_registers_are_distinct() {
        let regs = [
            FPGA_CONFIG,
            FPGA_CONTROL,
            PROGRAM_ADDRESS,
            PROGRAM_SIZE,
            RESULT_ADDRESS,
            RESULT_SIZE,
            EXCEPTION,
        ];
        for (i, a) in regs.iter().enumerate() {
            for b in &regs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn register_blocks_do_not_overlap() {
        // spike router: 1 squeeze word + 2 words per neuron
        assert!(SPIKE_ROUTER_BASE + 65 <= DAC12_BASE);
        assert!(DAC12_BASE + 9 <= DAC25_BASE);
        assert!(CAPMEM_CELL_BASE + CAPMEM_ROW_STRIDE * 33 <= CAPMEM_CONFIG_BASE);
        assert!(PPU_MEMORY_BASE + 4096 <= PPU_CONTROL);
    }
}
