//! `dls`: command-line interface for DLS v2 boards.
//!
//! ```text
//! USAGE:
//!   dls boards                 List allocated board serial numbers
//!   dls program                Hex dump of the default configure program
//!   dls decode <file>          Decode a raw result stream
//!   dls simulate               Run a loopback experiment on the software board
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dls_chip::coord::{CapMemCellOnDls, SynapseDriverOnDls};
use dls_containers::{Board, CapMemCell, CapMemCellValue, Chip, SynapseAddress};
use dls_driver::{
    BoardControl, ExecuteConfig, PlaybackProgramBuilder, PlaybackSpike, SoftwareTransport,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dls", about = "DLS v2 board control CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List board serial numbers allocated to this job.
    Boards,
    /// Print the instruction stream that configures a default chip.
    Program,
    /// Decode a raw result stream dumped from a board.
    Decode {
        /// File holding the result bytes.
        file: PathBuf,
    },
    /// Run a write/read/fire experiment on the software board with loopback.
    Simulate {
        /// Extra spikes to play after the fixed one.
        #[arg(long, default_value_t = 0)]
        spikes: u16,
        /// Clock cycles between spikes.
        #[arg(long, default_value_t = 100)]
        interval: u32,
        /// Give up waiting for the sequencer after this many milliseconds.
        #[arg(long, default_value_t = 60_000)]
        max_wait_ms: u64,
        /// First polling interval in microseconds.
        #[arg(long, default_value_t = 50)]
        min_poll_us: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Boards => cmd_boards(),
        Cmd::Program => cmd_program()?,
        Cmd::Decode { file } => cmd_decode(&file)?,
        Cmd::Simulate {
            spikes,
            interval,
            max_wait_ms,
            min_poll_us,
        } => cmd_simulate(
            spikes,
            interval,
            ExecuteConfig {
                min_wait_period: Duration::from_micros(min_poll_us),
                max_wait: Duration::from_millis(max_wait_ms),
                ..ExecuteConfig::default()
            },
        )?,
    }

    Ok(())
}

fn cmd_boards() {
    let serials = dls_driver::available_board_usb_serial_numbers();
    if serials.is_empty() {
        println!("No boards allocated (set {})", dls_driver::SLURM_BOARDS_VAR);
        return;
    }
    let default = dls_driver::default_board_usb_serial_number();
    for serial in &serials {
        let marker = if default.as_deref() == Some(serial.as_str()) { "*" } else { " " };
        println!("{marker} {serial}");
    }
}

fn cmd_program() -> Result<()> {
    let program = dls_driver::get_configure_program(&Chip::default())?;
    println!(
        "Program {}  {} bytes  {} expected reads",
        program.serial_number(),
        program.instruction_bytes().len(),
        program.expected_read_words()
    );
    let mut offset = 0;
    for (index, block) in program.instruction_byte_blocks().enumerate() {
        println!("-- block {index} ({} bytes)", block.len());
        for chunk in block.chunks(16) {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            println!("{offset:08x}  {}", hex.join(" "));
            offset += chunk.len();
        }
    }
    Ok(())
}

fn cmd_decode(file: &Path) -> Result<()> {
    let result = dls_driver::decode_result_file(file)
        .with_context(|| format!("decoding {}", file.display()))?;

    println!("Read words : {}", result.read_words.len());
    for (i, word) in result.read_words.iter().enumerate() {
        println!("  [{i}] 0x{word:08x}");
    }
    println!("Spikes     : {}", result.spikes.len());
    for spike in &result.spikes {
        println!("  {spike}");
    }
    Ok(())
}

fn cmd_simulate(count: u16, interval: u32, config: ExecuteConfig) -> Result<()> {
    let mut control = BoardControl::open(SoftwareTransport::new())?.with_execute_config(config);

    let mut board = Board::default();
    board.fpga_config.loopback_to_dls = true;
    let chip = Chip::default();

    // write a cell, read it back, then fire one driver row after 100 cycles
    let cell = CapMemCellOnDls::default();
    let mut builder = PlaybackProgramBuilder::new();
    builder.set_time(0);
    builder.write(cell, &CapMemCell::new(CapMemCellValue::new_const(7)))?;
    let ticket = builder.read::<CapMemCell>(cell)?;
    builder.wait_for(100);
    builder.fire(1 << 3);

    let spikes: Vec<PlaybackSpike> = (0..count)
        .map(|i| {
            let row = SynapseDriverOnDls::new_const(i % 32);
            let time = u32::from(i + 1).wrapping_mul(interval).wrapping_add(100);
            PlaybackSpike::new(time, SynapseAddress::new_const(0), row)
        })
        .collect();
    builder.play_spikes(&spikes);
    let mut program = builder.done();

    info!(spikes = spikes.len(), serial = %program.serial_number(), "running loopback experiment");
    control.run_experiment(&board, &chip, &mut program)?;

    println!("Program    : {}", program.serial_number());
    println!("Read back  : {}", program.get(&ticket)?.value.value());
    let recorded = program.spikes()?;
    println!("Spikes     : {} played, {} recorded", spikes.len() + 1, recorded.len());
    for spike in recorded {
        println!("  {spike}");
    }
    Ok(())
}
