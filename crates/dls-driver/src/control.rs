//! Execution control for one board.
//!
//! `BoardControl` owns the transport and sequences the three phases of a
//! run:
//!
//! ```text
//!            transfer            execute                 fetch
//!   Idle ─────────────► Transferred ─────► Executing ─┬─► Completed ──► results
//!                                                     ├─► TimedOut
//!                                                     └─► Faulted
//! ```
//!
//! Only the execute poll is retried, with a doubling interval and a hard
//! ceiling. Every other failure is returned as is.

use crate::decoder::decode_result_bytes;
use crate::error::{DlsError, Result};
use crate::playback::{get_configure_program, staging_blocks, PlaybackProgram, SerialNumber};
use crate::transport::{ocp_read, ocp_write, Transport};
use bytes::Bytes;
use dls_chip::coord::Unique;
use dls_chip::regs::sdram;
use dls_containers::{
    visitors, Board, Chip, FpgaConfig, FpgaControl, FpgaException, ProgramAddress, ProgramSize,
    ResultAddress, ResultSize,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Polling behaviour of [`BoardControl::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteConfig {
    /// First poll interval; doubled after every poll.
    pub min_wait_period: Duration,
    /// Upper bound for the poll interval.
    pub max_wait_period: Option<Duration>,
    /// Give up once the accumulated wait reaches this.
    pub max_wait: Duration,
    /// Sleep this long before the first poll.
    pub expected_runtime: Option<Duration>,
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            min_wait_period: Duration::from_micros(50),
            max_wait_period: None,
            max_wait: Duration::from_secs(60),
            expected_runtime: None,
        }
    }
}

/// Phase of the current program on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Nothing staged.
    Idle,
    /// Program staged, not started.
    Transferred,
    /// Execute bit set, polling.
    Executing,
    /// Sequencer finished.
    Completed,
    /// Poll ceiling reached before the sequencer finished.
    TimedOut,
    /// Hardware reported an exception or the run was aborted.
    Faulted,
}

/// Exclusive handle to one board.
#[derive(Debug)]
pub struct BoardControl<T: Transport> {
    transport: Option<T>,
    state: ExecutionState,
    transferred: SerialNumber,
    program_size: u32,
    config: ExecuteConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<T: Transport> BoardControl<T> {
    /// Take ownership of `transport` and soft-reset the board.
    ///
    /// # Errors
    ///
    /// Returns error if the reset cannot be written.
    pub fn open(transport: T) -> Result<Self> {
        let mut control = Self {
            transport: Some(transport),
            state: ExecutionState::Idle,
            transferred: SerialNumber::INVALID,
            program_size: 0,
            config: ExecuteConfig::default(),
            cancel: None,
        };
        control.soft_reset()?;
        info!("board opened");
        Ok(control)
    }

    /// Replace the execute polling configuration.
    #[must_use]
    pub fn with_execute_config(mut self, config: ExecuteConfig) -> Self {
        self.config = config;
        self
    }

    /// Check `flag` on every poll; setting it aborts `execute`.
    pub fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Polling configuration in use.
    pub fn execute_config(&self) -> &ExecuteConfig {
        &self.config
    }

    /// Phase of the current program.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Serial of the last transferred program, `INVALID` if none.
    pub fn last_transferred(&self) -> SerialNumber {
        self.transferred
    }

    /// Access the transport.
    ///
    /// # Errors
    ///
    /// Returns a usage error after [`BoardControl::close`].
    pub fn transport(&mut self) -> Result<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| DlsError::usage("board control used after close"))
    }

    /// Release the transport. Every later call is a usage error.
    ///
    /// # Errors
    ///
    /// Returns a usage error if already closed.
    pub fn close(&mut self) -> Result<T> {
        let transport = self
            .transport
            .take()
            .ok_or_else(|| DlsError::usage("board control closed twice"))?;
        self.state = ExecutionState::Idle;
        self.transferred = SerialNumber::INVALID;
        self.program_size = 0;
        info!("board closed");
        Ok(transport)
    }

    /// Pulse both reset lines, then write the default FPGA configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the writes fail.
    pub fn soft_reset(&mut self) -> Result<()> {
        let transport = self.transport()?;
        ocp_write(transport, Unique, &FpgaConfig::reset())?;
        ocp_write(transport, Unique, &FpgaConfig::default())?;
        self.state = ExecutionState::Idle;
        self.transferred = SerialNumber::INVALID;
        self.program_size = 0;
        debug!("soft reset");
        Ok(())
    }

    /// Write the board, then the chip through a configure program.
    ///
    /// If the board holds the chip in reset, only the board is written and
    /// a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns error if any write or the configure run fails.
    pub fn configure_static(&mut self, board: &Board, chip: &Chip) -> Result<()> {
        ocp_write(self.transport()?, Unique, board)?;
        debug!(words = visitors::size_in_words(board), "board written");

        if board.fpga_config.dls_reset {
            warn!("chip is held in reset, skipping chip configuration");
            return Ok(());
        }

        let mut program = get_configure_program(chip)?;
        self.run(&mut program)
    }

    /// Stage `program` on the board and record its serial.
    ///
    /// # Errors
    ///
    /// Returns a usage error for a program without a valid serial, or a
    /// transport error.
    pub fn transfer(&mut self, program: &PlaybackProgram) -> Result<()> {
        let serial = program.serial_number();
        if !serial.is_valid() {
            return Err(DlsError::usage("program has no valid serial number"));
        }
        self.transfer_blocks(program.instruction_bytes())?;
        self.transferred = serial;
        info!(%serial, bytes = program.instruction_bytes().len(), "program transferred");
        Ok(())
    }

    /// Stage a raw instruction stream. Results can only be fetched raw.
    ///
    /// # Errors
    ///
    /// Returns error if the stream is too large or the transport fails.
    pub fn transfer_blocks(&mut self, bytes: &Bytes) -> Result<()> {
        // forget the previous program first so a failure cannot pair stale
        // results with it
        self.transferred = SerialNumber::INVALID;
        self.program_size = 0;
        self.state = ExecutionState::Idle;

        let size = u32::try_from(bytes.len())
            .ok()
            .filter(|&s| s as usize <= sdram::MAX_SIZE)
            .ok_or_else(|| {
                DlsError::usage(format!("program of {} bytes does not fit SDRAM", bytes.len()))
            })?;

        let transport = self.transport()?;
        let block = transport.max_block_size().clamp(1, sdram::BLOCK_SIZE);
        let mut address = sdram::PROGRAM_BASE;
        for chunk in staging_blocks(bytes, block) {
            transport.block_write(address, &chunk)?;
            #[allow(clippy::cast_possible_truncation)]
            let step = chunk.len() as u32;
            address += step;
        }

        ocp_write(transport, Unique, &ProgramAddress(sdram::PROGRAM_BASE))?;
        ocp_write(transport, Unique, &ProgramSize(size))?;
        ocp_write(transport, Unique, &ResultAddress(sdram::RESULT_BASE))?;

        self.program_size = size;
        self.state = ExecutionState::Transferred;
        debug!(bytes = size, block, "instruction stream staged");
        Ok(())
    }

    /// Start the staged program and wait for it to finish.
    ///
    /// # Errors
    ///
    /// - usage error unless a program was transferred since the last run
    /// - invalid configuration if the chip is held in reset
    /// - [`DlsError::Timeout`] when the poll ceiling is reached
    /// - [`DlsError::Cancelled`] when the cancellation flag is set
    pub fn execute(&mut self) -> Result<()> {
        if self.state != ExecutionState::Transferred {
            return Err(DlsError::usage(format!(
                "execute in state {:?}, transfer a program first",
                self.state
            )));
        }
        let transport = self.transport()?;
        let fpga: FpgaConfig = ocp_read(transport, Unique)?;
        if fpga.dls_reset {
            return Err(DlsError::invalid_configuration(
                "chip is held in reset, executing would freeze the board",
            ));
        }

        ocp_write(transport, Unique, &FpgaControl { execute: true })?;
        self.state = ExecutionState::Executing;

        match self.poll_until_done() {
            Ok(()) => {
                self.state = ExecutionState::Completed;
                Ok(())
            }
            Err(e) => {
                self.state = match e {
                    DlsError::Timeout { .. } => ExecutionState::TimedOut,
                    _ => ExecutionState::Faulted,
                };
                Err(e)
            }
        }
    }

    fn poll_until_done(&mut self) -> Result<()> {
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let transport = self.transport()?;

        let mut waited = Duration::ZERO;
        if let Some(expected) = config.expected_runtime {
            std::thread::sleep(expected);
            waited += expected;
        }

        let mut interval = config.min_wait_period;
        loop {
            if cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
                warn!(?waited, "execution cancelled");
                return Err(DlsError::Cancelled);
            }

            let control: FpgaControl = ocp_read(transport, Unique)?;
            if !control.execute {
                debug!(?waited, "execution finished");
                return Ok(());
            }

            if waited >= config.max_wait {
                let exception = ocp_read::<_, FpgaException>(transport, Unique)
                    .ok()
                    .and_then(|e| e.raw());
                error!(?waited, ?exception, "execution timed out");
                return Err(DlsError::Timeout { waited, exception });
            }

            std::thread::sleep(interval);
            waited += interval;
            interval = interval.saturating_mul(2);
            if let Some(cap) = config.max_wait_period {
                interval = interval.min(cap);
            }
            debug!(?interval, "polling execute flag");
        }
    }

    /// Read the results of the last run into `program`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `program` is not the last transferred
    /// program, plus everything [`BoardControl::fetch_raw`] returns.
    pub fn fetch(&mut self, program: &mut PlaybackProgram) -> Result<()> {
        if !self.transferred.is_valid() || program.serial_number() != self.transferred {
            return Err(DlsError::usage(format!(
                "fetch for program {} but last transferred is {}",
                program.serial_number(),
                self.transferred
            )));
        }
        let bytes = self.fetch_raw()?;
        decode_result_bytes(&bytes, program)
    }

    /// Read the raw result stream of the last run.
    ///
    /// # Errors
    ///
    /// - usage error if nothing was transferred or the run did not complete
    /// - protocol error if the reported size is impossible
    /// - [`DlsError::HardwareException`] if the exception register is raised
    pub fn fetch_raw(&mut self) -> Result<Bytes> {
        if self.program_size == 0 {
            return Err(DlsError::usage("fetch without a transferred program"));
        }
        if !matches!(
            self.state,
            ExecutionState::Transferred | ExecutionState::Completed
        ) {
            return Err(DlsError::usage(format!(
                "fetch in state {:?}",
                self.state
            )));
        }

        let transport = self.transport()?;
        let size: ResultSize = ocp_read(transport, Unique)?;
        let size = size
            .value()
            .ok_or_else(|| DlsError::protocol("result size register not read"))?
            as usize;
        let max = transport.max_block_size();
        if size > max {
            return Err(DlsError::protocol(format!(
                "hardware reports {size} result bytes, at most {max} can exist"
            )));
        }

        let exception: FpgaException = ocp_read(transport, Unique)?;
        if exception.is_raised() {
            let payload = exception.raw().unwrap_or_default();
            error!(%exception, "hardware exception");
            self.state = ExecutionState::Faulted;
            return Err(DlsError::HardwareException { payload });
        }

        let bytes = transport.read_block(sdram::RESULT_WINDOW + sdram::RESULT_BASE, size)?;
        debug!(bytes = size, "results fetched");
        Ok(bytes)
    }

    /// Transfer, execute and fetch `program`.
    ///
    /// # Errors
    ///
    /// Returns the first error of the three phases.
    pub fn run(&mut self, program: &mut PlaybackProgram) -> Result<()> {
        self.transfer(program)?;
        self.execute()?;
        self.fetch(program)
    }

    /// Transfer, execute and fetch a raw instruction stream.
    ///
    /// # Errors
    ///
    /// Returns the first error of the three phases.
    pub fn run_raw(&mut self, bytes: &Bytes) -> Result<Bytes> {
        self.transfer_blocks(bytes)?;
        self.execute()?;
        self.fetch_raw()
    }

    /// Configure board and chip, then run `program`.
    ///
    /// # Errors
    ///
    /// Returns the first error of configuration or the run.
    pub fn run_experiment(
        &mut self,
        board: &Board,
        chip: &Chip,
        program: &mut PlaybackProgram,
    ) -> Result<()> {
        self.configure_static(board, chip)?;
        self.run(program)
    }
}
