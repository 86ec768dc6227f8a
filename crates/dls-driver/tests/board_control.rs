//! Execution controller scenarios
//!
//! End-to-end transfer / execute / fetch runs against an echoing stub and
//! the simulated board.

use bytes::Bytes;
use dls_chip::coord::{CapMemCellOnDls, NeuronOnDls, Unique};
use dls_chip::instruction::{Instruction, InstructionReader};
use dls_chip::regs::{self, control, exception, sdram};
use dls_chip::{Address, Word};
use dls_containers::{Board, CapMemCell, CapMemCellValue, Chip, FpgaConfig};
use dls_driver::{
    ocp_write, BoardControl, Completion, DlsError, ExecuteConfig, ExecutionState,
    PlaybackProgramBuilder, RecordedSpike, SoftwareTransport, Transport,
};
use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Echoes every staged instruction except `Halt` verbatim into the result
/// stream and finishes instantly.
#[derive(Debug, Default)]
struct EchoStub {
    registers: HashMap<Address, Word>,
    staged: Vec<u8>,
    results: Vec<u8>,
}

impl Transport for EchoStub {
    fn write_words(&mut self, addresses: &[Address], words: &[Word]) -> dls_driver::Result<()> {
        for (&a, &w) in addresses.iter().zip(words) {
            if a == regs::FPGA_CONTROL && w & control::EXECUTE != 0 {
                self.results.clear();
                for i in InstructionReader::new(&self.staged) {
                    let i = i?;
                    if i != Instruction::Halt {
                        i.encode_into(&mut self.results);
                    }
                }
                Instruction::Halt.encode_into(&mut self.results);
                self.registers.insert(regs::RESULT_SIZE, self.results.len() as Word);
                continue;
            }
            self.registers.insert(a, w);
        }
        Ok(())
    }

    fn read_words(&mut self, addresses: &[Address]) -> dls_driver::Result<Vec<Word>> {
        Ok(addresses
            .iter()
            .map(|a| self.registers.get(a).copied().unwrap_or(0))
            .collect())
    }

    fn block_write(&mut self, address: Address, bytes: &[u8]) -> dls_driver::Result<()> {
        let offset = address as usize;
        if self.staged.len() < offset + bytes.len() {
            self.staged.resize(offset + bytes.len(), 0);
        }
        self.staged[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_block(&mut self, address: Address, size: usize) -> dls_driver::Result<Bytes> {
        assert_eq!(address, sdram::RESULT_WINDOW);
        Ok(Bytes::copy_from_slice(&self.results[..size]))
    }

    fn max_block_size(&self) -> usize {
        sdram::MAX_SIZE
    }
}

/// Simulated board that claims a tiny SDRAM.
#[derive(Debug)]
struct TinySdram(SoftwareTransport);

impl Transport for TinySdram {
    fn write_words(&mut self, addresses: &[Address], words: &[Word]) -> dls_driver::Result<()> {
        self.0.write_words(addresses, words)
    }

    fn read_words(&mut self, addresses: &[Address]) -> dls_driver::Result<Vec<Word>> {
        self.0.read_words(addresses)
    }

    fn block_write(&mut self, address: Address, bytes: &[u8]) -> dls_driver::Result<()> {
        self.0.block_write(address, bytes)
    }

    fn read_block(&mut self, address: Address, size: usize) -> dls_driver::Result<Bytes> {
        self.0.read_block(address, size)
    }

    fn max_block_size(&self) -> usize {
        2
    }
}

#[test]
fn echo_scenario_yields_read_value_and_mirrored_spike() {
    init_tracing();
    let mut control = BoardControl::open(EchoStub::default()).unwrap();

    let mut builder = PlaybackProgramBuilder::new();
    builder
        .write(CapMemCellOnDls::default(), &CapMemCell::new(CapMemCellValue::new_const(7)))
        .unwrap();
    builder.wait_for(100);
    builder.fire(1 << 3);
    builder.halt();
    let mut program = builder.done();

    control.run(&mut program).unwrap();

    assert_eq!(program.read_words().unwrap(), &[7]);
    assert_eq!(
        program.spikes().unwrap(),
        &[RecordedSpike::new(100, NeuronOnDls::new_const(28))]
    );
    assert_eq!(control.state(), ExecutionState::Completed);
}

#[test]
fn hung_sequencer_times_out() {
    init_tracing();
    let transport = SoftwareTransport::new().with_completion(Completion::Never);
    let mut control = BoardControl::open(transport)
        .unwrap()
        .with_execute_config(ExecuteConfig {
            min_wait_period: Duration::from_micros(50),
            max_wait: Duration::from_millis(200),
            ..ExecuteConfig::default()
        });

    let mut builder = PlaybackProgramBuilder::new();
    builder.halt();
    control.transfer(&builder.done()).unwrap();

    let start = Instant::now();
    let err = control.execute().unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(5));
    match err {
        DlsError::Timeout { waited, exception } => {
            assert!(waited >= Duration::from_millis(200));
            assert_eq!(exception, Some(0));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(control.state(), ExecutionState::TimedOut);
    assert!(control.fetch_raw().unwrap_err().is_usage());
}

#[test]
fn fetch_for_other_program_is_usage_error() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let mut builder = PlaybackProgramBuilder::new();
    let mut first = builder.done();
    let mut second = builder.done();

    assert!(control.fetch(&mut first).unwrap_err().is_usage());

    control.transfer(&first).unwrap();
    control.execute().unwrap();
    assert!(control.fetch(&mut second).unwrap_err().is_usage());
    assert!(!second.has_results());
    control.fetch(&mut first).unwrap();
}

#[test]
fn failed_transfer_forgets_previous_program() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let mut builder = PlaybackProgramBuilder::new();
    let mut program = builder.done();
    control.run(&mut program).unwrap();

    control.close().unwrap();
    assert!(control.transfer(&program).is_err());
    assert!(control.fetch(&mut program).unwrap_err().is_usage());
}

#[test]
fn execute_with_chip_in_reset_is_refused() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let mut builder = PlaybackProgramBuilder::new();
    control.transfer(&builder.done()).unwrap();

    let held = FpgaConfig {
        dls_reset: true,
        ..FpgaConfig::default()
    };
    ocp_write(control.transport().unwrap(), Unique, &held).unwrap();

    assert!(matches!(
        control.execute(),
        Err(DlsError::InvalidConfiguration { .. })
    ));
    assert_eq!(control.transport().unwrap().executions(), 0);
}

#[test]
fn raised_exception_aborts_fetch_with_payload() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    // no halt: the sequencer runs off the end of the program
    let bytes = Bytes::from(Instruction::WaitFor(1).to_bytes());
    match control.run_raw(&bytes) {
        Err(DlsError::HardwareException { payload }) => {
            assert_eq!(payload, exception::PROGRAM_OVERRUN);
        }
        other => panic!("expected hardware exception, got {other:?}"),
    }
    assert_eq!(control.state(), ExecutionState::Faulted);
}

#[test]
fn impossible_result_size_is_protocol_error() {
    let mut control = BoardControl::open(TinySdram(SoftwareTransport::new())).unwrap();
    let mut builder = PlaybackProgramBuilder::new();
    builder.wait_for(1000);
    let mut program = builder.done();
    assert!(matches!(
        control.run(&mut program),
        Err(DlsError::Protocol { .. })
    ));
}

#[test]
fn read_tickets_resolve_after_run() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let cell = CapMemCellOnDls::default();
    let mut builder = PlaybackProgramBuilder::new();
    builder
        .write(cell, &CapMemCell::new(CapMemCellValue::new_const(512)))
        .unwrap();
    let ticket = builder.read::<CapMemCell>(cell).unwrap();
    let mut program = builder.done();

    assert!(program.get(&ticket).unwrap_err().is_usage());
    control.run(&mut program).unwrap();
    assert_eq!(program.get(&ticket).unwrap().value.value(), 512);
}

#[test]
fn result_dump_decodes_from_file() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let loopback = FpgaConfig {
        loopback_to_dls: true,
        ..FpgaConfig::default()
    };
    ocp_write(control.transport().unwrap(), Unique, &loopback).unwrap();

    let mut builder = PlaybackProgramBuilder::new();
    builder.set_time(10);
    builder.fire(1);
    builder.halt();
    let program = builder.done();
    let raw = control.run_raw(program.instruction_bytes()).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&raw).unwrap();
    let result = dls_driver::decode_result_file(file.path()).unwrap();
    assert_eq!(result.spikes, vec![RecordedSpike::new(10, NeuronOnDls::new_const(31))]);
}

#[test]
fn execute_after_completed_run_is_refused() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();
    let mut builder = PlaybackProgramBuilder::new();
    let mut program = builder.done();
    control.run(&mut program).unwrap();
    assert_eq!(control.transport().unwrap().executions(), 1);

    assert!(control.execute().unwrap_err().is_usage());
    assert_eq!(control.transport().unwrap().executions(), 1);
    assert_eq!(control.state(), ExecutionState::Completed);

    // a fresh transfer arms it again
    control.transfer(&program).unwrap();
    control.execute().unwrap();
    assert_eq!(control.transport().unwrap().executions(), 2);
}

#[test]
fn execute_after_timeout_is_refused() {
    let transport = SoftwareTransport::new().with_completion(Completion::Never);
    let mut control = BoardControl::open(transport)
        .unwrap()
        .with_execute_config(ExecuteConfig {
            min_wait_period: Duration::from_micros(50),
            max_wait: Duration::from_millis(5),
            ..ExecuteConfig::default()
        });
    let mut builder = PlaybackProgramBuilder::new();
    control.transfer(&builder.done()).unwrap();
    assert!(matches!(control.execute(), Err(DlsError::Timeout { .. })));

    assert!(control.execute().unwrap_err().is_usage());
    assert_eq!(control.transport().unwrap().executions(), 1);
    assert_eq!(control.state(), ExecutionState::TimedOut);
}

#[test]
fn expected_runtime_is_waited_before_polling() {
    let mut builder = PlaybackProgramBuilder::new();
    builder.wait_for(1500);
    builder.wait_for(500);
    let mut program = builder.done();
    let expected = program.expected_runtime(Duration::from_micros(10));
    assert_eq!(expected, Duration::from_millis(20));

    let mut control = BoardControl::open(SoftwareTransport::new())
        .unwrap()
        .with_execute_config(ExecuteConfig {
            expected_runtime: Some(expected),
            ..ExecuteConfig::default()
        });
    let start = Instant::now();
    control.run(&mut program).unwrap();
    assert!(start.elapsed() >= expected);
    assert_eq!(control.state(), ExecutionState::Completed);
}

#[test]
fn expected_runtime_counts_toward_the_ceiling() {
    let transport = SoftwareTransport::new().with_completion(Completion::Never);
    let mut control = BoardControl::open(transport)
        .unwrap()
        .with_execute_config(ExecuteConfig {
            min_wait_period: Duration::from_micros(50),
            max_wait: Duration::from_millis(10),
            expected_runtime: Some(Duration::from_millis(30)),
            ..ExecuteConfig::default()
        });
    let mut builder = PlaybackProgramBuilder::new();
    control.transfer(&builder.done()).unwrap();

    let start = Instant::now();
    match control.execute() {
        Err(DlsError::Timeout { waited, .. }) => {
            assert!(waited >= Duration::from_millis(30));
            // ceiling already passed after the estimate, so no backoff rounds
            assert!(waited < Duration::from_millis(30) + Duration::from_millis(10));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn run_experiment_configures_then_runs() {
    let mut control = BoardControl::open(SoftwareTransport::new()).unwrap();

    let mut board = Board::default();
    board.fpga_config.loopback_to_dls = true;
    let mut chip = Chip::default();
    let cell = CapMemCellOnDls::default();
    chip.capmem.set(cell, CapMemCellValue::new_const(640));

    let mut builder = PlaybackProgramBuilder::new();
    let ticket = builder.read::<CapMemCell>(cell).unwrap();
    builder.wait_for(100);
    builder.fire(1 << 3);
    let mut program = builder.done();

    control.run_experiment(&board, &chip, &mut program).unwrap();

    assert_eq!(program.get(&ticket).unwrap().value.value(), 640);
    assert_eq!(
        program.spikes().unwrap(),
        &[RecordedSpike::new(100, NeuronOnDls::new_const(28))]
    );
    let transport = control.transport().unwrap();
    // configure program plus the experiment
    assert_eq!(transport.executions(), 2);
    assert_eq!(control.last_transferred(), program.serial_number());
    assert_eq!(control.state(), ExecutionState::Completed);
}

#[test]
#[ignore] // Requires hardware
fn test_available_boards() {
    let serials = dls_driver::available_board_usb_serial_numbers();
    assert!(!serials.is_empty(), "no boards allocated");
    println!("Boards: {serials:?}");
}
