//! Error types for board control and playback

use dls_chip::instruction::InstructionDecodeError;
use dls_containers::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DlsError>;

/// Errors that can occur while building, running or decoding playback programs
#[derive(Debug, Error)]
pub enum DlsError {
    /// Operation called in a state that violates its precondition
    #[error("Usage error: {reason}")]
    Usage {
        /// What was violated
        reason: String,
    },

    /// Board or chip configuration forbids the operation
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for failure
        reason: String,
    },

    /// Hardware reported something that cannot be valid
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Reason for failure
        reason: String,
    },

    /// FPGA exception register was raised
    #[error("Hardware exception: {payload:#010x}")]
    HardwareException {
        /// Raw exception register
        payload: u32,
    },

    /// Execution did not finish within the configured ceiling
    #[error("Execution timeout after {waited:?} (exception register: {exception:?})")]
    Timeout {
        /// Accumulated poll wait
        waited: Duration,
        /// Exception register read after the timeout, if the read succeeded
        exception: Option<u32>,
    },

    /// Polling was cancelled by the caller
    #[error("Execution cancelled")]
    Cancelled,

    /// Transport failed to move data
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for failure
        reason: String,
    },

    /// Container encoding or decoding failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Result stream held an undecodable instruction
    #[error("Result decode failed: {0}")]
    Decode(#[from] InstructionDecodeError),

    /// I/O error while reading or writing dumps
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl DlsError {
    /// Create a usage error
    pub fn usage(reason: impl Into<String>) -> Self {
        Self::Usage {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// True for programmer errors that no retry can fix
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }
}
