//! Error types for container encoding and decoding

use dls_chip::coord::CoordinateMismatch;
use dls_chip::RangeError;
use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while building, encoding or decoding containers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A bounded value or coordinate was out of range
    #[error(transparent)]
    Range(#[from] RangeError),

    /// A traversal handed a leaf the wrong coordinate class
    #[error(transparent)]
    Coordinate(#[from] CoordinateMismatch),

    /// Word slice length did not match the register size
    #[error("{type_name}: expected {expected} words, got {got}")]
    WordCount {
        /// Register type
        type_name: &'static str,
        /// Words required
        expected: usize,
        /// Words supplied
        got: usize,
    },

    /// Hot-bit word with zero or several bits set where exactly one is required
    #[error("{type_name}: hot-bit word {word:#010x} must have exactly one bit set")]
    InvalidHotBit {
        /// Register type
        type_name: &'static str,
        /// Offending word
        word: u32,
    },

    /// A sub-field held a value with no meaning
    #[error("{type_name}: field {field} has invalid value {value:#x}")]
    InvalidField {
        /// Register type
        type_name: &'static str,
        /// Field name
        field: &'static str,
        /// Raw value
        value: u32,
    },
}

impl ConfigError {
    /// Create a word count error
    pub fn word_count(type_name: &'static str, expected: usize, got: usize) -> Self {
        Self::WordCount {
            type_name,
            expected,
            got,
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(type_name: &'static str, field: &'static str, value: u32) -> Self {
        Self::InvalidField {
            type_name,
            field,
            value,
        }
    }
}
