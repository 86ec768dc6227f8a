//! The leaf register contract.

use crate::error::{ConfigError, Result};
use dls_chip::coord::{AnyCoordinate, Coordinate, CoordinateMismatch};
use dls_chip::{Address, Word};
use std::any::Any;
use std::fmt::Debug;

/// A configuration object mapped directly onto `CONFIG_SIZE_IN_WORDS`
/// register words.
///
/// `addresses(c)[i]` is where `encode()[i]` belongs; both always have
/// exactly `CONFIG_SIZE_IN_WORDS` entries and their order is the order the
/// transport must see. `decode` is the exact inverse of `encode`.
pub trait LeafConfig: Clone + PartialEq + Debug + 'static {
    /// Coordinate class locating instances of this register.
    type Coordinate: Coordinate
        + Into<AnyCoordinate>
        + TryFrom<AnyCoordinate, Error = CoordinateMismatch>;

    /// Number of register words.
    const CONFIG_SIZE_IN_WORDS: usize;

    /// Register addresses for the instance at `coord`. Pure function of `coord`.
    fn addresses(&self, coord: Self::Coordinate) -> Vec<Address>;

    /// Pack into register words.
    fn encode(&self) -> Vec<Word>;

    /// Replace `self` with the value held in `words`.
    ///
    /// `self` is left untouched on error.
    ///
    /// # Errors
    ///
    /// Returns an error if `words` has the wrong length or holds a value
    /// outside the range of a field.
    fn decode(&mut self, words: &[Word]) -> Result<()>;
}

/// Check a word slice length before decoding.
pub(crate) fn expect_words(type_name: &'static str, expected: usize, words: &[Word]) -> Result<()> {
    if words.len() == expected {
        Ok(())
    } else {
        Err(ConfigError::word_count(type_name, expected, words.len()))
    }
}

/// Object-safe view of a [`LeafConfig`], used during traversal.
pub trait DynLeaf: Debug {
    /// Short type name.
    fn type_name(&self) -> &'static str;

    /// Number of register words.
    fn size_in_words(&self) -> usize;

    /// Addresses for an erased coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if `coord` is not of this leaf's coordinate class.
    fn addresses_at(&self, coord: AnyCoordinate) -> Result<Vec<Address>>;

    /// Encoded words.
    fn encode_words(&self) -> Vec<Word>;

    /// Decode from words.
    ///
    /// # Errors
    ///
    /// See [`LeafConfig::decode`].
    fn decode_words(&mut self, words: &[Word]) -> Result<()>;

    /// Upcast for typed comparison.
    fn as_any(&self) -> &dyn Any;

    /// Typed equality against another erased leaf.
    fn dyn_eq(&self, other: &dyn DynLeaf) -> bool;
}

impl<T: LeafConfig> DynLeaf for T {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("leaf")
    }

    fn size_in_words(&self) -> usize {
        T::CONFIG_SIZE_IN_WORDS
    }

    fn addresses_at(&self, coord: AnyCoordinate) -> Result<Vec<Address>> {
        let coord = T::Coordinate::try_from(coord)?;
        Ok(self.addresses(coord))
    }

    fn encode_words(&self) -> Vec<Word> {
        self.encode()
    }

    fn decode_words(&mut self, words: &[Word]) -> Result<()> {
        self.decode(words)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynLeaf) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}
