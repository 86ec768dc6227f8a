//! Coordinates of physical locations on the chip and board.
//!
//! Every coordinate class is a finite, totally ordered domain. `iter_all`
//! enumerates a class in canonical order (`0..SIZE`); composite containers
//! flatten their children in exactly this order, so the enumeration order is
//! part of the register-transfer contract.
//!
//! ```text
//! CapMem cell grid (33 columns × 24 rows):
//!
//!   column  0 … 31   one per neuron
//!   column  32       shared column (common neuron parameters)
//!
//!   enum = row * 33 + column
//! ```

use crate::rant::RangeError;
use std::fmt::Debug;
use std::hash::Hash;

/// An enumerable coordinate class.
pub trait Coordinate: Copy + Eq + Ord + Hash + Debug + 'static {
    /// Number of coordinates in this class.
    const SIZE: usize;

    /// Class name, used in error messages.
    const NAME: &'static str;

    /// Coordinate at enumeration position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if `index >= SIZE`.
    fn from_enum(index: usize) -> Result<Self, RangeError>;

    /// Enumeration position of this coordinate.
    fn to_enum(self) -> usize;
}

/// Iterate all coordinates of class `C` in canonical order.
pub fn iter_all<C: Coordinate>() -> impl Iterator<Item = C> + Clone {
    (0..C::SIZE).filter_map(|i| C::from_enum(i).ok())
}

fn check_enum(name: &'static str, index: usize, size: usize) -> Result<(), RangeError> {
    if index >= size {
        return Err(RangeError::new(name, index as u64, size as u64 - 1));
    }
    Ok(())
}

macro_rules! index_coordinate {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u16);

        impl $name {
            /// Largest valid index.
            pub const MAX: u16 = $size - 1;

            /// Construct from an index.
            ///
            /// # Errors
            ///
            /// Returns [`RangeError`] if `index > MAX`.
            pub fn new(index: u16) -> Result<Self, RangeError> {
                check_enum(stringify!($name), usize::from(index), $size)?;
                Ok(Self(index))
            }

            /// Construct in a `const` context.
            #[must_use]
            pub const fn new_const(index: u16) -> Self {
                assert!(index < $size, "coordinate out of range");
                Self(index)
            }

            /// Index of this coordinate.
            #[must_use]
            pub const fn value(self) -> u16 {
                self.0
            }
        }

        impl Coordinate for $name {
            const SIZE: usize = $size;
            const NAME: &'static str = stringify!($name);

            fn from_enum(index: usize) -> Result<Self, RangeError> {
                check_enum(Self::NAME, index, Self::SIZE)?;
                #[allow(clippy::cast_possible_truncation)]
                Ok(Self(index as u16))
            }

            fn to_enum(self) -> usize {
                usize::from(self.0)
            }
        }
    };
}

macro_rules! singleton_coordinate {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name;

        impl Coordinate for $name {
            const SIZE: usize = 1;
            const NAME: &'static str = stringify!($name);

            fn from_enum(index: usize) -> Result<Self, RangeError> {
                check_enum(Self::NAME, index, Self::SIZE)?;
                Ok(Self)
            }

            fn to_enum(self) -> usize {
                0
            }
        }
    };
}

// ── Singletons ───────────────────────────────────────────────────────────────

singleton_coordinate!(
    /// The one instance of a board-level or FPGA resource.
    Unique
);
singleton_coordinate!(
    /// The whole capacitive memory.
    CapMemOnDls
);
singleton_coordinate!(
    /// The CapMem controller configuration register block.
    CapMemConfigOnDls
);
singleton_coordinate!(
    /// The whole PPU memory.
    PpuMemoryOnDls
);
singleton_coordinate!(
    /// PPU control register.
    PpuControlRegisterOnDls
);
singleton_coordinate!(
    /// PPU status register.
    PpuStatusRegisterOnDls
);

// ── Indexed classes ──────────────────────────────────────────────────────────

index_coordinate!(
    /// Neuron on the chip (32).
    NeuronOnDls, 32
);
index_coordinate!(
    /// Synapse driver row (32).
    SynapseDriverOnDls, 32
);
index_coordinate!(
    /// CapMem column: 32 neuron columns plus the shared column.
    CapMemColumnOnDls, 33
);
index_coordinate!(
    /// CapMem row, i.e. parameter slot within a column (24).
    CapMemRowOnDls, 24
);
index_coordinate!(
    /// Word in PPU memory (16 KiB).
    PpuMemoryWordOnDls, 4096
);
index_coordinate!(
    /// Output channel of a board DAC.
    DacChannel, 8
);

impl CapMemColumnOnDls {
    /// Column holding the parameters shared by all neurons.
    pub const SHARED: Self = Self(32);

    /// True for the shared column.
    #[must_use]
    pub const fn is_shared(self) -> bool {
        self.0 == Self::SHARED.0
    }
}

impl From<NeuronOnDls> for CapMemColumnOnDls {
    fn from(neuron: NeuronOnDls) -> Self {
        Self(neuron.value())
    }
}

// ── CapMem cells ─────────────────────────────────────────────────────────────

/// Per-neuron CapMem parameters, by row.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum NeuronParameter {
    VLeak = 0,
    VTreshold = 1,
    VExcSynInputReference = 2,
    VInhSynInputReference = 3,
    IBiasSpikeComparator = 9,
    ISpikeComparatorDelay = 10,
    IBiasLeakMain = 11,
    IBiasLeakSd = 12,
    IBiasReadoutBuffer = 13,
    IRefractoryTime = 14,
    IBiasExcSynInputMain = 15,
    IBiasExcSynInputSd = 16,
    IBiasExcSynInputResistor = 17,
    IBiasExcSynInputOffset = 18,
    IBiasInhSynInputResistor = 19,
    IBiasInhSynInputMain = 20,
    IBiasInhSynInputSd = 22,
    IBiasInhSynInputOffset = 23,
}

impl NeuronParameter {
    /// CapMem row holding this parameter.
    #[must_use]
    pub const fn row(self) -> CapMemRowOnDls {
        CapMemRowOnDls(self as u16)
    }
}

/// Parameters stored once in the shared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommonNeuronParameter {
    /// Reset potential.
    EReset,
}

impl CommonNeuronParameter {
    /// CapMem row holding this parameter.
    #[must_use]
    pub const fn row(self) -> CapMemRowOnDls {
        match self {
            Self::EReset => CapMemRowOnDls(0),
        }
    }
}

/// One CapMem cell. Ordered by enumeration (row-major).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapMemCellOnDls {
    // field order gives the derived Ord the row-major enumeration order
    row: CapMemRowOnDls,
    column: CapMemColumnOnDls,
}

impl CapMemCellOnDls {
    /// Cell at `(column, row)`.
    #[must_use]
    pub const fn new(column: CapMemColumnOnDls, row: CapMemRowOnDls) -> Self {
        Self { row, column }
    }

    /// Cell holding `parameter` of `neuron`.
    #[must_use]
    pub fn from_neuron(neuron: NeuronOnDls, parameter: NeuronParameter) -> Self {
        Self::new(neuron.into(), parameter.row())
    }

    /// Cell holding a shared parameter.
    #[must_use]
    pub const fn from_common(parameter: CommonNeuronParameter) -> Self {
        Self::new(CapMemColumnOnDls::SHARED, parameter.row())
    }

    /// Column of this cell.
    #[must_use]
    pub const fn column(self) -> CapMemColumnOnDls {
        self.column
    }

    /// Row of this cell.
    #[must_use]
    pub const fn row(self) -> CapMemRowOnDls {
        self.row
    }
}

impl Coordinate for CapMemCellOnDls {
    const SIZE: usize = CapMemColumnOnDls::SIZE * CapMemRowOnDls::SIZE;
    const NAME: &'static str = "CapMemCellOnDls";

    fn from_enum(index: usize) -> Result<Self, RangeError> {
        check_enum(Self::NAME, index, Self::SIZE)?;
        let column = CapMemColumnOnDls::from_enum(index % CapMemColumnOnDls::SIZE)?;
        let row = CapMemRowOnDls::from_enum(index / CapMemColumnOnDls::SIZE)?;
        Ok(Self::new(column, row))
    }

    fn to_enum(self) -> usize {
        self.row.to_enum() * CapMemColumnOnDls::SIZE + self.column.to_enum()
    }
}

// ── Board DACs ───────────────────────────────────────────────────────────────

/// DAC chips on the baseboard, configured over I2C by the FPGA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DacOnBoard {
    /// 1.2 V DAC.
    #[default]
    Dac12,
    /// 2.5 V DAC.
    Dac25,
}

impl Coordinate for DacOnBoard {
    const SIZE: usize = 2;
    const NAME: &'static str = "DacOnBoard";

    fn from_enum(index: usize) -> Result<Self, RangeError> {
        match index {
            0 => Ok(Self::Dac12),
            1 => Ok(Self::Dac25),
            _ => Err(RangeError::new(Self::NAME, index as u64, 1)),
        }
    }

    fn to_enum(self) -> usize {
        self as usize
    }
}

// ── Type-erased coordinate ───────────────────────────────────────────────────

/// Any coordinate, as handed to traversal visitors.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnyCoordinate {
    Unique(Unique),
    CapMem(CapMemOnDls),
    CapMemCell(CapMemCellOnDls),
    CapMemConfig(CapMemConfigOnDls),
    PpuMemory(PpuMemoryOnDls),
    PpuMemoryWord(PpuMemoryWordOnDls),
    PpuControlRegister(PpuControlRegisterOnDls),
    PpuStatusRegister(PpuStatusRegisterOnDls),
    Dac(DacOnBoard),
}

/// The erased coordinate had a different class than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected a {expected} coordinate, got {got:?}")]
pub struct CoordinateMismatch {
    /// Expected class name.
    pub expected: &'static str,
    /// Coordinate actually supplied.
    pub got: AnyCoordinate,
}

macro_rules! erase_coordinate {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AnyCoordinate {
                fn from(c: $ty) -> Self {
                    Self::$variant(c)
                }
            }

            impl TryFrom<AnyCoordinate> for $ty {
                type Error = CoordinateMismatch;

                fn try_from(c: AnyCoordinate) -> Result<Self, Self::Error> {
                    match c {
                        AnyCoordinate::$variant(inner) => Ok(inner),
                        got => Err(CoordinateMismatch { expected: <$ty as Coordinate>::NAME, got }),
                    }
                }
            }
        )*
    };
}

erase_coordinate! {
    Unique => Unique,
    CapMemOnDls => CapMem,
    CapMemCellOnDls => CapMemCell,
    CapMemConfigOnDls => CapMemConfig,
    PpuMemoryOnDls => PpuMemory,
    PpuMemoryWordOnDls => PpuMemoryWord,
    PpuControlRegisterOnDls => PpuControlRegister,
    PpuStatusRegisterOnDls => PpuStatusRegister,
    DacOnBoard => Dac,
}
