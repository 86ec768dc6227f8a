//! Capacitive memory: analog parameter cells and the controller that
//! refreshes them.

use crate::error::{ConfigError, Result};
use crate::leaf::{expect_words, LeafConfig};
use crate::traversal::{composite_container, Composite, Node, NodeMut};
use dls_chip::bitfield::{hot_bit_position, Field};
use dls_chip::coord::{
    AnyCoordinate, CapMemCellOnDls, CapMemColumnOnDls, CapMemConfigOnDls, CapMemOnDls,
    CapMemRowOnDls, CommonNeuronParameter, NeuronOnDls, NeuronParameter,
};
use dls_chip::regs::{CAPMEM_CELL_BASE, CAPMEM_CONFIG_BASE, CAPMEM_ROW_STRIDE};
use dls_chip::{ranged_value, Address, Coordinate, Word};

ranged_value!(
    /// Analog value of one CapMem cell (10 bit DAC code).
    CapMemCellValue, u16, 1023
);

// ── CapMemCell ───────────────────────────────────────────────────────────────

/// One analog parameter cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapMemCell {
    /// Stored DAC code.
    pub value: CapMemCellValue,
}

impl CapMemCell {
    /// Cell holding `value`.
    pub const fn new(value: CapMemCellValue) -> Self {
        Self { value }
    }
}

impl LeafConfig for CapMemCell {
    type Coordinate = CapMemCellOnDls;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, coord: CapMemCellOnDls) -> Vec<Address> {
        let column = Address::from(coord.column().value());
        let row = Address::from(coord.row().value());
        vec![CAPMEM_CELL_BASE + CAPMEM_ROW_STRIDE * column + row]
    }

    fn encode(&self) -> Vec<Word> {
        vec![Word::from(self.value.value())]
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("CapMemCell", Self::CONFIG_SIZE_IN_WORDS, words)?;
        self.value = CapMemCellValue::new(u64::from(words[0]))?;
        Ok(())
    }
}

// ── CapMem ───────────────────────────────────────────────────────────────────

/// Power-up values for each neuron column, by row.
const NEURON_DEFAULTS: [u16; 24] = [
    300, 600, 690, 690, 0, 0, 0, 0, 0, 650, 130, 1022, 1022, 0, 300, 0, 0, 500, 0, 500, 0, 0, 0, 0,
];

/// Power-up values for the shared column, by row.
const SHARED_DEFAULTS: [u16; 24] = [
    100, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// All CapMem cells of the chip, stored in enumeration order.
#[derive(Debug, Clone)]
pub struct CapMem {
    cells: Vec<CapMemCell>,
}

impl Default for CapMem {
    fn default() -> Self {
        let cells = dls_chip::iter_all::<CapMemCellOnDls>()
            .map(|cell| {
                let row = usize::from(cell.row().value());
                let value = if cell.column().is_shared() {
                    SHARED_DEFAULTS[row]
                } else {
                    NEURON_DEFAULTS[row]
                };
                CapMemCell::new(CapMemCellValue::new_const(value))
            })
            .collect();
        Self { cells }
    }
}

impl CapMem {
    /// Value of one cell.
    pub fn get(&self, cell: CapMemCellOnDls) -> CapMemCellValue {
        self.cells[cell.to_enum()].value
    }

    /// Set one cell.
    pub fn set(&mut self, cell: CapMemCellOnDls, value: CapMemCellValue) {
        self.cells[cell.to_enum()].value = value;
    }

    /// Value of a per-neuron parameter.
    pub fn get_neuron(&self, neuron: NeuronOnDls, parameter: NeuronParameter) -> CapMemCellValue {
        self.get(CapMemCellOnDls::from_neuron(neuron, parameter))
    }

    /// Set a per-neuron parameter.
    pub fn set_neuron(
        &mut self,
        neuron: NeuronOnDls,
        parameter: NeuronParameter,
        value: CapMemCellValue,
    ) {
        self.set(CapMemCellOnDls::from_neuron(neuron, parameter), value);
    }

    /// Value of a shared parameter.
    pub fn get_common(&self, parameter: CommonNeuronParameter) -> CapMemCellValue {
        self.get(CapMemCellOnDls::from_common(parameter))
    }

    /// Set a shared parameter.
    pub fn set_common(&mut self, parameter: CommonNeuronParameter, value: CapMemCellValue) {
        self.set(CapMemCellOnDls::from_common(parameter), value);
    }
}

impl Composite for CapMem {
    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(AnyCoordinate, Node<'a>)) {
        for (coord, cell) in dls_chip::iter_all::<CapMemCellOnDls>().zip(&self.cells) {
            f(coord.into(), Node::Leaf(cell));
        }
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>)) {
        for (coord, cell) in dls_chip::iter_all::<CapMemCellOnDls>().zip(&mut self.cells) {
            f(coord.into(), NodeMut::Leaf(cell));
        }
    }
}

composite_container!(CapMem, CapMemOnDls);

// ── CapMemConfig ─────────────────────────────────────────────────────────────

ranged_value!(
    /// Debug output amplifier bias.
    OutAmpBias, u8, 15
);
ranged_value!(
    /// Debug source follower bias.
    SourceFollowerBias, u8, 15
);
ranged_value!(
    /// Debug level shifter bias.
    LevelShifterBias, u8, 15
);
ranged_value!(
    /// Global bias of the CapMem voltage cells.
    VGlobalBias, u8, 15
);
ranged_value!(
    /// Reference resistance of the current cells.
    CurrentCellRes, u8, 63
);
ranged_value!(
    /// Boost multiplier.
    BoostFactor, u8, 15
);
ranged_value!(
    /// Clock prescaler during the pause phase.
    PrescalePause, u8, 6
);
ranged_value!(
    /// Clock prescaler during the ramp phase.
    PrescaleRamp, u8, 6
);
ranged_value!(
    /// Refresh sub-counter.
    SubCounter, u16, 65535
);
ranged_value!(
    /// Length of the pause between refresh cycles.
    PauseCounter, u32, u32::MAX
);
ranged_value!(
    /// Length of pulse A.
    PulseA, u16, 65535
);
ranged_value!(
    /// Length of pulse B.
    PulseB, u16, 65535
);
ranged_value!(
    /// Boost duration A.
    BoostA, u16, 65535
);
ranged_value!(
    /// Boost duration B.
    BoostB, u16, 65535
);

/// Voltage reference routed to the debug output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VRefSelect {
    /// No reference routed.
    #[default]
    Disabled = 0,
    /// Voltage reference.
    VRefV = 1,
    /// Current reference.
    VRefI = 2,
}

/// Current output routed to the debug output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IOutSelect {
    /// Nothing routed.
    #[default]
    Disabled = 0,
    /// Cell output multiplexer.
    IOutMux = 1,
    /// Ramp current.
    IOutRamp = 2,
}

impl VRefSelect {
    fn from_raw(raw: Word) -> Option<Self> {
        match raw {
            0 => Some(Self::Disabled),
            1 => Some(Self::VRefV),
            2 => Some(Self::VRefI),
            _ => None,
        }
    }
}

impl IOutSelect {
    fn from_raw(raw: Word) -> Option<Self> {
        match raw {
            0 => Some(Self::Disabled),
            1 => Some(Self::IOutMux),
            2 => Some(Self::IOutRamp),
            _ => None,
        }
    }
}

mod layout {
    use dls_chip::bitfield::Field;

    pub const HOT_BIT_ROW: Field = Field::word(0);
    pub const COLUMN: Field = Field::word(1);
    pub const V_REF_SELECT: Field = Field::word(2);
    pub const V_GLOBAL_BIAS: Field = Field::new(3, 0, 4);
    pub const LEVEL_SHIFTER_BIAS: Field = Field::new(3, 4, 4);
    pub const SOURCE_FOLLOWER_BIAS: Field = Field::new(3, 8, 4);
    pub const OUT_AMP_BIAS: Field = Field::new(3, 12, 4);
    pub const CURRENT_CELL_RES: Field = Field::word(4);
    pub const I_OUT_SELECT: Field = Field::word(5);
    pub const SUB_COUNTER: Field = Field::new(6, 0, 16);
    pub const ENABLE_CAPMEM: Field = Field::new(6, 16, 1);
    pub const ENABLE_BOOST: Field = Field::new(6, 17, 1);
    pub const ENABLE_AUTOBOOST: Field = Field::new(6, 18, 1);
    pub const PRESCALE_RAMP: Field = Field::new(6, 20, 4);
    pub const PRESCALE_PAUSE: Field = Field::new(6, 24, 4);
    pub const BOOST_FACTOR: Field = Field::new(6, 28, 4);
    pub const PULSE_B: Field = Field::new(7, 0, 16);
    pub const PULSE_A: Field = Field::new(7, 16, 16);
    pub const BOOST_B: Field = Field::new(8, 0, 16);
    pub const BOOST_A: Field = Field::new(8, 16, 16);
    pub const PAUSE_COUNTER: Field = Field::word(9);
}

/// CapMem controller configuration.
///
/// ```text
/// word 0  hot-bit row of the debug readout cell (0 = readout disabled)
/// word 1  column of the debug readout cell
/// word 2  v_ref_select
/// word 3  [15:12] out_amp  [11:8] source_follower  [7:4] level_shifter  [3:0] v_global
/// word 4  current_cell_res
/// word 5  i_out_select
/// word 6  [31:28] boost_factor  [27:24] prescale_pause  [23:20] prescale_ramp
///         [18] autoboost  [17] boost  [16] enable  [15:0] sub_counter
/// word 7  [31:16] pulse_a  [15:0] pulse_b
/// word 8  [31:16] boost_a  [15:0] boost_b
/// word 9  pause_counter
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs, clippy::struct_excessive_bools)]
pub struct CapMemConfig {
    pub enable_capmem: bool,
    /// Cell routed to the debug output; `None` disables the readout.
    pub debug_readout: Option<CapMemCellOnDls>,
    pub debug_v_ref_select: VRefSelect,
    pub debug_i_out_select: IOutSelect,
    pub debug_out_amp_bias: OutAmpBias,
    pub debug_source_follower_bias: SourceFollowerBias,
    pub debug_level_shifter_bias: LevelShifterBias,
    pub v_global_bias: VGlobalBias,
    pub current_cell_res: CurrentCellRes,
    pub enable_boost: bool,
    pub boost_factor: BoostFactor,
    pub enable_autoboost: bool,
    pub prescale_pause: PrescalePause,
    pub prescale_ramp: PrescaleRamp,
    pub sub_counter: SubCounter,
    pub pause_counter: PauseCounter,
    pub pulse_a: PulseA,
    pub pulse_b: PulseB,
    pub boost_a: BoostA,
    pub boost_b: BoostB,
}

impl Default for CapMemConfig {
    fn default() -> Self {
        Self {
            enable_capmem: true,
            debug_readout: None,
            debug_v_ref_select: VRefSelect::Disabled,
            debug_i_out_select: IOutSelect::Disabled,
            debug_out_amp_bias: OutAmpBias::new_const(7),
            debug_source_follower_bias: SourceFollowerBias::new_const(3),
            debug_level_shifter_bias: LevelShifterBias::new_const(3),
            v_global_bias: VGlobalBias::new_const(7),
            current_cell_res: CurrentCellRes::new_const(8),
            enable_boost: false,
            boost_factor: BoostFactor::new_const(0),
            enable_autoboost: false,
            prescale_pause: PrescalePause::new_const(3),
            prescale_ramp: PrescaleRamp::new_const(3),
            sub_counter: SubCounter::new_const(8),
            pause_counter: PauseCounter::new_const(8096),
            pulse_a: PulseA::new_const(4),
            pulse_b: PulseB::new_const(7),
            boost_a: BoostA::new_const(0),
            boost_b: BoostB::new_const(0),
        }
    }
}

impl CapMemConfig {
    /// Debug readout cell, or the first cell when the readout is disabled.
    #[must_use]
    pub fn debug_capmem_coord(&self) -> CapMemCellOnDls {
        self.debug_readout.unwrap_or_default()
    }
}

fn field(f: Field, words: &[Word]) -> u64 {
    u64::from(f.extract(words))
}

impl LeafConfig for CapMemConfig {
    type Coordinate = CapMemConfigOnDls;
    const CONFIG_SIZE_IN_WORDS: usize = 10;

    fn addresses(&self, _coord: CapMemConfigOnDls) -> Vec<Address> {
        (0..10).map(|i| CAPMEM_CONFIG_BASE + i).collect()
    }

    fn encode(&self) -> Vec<Word> {
        use layout::*;

        let mut words = vec![0; Self::CONFIG_SIZE_IN_WORDS];
        if let Some(coord) = self.debug_readout {
            HOT_BIT_ROW.insert(&mut words, 1 << coord.row().value());
            COLUMN.insert(&mut words, Word::from(coord.column().value()));
        }
        V_REF_SELECT.insert(&mut words, self.debug_v_ref_select as Word);
        V_GLOBAL_BIAS.insert(&mut words, self.v_global_bias.value().into());
        LEVEL_SHIFTER_BIAS.insert(&mut words, self.debug_level_shifter_bias.value().into());
        SOURCE_FOLLOWER_BIAS.insert(&mut words, self.debug_source_follower_bias.value().into());
        OUT_AMP_BIAS.insert(&mut words, self.debug_out_amp_bias.value().into());
        CURRENT_CELL_RES.insert(&mut words, self.current_cell_res.value().into());
        I_OUT_SELECT.insert(&mut words, self.debug_i_out_select as Word);
        SUB_COUNTER.insert(&mut words, self.sub_counter.value().into());
        ENABLE_CAPMEM.insert_bool(&mut words, self.enable_capmem);
        ENABLE_BOOST.insert_bool(&mut words, self.enable_boost);
        ENABLE_AUTOBOOST.insert_bool(&mut words, self.enable_autoboost);
        PRESCALE_RAMP.insert(&mut words, self.prescale_ramp.value().into());
        PRESCALE_PAUSE.insert(&mut words, self.prescale_pause.value().into());
        BOOST_FACTOR.insert(&mut words, self.boost_factor.value().into());
        PULSE_B.insert(&mut words, self.pulse_b.value().into());
        PULSE_A.insert(&mut words, self.pulse_a.value().into());
        BOOST_B.insert(&mut words, self.boost_b.value().into());
        BOOST_A.insert(&mut words, self.boost_a.value().into());
        PAUSE_COUNTER.insert(&mut words, self.pause_counter.value());
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        use layout::*;
        const NAME: &str = "CapMemConfig";

        expect_words(NAME, Self::CONFIG_SIZE_IN_WORDS, words)?;

        let hot = HOT_BIT_ROW.extract(words);
        let debug_readout = if hot == 0 {
            None
        } else {
            let row = hot_bit_position(hot)
                .ok_or(ConfigError::InvalidHotBit { type_name: NAME, word: hot })?;
            #[allow(clippy::cast_possible_truncation)]
            let row = CapMemRowOnDls::new(row as u16)?;
            let column = u16::try_from(COLUMN.extract(words))
                .map_err(|_| dls_chip::RangeError::new("CapMemColumnOnDls", field(COLUMN, words), 32))?;
            let column = CapMemColumnOnDls::new(column)?;
            Some(CapMemCellOnDls::new(column, row))
        };

        let v_ref = V_REF_SELECT.extract(words);
        let i_out = I_OUT_SELECT.extract(words);

        // Build the whole value first so `self` stays untouched on error.
        *self = Self {
            enable_capmem: ENABLE_CAPMEM.extract_bool(words),
            debug_readout,
            debug_v_ref_select: VRefSelect::from_raw(v_ref)
                .ok_or_else(|| ConfigError::invalid_field(NAME, "v_ref_select", v_ref))?,
            debug_i_out_select: IOutSelect::from_raw(i_out)
                .ok_or_else(|| ConfigError::invalid_field(NAME, "i_out_select", i_out))?,
            debug_out_amp_bias: OutAmpBias::new(field(OUT_AMP_BIAS, words))?,
            debug_source_follower_bias: SourceFollowerBias::new(field(SOURCE_FOLLOWER_BIAS, words))?,
            debug_level_shifter_bias: LevelShifterBias::new(field(LEVEL_SHIFTER_BIAS, words))?,
            v_global_bias: VGlobalBias::new(field(V_GLOBAL_BIAS, words))?,
            current_cell_res: CurrentCellRes::new(field(CURRENT_CELL_RES, words))?,
            enable_boost: ENABLE_BOOST.extract_bool(words),
            boost_factor: BoostFactor::new(field(BOOST_FACTOR, words))?,
            enable_autoboost: ENABLE_AUTOBOOST.extract_bool(words),
            prescale_pause: PrescalePause::new(field(PRESCALE_PAUSE, words))?,
            prescale_ramp: PrescaleRamp::new(field(PRESCALE_RAMP, words))?,
            sub_counter: SubCounter::new(field(SUB_COUNTER, words))?,
            pause_counter: PauseCounter::new(field(PAUSE_COUNTER, words))?,
            pulse_a: PulseA::new(field(PULSE_A, words))?,
            pulse_b: PulseB::new(field(PULSE_B, words))?,
            boost_a: BoostA::new(field(BOOST_A, words))?,
            boost_b: BoostB::new(field(BOOST_B, words))?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitors;
    use dls_chip::coord::{iter_all, CapMemColumnOnDls};

    #[test]
    fn cell_address_is_column_major() {
        let cell = CapMemCellOnDls::new(
            CapMemColumnOnDls::new_const(2),
            CapMemRowOnDls::new_const(5),
        );
        assert_eq!(CapMemCell::default().addresses(cell), vec![0x1800_0000 + 64 + 5]);
    }

    #[test]
    fn cell_rejects_values_above_1023() {
        let mut cell = CapMemCell::default();
        assert!(cell.decode(&[1023]).is_ok());
        assert!(matches!(cell.decode(&[1024]), Err(ConfigError::Range(_))));
        assert_eq!(cell.value.value(), 1023);
    }

    #[test]
    fn default_capmem_tables() {
        let capmem = CapMem::default();
        let n7 = NeuronOnDls::new_const(7);
        assert_eq!(capmem.get_neuron(n7, NeuronParameter::VLeak).value(), 300);
        assert_eq!(capmem.get_neuron(n7, NeuronParameter::VTreshold).value(), 600);
        assert_eq!(capmem.get_neuron(n7, NeuronParameter::IBiasLeakMain).value(), 1022);
        assert_eq!(capmem.get_neuron(n7, NeuronParameter::IBiasInhSynInputOffset).value(), 0);
        assert_eq!(capmem.get_common(CommonNeuronParameter::EReset).value(), 100);
        let shared_row1 = CapMemCellOnDls::new(CapMemColumnOnDls::SHARED, CapMemRowOnDls::new_const(1));
        assert_eq!(capmem.get(shared_row1).value(), 0);
    }

    #[test]
    fn capmem_flattens_in_enumeration_order() {
        let capmem = CapMem::default();
        let addresses = visitors::collect_addresses(CapMemOnDls, &capmem).unwrap();
        assert_eq!(addresses.len(), 792);
        let expected: Vec<Address> = iter_all::<CapMemCellOnDls>()
            .map(|c| CapMemCell::default().addresses(c)[0])
            .collect();
        assert_eq!(addresses, expected);
    }

    #[test]
    fn capmem_set_changes_equality() {
        let mut a = CapMem::default();
        let b = CapMem::default();
        assert_eq!(a, b);
        a.set_neuron(NeuronOnDls::new_const(0), NeuronParameter::VLeak, CapMemCellValue::new_const(1));
        assert_ne!(a, b);
    }

    #[test]
    fn config_default_encoding() {
        let words = CapMemConfig::default().encode();
        assert_eq!(words[0], 0);
        assert_eq!(words[1], 0);
        assert_eq!(words[3], 0x7337);
        assert_eq!(words[4], 8);
        assert_eq!(words[6], (3 << 24) | (3 << 20) | (1 << 16) | 8);
        assert_eq!(words[7], (4 << 16) | 7);
        assert_eq!(words[9], 8096);
    }

    #[test]
    fn config_debug_cell_is_hot_bit_encoded() {
        let mut config = CapMemConfig::default();
        config.debug_readout = Some(CapMemCellOnDls::new(
            CapMemColumnOnDls::new_const(17),
            CapMemRowOnDls::new_const(9),
        ));
        let words = config.encode();
        assert_eq!(words[0], 1 << 9);
        assert_eq!(words[1], 17);

        let mut decoded = CapMemConfig::default();
        decoded.decode(&words).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn config_rejects_multiple_hot_bits() {
        let mut words = CapMemConfig::default().encode();
        words[0] = 0b101;
        let mut config = CapMemConfig::default();
        assert!(matches!(
            config.decode(&words),
            Err(ConfigError::InvalidHotBit { word: 0b101, .. })
        ));
        assert_eq!(config, CapMemConfig::default());
    }

    #[test]
    fn config_rejects_hot_bit_beyond_last_row() {
        let mut words = CapMemConfig::default().encode();
        words[0] = 1 << 24;
        assert!(CapMemConfig::default().decode(&words).is_err());
    }

    #[test]
    fn config_rejects_unknown_select() {
        let mut words = CapMemConfig::default().encode();
        words[2] = 3;
        assert!(matches!(
            CapMemConfig::default().decode(&words),
            Err(ConfigError::InvalidField { field: "v_ref_select", value: 3, .. })
        ));
    }

    #[test]
    fn config_rejects_prescale_above_six() {
        let mut words = CapMemConfig::default().encode();
        words[6] |= 7 << 20;
        assert!(matches!(
            CapMemConfig::default().decode(&words),
            Err(ConfigError::Range(_))
        ));
    }

    #[test]
    fn config_roundtrip_with_every_field_set() {
        let config = CapMemConfig {
            enable_capmem: false,
            debug_readout: Some(CapMemCellOnDls::new(
                CapMemColumnOnDls::SHARED,
                CapMemRowOnDls::new_const(23),
            )),
            debug_v_ref_select: VRefSelect::VRefI,
            debug_i_out_select: IOutSelect::IOutRamp,
            debug_out_amp_bias: OutAmpBias::new_const(15),
            debug_source_follower_bias: SourceFollowerBias::new_const(1),
            debug_level_shifter_bias: LevelShifterBias::new_const(2),
            v_global_bias: VGlobalBias::new_const(14),
            current_cell_res: CurrentCellRes::new_const(63),
            enable_boost: true,
            boost_factor: BoostFactor::new_const(15),
            enable_autoboost: true,
            prescale_pause: PrescalePause::new_const(6),
            prescale_ramp: PrescaleRamp::new_const(1),
            sub_counter: SubCounter::new_const(65535),
            pause_counter: PauseCounter::new_const(u32::MAX),
            pulse_a: PulseA::new_const(65535),
            pulse_b: PulseB::new_const(1),
            boost_a: BoostA::new_const(12),
            boost_b: BoostB::new_const(65535),
        };
        let mut decoded = CapMemConfig::default();
        decoded.decode(&config.encode()).unwrap();
        assert_eq!(decoded, config);
    }
}
