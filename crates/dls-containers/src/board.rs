//! Board-level configuration: DACs, FPGA link setup and the spike router.

use crate::error::{ConfigError, Result};
use crate::leaf::{expect_words, LeafConfig};
use crate::traversal::{composite_container, Composite, Node, NodeMut};
use dls_chip::bitfield::Field;
use dls_chip::coord::{
    AnyCoordinate, DacChannel, DacOnBoard, NeuronOnDls, SynapseDriverOnDls, Unique,
};
use dls_chip::regs::{self, fpga_config, DAC_SETUP_COMMAND};
use dls_chip::{iter_all, ranged_value, Address, Coordinate, Word};

// ── DAC ──────────────────────────────────────────────────────────────────────

ranged_value!(
    /// 12 bit DAC output code.
    DacValue, u16, 4095
);

const DAC_CHANNEL: Field = Field::new(0, 12, 4);
const DAC_VALUE: Field = Field::new(0, 0, 12);

/// Eight-channel DAC on the baseboard, configured over I2C by the FPGA.
///
/// The first word is the setup command, followed by one
/// `channel << 12 | value` word per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dac {
    channels: [DacValue; DacChannel::SIZE],
}

impl Dac {
    /// Output code of `channel`.
    pub fn get(&self, channel: DacChannel) -> DacValue {
        self.channels[channel.to_enum()]
    }

    /// Set the output code of `channel`.
    pub fn set(&mut self, channel: DacChannel, value: DacValue) {
        self.channels[channel.to_enum()] = value;
    }
}

impl LeafConfig for Dac {
    type Coordinate = DacOnBoard;
    const CONFIG_SIZE_IN_WORDS: usize = 1 + DacChannel::SIZE;

    fn addresses(&self, coord: DacOnBoard) -> Vec<Address> {
        let base = match coord {
            DacOnBoard::Dac12 => regs::DAC12_BASE,
            DacOnBoard::Dac25 => regs::DAC25_BASE,
        };
        (0..9).map(|i| base + i).collect()
    }

    fn encode(&self) -> Vec<Word> {
        let mut words = Vec::with_capacity(Self::CONFIG_SIZE_IN_WORDS);
        words.push(DAC_SETUP_COMMAND);
        for (channel, value) in (0..).zip(&self.channels) {
            let mut w = [0];
            DAC_CHANNEL.insert(&mut w, channel);
            DAC_VALUE.insert(&mut w, value.value().into());
            words.push(w[0]);
        }
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("Dac", Self::CONFIG_SIZE_IN_WORDS, words)?;
        if words[0] != DAC_SETUP_COMMAND {
            return Err(ConfigError::invalid_field("Dac", "setup", words[0]));
        }
        let mut channels = [DacValue::default(); DacChannel::SIZE];
        for (i, (slot, &w)) in channels.iter_mut().zip(&words[1..]).enumerate() {
            let channel = DAC_CHANNEL.extract(&[w]);
            if channel as usize != i {
                return Err(ConfigError::invalid_field("Dac", "channel", channel));
            }
            *slot = DacValue::new(u64::from(DAC_VALUE.extract(&[w])))?;
        }
        self.channels = channels;
        Ok(())
    }
}

// ── FpgaConfig ───────────────────────────────────────────────────────────────

ranged_value!(
    /// Trace generator control bits.
    TgCtrl, u8, 63
);

/// FPGA configuration word: reset lines, link setup and spike routing.
///
/// While `dls_reset` is set the chip is held in reset and cannot be
/// configured or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs, clippy::struct_excessive_bools)]
pub struct FpgaConfig {
    pub dls_reset: bool,
    pub soft_reset: bool,
    pub tg_ctrl: TgCtrl,
    pub enable_spike_router: bool,
    pub i_phase_sel: bool,
    pub o_phase_sel: bool,
    pub train: bool,
    pub txrx_en: bool,
    pub en_lvds_rx: bool,
    pub analog_power_en: bool,
    pub loopback_to_dls: bool,
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self {
            dls_reset: false,
            soft_reset: false,
            tg_ctrl: TgCtrl::new_const(0x3f),
            enable_spike_router: false,
            i_phase_sel: false,
            o_phase_sel: false,
            train: false,
            txrx_en: true,
            en_lvds_rx: true,
            analog_power_en: true,
            loopback_to_dls: false,
        }
    }
}

const FLAGS: [u32; 10] = [
    fpga_config::DLS_RESET,
    fpga_config::SOFT_RESET,
    fpga_config::ENABLE_SPIKE_ROUTER,
    fpga_config::I_PHASE_SEL,
    fpga_config::O_PHASE_SEL,
    fpga_config::TRAIN,
    fpga_config::TXRX_EN,
    fpga_config::EN_LVDS_RX,
    fpga_config::ANALOG_POWER_EN,
    fpga_config::LOOPBACK_TO_DLS,
];
const TG_CTRL: Field = Field::new(0, fpga_config::TG_CTRL_SHIFT, 6);

impl FpgaConfig {
    fn flags(&self) -> [bool; 10] {
        [
            self.dls_reset,
            self.soft_reset,
            self.enable_spike_router,
            self.i_phase_sel,
            self.o_phase_sel,
            self.train,
            self.txrx_en,
            self.en_lvds_rx,
            self.analog_power_en,
            self.loopback_to_dls,
        ]
    }

    /// Default configuration with both reset lines asserted.
    pub fn reset() -> Self {
        Self {
            dls_reset: true,
            soft_reset: true,
            ..Self::default()
        }
    }
}

impl LeafConfig for FpgaConfig {
    type Coordinate = Unique;
    const CONFIG_SIZE_IN_WORDS: usize = 1;

    fn addresses(&self, _coord: Unique) -> Vec<Address> {
        vec![regs::FPGA_CONFIG]
    }

    fn encode(&self) -> Vec<Word> {
        let mut words = vec![0];
        for (bit, on) in FLAGS.iter().zip(self.flags()) {
            if on {
                words[0] |= bit;
            }
        }
        TG_CTRL.insert(&mut words, self.tg_ctrl.value().into());
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("FpgaConfig", 1, words)?;
        let w = words[0];
        let on = |bit: u32| w & bit != 0;
        *self = Self {
            dls_reset: on(fpga_config::DLS_RESET),
            soft_reset: on(fpga_config::SOFT_RESET),
            tg_ctrl: TgCtrl::new(u64::from(TG_CTRL.extract(words)))?,
            enable_spike_router: on(fpga_config::ENABLE_SPIKE_ROUTER),
            i_phase_sel: on(fpga_config::I_PHASE_SEL),
            o_phase_sel: on(fpga_config::O_PHASE_SEL),
            train: on(fpga_config::TRAIN),
            txrx_en: on(fpga_config::TXRX_EN),
            en_lvds_rx: on(fpga_config::EN_LVDS_RX),
            analog_power_en: on(fpga_config::ANALOG_POWER_EN),
            loopback_to_dls: on(fpga_config::LOOPBACK_TO_DLS),
        };
        Ok(())
    }
}

// ── SpikeRouter ──────────────────────────────────────────────────────────────

ranged_value!(
    /// 6 bit synapse address carried by routed spikes.
    SynapseAddress, u8, 63
);
ranged_value!(
    /// Squeeze-mode collection interval in FPGA cycles.
    SqueezeDelay, u16, 0x3fff
);

/// Set of synapse driver rows a routed spike is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TargetRows(u32);

impl TargetRows {
    /// No rows.
    pub const NONE: Self = Self(0);

    /// From a raw bitset, bit `i` selecting driver row `i`.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitset.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Add a row.
    #[must_use]
    pub fn with(self, row: SynapseDriverOnDls) -> Self {
        Self(self.0 | (1 << row.value()))
    }

    /// True if `row` is targeted.
    pub fn contains(self, row: SynapseDriverOnDls) -> bool {
        self.0 & (1 << row.value()) != 0
    }
}

impl FromIterator<SynapseDriverOnDls> for TargetRows {
    fn from_iter<I: IntoIterator<Item = SynapseDriverOnDls>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

const NEURONS: usize = NeuronOnDls::SIZE;
const SQUEEZE_ENABLED: Field = Field::new(0, 0, 1);
const SQUEEZE_ADDRESS: Field = Field::new(0, 1, 6);
const SQUEEZE_DELAY: Field = Field::new(0, 8, 14);

/// Routes spikes recorded from neurons back onto synapse drivers.
///
/// Either every neuron has its own route (address plus target rows), or
/// squeeze mode is on: all spikes within `delay` cycles are or-ed into one
/// packet with a fixed address. Routing is off by default.
///
/// ```text
/// word 0        [21:8] squeeze delay  [6:1] squeeze address  [0] squeeze enable
/// word 1..=32   synapse address of neuron 0..31
/// word 33..=64  target rows of neuron 0..31
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpikeRouter {
    squeeze: Option<(SynapseAddress, SqueezeDelay)>,
    address_by_neuron: [SynapseAddress; NEURONS],
    target_rows_by_neuron: [TargetRows; NEURONS],
}

impl Default for SpikeRouter {
    fn default() -> Self {
        Self {
            squeeze: None,
            address_by_neuron: [SynapseAddress::default(); NEURONS],
            target_rows_by_neuron: [TargetRows::NONE; NEURONS],
        }
    }
}

impl SpikeRouter {
    /// Disable all routing.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Enable squeeze mode.
    pub fn enable_squeeze_mode(&mut self, address: SynapseAddress, delay: SqueezeDelay) {
        self.squeeze = Some((address, delay));
    }

    /// Route spikes of `neuron` to `target_rows`. Leaves squeeze mode.
    pub fn set_neuron_route(
        &mut self,
        neuron: NeuronOnDls,
        address: SynapseAddress,
        target_rows: TargetRows,
    ) {
        self.squeeze = None;
        self.address_by_neuron[neuron.to_enum()] = address;
        self.target_rows_by_neuron[neuron.to_enum()] = target_rows;
    }

    /// Squeeze-mode address and delay, if enabled.
    pub fn squeeze_mode(&self) -> Option<(SynapseAddress, SqueezeDelay)> {
        self.squeeze
    }

    /// Route of `neuron`.
    pub fn neuron_route(&self, neuron: NeuronOnDls) -> (SynapseAddress, TargetRows) {
        (
            self.address_by_neuron[neuron.to_enum()],
            self.target_rows_by_neuron[neuron.to_enum()],
        )
    }
}

impl LeafConfig for SpikeRouter {
    type Coordinate = Unique;
    const CONFIG_SIZE_IN_WORDS: usize = 1 + 2 * NEURONS;

    fn addresses(&self, _coord: Unique) -> Vec<Address> {
        (0..65).map(|i| regs::SPIKE_ROUTER_BASE + i).collect()
    }

    fn encode(&self) -> Vec<Word> {
        let mut words = vec![0; Self::CONFIG_SIZE_IN_WORDS];
        if let Some((address, delay)) = self.squeeze {
            SQUEEZE_ENABLED.insert_bool(&mut words, true);
            SQUEEZE_ADDRESS.insert(&mut words, address.value().into());
            SQUEEZE_DELAY.insert(&mut words, delay.value().into());
        }
        for i in 0..NEURONS {
            words[1 + i] = self.address_by_neuron[i].value().into();
            words[1 + NEURONS + i] = self.target_rows_by_neuron[i].bits();
        }
        words
    }

    fn decode(&mut self, words: &[Word]) -> Result<()> {
        expect_words("SpikeRouter", Self::CONFIG_SIZE_IN_WORDS, words)?;
        let squeeze = if SQUEEZE_ENABLED.extract_bool(words) {
            Some((
                SynapseAddress::new(SQUEEZE_ADDRESS.extract(words).into())?,
                SqueezeDelay::new(SQUEEZE_DELAY.extract(words).into())?,
            ))
        } else {
            None
        };
        let mut address_by_neuron = [SynapseAddress::default(); NEURONS];
        for (slot, &w) in address_by_neuron.iter_mut().zip(&words[1..=NEURONS]) {
            *slot = SynapseAddress::new(w.into())?;
        }
        let mut target_rows_by_neuron = [TargetRows::NONE; NEURONS];
        for (slot, &w) in target_rows_by_neuron.iter_mut().zip(&words[1 + NEURONS..]) {
            *slot = TargetRows(w);
        }
        *self = Self {
            squeeze,
            address_by_neuron,
            target_rows_by_neuron,
        };
        Ok(())
    }
}

// ── Board ────────────────────────────────────────────────────────────────────

/// Named analog board parameters, each driven by one DAC channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoardParameter {
    CadcRamp01,
    CadcRampBias,
    CadcRampSlope,
    CadcVBias,
    CapmemIBufBias,
    CapmemIOffset,
    CapmemIRef,
    GeneralPurpose0,
    GeneralPurpose1,
    SynCoroutBias,
    SynVBias,
    SynVDdResMeas,
    SynVRamp,
    SynVReset,
    SynVStore,
}

impl BoardParameter {
    /// DAC and channel driving this parameter. The first eight sit on the
    /// 1.2 V DAC, the rest on the 2.5 V DAC.
    pub fn dac_channel(self) -> (DacOnBoard, DacChannel) {
        let index = self as u16;
        if index < 8 {
            (DacOnBoard::Dac12, DacChannel::new_const(index))
        } else {
            (DacOnBoard::Dac25, DacChannel::new_const(index - 8))
        }
    }
}

/// Everything configurable on the baseboard.
#[derive(Debug, Clone, Default)]
pub struct Board {
    dacs: [Dac; DacOnBoard::SIZE],
    /// FPGA configuration word.
    pub fpga_config: FpgaConfig,
    /// Spike router.
    pub spike_router: SpikeRouter,
}

impl Board {
    /// DAC code of `parameter`.
    pub fn get_parameter(&self, parameter: BoardParameter) -> DacValue {
        let (dac, channel) = parameter.dac_channel();
        self.dacs[dac.to_enum()].get(channel)
    }

    /// Set the DAC code of `parameter`.
    pub fn set_parameter(&mut self, parameter: BoardParameter, value: DacValue) {
        let (dac, channel) = parameter.dac_channel();
        self.dacs[dac.to_enum()].set(channel, value);
    }

    /// One DAC.
    pub fn dac(&self, dac: DacOnBoard) -> &Dac {
        &self.dacs[dac.to_enum()]
    }
}

impl Composite for Board {
    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(AnyCoordinate, Node<'a>)) {
        for (coord, dac) in iter_all::<DacOnBoard>().zip(&self.dacs) {
            f(coord.into(), Node::Leaf(dac));
        }
        f(Unique.into(), Node::Leaf(&self.fpga_config));
        f(Unique.into(), Node::Leaf(&self.spike_router));
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>)) {
        for (coord, dac) in iter_all::<DacOnBoard>().zip(&mut self.dacs) {
            f(coord.into(), NodeMut::Leaf(dac));
        }
        f(Unique.into(), NodeMut::Leaf(&mut self.fpga_config));
        f(Unique.into(), NodeMut::Leaf(&mut self.spike_router));
    }
}

composite_container!(Board, Unique);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitors;

    #[test]
    fn dac_words_carry_channel_index() {
        let mut dac = Dac::default();
        dac.set(DacChannel::new_const(3), DacValue::new_const(0xabc));
        let words = dac.encode();
        assert_eq!(words[0], DAC_SETUP_COMMAND);
        assert_eq!(words[4], (3 << 12) | 0xabc);
        assert_eq!(dac.addresses(DacOnBoard::Dac25)[0], regs::DAC25_BASE);

        let mut decoded = Dac::default();
        decoded.decode(&words).unwrap();
        assert_eq!(decoded, dac);
    }

    #[test]
    fn dac_rejects_swapped_channels() {
        let mut words = Dac::default().encode();
        words.swap(1, 2);
        assert!(matches!(
            Dac::default().decode(&words),
            Err(ConfigError::InvalidField { field: "channel", .. })
        ));
    }

    #[test]
    fn fpga_config_bits() {
        let words = FpgaConfig::default().encode();
        assert_eq!(
            words[0],
            (0x3f << 2) | fpga_config::TXRX_EN | fpga_config::EN_LVDS_RX | fpga_config::ANALOG_POWER_EN
        );
        let reset = FpgaConfig::reset().encode()[0];
        assert_eq!(reset & 0b11, 0b11);

        let mut decoded = FpgaConfig::default();
        decoded.decode(&[reset]).unwrap();
        assert_eq!(decoded, FpgaConfig::reset());
    }

    #[test]
    fn spike_router_modes_are_exclusive() {
        let mut router = SpikeRouter::default();
        router.enable_squeeze_mode(SynapseAddress::new_const(5), SqueezeDelay::new_const(100));
        let words = router.encode();
        assert_eq!(words[0], 1 | (5 << 1) | (100 << 8));

        let rows: TargetRows = [0, 31]
            .into_iter()
            .map(SynapseDriverOnDls::new_const)
            .collect();
        router.set_neuron_route(NeuronOnDls::new_const(2), SynapseAddress::new_const(9), rows);
        assert_eq!(router.squeeze_mode(), None);
        let words = router.encode();
        assert_eq!(words[0], 0);
        assert_eq!(words[3], 9);
        assert_eq!(words[35], 0x8000_0001);

        let mut decoded = SpikeRouter::default();
        decoded.decode(&words).unwrap();
        assert_eq!(decoded, router);
        assert!(decoded.neuron_route(NeuronOnDls::new_const(2)).1.contains(SynapseDriverOnDls::new_const(31)));
    }

    #[test]
    fn board_parameters_map_onto_distinct_channels() {
        let mut board = Board::default();
        board.set_parameter(BoardParameter::CapmemIRef, DacValue::new_const(1000));
        board.set_parameter(BoardParameter::SynVStore, DacValue::new_const(2000));
        assert_eq!(board.get_parameter(BoardParameter::CapmemIRef).value(), 1000);
        assert_eq!(board.get_parameter(BoardParameter::SynVStore).value(), 2000);
        assert_eq!(board.dac(DacOnBoard::Dac12).get(DacChannel::new_const(6)).value(), 1000);
        assert_eq!(board.dac(DacOnBoard::Dac25).get(DacChannel::new_const(6)).value(), 2000);
    }

    #[test]
    fn board_traversal_order() {
        let board = Board::default();
        let addresses = visitors::collect_addresses(Unique, &board).unwrap();
        assert_eq!(addresses.len(), 9 + 9 + 1 + 65);
        assert_eq!(addresses[0], regs::DAC12_BASE);
        assert_eq!(addresses[9], regs::DAC25_BASE);
        assert_eq!(addresses[18], regs::FPGA_CONFIG);
        assert_eq!(addresses[19], regs::SPIKE_ROUTER_BASE);
    }
}
