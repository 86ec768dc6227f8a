//! The whole-chip configuration.

use crate::capmem::{CapMem, CapMemConfig};
use crate::ppu::{PpuControlRegister, PpuMemory};
use crate::traversal::{composite_container, Composite, Node, NodeMut};
use dls_chip::coord::{
    AnyCoordinate, CapMemConfigOnDls, CapMemOnDls, PpuControlRegisterOnDls, PpuMemoryOnDls,
    Unique,
};

/// Static configuration of one DLS v2 chip.
///
/// Traversal order is CapMem, CapMem controller, PPU memory, PPU control.
/// The PPU is released last so it starts on a fully configured chip.
#[derive(Debug, Clone, Default)]
pub struct Chip {
    /// Analog parameters.
    pub capmem: CapMem,
    /// CapMem controller.
    pub capmem_config: CapMemConfig,
    /// PPU program and data.
    pub ppu_memory: PpuMemory,
    /// PPU reset and clock control.
    pub ppu_control_register: PpuControlRegister,
}

impl Composite for Chip {
    fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(AnyCoordinate, Node<'a>)) {
        f(CapMemOnDls.into(), Node::Composite(&self.capmem));
        f(CapMemConfigOnDls.into(), Node::Leaf(&self.capmem_config));
        f(PpuMemoryOnDls.into(), Node::Composite(&self.ppu_memory));
        f(PpuControlRegisterOnDls.into(), Node::Leaf(&self.ppu_control_register));
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(AnyCoordinate, NodeMut<'_>)) {
        f(CapMemOnDls.into(), NodeMut::Composite(&mut self.capmem));
        f(CapMemConfigOnDls.into(), NodeMut::Leaf(&mut self.capmem_config));
        f(PpuMemoryOnDls.into(), NodeMut::Composite(&mut self.ppu_memory));
        f(PpuControlRegisterOnDls.into(), NodeMut::Leaf(&mut self.ppu_control_register));
    }
}

composite_container!(Chip, Unique);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitors;
    use dls_chip::regs;

    #[test]
    fn chip_flattens_children_in_order() {
        let chip = Chip::default();
        let addresses = visitors::collect_addresses(Unique, &chip).unwrap();
        assert_eq!(addresses.len(), 792 + 10 + 4096 + 1);
        assert_eq!(addresses[0], regs::CAPMEM_CELL_BASE);
        assert_eq!(addresses[792], regs::CAPMEM_CONFIG_BASE);
        assert_eq!(addresses[802], regs::PPU_MEMORY_BASE);
        assert_eq!(*addresses.last().unwrap(), regs::PPU_CONTROL);
        assert_eq!(visitors::size_in_words(&chip), addresses.len());
    }

    #[test]
    fn preorder_visits_composites_before_children() {
        let coords = visitors::coordinates(Unique, &Chip::default());
        assert_eq!(coords[0], AnyCoordinate::Unique(Unique));
        assert_eq!(coords[1], AnyCoordinate::CapMem(CapMemOnDls));
        assert!(matches!(coords[2], AnyCoordinate::CapMemCell(_)));
        assert_eq!(coords[794], AnyCoordinate::CapMemConfig(CapMemConfigOnDls));
        assert_eq!(coords[795], AnyCoordinate::PpuMemory(PpuMemoryOnDls));
        assert_eq!(coords.len(), 1 + 1 + 792 + 1 + 1 + 4096 + 1);
    }

    #[test]
    fn chip_decode_roundtrip() {
        let mut chip = Chip::default();
        chip.ppu_control_register.inhibit_reset = true;
        chip.capmem_config.enable_boost = true;
        let words = visitors::collect_words(&chip);

        let mut decoded = Chip::default();
        assert_ne!(decoded, chip);
        visitors::decode_words(&mut decoded, &words).unwrap();
        assert_eq!(decoded, chip);
    }
}
