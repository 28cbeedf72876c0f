// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PERST# control through the SoC's DesignWare APB GPIO block.

use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::topology::ResetGpio;
use baikal_pcie_defs::gpio;

/// The PERST# line of one port.
pub struct PerstLine<'a, H: ?Sized> {
    regs: RegisterBlock<'a, H>,
    line: ResetGpio,
}

impl<'a, H: PlatformHal + ?Sized> PerstLine<'a, H> {
    /// Wraps pin `line` of the GPIO controller at `base`.
    pub fn new(hal: &'a H, base: u64, line: ResetGpio) -> Self {
        Self {
            regs: RegisterBlock::new(hal, base),
            line,
        }
    }

    fn drive(&self, asserted: bool) {
        let bit = 1 << self.line.pin;
        let high = asserted != self.line.active_low;
        self.regs.modify(gpio::SWPORTA_DR, |v| if high { v | bit } else { v & !bit });
    }

    /// Drives PERST# active and turns the pin into an output. The level is
    /// latched first so the pin never glitches to the inactive state.
    pub fn assert(&self) {
        self.drive(true);
        let bit = 1 << self.line.pin;
        self.regs.modify(gpio::SWPORTA_DDR, |v| v | bit);
    }

    /// Releases PERST#.
    pub fn deassert(&self) {
        self.drive(false);
    }
}
