// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Register view of one root port, shared by the bring-up stages.

use crate::gpio::PerstLine;
use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::soc::SocVariant;
use crate::topology::ControllerDescriptor;
use baikal_pcie_defs::caps::pci_express::LinkControl;
use baikal_pcie_defs::caps::pci_express::LinkStatus;
use baikal_pcie_defs::caps::pci_express::split_link_ctl_sts;
use baikal_pcie_defs::dw::ltssm::LinkDebugStatus;
use baikal_pcie_defs::dw::port_logic;

pub(crate) struct Port<'a, H: ?Sized> {
    pub variant: &'static SocVariant,
    pub controller: &'a ControllerDescriptor,
    pub dbi: RegisterBlock<'a, H>,
    pub control: RegisterBlock<'a, H>,
    pub config: RegisterBlock<'a, H>,
    pub perst: Option<PerstLine<'a, H>>,
}

impl<'a, H: PlatformHal + ?Sized> Port<'a, H> {
    pub fn new(
        hal: &'a H,
        variant: &'static SocVariant,
        controller: &'a ControllerDescriptor,
    ) -> Self {
        Self {
            variant,
            controller,
            dbi: RegisterBlock::new(hal, controller.dbi_base),
            control: RegisterBlock::new(hal, controller.control_base),
            config: RegisterBlock::new(hal, controller.config_base),
            perst: controller
                .reset_gpio
                .map(|gpio| PerstLine::new(hal, variant.gpio_base, gpio)),
        }
    }

    pub fn index(&self) -> u32 {
        self.controller.index
    }

    pub fn hal(&self) -> &'a H {
        self.dbi.hal()
    }

    pub fn set_ltssm_enable(&self, enable: bool) {
        let mask = self.variant.control.ltssm_enable;
        self.control.modify(self.variant.control.ltssm_control, |v| {
            if enable { v | mask } else { v & !mask }
        });
    }

    pub fn link_debug(&self) -> LinkDebugStatus {
        LinkDebugStatus::from_bits(self.control.read(self.variant.control.link_status))
    }

    pub fn link_control_status(&self) -> (LinkControl, LinkStatus) {
        split_link_ctl_sts(self.dbi.read(port_logic::LINK_CTL_STS))
    }
}
