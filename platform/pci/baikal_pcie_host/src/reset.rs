// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reset and configuration of a root port, up to enabling link training.

use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::iatu;
use crate::iatu::OutboundWindow;
use crate::iatu::WindowType;
use crate::phy;
use crate::phy::PhyAccess;
use crate::port::Port;
use crate::topology::BUS_WINDOW_SIZE;
use crate::topology::ControllerDescriptor;
use crate::topology::LaneCount;
use crate::topology::WindowKind;
use baikal_pcie_defs::caps::pci_express::LinkCapabilities;
use baikal_pcie_defs::caps::pci_express::LinkControl2;
use baikal_pcie_defs::caps::pci_express::LinkSpeed;
use baikal_pcie_defs::cfg_space;
use baikal_pcie_defs::dw::port_logic;
use baikal_pcie_defs::dw::port_logic::Gen2Control;
use baikal_pcie_defs::dw::port_logic::MiscControl1;
use baikal_pcie_defs::dw::port_logic::PortLinkControl;
use std::time::Duration;

/// Width of the PERST# pulse used to recover a locked-up link.
pub const RECOVERY_PULSE: Duration = Duration::from_millis(1);

/// Outbound region numbers.
pub mod region {
    /// Type 0 config, bus directly below the port.
    pub const CFG0: u32 = 0;
    /// Type 1 config, remaining buses.
    pub const CFG1: u32 = 1;
    /// First memory window.
    pub const MEM: u32 = 2;
    /// I/O window.
    pub const IO: u32 = 3;
    /// Second memory window, when both 32-bit and 64-bit windows exist.
    pub const MEM_HIGH: u32 = 4;
}

/// Soft failures met while resetting a port. Bring-up continues past all
/// of them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequencerReport {
    /// The core never reported reset completion.
    pub reset_done_timeout: bool,
    /// PHY tuning was abandoned on a handshake timeout.
    pub phy_tuning_failed: bool,
    /// Outbound windows that could not be programmed.
    pub window_failures: u32,
}

/// Keeps the DBI's read-only fields writable for its lifetime.
pub(crate) struct DbiWriteGuard<'a, H: PlatformHal + ?Sized> {
    dbi: RegisterBlock<'a, H>,
}

impl<'a, H: PlatformHal + ?Sized> DbiWriteGuard<'a, H> {
    pub fn new(dbi: RegisterBlock<'a, H>) -> Self {
        let enable = MiscControl1::new()
            .with_dbi_ro_write_enable(true)
            .into_bits();
        dbi.modify(port_logic::MISC_CONTROL_1, |v| v | enable);
        Self { dbi }
    }
}

impl<H: PlatformHal + ?Sized> Drop for DbiWriteGuard<'_, H> {
    fn drop(&mut self) {
        let enable = MiscControl1::new()
            .with_dbi_ro_write_enable(true)
            .into_bits();
        self.dbi.modify(port_logic::MISC_CONTROL_1, |v| v & !enable);
    }
}

/// The windows a controller needs: CFG0 over the first bus of the config
/// window, CFG1 over the rest, then I/O and memory.
pub fn outbound_windows(controller: &ControllerDescriptor) -> Vec<OutboundWindow> {
    let mut windows = vec![
        OutboundWindow {
            region: region::CFG0,
            cpu_base: controller.config_base,
            pci_base: 0,
            size: BUS_WINDOW_SIZE,
            kind: WindowType::Cfg0,
        },
        OutboundWindow {
            region: region::CFG1,
            cpu_base: controller.config_base + BUS_WINDOW_SIZE,
            pci_base: BUS_WINDOW_SIZE,
            size: controller.config_size - BUS_WINDOW_SIZE,
            kind: WindowType::Cfg1,
        },
    ];
    let mut mem_regions = [region::MEM, region::MEM_HIGH].into_iter();
    for kind in [WindowKind::Mem32, WindowKind::Mem64, WindowKind::Io] {
        let Some(window) = controller.window(kind) else {
            continue;
        };
        let (region, kind) = match kind {
            WindowKind::Io => (region::IO, WindowType::Io),
            WindowKind::Mem32 | WindowKind::Mem64 => match mem_regions.next() {
                Some(region) => (region, WindowType::Mem),
                None => continue,
            },
        };
        windows.push(OutboundWindow {
            region,
            cpu_base: window.cpu_base,
            pci_base: window.pci_base,
            size: window.size,
            kind,
        });
    }
    windows
}

/// Resets the port, applies static configuration and enables the LTSSM.
pub(crate) fn reset_and_configure<H: PlatformHal + ?Sized>(port: &Port<'_, H>) -> SequencerReport {
    let variant = port.variant;
    let controller = port.controller;
    let hal = port.hal();
    let index = port.index();
    let mut report = SequencerReport::default();

    port.set_ltssm_enable(false);
    if let Some(perst) = &port.perst {
        perst.assert();
    }

    let lanes = controller.lanes.map_or(variant.max_lanes, LaneCount::count);
    let bundle = variant.reset.assert_mask(lanes);
    port.control.modify(variant.control.reset, |v| v | bundle);
    hal.stall(variant.reset.hold);
    let release = bundle | variant.reset.release_extra;
    port.control.modify(variant.control.reset, |v| v & !release);

    if let Some(poll) = &variant.control.reset_done {
        let done = (0..poll.polls).any(|_| {
            if port.control.read(poll.register) & poll.done != 0 {
                return true;
            }
            hal.stall(poll.interval);
            false
        });
        if !done {
            report.reset_done_timeout = true;
            tracing::warn!(
                controller = index,
                status = port.control.read(poll.register),
                "reset completion not reported"
            );
        }
    }

    if !variant.phy_tuning.is_empty() {
        let access = PhyAccess::new(port.dbi);
        if let Err(err) = phy::apply_tuning(&access, phy::lane_mask(lanes), variant.phy_tuning) {
            report.phy_tuning_failed = true;
            tracing::warn!(
                controller = index,
                error = &err as &dyn std::error::Error,
                "phy tuning abandoned"
            );
        }
    }

    if let (Some(msi), Some(id)) = (&variant.msi_translation, controller.msi_routing_id) {
        let shift = (msi.rcnum_shift)(index);
        let enable = (msi.enable)(index);
        let address = msi.register;
        let value = hal.read_u32(address);
        hal.write_u32(
            address,
            (value & !(msi.rcnum_mask << shift)) | ((id as u32 & msi.rcnum_mask) << shift) | enable,
        );
        tracing::debug!(
            controller = index,
            routing_id = id,
            "msi translation enabled"
        );
    }

    {
        let _guard = DbiWriteGuard::new(port.dbi);
        port.dbi.modify(cfg_space::CLASS_REVISION, |v| {
            (cfg_space::CLASS_CODE_PCI_BRIDGE << 8) | (v & 0xff)
        });
        if let Some(lanes) = controller.lanes {
            program_lanes(port.dbi, lanes);
        }
    }

    if let Some(perst) = &port.perst {
        perst.deassert();
    }

    for window in outbound_windows(controller) {
        if let Err(err) = iatu::program_window(hal, variant, index, controller.dbi_base, &window) {
            report.window_failures += 1;
            tracing::warn!(
                controller = index,
                region = window.region,
                error = &err as &dyn std::error::Error,
                "outbound window not programmed"
            );
        }
    }

    // Train at 2.5 GT/s first; late retraining raises the speed.
    port.dbi.modify(port_logic::LINK_CTL_STS_2, |v| {
        LinkControl2::from_bits(v as u16)
            .with_target_link_speed(LinkSpeed::Gen1.into_bits().into())
            .into_bits()
            .into()
    });

    port.set_ltssm_enable(true);
    tracing::debug!(controller = index, ?report, "ltssm enabled");
    report
}

fn program_lanes<H: PlatformHal + ?Sized>(dbi: RegisterBlock<'_, H>, lanes: LaneCount) {
    dbi.modify(port_logic::PORT_LINK_CONTROL, |v| {
        PortLinkControl::from_bits(v)
            .with_link_capable(lanes.link_capable())
            .into_bits()
    });
    if let Some(num_of_lanes) = lanes.gen2_num_lanes() {
        dbi.modify(port_logic::GEN2_CONTROL, |v| {
            Gen2Control::from_bits(v)
                .with_num_of_lanes(num_of_lanes)
                .into_bits()
        });
    }
    dbi.modify(port_logic::LINK_CAPS, |v| {
        LinkCapabilities::from_bits(v)
            .with_max_link_width(lanes.count())
            .into_bits()
    });
}

/// Pulses PERST# and the core reset around an LTSSM restart.
pub(crate) fn pulse_reset<H: PlatformHal + ?Sized>(port: &Port<'_, H>) {
    let core = port.variant.reset.core;
    port.set_ltssm_enable(false);
    if let Some(perst) = &port.perst {
        perst.assert();
    }
    port.control.modify(port.variant.control.reset, |v| v | core);
    port.hal().stall(RECOVERY_PULSE);
    port.control.modify(port.variant.control.reset, |v| v & !core);
    if let Some(perst) = &port.perst {
        perst.deassert();
    }
    port.set_ltssm_enable(true);
}
