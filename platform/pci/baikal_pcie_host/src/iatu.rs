// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Outbound address translation windows.

use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::soc::IatuLayout;
use crate::soc::SocVariant;
use baikal_pcie_defs::dw::iatu;
use baikal_pcie_defs::dw::iatu::RegionControl1;
use baikal_pcie_defs::dw::iatu::RegionControl2;
use baikal_pcie_defs::dw::iatu::RegionRegisters;
use thiserror::Error;

/// Transaction type generated by a window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WindowType {
    /// Memory reads and writes.
    Mem,
    /// I/O reads and writes.
    Io,
    /// Type 0 configuration requests, for the bus directly below the port.
    Cfg0,
    /// Type 1 configuration requests, for buses further down.
    Cfg1,
}

impl WindowType {
    fn region_type(self) -> u32 {
        match self {
            Self::Mem => iatu::TYPE_MEM,
            Self::Io => iatu::TYPE_IO,
            Self::Cfg0 => iatu::TYPE_CFG0,
            Self::Cfg1 => iatu::TYPE_CFG1,
        }
    }

    /// Config windows take bus/device/function from the address.
    fn shift_mode(self) -> bool {
        matches!(self, Self::Cfg0 | Self::Cfg1)
    }
}

/// One outbound region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OutboundWindow {
    /// Region number.
    pub region: u32,
    /// CPU base, before SoC address masking.
    pub cpu_base: u64,
    /// PCI base.
    pub pci_base: u64,
    /// Size in bytes.
    pub size: u64,
    /// Transaction type.
    pub kind: WindowType,
}

/// A window the iATU cannot represent. Nothing is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    /// Size below 64 KiB or not below 4 GiB.
    #[error("window size {0:#x} is outside [64 KiB, 4 GiB)")]
    Size(u64),
    /// A base or the size is not a multiple of 64 KiB.
    #[error("window cpu {cpu_base:#x} pci {pci_base:#x} size {size:#x} is not 64 KiB aligned")]
    Alignment {
        /// CPU base
        cpu_base: u64,
        /// PCI base
        pci_base: u64,
        /// Size
        size: u64,
    },
    /// The controller has fewer outbound regions.
    #[error("region {region} exceeds the {count} outbound regions")]
    Region {
        /// Requested region
        region: u32,
        /// Available regions
        count: u32,
    },
}

impl OutboundWindow {
    /// Checks the iATU's size and alignment rules.
    pub fn validate(&self, variant: &SocVariant) -> Result<(), WindowError> {
        if self.size < iatu::MIN_WINDOW_SIZE || self.size >= iatu::MAX_WINDOW_SIZE {
            return Err(WindowError::Size(self.size));
        }
        let granule = iatu::WINDOW_ALIGNMENT;
        if !self.cpu_base.is_multiple_of(granule)
            || !self.pci_base.is_multiple_of(granule)
            || !self.size.is_multiple_of(granule)
        {
            return Err(WindowError::Alignment {
                cpu_base: self.cpu_base,
                pci_base: self.pci_base,
                size: self.size,
            });
        }
        if self.region >= variant.outbound_regions {
            return Err(WindowError::Region {
                region: self.region,
                count: variant.outbound_regions,
            });
        }
        Ok(())
    }
}

/// Programs `window` into outbound region `window.region` of the controller
/// whose DBI is at `dbi_base`.
///
/// The region is disabled, its addresses written, and then enabled by the
/// final control write, so it is never live with a half-written mapping.
/// Programming the same window twice leaves the same register state.
pub fn program_window<H: PlatformHal + ?Sized>(
    hal: &H,
    variant: &SocVariant,
    index: u32,
    dbi_base: u64,
    window: &OutboundWindow,
) -> Result<(), WindowError> {
    window.validate(variant)?;

    let cpu_base = window.cpu_base & (variant.cpu_address_mask)(index);
    let cpu_limit = cpu_base + window.size - 1;

    let dbi = RegisterBlock::new(hal, dbi_base);
    let (block, regs): (RegisterBlock<'_, H>, RegionRegisters) = match variant.iatu {
        IatuLayout::Viewport => (dbi, iatu::VIEWPORT_REGISTERS),
        IatuLayout::Unrolled { offset } => (
            RegisterBlock::new(
                hal,
                dbi_base + offset + window.region as u64 * iatu::UNROLLED_REGION_STRIDE,
            ),
            iatu::UNROLLED_REGISTERS,
        ),
    };

    tracing::debug!(
        controller = index,
        region = window.region,
        kind = ?window.kind,
        cpu_base,
        cpu_limit,
        pci_base = window.pci_base,
        "programming outbound window"
    );

    hal.memory_barrier();
    if let IatuLayout::Viewport = variant.iatu {
        dbi.write(iatu::VIEWPORT, window.region);
    }
    block.write(regs.control_2, 0);
    block.write(regs.lower_base, cpu_base as u32);
    block.write(regs.upper_base, (cpu_base >> 32) as u32);
    block.write(regs.limit, cpu_limit as u32);
    block.write(regs.upper_limit, (cpu_limit >> 32) as u32);
    block.write(regs.lower_target, window.pci_base as u32);
    block.write(regs.upper_target, (window.pci_base >> 32) as u32);
    block.write(
        regs.control_1,
        RegionControl1::new()
            .with_region_type(window.kind.region_type())
            .into_bits(),
    );
    block.write(
        regs.control_2,
        RegionControl2::new()
            .with_region_enable(true)
            .with_cfg_shift_mode(window.kind.shift_mode())
            .into_bits(),
    );
    Ok(())
}
