// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Root bridge descriptors handed to the generic PCI enumerator.
//!
//! Apertures follow the UEFI host bridge convention: `base` and `limit` are
//! PCI bus addresses and `translation` is added to a CPU address to get the
//! bus address (`device = host + translation`), with wrap-around.

use crate::topology::BUS_WINDOW_SIZE;
use crate::topology::ControllerDescriptor;
use crate::topology::Window;
use crate::topology::WindowKind;
use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::little_endian::U16;
use zerocopy::little_endian::U32;

/// Highest bus number a segment can hold.
pub const MAX_BUS: u8 = 0xFF;

/// An address range forwarded by a root bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Aperture {
    /// First bus address.
    pub base: u64,
    /// Last bus address, inclusive.
    pub limit: u64,
    /// Bus address minus CPU address.
    pub translation: u64,
}

impl Aperture {
    /// The aperture of a bridge that forwards nothing.
    pub const EMPTY: Self = Self {
        base: u64::MAX,
        limit: 0,
        translation: 0,
    };

    /// Aperture covering `window`. The loader guarantees the window does
    /// not wrap; a hand-built one that does is clamped at `u64::MAX`.
    pub fn from_window(window: &Window) -> Self {
        Self {
            base: window.pci_base,
            limit: window.pci_base.saturating_add(window.size.saturating_sub(1)),
            translation: window.pci_base.wrapping_sub(window.cpu_base),
        }
    }

    /// True for [`Aperture::EMPTY`] and any other inverted range.
    pub fn is_empty(&self) -> bool {
        self.base > self.limit
    }
}

/// Bus numbers decoded by a root bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusRange {
    /// Root bus.
    pub base: u8,
    /// Last subordinate bus.
    pub limit: u8,
}

/// Resource allocation attributes of a root bridge.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct AllocationAttributes {
    /// Prefetchable memory is allocated from the non-prefetchable apertures.
    pub combine_mem_pmem: bool,
    /// The bridge decodes 64-bit memory.
    pub mem64_decode: bool,
    #[bits(62)]
    _reserved: u64,
}

/// Generic device path node header.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout)]
pub struct DevicePathHeader {
    /// Node type.
    pub kind: u8,
    /// Node subtype.
    pub sub_kind: u8,
    /// Node length in bytes, header included.
    pub length: U16,
}

const ACPI_DEVICE_PATH: u8 = 0x02;
const ACPI_DP: u8 = 0x01;
const END_DEVICE_PATH: u8 = 0x7F;
const END_ENTIRE_DEVICE_PATH: u8 = 0xFF;

/// Compressed EISA id of PNP0A08, a PCI Express root bridge.
pub const PNP0A08: u32 = 0x0A08_41D0;

/// `Acpi(PNP0A08, segment)` followed by the end node.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout)]
pub struct RootBridgeDevicePath {
    /// ACPI node header.
    pub header: DevicePathHeader,
    /// Compressed EISA HID.
    pub hid: U32,
    /// Unique id, the segment number.
    pub uid: U32,
    /// End of path.
    pub end: DevicePathHeader,
}

const_assert_eq!(size_of::<RootBridgeDevicePath>(), 16);

impl RootBridgeDevicePath {
    /// The device path of the root bridge of `segment`.
    pub fn new(segment: u32) -> Self {
        Self {
            header: DevicePathHeader {
                kind: ACPI_DEVICE_PATH,
                sub_kind: ACPI_DP,
                length: U16::new(12),
            },
            hid: U32::new(PNP0A08),
            uid: U32::new(segment),
            end: DevicePathHeader {
                kind: END_DEVICE_PATH,
                sub_kind: END_ENTIRE_DEVICE_PATH,
                length: U16::new(4),
            },
        }
    }
}

/// One root bridge, as published to the PCI enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBridge {
    /// PCI segment, equal to the controller index.
    pub segment: u32,
    /// Allocation attributes.
    pub allocation_attributes: AllocationAttributes,
    /// DMA above 4 GiB is supported.
    pub dma_above_4g: bool,
    /// Bus numbers.
    pub bus: BusRange,
    /// I/O space.
    pub io: Aperture,
    /// 32-bit memory.
    pub mem: Aperture,
    /// 64-bit memory.
    pub mem_above_4g: Aperture,
    /// 32-bit prefetchable memory; always empty, combined with `mem`.
    pub pmem: Aperture,
    /// 64-bit prefetchable memory; always empty, combined with
    /// `mem_above_4g`.
    pub pmem_above_4g: Aperture,
    /// Device path.
    pub device_path: RootBridgeDevicePath,
}

impl RootBridge {
    /// Describes the bridge of `controller`, whatever the state of its link.
    pub fn new(controller: &ControllerDescriptor) -> Self {
        let aperture = |kind| {
            controller
                .window(kind)
                .map_or(Aperture::EMPTY, Aperture::from_window)
        };
        let mem_above_4g = aperture(WindowKind::Mem64);
        let buses = controller.config_size / BUS_WINDOW_SIZE;
        Self {
            segment: controller.index,
            allocation_attributes: AllocationAttributes::new()
                .with_combine_mem_pmem(true)
                .with_mem64_decode(!mem_above_4g.is_empty()),
            dma_above_4g: true,
            bus: BusRange {
                base: 0,
                limit: buses.saturating_sub(1).min(MAX_BUS as u64) as u8,
            },
            io: aperture(WindowKind::Io),
            mem: aperture(WindowKind::Mem32),
            mem_above_4g,
            pmem: Aperture::EMPTY,
            pmem_above_4g: Aperture::EMPTY,
            device_path: RootBridgeDevicePath::new(controller.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::BM1000;
    use crate::test_helpers::bm1000_node;
    use crate::test_helpers::topology;

    #[test]
    fn apertures_from_windows() {
        let topology = topology(&BM1000, [bm1000_node(1)]);
        let controller = &topology.controllers()[0];
        let bridge = RootBridge::new(controller);
        assert_eq!(bridge.segment, 1);
        assert_eq!(bridge.bus, BusRange { base: 0, limit: 31 });

        let io = controller.window(WindowKind::Io).unwrap();
        assert_eq!(bridge.io.base, 0);
        assert_eq!(bridge.io.limit, 0xFFFF);
        // Bus address 0 sits below the CPU address, so the offset wraps.
        assert_eq!(bridge.io.translation, 0u64.wrapping_sub(io.cpu_base));
        let io_cpu = bridge.io.base.wrapping_sub(bridge.io.translation);
        assert_eq!(io_cpu, io.cpu_base);

        let mem = controller.window(WindowKind::Mem32).unwrap();
        assert_eq!(bridge.mem.base, mem.pci_base);
        assert_eq!(bridge.mem.limit, mem.pci_base + mem.size - 1);
        assert!(!bridge.mem_above_4g.is_empty());
        assert!(bridge.pmem.is_empty());
        assert!(bridge.allocation_attributes.combine_mem_pmem());
        assert!(bridge.allocation_attributes.mem64_decode());
    }

    #[test]
    fn missing_windows_are_empty() {
        let topology = topology(&BM1000, [bm1000_node(0).without("ranges")]);
        let bridge = RootBridge::new(&topology.controllers()[0]);
        assert_eq!(bridge.io, Aperture::EMPTY);
        assert_eq!(bridge.mem, Aperture::EMPTY);
        assert_eq!(bridge.mem_above_4g, Aperture::EMPTY);
        assert!(!bridge.allocation_attributes.mem64_decode());
    }

    #[test]
    fn device_path_bytes() {
        let path = RootBridgeDevicePath::new(2);
        assert_eq!(
            path.as_bytes(),
            &[
                0x02, 0x01, 0x0C, 0x00, // ACPI HID node, 12 bytes
                0xD0, 0x41, 0x08, 0x0A, // PNP0A08
                0x02, 0x00, 0x00, 0x00, // segment
                0x7F, 0xFF, 0x04, 0x00, // end
            ]
        );
    }
}
