// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Register definitions for the DesignWare PCIe root complexes on Baikal
//! BM1000 and BS1000 SoCs.
//!
//! Standard PCI/PCIe layouts live in [`cfg_space`] and [`caps`], the
//! DesignWare port logic shared by both SoCs in [`dw`], and the SoC glue
//! (reset/LTSSM control blocks, PHY access, GPIO) in [`bm1000`] and
//! [`bs1000`].

#![forbid(unsafe_code)]

pub mod bm1000;
pub mod bs1000;
pub mod dw;
pub mod gpio;

pub mod cfg_space {
    //! Type 0/1 configuration space header layout.

    /// Device ID (31:16) and Vendor ID (15:0).
    pub const DEVICE_VENDOR: u16 = 0x00;
    /// Status (31:16) and Command (15:0).
    pub const STATUS_COMMAND: u16 = 0x04;
    /// Class code (31:8) and Revision ID (7:0).
    pub const CLASS_REVISION: u16 = 0x08;
    /// Capabilities pointer, low byte.
    pub const CAP_PTR: u16 = 0x34;

    /// Offset of the first entry of the capability list on every Baikal
    /// downstream port and on the devices found behind it.
    pub const FIRST_CAPABILITY_OFFSET: u16 = 0x40;

    /// Value returned by a read that no function claimed.
    pub const INVALID_READ: u32 = !0;

    /// Vendor ID returned while a function answers with Configuration
    /// Request Retry Status.
    pub const CRS_VENDOR_ID: u16 = 0x0001;

    /// Class code of a PCI-to-PCI bridge (base 0x06, sub 0x04, prog-if 0).
    pub const CLASS_CODE_PCI_BRIDGE: u32 = 0x06_04_00;

    /// Byte offset of `register` for `bus:device.function` in an ECAM style
    /// (shift mode) configuration window.
    pub const fn ecam_offset(bus: u8, device: u8, function: u8, register: u16) -> u64 {
        ((bus as u64) << 20)
            | (((device & 0x1f) as u64) << 15)
            | (((function & 0x7) as u64) << 12)
            | (register & 0xfff) as u64
    }
}

pub mod caps {
    //! Capability list definitions.

    /// Capability ID of the PCI Express capability.
    pub const CAP_ID_PCI_EXPRESS: u8 = 0x10;

    /// Upper bound on capability list entries in the 256-byte legacy space.
    pub const MAX_CAPABILITIES: usize = 48;

    /// PCI Express capability
    #[expect(missing_docs)] // register offsets are self explanatory
    pub mod pci_express {
        use bitfield_struct::bitfield;
        use core::fmt;
        use zerocopy::FromBytes;
        use zerocopy::Immutable;
        use zerocopy::IntoBytes;
        use zerocopy::KnownLayout;

        pub const PCIE_CAPS: u16 = 0x00;
        pub const DEVICE_CAPS: u16 = 0x04;
        pub const DEVICE_CTL_STS: u16 = 0x08;
        pub const LINK_CAPS: u16 = 0x0C;
        /// Link Control (15:0) and Link Status (31:16).
        pub const LINK_CTL_STS: u16 = 0x10;
        pub const LINK_CAPS_2: u16 = 0x2C;
        /// Link Control 2 (15:0) and Link Status 2 (31:16).
        pub const LINK_CTL_STS_2: u16 = 0x30;

        /// PCIe link speed generation, as encoded in the Max Link Speed,
        /// Current Link Speed and Target Link Speed fields.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum LinkSpeed {
            /// 2.5 GT/s
            Gen1 = 1,
            /// 5.0 GT/s
            Gen2 = 2,
            /// 8.0 GT/s
            Gen3 = 3,
            /// 16.0 GT/s
            Gen4 = 4,
            /// 32.0 GT/s
            Gen5 = 5,
        }

        impl LinkSpeed {
            /// Decodes a raw speed field, `None` for reserved encodings.
            pub const fn from_bits(bits: u8) -> Option<Self> {
                Some(match bits {
                    1 => Self::Gen1,
                    2 => Self::Gen2,
                    3 => Self::Gen3,
                    4 => Self::Gen4,
                    5 => Self::Gen5,
                    _ => return None,
                })
            }

            pub const fn into_bits(self) -> u8 {
                self as u8
            }

            /// Transfer rate label.
            pub const fn rate(self) -> &'static str {
                match self {
                    Self::Gen1 => "2.5 GT/s",
                    Self::Gen2 => "5.0 GT/s",
                    Self::Gen3 => "8.0 GT/s",
                    Self::Gen4 => "16.0 GT/s",
                    Self::Gen5 => "32.0 GT/s",
                }
            }
        }

        impl fmt::Display for LinkSpeed {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.rate())
            }
        }

        /// Link Capabilities Register
        #[bitfield(u32)]
        #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
        pub struct LinkCapabilities {
            #[bits(4)]
            pub max_link_speed: u32,
            #[bits(6)]
            pub max_link_width: u32,
            #[bits(2)]
            pub aspm_support: u32,
            #[bits(3)]
            pub l0s_exit_latency: u32,
            #[bits(3)]
            pub l1_exit_latency: u32,
            pub clock_power_management: bool,
            pub surprise_down_error_reporting: bool,
            pub data_link_layer_link_active_reporting: bool,
            pub link_bandwidth_notification_capability: bool,
            pub aspm_optionality_compliance: bool,
            #[bits(1)]
            _reserved: u32,
            #[bits(8)]
            pub port_number: u32,
        }

        /// Link Control Register
        #[bitfield(u16)]
        #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
        pub struct LinkControl {
            #[bits(2)]
            pub aspm_control: u16,
            #[bits(1)]
            _reserved: u16,
            #[bits(1)]
            pub read_completion_boundary: u16,
            pub link_disable: bool,
            pub retrain_link: bool,
            pub common_clock_configuration: bool,
            pub extended_synch: bool,
            pub enable_clock_power_management: bool,
            pub hardware_autonomous_width_disable: bool,
            pub link_bandwidth_management_interrupt_enable: bool,
            pub link_autonomous_bandwidth_interrupt_enable: bool,
            #[bits(4)]
            _reserved2: u16,
        }

        /// Link Status Register
        #[bitfield(u16)]
        #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
        pub struct LinkStatus {
            #[bits(4)]
            pub current_link_speed: u16,
            #[bits(6)]
            pub negotiated_link_width: u16,
            #[bits(1)]
            _reserved: u16,
            pub link_training: bool,
            pub slot_clock_configuration: bool,
            pub data_link_layer_link_active: bool,
            pub link_bandwidth_management_status: bool,
            pub link_autonomous_bandwidth_status: bool,
        }

        /// Link Control 2 Register
        #[bitfield(u16)]
        #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
        pub struct LinkControl2 {
            #[bits(4)]
            pub target_link_speed: u16,
            pub enter_compliance: bool,
            pub hardware_autonomous_speed_disable: bool,
            #[bits(1)]
            pub selectable_de_emphasis: u16,
            #[bits(3)]
            pub transmit_margin: u16,
            pub enter_modified_compliance: bool,
            pub compliance_sos: bool,
            #[bits(4)]
            pub compliance_preset_de_emphasis: u16,
        }

        /// Splits the Link Control/Status dword into its two halves.
        pub fn split_link_ctl_sts(value: u32) -> (LinkControl, LinkStatus) {
            (
                LinkControl::from_bits(value as u16),
                LinkStatus::from_bits((value >> 16) as u16),
            )
        }

        /// Combines a Link Control value with an all-zero status half, so
        /// that write-1-to-clear status bits are left untouched.
        pub fn link_ctl_dword(control: LinkControl) -> u32 {
            control.into_bits() as u32
        }
    }
}
