// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! DesignWare PCIe core registers, as seen through the DBI block of a root
//! port.

pub mod port_logic {
    //! Port logic registers (vendor-specific extended space of the DBI).

    use bitfield_struct::bitfield;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// Offset of the root port's PCI Express capability inside the DBI.
    pub const PCIE_CAP_OFFSET: u16 = 0x70;
    /// Link Capabilities of the root port.
    pub const LINK_CAPS: u16 = PCIE_CAP_OFFSET + crate::caps::pci_express::LINK_CAPS;
    /// Link Control/Status of the root port.
    pub const LINK_CTL_STS: u16 = PCIE_CAP_OFFSET + crate::caps::pci_express::LINK_CTL_STS;
    /// Link Control 2/Status 2 of the root port.
    pub const LINK_CTL_STS_2: u16 = PCIE_CAP_OFFSET + crate::caps::pci_express::LINK_CTL_STS_2;

    /// PORT_LINK_CTRL
    pub const PORT_LINK_CONTROL: u16 = 0x710;
    /// GEN2_CTRL
    pub const GEN2_CONTROL: u16 = 0x80C;
    /// MISC_CONTROL_1
    pub const MISC_CONTROL_1: u16 = 0x8BC;

    /// Port Link Control Register
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct PortLinkControl {
        pub vendor_specific_dllp_request: bool,
        pub scramble_disable: bool,
        pub loopback_enable: bool,
        pub reset_assert: bool,
        #[bits(1)]
        _reserved: u32,
        pub dll_link_enable: bool,
        pub link_disable: bool,
        pub fast_link_mode: bool,
        #[bits(4)]
        pub link_rate: u32,
        #[bits(4)]
        _reserved2: u32,
        /// Lanes the port may train on, as a contiguous low mask (x4 = 0x07).
        #[bits(6)]
        pub link_capable: u32,
        #[bits(10)]
        _reserved3: u32,
    }

    /// Gen2 Control Register
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct Gen2Control {
        #[bits(8)]
        pub fast_training_sequences: u32,
        /// Predetermined lane count used during Configuration (1..=16).
        #[bits(5)]
        pub num_of_lanes: u32,
        #[bits(4)]
        _reserved: u32,
        pub direct_speed_change: bool,
        #[bits(14)]
        _reserved2: u32,
    }

    /// Misc Control 1 Register
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct MiscControl1 {
        /// Makes read-only config fields (class code, link capabilities)
        /// writable through the DBI.
        pub dbi_ro_write_enable: bool,
        #[bits(31)]
        _reserved: u32,
    }
}

pub mod iatu {
    //! Internal address translation unit, outbound direction.
    //!
    //! Older cores expose one region at a time through a viewport at 0x900;
    //! cores with the unrolled layout map every region at a fixed stride.

    use bitfield_struct::bitfield;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// Region select register of the viewport layout.
    pub const VIEWPORT: u16 = 0x900;
    /// Viewport direction bit, set for inbound regions.
    pub const VIEWPORT_INBOUND: u32 = 1 << 31;

    /// Register offsets relative to the selected region.
    #[derive(Debug, Copy, Clone)]
    pub struct RegionRegisters {
        /// Region Control 1
        pub control_1: u16,
        /// Region Control 2
        pub control_2: u16,
        /// Lower Base Address
        pub lower_base: u16,
        /// Upper Base Address
        pub upper_base: u16,
        /// Lower Limit Address
        pub limit: u16,
        /// Lower Target Address
        pub lower_target: u16,
        /// Upper Target Address
        pub upper_target: u16,
        /// Upper Limit Address
        pub upper_limit: u16,
    }

    /// Viewport layout, offsets within the DBI.
    pub const VIEWPORT_REGISTERS: RegionRegisters = RegionRegisters {
        control_1: 0x904,
        control_2: 0x908,
        lower_base: 0x90C,
        upper_base: 0x910,
        limit: 0x914,
        lower_target: 0x918,
        upper_target: 0x91C,
        upper_limit: 0x924,
    };

    /// Unrolled layout, offsets within one outbound region block.
    pub const UNROLLED_REGISTERS: RegionRegisters = RegionRegisters {
        control_1: 0x00,
        control_2: 0x04,
        lower_base: 0x08,
        upper_base: 0x0C,
        limit: 0x10,
        lower_target: 0x14,
        upper_target: 0x18,
        upper_limit: 0x20,
    };

    /// Distance between two outbound regions in the unrolled layout.
    pub const UNROLLED_REGION_STRIDE: u64 = 0x200;

    /// Region type: memory
    pub const TYPE_MEM: u32 = 0x0;
    /// Region type: I/O
    pub const TYPE_IO: u32 = 0x2;
    /// Region type: type 0 configuration
    pub const TYPE_CFG0: u32 = 0x4;
    /// Region type: type 1 configuration
    pub const TYPE_CFG1: u32 = 0x5;

    /// Granule of every base, target and size.
    pub const WINDOW_ALIGNMENT: u64 = 0x1_0000;
    /// Smallest window the unit can translate.
    pub const MIN_WINDOW_SIZE: u64 = WINDOW_ALIGNMENT;
    /// Exclusive upper bound of a window size.
    pub const MAX_WINDOW_SIZE: u64 = 1 << 32;

    /// Region Control 1
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct RegionControl1 {
        #[bits(5)]
        pub region_type: u32,
        #[bits(27)]
        _reserved: u32,
    }

    /// Region Control 2
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct RegionControl2 {
        #[bits(28)]
        _reserved: u32,
        /// Bus/device/function come from address bits 27:12 (ECAM style).
        pub cfg_shift_mode: bool,
        #[bits(2)]
        _reserved2: u32,
        pub region_enable: bool,
    }
}

pub mod ltssm {
    //! LTSSM state codes reported by the core's debug status.

    use bitfield_struct::bitfield;
    use core::fmt;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// A 6-bit LTSSM state code.
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct LtssmState(pub u8);

    macro_rules! ltssm_states {
        ($($name:ident = $value:expr,)*) => {
            #[expect(missing_docs)] // state names follow the core's databook
            impl LtssmState {
                $(pub const $name: Self = Self($value);)*

                /// Databook name of the state, `None` for unassigned codes.
                pub const fn name(self) -> Option<&'static str> {
                    match self {
                        $(Self::$name => Some(stringify!($name)),)*
                        _ => None,
                    }
                }
            }
        };
    }

    ltssm_states! {
        DETECT_QUIET = 0x00,
        DETECT_ACT = 0x01,
        POLL_ACTIVE = 0x02,
        POLL_COMPLIANCE = 0x03,
        POLL_CONFIG = 0x04,
        PRE_DETECT_QUIET = 0x05,
        DETECT_WAIT = 0x06,
        CFG_LINKWD_START = 0x07,
        CFG_LINKWD_ACEPT = 0x08,
        CFG_LANENUM_WAI = 0x09,
        CFG_LANENUM_ACEPT = 0x0A,
        CFG_COMPLETE = 0x0B,
        CFG_IDLE = 0x0C,
        RCVRY_LOCK = 0x0D,
        RCVRY_SPEED = 0x0E,
        RCVRY_RCVRCFG = 0x0F,
        RCVRY_IDLE = 0x10,
        L0 = 0x11,
        L0S = 0x12,
        L123_SEND_EIDLE = 0x13,
        L1_IDLE = 0x14,
        L2_IDLE = 0x15,
        L2_WAKE = 0x16,
        DISABLED_ENTRY = 0x17,
        DISABLED_IDLE = 0x18,
        DISABLED = 0x19,
        LPBK_ENTRY = 0x1A,
        LPBK_ACTIVE = 0x1B,
        LPBK_EXIT = 0x1C,
        LPBK_EXIT_TIMEOUT = 0x1D,
        HOT_RESET_ENTRY = 0x1E,
        HOT_RESET = 0x1F,
        RCVRY_EQ0 = 0x20,
        RCVRY_EQ1 = 0x21,
        RCVRY_EQ2 = 0x22,
        RCVRY_EQ3 = 0x23,
    }

    impl LtssmState {
        /// True once the receiver has seen a partner, i.e. the state machine
        /// left the Detect sub-states.
        pub const fn partner_detected(self) -> bool {
            self.0 > Self::DETECT_ACT.0
        }

        /// States from which the link does not make progress on its own.
        pub const fn is_lockup(self) -> bool {
            matches!(self, Self::POLL_COMPLIANCE | Self::PRE_DETECT_QUIET)
        }
    }

    impl fmt::Display for LtssmState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.name() {
                Some(name) => f.write_str(name),
                None => write!(f, "{:#04x}", self.0),
            }
        }
    }

    impl fmt::Debug for LtssmState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Display::fmt(self, f)
        }
    }

    /// Link debug status word, shared by the BM1000 LCRU and BS1000 APB
    /// status registers.
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct LinkDebugStatus {
        #[bits(6)]
        pub ltssm: u8,
        /// Physical layer up
        pub smlh_link_up: bool,
        /// Data link layer up
        pub rdlh_link_up: bool,
        #[bits(24)]
        _reserved: u32,
    }

    impl LinkDebugStatus {
        /// Decoded LTSSM state.
        pub fn state(&self) -> LtssmState {
            LtssmState(self.ltssm())
        }

        /// L0 with both the physical and data link layers up.
        pub fn is_link_up(&self) -> bool {
            self.state() == LtssmState::L0 && self.smlh_link_up() && self.rdlh_link_up()
        }
    }

}
