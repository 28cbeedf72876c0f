// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! BM1000 glue: LCRU general purpose registers and the indirect PHY port.

use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Root ports on the die.
pub const CONTROLLER_COUNT: u32 = 3;
/// Widest port.
pub const MAX_LANES: u32 = 8;

/// Base of the PCIe LCRU general purpose registers.
pub const LCRU_GPR_BASE: u64 = 0x0205_0000;
/// Size of one controller's slice of the LCRU.
pub const LCRU_GPR_STRIDE: u64 = 0x20;

/// Offsets within a controller's LCRU slice.
pub mod lcru {
    /// Reset control, see [`super::ResetControl`].
    pub const RESET: u16 = 0x00;
    /// Link debug status, see [`crate::dw::ltssm::LinkDebugStatus`].
    pub const STATUS: u16 = 0x04;
    /// General control, see [`super::GeneralControl`].
    pub const GENCTL: u16 = 0x08;
}

/// MSI translation control 2, global to the LCRU.
pub const MSI_TRANS_CTL2: u64 = LCRU_GPR_BASE + 0xF8;
/// Width of each controller's root complex number field.
pub const MSI_TRANS_RCNUM_MASK: u32 = 0x3;

/// Shift of controller `index`'s root complex number field in
/// [`MSI_TRANS_CTL2`].
pub const fn msi_trans_rcnum_shift(index: u32) -> u32 {
    index * 2
}

/// Translation enable bit of controller `index` in [`MSI_TRANS_CTL2`].
pub const fn msi_trans_enable(index: u32) -> u32 {
    1 << (9 + index)
}

/// PERST# GPIO controller.
pub const GPIO_BASE: u64 = 0x2020_0000;

/// LCRU reset control. A set bit holds the block in reset.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ResetControl {
    pub phy: bool,
    #[bits(3)]
    _reserved: u32,
    pub pipe0: bool,
    pub pipe1: bool,
    #[bits(2)]
    _reserved2: u32,
    pub core: bool,
    pub power: bool,
    pub sticky: bool,
    pub non_sticky: bool,
    pub hot: bool,
    pub adb_power_down: bool,
    #[bits(18)]
    _reserved3: u32,
}

/// LCRU general control.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct GeneralControl {
    #[bits(1)]
    _reserved: u32,
    pub ltssm_enable: bool,
    pub dbi2_mode: bool,
    pub phy_management_enable: bool,
    #[bits(28)]
    _reserved2: u32,
}

/// Indirect PHY register port, inside the DBI.
pub mod phy {
    use bitfield_struct::bitfield;
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    /// Lane select mask.
    pub const LANES: u16 = 0xB00;
    /// Address, see [`PhyAddress`].
    pub const ADDRESS: u16 = 0xB04;
    /// Data in/out.
    pub const DATA: u16 = 0xB08;
    /// Handshake status, see [`PhyStatus`].
    pub const STATUS: u16 = 0xB0C;

    /// Handshake polls before an access is abandoned.
    pub const POLL_COUNT: u32 = 1000;
    /// Delay between handshake polls, in microseconds.
    pub const POLL_INTERVAL_US: u64 = 1;

    /// PHY address register.
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct PhyAddress {
        #[bits(31)]
        pub address: u32,
        pub write: bool,
    }

    /// PHY handshake status.
    #[bitfield(u32)]
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct PhyStatus {
        pub done: bool,
        pub busy: bool,
        #[bits(30)]
        _reserved: u32,
    }

    /// Lane-broadcast receiver and transmitter equalization registers.
    #[expect(missing_docs)]
    pub mod regs {
        pub const RX_CTLE: u32 = 0x1017;
        pub const RX_AGC: u32 = 0x1018;
        pub const RX_DFE: u32 = 0x101A;
        pub const TX_BOOST: u32 = 0x1003;
        pub const TX_GAIN: u32 = 0x1004;
    }
}
