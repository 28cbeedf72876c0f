// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! BS1000 glue: per-controller APB control block and controller address map.

use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Root ports on the die.
pub const CONTROLLER_COUNT: u32 = 14;
/// Widest port.
pub const MAX_LANES: u32 = 32;

/// DBI base of every controller, indexed by controller number. Units P0
/// and P1 carry four controllers each, P2 to P4 two each.
pub const DBI_BASES: [u64; CONTROLLER_COUNT as usize] = [
    0x3900_0000,
    0x3910_0000,
    0x3920_0000,
    0x3930_0000,
    0x3D00_0000,
    0x3D10_0000,
    0x3D20_0000,
    0x3D30_0000,
    0x4500_0000,
    0x4510_0000,
    0x4900_0000,
    0x4910_0000,
    0x4D00_0000,
    0x4D10_0000,
];

/// Controllers `0..WIDE_ADDRESS_CONTROLLERS` (units P0 and P1) decode 40
/// CPU address bits; the rest decode 39.
pub const WIDE_ADDRESS_CONTROLLERS: u32 = 8;

/// Offset of the unrolled iATU inside a controller's DBI window.
pub const IATU_UNROLLED_OFFSET: u64 = 0x8_0000;

/// PERST# GPIO controller.
pub const GPIO_BASE: u64 = 0x0C40_0000;

/// Offsets within a controller's APB block.
pub mod apb {
    /// Reset control, see [`super::ResetControl`].
    pub const PE_RST_CTRL: u16 = 0x04;
    /// Reset status, see [`super::ResetStatus`].
    pub const PE_RST_STS: u16 = 0x08;
    /// General control 3, see [`super::GeneralControl3`].
    pub const GEN_CTRL3: u16 = 0x58;
    /// Link debug status, see [`crate::dw::ltssm::LinkDebugStatus`].
    pub const LINK_DBG2: u16 = 0xB4;
}

/// APB reset control. A set bit holds the block in reset.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ResetControl {
    pub phy: bool,
    pub pipe0: bool,
    pub pipe1: bool,
    pub core: bool,
    pub power: bool,
    pub sticky: bool,
    pub non_sticky: bool,
    pub hot: bool,
    pub adb_power_down: bool,
    #[bits(23)]
    _reserved: u32,
}

/// APB reset status.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ResetStatus {
    /// Core and PHY have left reset.
    pub reset_done: bool,
    #[bits(31)]
    _reserved: u32,
}

/// APB general control 3.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct GeneralControl3 {
    pub ltssm_enable: bool,
    #[bits(31)]
    _reserved: u32,
}

/// Reset-done polls after the reset bundle is released.
pub const RESET_DONE_POLL_COUNT: u32 = 1000;
/// Delay between reset-done polls, in microseconds.
pub const RESET_DONE_POLL_INTERVAL_US: u64 = 10;
