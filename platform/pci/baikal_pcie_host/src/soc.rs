// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Silicon variant descriptions.
//!
//! BM1000 and BS1000 wrap the same DesignWare core in different glue. The
//! bring-up algorithm is shared and reads every SoC-specific register
//! offset, bit and timing from one of the [`SocVariant`] statics below.

use baikal_pcie_defs::bm1000;
use baikal_pcie_defs::bs1000;
use std::time::Duration;

/// Where a controller's identity and register blocks come from in its
/// device tree node.
#[derive(Debug)]
pub enum RegLayout {
    /// `reg` named by `reg-names` (`"dbi"`, `"config"`); the controller
    /// index is the `baikal,pcie-lcru` argument, which also selects the
    /// controller's slice of a shared control block.
    Named {
        /// Base of the shared control block.
        control_base: u64,
        /// Size of one controller's slice.
        control_stride: u64,
    },
    /// `reg` holds the DBI, control (APB) and config regions in that order;
    /// the controller index is the position of the DBI base in `dbi_bases`.
    Positional {
        /// DBI base of every controller, by index.
        dbi_bases: &'static [u64],
    },
}

/// Offsets and bits of the reset/LTSSM control block.
#[derive(Debug)]
pub struct ControlBlock {
    /// Reset control register.
    pub reset: u16,
    /// Link debug status register.
    pub link_status: u16,
    /// Register holding the LTSSM enable bit.
    pub ltssm_control: u16,
    /// LTSSM enable bit.
    pub ltssm_enable: u32,
    /// Reset-done status, if the SoC reports one.
    pub reset_done: Option<ResetDonePoll>,
}

/// How to wait for the core to leave reset.
#[derive(Debug)]
pub struct ResetDonePoll {
    /// Status register.
    pub register: u16,
    /// Bit set once reset completes.
    pub done: u32,
    /// Polls before giving up.
    pub polls: u32,
    /// Delay between polls.
    pub interval: Duration,
}

/// Layout of the global MSI translation control register.
#[derive(Debug)]
pub struct MsiTranslation {
    /// Register address.
    pub register: u64,
    /// Width mask of a root complex number field.
    pub rcnum_mask: u32,
    /// Shift of controller `index`'s root complex number.
    pub rcnum_shift: fn(u32) -> u32,
    /// Translation enable bit of controller `index`.
    pub enable: fn(u32) -> u32,
}

/// Reset bits, written as one bundle.
#[derive(Debug)]
pub struct ResetBundle {
    /// Core, power, sticky, non-sticky, PHY and pipe 0 resets.
    pub base: u32,
    /// Pipe 1 reset, added for ports of eight lanes or more.
    pub pipe1: u32,
    /// Core reset alone, pulsed during link recovery.
    pub core: u32,
    /// Bits held since power-on (ADB power-down, hot reset) that are
    /// released together with the bundle.
    pub release_extra: u32,
    /// Minimum time the bundle stays asserted.
    pub hold: Duration,
}

impl ResetBundle {
    /// The bundle for a port trained on `lanes` lanes.
    pub fn assert_mask(&self, lanes: u32) -> u32 {
        if lanes >= 8 {
            self.base | self.pipe1
        } else {
            self.base
        }
    }
}

/// Outbound iATU register layout.
#[derive(Debug, Copy, Clone)]
pub enum IatuLayout {
    /// Regions selected through the viewport register.
    Viewport,
    /// Regions mapped at a fixed stride from `offset` into the DBI.
    Unrolled {
        /// Offset of region 0 from the DBI base.
        offset: u64,
    },
}

/// One PHY register adjustment, applied read-modify-write to all lanes.
#[derive(Debug)]
pub struct PhyTuning {
    /// Register name, for diagnostics.
    pub name: &'static str,
    /// PHY register address.
    pub address: u32,
    /// Bits replaced by `value`.
    pub mask: u32,
    /// New field value, already shifted into place.
    pub value: u32,
}

/// A silicon variant.
#[derive(Debug)]
pub struct SocVariant {
    /// Marketing name, for diagnostics.
    pub name: &'static str,
    /// `compatible` string of the PCIe nodes.
    pub compatible: &'static str,
    /// Number of root ports.
    pub controller_count: u32,
    /// Widest port, used for the PHY lane mask when no width is configured.
    pub max_lanes: u32,
    /// Device tree layout of a controller node.
    pub reg_layout: RegLayout,
    /// Reset and LTSSM control block.
    pub control: ControlBlock,
    /// Reset bits.
    pub reset: ResetBundle,
    /// iATU register layout.
    pub iatu: IatuLayout,
    /// Outbound iATU regions per controller.
    pub outbound_regions: u32,
    /// PERST# GPIO controller.
    pub gpio_base: u64,
    /// PHY equalization overrides; empty when the PHY needs none.
    pub phy_tuning: &'static [PhyTuning],
    /// MSI translation control, if MSIs carry a root complex number.
    pub msi_translation: Option<MsiTranslation>,
    /// Budget for reaching L0, measured from LTSSM enable and including the
    /// detect phase.
    pub link_up_timeout: Duration,
    /// Whether links may be retrained to a higher speed late in boot.
    pub supports_retrain: bool,
    /// CPU address bits decoded by controller `index`'s iATU.
    pub cpu_address_mask: fn(u32) -> u64,
}

/// Baikal-M (BM1000): three ports, up to x8, LCRU glue, viewport iATU.
pub static BM1000: SocVariant = SocVariant {
    name: "BM1000",
    compatible: "baikal,bm1000-pcie",
    controller_count: bm1000::CONTROLLER_COUNT,
    max_lanes: bm1000::MAX_LANES,
    reg_layout: RegLayout::Named {
        control_base: bm1000::LCRU_GPR_BASE,
        control_stride: bm1000::LCRU_GPR_STRIDE,
    },
    control: ControlBlock {
        reset: bm1000::lcru::RESET,
        link_status: bm1000::lcru::STATUS,
        ltssm_control: bm1000::lcru::GENCTL,
        ltssm_enable: bm1000::GeneralControl::new()
            .with_ltssm_enable(true)
            .into_bits(),
        reset_done: None,
    },
    reset: ResetBundle {
        base: bm1000::ResetControl::new()
            .with_core(true)
            .with_power(true)
            .with_sticky(true)
            .with_non_sticky(true)
            .with_phy(true)
            .with_pipe0(true)
            .into_bits(),
        pipe1: bm1000::ResetControl::new().with_pipe1(true).into_bits(),
        core: bm1000::ResetControl::new().with_core(true).into_bits(),
        release_extra: bm1000::ResetControl::new()
            .with_adb_power_down(true)
            .with_hot(true)
            .into_bits(),
        hold: Duration::from_nanos(100),
    },
    iatu: IatuLayout::Viewport,
    outbound_regions: 8,
    gpio_base: bm1000::GPIO_BASE,
    phy_tuning: &BM1000_PHY_TUNING,
    msi_translation: Some(MsiTranslation {
        register: bm1000::MSI_TRANS_CTL2,
        rcnum_mask: bm1000::MSI_TRANS_RCNUM_MASK,
        rcnum_shift: bm1000::msi_trans_rcnum_shift,
        enable: bm1000::msi_trans_enable,
    }),
    link_up_timeout: Duration::from_millis(200),
    supports_retrain: true,
    cpu_address_mask: |_| u64::MAX,
};

static BM1000_PHY_TUNING: [PhyTuning; 5] = {
    use bm1000::phy::regs;
    [
        PhyTuning {
            name: "rx_ctle",
            address: regs::RX_CTLE,
            mask: 0x00F0,
            value: 0x0040,
        },
        PhyTuning {
            name: "rx_agc",
            address: regs::RX_AGC,
            mask: 0x000F,
            value: 0x0006,
        },
        PhyTuning {
            name: "rx_dfe",
            address: regs::RX_DFE,
            mask: 0x0001,
            value: 0x0000,
        },
        PhyTuning {
            name: "tx_boost",
            address: regs::TX_BOOST,
            mask: 0x001F,
            value: 0x000A,
        },
        PhyTuning {
            name: "tx_gain",
            address: regs::TX_GAIN,
            mask: 0x0700,
            value: 0x0300,
        },
    ]
};

/// Baikal-S (BS1000): fourteen ports, up to x32, APB glue, unrolled iATU.
pub static BS1000: SocVariant = SocVariant {
    name: "BS1000",
    compatible: "baikal,bs1000-pcie",
    controller_count: bs1000::CONTROLLER_COUNT,
    max_lanes: bs1000::MAX_LANES,
    reg_layout: RegLayout::Positional {
        dbi_bases: &bs1000::DBI_BASES,
    },
    control: ControlBlock {
        reset: bs1000::apb::PE_RST_CTRL,
        link_status: bs1000::apb::LINK_DBG2,
        ltssm_control: bs1000::apb::GEN_CTRL3,
        ltssm_enable: bs1000::GeneralControl3::new()
            .with_ltssm_enable(true)
            .into_bits(),
        reset_done: Some(ResetDonePoll {
            register: bs1000::apb::PE_RST_STS,
            done: bs1000::ResetStatus::new().with_reset_done(true).into_bits(),
            polls: bs1000::RESET_DONE_POLL_COUNT,
            interval: Duration::from_micros(bs1000::RESET_DONE_POLL_INTERVAL_US),
        }),
    },
    reset: ResetBundle {
        base: bs1000::ResetControl::new()
            .with_core(true)
            .with_power(true)
            .with_sticky(true)
            .with_non_sticky(true)
            .with_phy(true)
            .with_pipe0(true)
            .into_bits(),
        pipe1: bs1000::ResetControl::new().with_pipe1(true).into_bits(),
        core: bs1000::ResetControl::new().with_core(true).into_bits(),
        release_extra: bs1000::ResetControl::new()
            .with_adb_power_down(true)
            .with_hot(true)
            .into_bits(),
        hold: Duration::from_micros(150),
    },
    iatu: IatuLayout::Unrolled {
        offset: bs1000::IATU_UNROLLED_OFFSET,
    },
    outbound_regions: 16,
    gpio_base: bs1000::GPIO_BASE,
    phy_tuning: &[],
    msi_translation: None,
    link_up_timeout: Duration::from_millis(100),
    supports_retrain: false,
    cpu_address_mask: bs1000_cpu_address_mask,
};

fn bs1000_cpu_address_mask(index: u32) -> u64 {
    let bits = if index < bs1000::WIDE_ADDRESS_CONTROLLERS {
        40
    } else {
        39
    };
    (1 << bits) - 1
}
