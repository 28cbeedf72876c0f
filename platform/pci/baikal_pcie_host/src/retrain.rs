// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Late-boot link retraining.
//!
//! Links train at 2.5 GT/s during bring-up. Once enumeration is done, each
//! live link is asked to retrain at the highest speed both the downstream
//! device and the port's configured ceiling allow.

use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::port::Port;
use baikal_pcie_defs::caps;
use baikal_pcie_defs::caps::pci_express;
use baikal_pcie_defs::caps::pci_express::LinkCapabilities;
use baikal_pcie_defs::caps::pci_express::LinkControl;
use baikal_pcie_defs::caps::pci_express::LinkControl2;
use baikal_pcie_defs::cfg_space;
use baikal_pcie_defs::dw::ltssm::LtssmState;
use baikal_pcie_defs::dw::port_logic;
use std::time::Duration;

/// Retrain timing and retry knobs.
#[derive(Debug, Clone)]
pub struct RetrainPolicy {
    /// Time allowed for each retrain to get back to L0.
    pub budget: Duration,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Further attempts when a retrain lands below the target speed.
    pub extra_attempts: u32,
    /// Delay before each further attempt.
    pub settle: Duration,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(1),
            poll_interval: Duration::from_millis(1),
            extra_attempts: 1,
            settle: Duration::from_millis(200),
        }
    }
}

/// What retraining did to one port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
    /// The link already runs at the target speed; nothing was written.
    AtTarget {
        /// Current speed.
        speed: u8,
    },
    /// No PCI Express capability was found on the downstream device.
    NoCapability,
    /// The link came back in L0.
    Retrained {
        /// Speed before retraining.
        from: u8,
        /// Speed after the last attempt.
        to: u8,
        /// Speed asked for.
        target: u8,
        /// Retrain requests issued.
        attempts: u32,
    },
    /// The data link layer went down during retraining. The LTSSM is left
    /// disabled.
    LinkLost {
        /// LTSSM state when the loss was seen.
        ltssm: LtssmState,
        /// Retrain requests issued.
        attempts: u32,
    },
    /// The link did not return to L0 in time. The LTSSM is left disabled.
    TimedOut {
        /// LTSSM state at the deadline.
        ltssm: LtssmState,
        /// Retrain requests issued.
        attempts: u32,
    },
}

/// Per-controller retrain result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetrainReport {
    /// Controller index.
    pub controller: u32,
    /// Result.
    pub outcome: RetrainOutcome,
}

/// Walks the capability list of the function at `config`, starting at the
/// fixed first capability offset, and returns the offset of capability
/// `id`.
pub fn find_capability<H: PlatformHal + ?Sized>(
    config: RegisterBlock<'_, H>,
    id: u8,
) -> Option<u16> {
    let mut offset = cfg_space::FIRST_CAPABILITY_OFFSET;
    for _ in 0..caps::MAX_CAPABILITIES {
        if offset < cfg_space::FIRST_CAPABILITY_OFFSET {
            return None;
        }
        let header = config.read(offset);
        if header == cfg_space::INVALID_READ {
            return None;
        }
        if header as u8 == id {
            return Some(offset);
        }
        offset = ((header >> 8) & 0xFC) as u16;
    }
    None
}

enum Failure {
    Lost(LtssmState),
    TimedOut(LtssmState),
}

pub(crate) fn retrain_port<H: PlatformHal + ?Sized>(
    port: &Port<'_, H>,
    policy: &RetrainPolicy,
) -> RetrainOutcome {
    let index = port.index();
    let Some(cap) = find_capability(port.config, caps::CAP_ID_PCI_EXPRESS) else {
        tracing::debug!(controller = index, "no pcie capability downstream");
        return RetrainOutcome::NoCapability;
    };
    let device_speed =
        LinkCapabilities::from_bits(port.config.read(cap + pci_express::LINK_CAPS))
            .max_link_speed() as u8;
    let target = device_speed.min(port.controller.max_link_speed);
    let (_, status) = port.link_control_status();
    let from = status.current_link_speed() as u8;
    if target <= from {
        tracing::debug!(
            controller = index,
            speed = from,
            device_speed,
            "link already at target speed"
        );
        return RetrainOutcome::AtTarget { speed: from };
    }

    port.dbi.modify(port_logic::LINK_CTL_STS_2, |v| {
        LinkControl2::from_bits(v as u16)
            .with_target_link_speed(target.into())
            .into_bits()
            .into()
    });

    let mut attempts = 0;
    loop {
        attempts += 1;
        match retrain_once(port, policy) {
            Ok(speed) if speed < target && attempts <= policy.extra_attempts => {
                tracing::info!(
                    controller = index,
                    speed,
                    target,
                    "link retrained below target, retrying"
                );
                port.hal().stall(policy.settle);
            }
            Ok(speed) => {
                tracing::info!(
                    controller = index,
                    from,
                    to = speed,
                    target,
                    attempts,
                    "link retrained"
                );
                return RetrainOutcome::Retrained {
                    from,
                    to: speed,
                    target,
                    attempts,
                };
            }
            Err(failure) => {
                port.set_ltssm_enable(false);
                let outcome = match failure {
                    Failure::Lost(ltssm) => RetrainOutcome::LinkLost { ltssm, attempts },
                    Failure::TimedOut(ltssm) => RetrainOutcome::TimedOut { ltssm, attempts },
                };
                tracing::warn!(controller = index, target, ?outcome, "link retrain failed");
                return outcome;
            }
        }
    }
}

fn retrain_once<H: PlatformHal + ?Sized>(
    port: &Port<'_, H>,
    policy: &RetrainPolicy,
) -> Result<u8, Failure> {
    port.dbi.modify(port_logic::LINK_CTL_STS, |v| {
        pci_express::link_ctl_dword(LinkControl::from_bits(v as u16).with_retrain_link(true))
    });

    let mut waited = Duration::ZERO;
    let mut ltssm = port.link_debug().state();
    while waited < policy.budget {
        port.hal().stall(policy.poll_interval);
        waited += policy.poll_interval;
        let debug = port.link_debug();
        let (_, link) = port.link_control_status();
        ltssm = debug.state();
        if !link.data_link_layer_link_active() {
            return Err(Failure::Lost(ltssm));
        }
        if debug.is_link_up() && !link.link_training() {
            return Ok(link.current_link_speed() as u8);
        }
    }
    Err(Failure::TimedOut(ltssm))
}
