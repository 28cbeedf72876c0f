// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Link training after LTSSM enable.
//!
//! Training is watched in two phases. Until the LTSSM leaves Detect the
//! port waits for a partner; once one is seen it waits for L0 with both the
//! physical and data link layers up. A link that falls into
//! Polling.Compliance or Pre.Detect.Quiet gets one reset pulse and a fresh
//! budget; a second lockup ends training.

use crate::hal::PlatformHal;
use crate::port::Port;
use crate::reset;
use baikal_pcie_defs::cfg_space;
use baikal_pcie_defs::dw::ltssm::LinkDebugStatus;
use baikal_pcie_defs::dw::ltssm::LtssmState;
use std::time::Duration;

/// Time allowed for a partner to appear after LTSSM enable.
pub const DETECT_TIMEOUT: Duration = Duration::from_millis(50);
/// Delay between link status polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Time allowed for the device behind a fresh link to answer config reads.
pub const CFG0_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Terminal result of link training on one port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// No receiver was detected. The LTSSM is left disabled.
    NoPartner {
        /// LTSSM state at the deadline.
        ltssm: LtssmState,
    },
    /// The link reached L0.
    LinkUp {
        /// Negotiated speed generation.
        speed: u8,
        /// Negotiated width in lanes.
        width: u8,
        /// Time since the LTSSM was (re-)enabled.
        elapsed: Duration,
        /// A lockup recovery pulse was needed.
        recovered: bool,
    },
    /// A partner was seen but the link never reached L0, or locked up a
    /// second time. The LTSSM is left disabled.
    Timeout {
        /// LTSSM state when training was abandoned.
        ltssm: LtssmState,
        /// Time since the LTSSM was (re-)enabled.
        elapsed: Duration,
        /// A lockup recovery pulse was issued.
        recovered: bool,
    },
}

impl LinkOutcome {
    /// True for [`LinkOutcome::LinkUp`].
    pub fn is_up(&self) -> bool {
        matches!(self, Self::LinkUp { .. })
    }

    /// Negotiated speed, for links that came up.
    pub fn speed(&self) -> Option<u8> {
        match *self {
            Self::LinkUp { speed, .. } => Some(speed),
            _ => None,
        }
    }
}

/// Watches training on a port whose LTSSM was just enabled until one of
/// the terminal outcomes is reached.
pub(crate) fn train<H: PlatformHal + ?Sized>(port: &Port<'_, H>) -> LinkOutcome {
    let index = port.index();
    let hal = port.hal();
    let mut elapsed = Duration::ZERO;

    let mut status = port.link_debug();
    while !status.state().partner_detected() {
        if elapsed >= DETECT_TIMEOUT {
            port.set_ltssm_enable(false);
            let outcome = LinkOutcome::NoPartner {
                ltssm: status.state(),
            };
            log_outcome(index, &status, &outcome);
            return outcome;
        }
        hal.stall(POLL_INTERVAL);
        elapsed += POLL_INTERVAL;
        status = port.link_debug();
    }
    tracing::debug!(
        controller = index,
        ltssm = %status.state(),
        elapsed_ms = elapsed.as_millis() as u64,
        "link partner detected"
    );

    let budget = port.variant.link_up_timeout;
    let mut recovered = false;
    loop {
        if status.is_link_up() {
            let (_, link) = port.link_control_status();
            let outcome = LinkOutcome::LinkUp {
                speed: link.current_link_speed() as u8,
                width: link.negotiated_link_width() as u8,
                elapsed,
                recovered,
            };
            log_outcome(index, &status, &outcome);
            return outcome;
        }

        let state = status.state();
        if state.is_lockup() {
            if !recovered {
                tracing::warn!(
                    controller = index,
                    ltssm = %state,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "link locked up, pulsing reset"
                );
                reset::pulse_reset(port);
                recovered = true;
                elapsed = Duration::ZERO;
                status = port.link_debug();
                continue;
            }
            return give_up(port, &status, elapsed, recovered);
        }

        if elapsed >= budget {
            return give_up(port, &status, elapsed, recovered);
        }
        hal.stall(POLL_INTERVAL);
        elapsed += POLL_INTERVAL;
        status = port.link_debug();
    }
}

fn give_up<H: PlatformHal + ?Sized>(
    port: &Port<'_, H>,
    status: &LinkDebugStatus,
    elapsed: Duration,
    recovered: bool,
) -> LinkOutcome {
    port.set_ltssm_enable(false);
    let outcome = LinkOutcome::Timeout {
        ltssm: status.state(),
        elapsed,
        recovered,
    };
    log_outcome(port.index(), status, &outcome);
    outcome
}

fn log_outcome(index: u32, status: &LinkDebugStatus, outcome: &LinkOutcome) {
    let ltssm = status.state();
    let smlh = status.smlh_link_up();
    let rdlh = status.rdlh_link_up();
    match *outcome {
        LinkOutcome::NoPartner { .. } => {
            tracing::info!(controller = index, %ltssm, smlh, rdlh, "no link partner")
        }
        LinkOutcome::LinkUp {
            speed,
            width,
            elapsed,
            recovered,
        } => tracing::info!(
            controller = index,
            %ltssm,
            smlh,
            rdlh,
            elapsed_ms = elapsed.as_millis() as u64,
            speed,
            width,
            recovered,
            "link up"
        ),
        LinkOutcome::Timeout {
            elapsed, recovered, ..
        } => tracing::warn!(
            controller = index,
            %ltssm,
            smlh,
            rdlh,
            elapsed_ms = elapsed.as_millis() as u64,
            recovered,
            "link training timed out"
        ),
    }
}

/// All ones or a Configuration Request Retry Status vendor ID.
fn is_pending(id: u32) -> bool {
    id == cfg_space::INVALID_READ || id as u16 == cfg_space::CRS_VENDOR_ID
}

/// Checks whether the CFG0 window answers only for device 0.
///
/// Some devices need a while after link up before they answer config
/// reads; the ID register is written with all ones and re-read until a
/// real ID shows up or the probe budget runs out.
pub(crate) fn probe_cfg0_filter<H: PlatformHal + ?Sized>(port: &Port<'_, H>) -> bool {
    let hal = port.hal();
    let mut waited = Duration::ZERO;
    let mut id = port.config.read(cfg_space::DEVICE_VENDOR);
    while is_pending(id) && waited < CFG0_PROBE_TIMEOUT {
        port.config.write(cfg_space::DEVICE_VENDOR, cfg_space::INVALID_READ);
        hal.stall(POLL_INTERVAL);
        waited += POLL_INTERVAL;
        id = port.config.read(cfg_space::DEVICE_VENDOR);
    }

    let alias = port
        .config
        .read(cfg_space::ecam_offset(0, 1, 0, cfg_space::DEVICE_VENDOR));
    let works = id != 0 && !is_pending(id) && alias == cfg_space::INVALID_READ;
    tracing::debug!(
        controller = port.index(),
        id,
        alias,
        waited_ms = waited.as_millis() as u64,
        works,
        "cfg0 filter probe"
    );
    works
}
