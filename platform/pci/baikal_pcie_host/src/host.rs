// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The PCIe host bridge: bring-up of every controller in a topology and the
//! published state that outlives it.

use crate::hal::PlatformHal;
use crate::link;
use crate::link::LinkOutcome;
use crate::port::Port;
use crate::reset;
use crate::reset::SequencerReport;
use crate::retrain;
use crate::retrain::RetrainOutcome;
use crate::retrain::RetrainPolicy;
use crate::retrain::RetrainReport;
use crate::root_bridge::RootBridge;
use crate::soc::SocVariant;
use crate::topology::ControllerDescriptor;
use crate::topology::Topology;

/// Negotiated speed and width read back from a live link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NegotiatedLink {
    /// Speed generation.
    pub speed: u8,
    /// Width in lanes.
    pub width: u8,
}

struct ControllerState {
    descriptor: ControllerDescriptor,
    sequencer: SequencerReport,
    outcome: LinkOutcome,
    cfg0_filter_works: bool,
    max_speed_seen: Option<u8>,
}

/// Brought-up PCIe subsystem of one SoC.
///
/// Built once by [`PcieHostBridge::bring_up`]; afterwards the root bridges
/// are fixed and only [`PcieHostBridge::retrain`] touches the hardware.
pub struct PcieHostBridge<H> {
    hal: H,
    variant: &'static SocVariant,
    controllers: Vec<ControllerState>,
    root_bridges: Vec<RootBridge>,
}

impl<H: PlatformHal> PcieHostBridge<H> {
    /// Resets every controller of `topology`, trains its link and publishes
    /// its root bridge.
    ///
    /// Never fails: a controller whose link does not come up is still
    /// published, as an empty bus.
    pub fn bring_up(hal: H, topology: Topology) -> Self {
        let variant = topology.variant();
        let mut controllers = Vec::with_capacity(topology.len());
        for descriptor in topology.into_controllers() {
            let port = Port::new(&hal, variant, &descriptor);
            tracing::info!(
                soc = variant.name,
                controller = descriptor.index,
                node = descriptor.name.as_str(),
                "bringing up pcie controller"
            );
            let sequencer = reset::reset_and_configure(&port);
            let outcome = link::train(&port);
            let cfg0_filter_works = outcome.is_up() && link::probe_cfg0_filter(&port);
            controllers.push(ControllerState {
                max_speed_seen: outcome.speed(),
                descriptor,
                sequencer,
                outcome,
                cfg0_filter_works,
            });
        }

        let root_bridges = controllers
            .iter()
            .map(|c| RootBridge::new(&c.descriptor))
            .collect();

        Self {
            hal,
            variant,
            controllers,
            root_bridges,
        }
    }

    fn controller(&self, index: u32) -> Option<&ControllerState> {
        self.controllers
            .iter()
            .find(|c| c.descriptor.index == index)
    }

    /// The published root bridges, one per controller, ordered by segment.
    pub fn root_bridges(&self) -> &[RootBridge] {
        &self.root_bridges
    }

    /// The silicon variant.
    pub fn variant(&self) -> &'static SocVariant {
        self.variant
    }

    /// Reads the live link state of controller `index`. Unknown controllers
    /// report no link.
    pub fn is_link_up(&self, index: u32) -> bool {
        self.controller(index).is_some_and(|c| {
            Port::new(&self.hal, self.variant, &c.descriptor)
                .link_debug()
                .is_link_up()
        })
    }

    /// Reads the live negotiated speed and width of controller `index`,
    /// `None` when the link is down.
    pub fn negotiated_link(&self, index: u32) -> Option<NegotiatedLink> {
        let c = self.controller(index)?;
        let port = Port::new(&self.hal, self.variant, &c.descriptor);
        if !port.link_debug().is_link_up() {
            return None;
        }
        let (_, status) = port.link_control_status();
        Some(NegotiatedLink {
            speed: status.current_link_speed() as u8,
            width: status.negotiated_link_width() as u8,
        })
    }

    /// How training ended for controller `index` during bring-up.
    pub fn link_outcome(&self, index: u32) -> Option<LinkOutcome> {
        self.controller(index).map(|c| c.outcome)
    }

    /// Highest speed controller `index` has trained at so far, `None` if its
    /// link never came up.
    pub fn max_link_speed_seen(&self, index: u32) -> Option<u8> {
        self.controller(index).and_then(|c| c.max_speed_seen)
    }

    /// Soft failures met while resetting controller `index`.
    pub fn sequencer_report(&self, index: u32) -> Option<SequencerReport> {
        self.controller(index).map(|c| c.sequencer)
    }

    /// True when controller `index`'s CFG0 window answers only for device 0,
    /// so config space below it can be walked without function aliasing.
    pub fn cfg0_filter_works(&self, index: u32) -> bool {
        self.controller(index).is_some_and(|c| c.cfg0_filter_works)
    }

    /// [`Self::cfg0_filter_works`] for every controller, bit N for index N.
    pub fn cfg0_filter_bitmap(&self) -> u32 {
        self.controllers
            .iter()
            .filter(|c| c.cfg0_filter_works)
            .fold(0, |bitmap, c| bitmap | 1 << c.descriptor.index)
    }

    /// Retrains live links towards the best speed both ends support.
    ///
    /// Meant to run once, after enumeration and before the OS takes over.
    /// Links already at their target are left untouched, so calling this
    /// again is harmless. SoCs without retrain support return no reports.
    pub fn retrain(&mut self, policy: &RetrainPolicy) -> Vec<RetrainReport> {
        if !self.variant.supports_retrain {
            tracing::debug!(soc = self.variant.name, "link retrain not supported");
            return Vec::new();
        }
        let mut reports = Vec::new();
        for c in &mut self.controllers {
            let port = Port::new(&self.hal, self.variant, &c.descriptor);
            if !port.link_debug().is_link_up() {
                continue;
            }
            let outcome = retrain::retrain_port(&port, policy);
            if let RetrainOutcome::Retrained { to, .. } = outcome {
                c.max_speed_seen = c.max_speed_seen.max(Some(to));
            }
            reports.push(RetrainReport {
                controller: c.descriptor.index,
                outcome,
            });
        }
        reports
    }
}
