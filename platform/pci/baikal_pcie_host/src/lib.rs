// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Root complex bring-up for the DesignWare PCIe controllers on Baikal
//! BM1000 and BS1000 SoCs.
//!
//! The flow is split in two phases driven by the embedder:
//!
//! 1. [`Topology::load`] reads the controller description from a
//!    device-tree style [`TopologySource`], and [`PcieHostBridge::bring_up`]
//!    resets each controller, programs its address translation windows,
//!    trains the link and publishes one [`RootBridge`] per controller.
//! 2. Later in boot, [`PcieHostBridge::retrain`] raises links that trained
//!    below what both ends support (BM1000 only).
//!
//! All register traffic goes through a [`PlatformHal`], so the engine runs
//! unchanged against real hardware ([`DirectMmio`]) or a simulation.

pub mod dt;
pub mod gpio;
pub mod hal;
pub mod host;
pub mod iatu;
pub mod link;
pub mod mmio;
pub mod phy;
pub mod reset;
pub mod retrain;
pub mod root_bridge;
pub mod soc;
pub mod topology;

mod port;

#[cfg(test)]
mod test_helpers;

pub use dt::DeviceTreeSnapshot;
pub use dt::TopologySource;
pub use hal::PlatformHal;
pub use host::PcieHostBridge;
pub use link::LinkOutcome;
pub use mmio::DirectMmio;
pub use retrain::RetrainPolicy;
pub use root_bridge::RootBridge;
pub use soc::SocVariant;
pub use topology::Topology;
