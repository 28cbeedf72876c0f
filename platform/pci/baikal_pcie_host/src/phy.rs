// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Indirect PHY register access (BM1000).
//!
//! Each access selects the lanes, latches the address (with the write flag
//! for stores), and then waits for the done/busy handshake before the data
//! register is used.

use crate::hal::PlatformHal;
use crate::hal::RegisterBlock;
use crate::soc::PhyTuning;
use baikal_pcie_defs::bm1000::phy;
use baikal_pcie_defs::bm1000::phy::PhyAddress;
use baikal_pcie_defs::bm1000::phy::PhyStatus;
use std::time::Duration;
use thiserror::Error;

/// PHY access failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhyError {
    /// The handshake never completed.
    #[error("phy access to {address:#x} timed out with status {status:#x}")]
    Timeout {
        /// PHY register address
        address: u32,
        /// Last handshake status read
        status: u32,
    },
}

/// The PHY port of one controller's DBI.
pub struct PhyAccess<'a, H: ?Sized> {
    dbi: RegisterBlock<'a, H>,
}

impl<'a, H: PlatformHal + ?Sized> PhyAccess<'a, H> {
    /// Accesses the PHY behind `dbi`.
    pub fn new(dbi: RegisterBlock<'a, H>) -> Self {
        Self { dbi }
    }

    /// Reads PHY register `address` through the lanes in `lanes`.
    pub fn read(&self, lanes: u32, address: u32) -> Result<u32, PhyError> {
        self.dbi.write(phy::LANES, lanes);
        self.dbi.write(
            phy::ADDRESS,
            PhyAddress::new().with_address(address).into_bits(),
        );
        self.wait(address)?;
        Ok(self.dbi.read(phy::DATA))
    }

    /// Writes `value` to PHY register `address` on the lanes in `lanes`.
    pub fn write(&self, lanes: u32, address: u32, value: u32) -> Result<(), PhyError> {
        self.dbi.write(phy::LANES, lanes);
        self.dbi.write(
            phy::ADDRESS,
            PhyAddress::new()
                .with_address(address)
                .with_write(true)
                .into_bits(),
        );
        self.wait(address)?;
        self.dbi.write(phy::DATA, value);
        self.wait(address)
    }

    fn wait(&self, address: u32) -> Result<(), PhyError> {
        let mut status = PhyStatus::new();
        for _ in 0..phy::POLL_COUNT {
            status = PhyStatus::from_bits(self.dbi.read(phy::STATUS));
            if status.done() && !status.busy() {
                return Ok(());
            }
            self.dbi
                .hal()
                .stall(Duration::from_micros(phy::POLL_INTERVAL_US));
        }
        Err(PhyError::Timeout {
            address,
            status: status.into_bits(),
        })
    }
}

/// Lane select mask covering lanes `0..lanes`.
pub fn lane_mask(lanes: u32) -> u32 {
    if lanes >= 32 {
        u32::MAX
    } else {
        (1 << lanes) - 1
    }
}

/// Applies `table` read-modify-write on `lanes`. Stops at the first failed
/// access; entries already written stay applied.
pub fn apply_tuning<H: PlatformHal + ?Sized>(
    phy: &PhyAccess<'_, H>,
    lanes: u32,
    table: &[PhyTuning],
) -> Result<(), PhyError> {
    for entry in table {
        let current = phy.read(lanes, entry.address)?;
        let value = (current & !entry.mask) | (entry.value & entry.mask);
        phy.write(lanes, entry.address, value)?;
        tracing::debug!(
            register = entry.name,
            address = entry.address,
            value,
            "phy tuning applied"
        );
    }
    Ok(())
}
