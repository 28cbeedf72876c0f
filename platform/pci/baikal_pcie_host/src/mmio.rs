// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`PlatformHal`] over identity-mapped device memory.

// UNSAFETY: volatile accesses to raw physical register addresses.
#![expect(unsafe_code)]

use crate::hal::PlatformHal;
use std::sync::atomic::Ordering;
use std::sync::atomic::fence;
use std::time::Duration;

/// Direct volatile register access for firmware running with device memory
/// identity mapped.
pub struct DirectMmio {
    stall: fn(Duration),
}

impl DirectMmio {
    /// Creates the access layer. `stall` is the platform's calibrated
    /// busy-wait.
    ///
    /// # Safety
    ///
    /// Every address later passed to [`PlatformHal::read_u32`] or
    /// [`PlatformHal::write_u32`] must be a 4-byte aligned device register
    /// that is mapped at its physical address, uncached, for the lifetime of
    /// the returned value. Register writes have side effects on the
    /// hardware; the caller must own the controllers being driven.
    pub unsafe fn new(stall: fn(Duration)) -> Self {
        Self { stall }
    }
}

impl PlatformHal for DirectMmio {
    fn read_u32(&self, address: u64) -> u32 {
        let ptr = address as usize as *const u32;
        // SAFETY: the creator guaranteed the address is a mapped register.
        unsafe { ptr.read_volatile() }
    }

    fn write_u32(&self, address: u64, value: u32) {
        let ptr = address as usize as *mut u32;
        // SAFETY: the creator guaranteed the address is a mapped register.
        unsafe { ptr.write_volatile(value) }
    }

    fn memory_barrier(&self) {
        fence(Ordering::SeqCst);
    }

    fn stall(&self, duration: Duration) {
        (self.stall)(duration)
    }
}
