// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hardware access primitives the engine is written against.

use std::time::Duration;

/// Register access and delay services supplied by the platform.
///
/// Addresses are CPU physical addresses of 32-bit device registers.
pub trait PlatformHal {
    /// Reads the 32-bit register at `address`.
    fn read_u32(&self, address: u64) -> u32;

    /// Writes `value` to the 32-bit register at `address`.
    fn write_u32(&self, address: u64, value: u32);

    /// Orders all previous register writes before any later ones.
    fn memory_barrier(&self);

    /// Busy-waits for at least `duration`.
    fn stall(&self, duration: Duration);
}

impl<T: PlatformHal + ?Sized> PlatformHal for &T {
    fn read_u32(&self, address: u64) -> u32 {
        (**self).read_u32(address)
    }

    fn write_u32(&self, address: u64, value: u32) {
        (**self).write_u32(address, value)
    }

    fn memory_barrier(&self) {
        (**self).memory_barrier()
    }

    fn stall(&self, duration: Duration) {
        (**self).stall(duration)
    }
}

/// A block of registers at a fixed base address.
pub struct RegisterBlock<'a, H: ?Sized> {
    hal: &'a H,
    base: u64,
}

impl<H: ?Sized> Clone for RegisterBlock<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: ?Sized> Copy for RegisterBlock<'_, H> {}

impl<'a, H: PlatformHal + ?Sized> RegisterBlock<'a, H> {
    /// Creates a block rooted at `base`.
    pub fn new(hal: &'a H, base: u64) -> Self {
        Self { hal, base }
    }

    /// Base address of the block.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// The underlying access layer.
    pub fn hal(&self) -> &'a H {
        self.hal
    }

    /// Reads the register at `offset`.
    pub fn read(&self, offset: impl Into<u64>) -> u32 {
        self.hal.read_u32(self.base + offset.into())
    }

    /// Writes the register at `offset`.
    pub fn write(&self, offset: impl Into<u64>, value: u32) {
        self.hal.write_u32(self.base + offset.into(), value)
    }

    /// Read-modify-write of the register at `offset`, committed with a
    /// single write.
    pub fn modify(&self, offset: impl Into<u64>, f: impl FnOnce(u32) -> u32) {
        let address = self.base + offset.into();
        let value = self.hal.read_u32(address);
        self.hal.write_u32(address, f(value));
    }
}
