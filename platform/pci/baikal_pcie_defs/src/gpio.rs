// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! DesignWare APB GPIO, port A. Drives the PERST# lines on both SoCs.

/// Port A data register.
pub const SWPORTA_DR: u16 = 0x00;
/// Port A data direction register, 1 = output.
pub const SWPORTA_DDR: u16 = 0x04;
/// Pins per port.
pub const PINS: u32 = 32;
