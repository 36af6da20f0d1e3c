//! Early board bring-up for LPC43xx boards.
//!
//! Brings the External Memory Controller (EMC) from reset into an
//! operational state: pin multiplexing through the SCU, SDRAM power-up
//! sequencing, NOR flash wait-state programming, and boot-source
//! detection from OTP fuses or GPIO strap pins.
//!
//! The crate targets the Keil MCB4300 (LPC4357) reference board; see
//! [`board::Mcb4300`] for the composed bring-up entry point. All
//! peripheral accessors accept an arbitrary base address, so every
//! driver can also run against plain memory on the host for testing.
//!
//! The bring-up sequence is open loop: no step reads back chip state,
//! and a mis-programmed timing set surfaces only as later data
//! corruption. [`memtest`] offers an explicit post-init read-back check
//! for callers that want one.
#![no_std]

#[cfg(test)]
extern crate std;

// This must go first, so that the macros are visible in the other modules.
mod fmt;

pub mod board;
pub mod bootsrc;
pub mod ccu;
pub mod emc;
pub mod gpio;
pub mod memtest;
pub mod otp;
pub mod scu;

pub use board::{BoardInfo, BringupConfig, Mcb4300, NorConfig};
pub use bootsrc::{BootCode, BootSource};
pub use ccu::EmcClockDivider;
pub use emc::sdram::{Mt48lc4m32b2, SdramChip, SdramConfig};
pub use emc::StaticMemoryTiming;

/// Bring-up error.
///
/// The hardware offers no runtime feedback during the sequence itself,
/// so the only detectable failures are configuration values that do not
/// fit their register fields. These are rejected before any register is
/// touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringupError {
    /// A timing value exceeds the width of its register field.
    InvalidTiming,
    /// Chip-select index outside 0..=3.
    InvalidChipSelect,
}

/// A memory region made usable by the bring-up sequence.
///
/// Published to the caller once the SDRAM reaches normal operation, so
/// later boot stages (relocation, heap setup) know what they can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryRegion {
    /// Base address on the system bus.
    pub base: usize,
    /// Size in bytes.
    pub size: usize,
}

impl MemoryRegion {
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }
}
