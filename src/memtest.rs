//! Destructive read-back memory test.
//!
//! The SDRAM bring-up sequence is open loop, so a wrong timing set or a
//! bad clock delay trim shows up only as silent data corruption later.
//! Running these patterns over the freshly published region right after
//! bring-up catches gross mis-configuration early, at the cost of
//! clobbering the region's contents.

use crate::MemoryRegion;

/// Memory test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemTestError {
    /// Region base is not word aligned.
    Misaligned,
    /// A word read back differently than written.
    Mismatch {
        addr: usize,
        expected: u32,
        found: u32,
    },
}

fn check_region(region: &MemoryRegion) -> Result<usize, MemTestError> {
    if region.base % 4 != 0 {
        return Err(MemTestError::Misaligned);
    }
    Ok(region.size / 4)
}

fn fill(base: usize, words: usize, value: impl Fn(usize) -> u32) {
    let base_ptr = base as *mut u32;
    for i in 0..words {
        unsafe { core::ptr::write_volatile(base_ptr.add(i), value(i)) };
    }
}

fn verify(base: usize, words: usize, value: impl Fn(usize) -> u32) -> Result<(), MemTestError> {
    let base_ptr = base as *const u32;
    for i in 0..words {
        let found = unsafe { core::ptr::read_volatile(base_ptr.add(i)) };
        let expected = value(i);
        if found != expected {
            return Err(MemTestError::Mismatch {
                addr: base + i * 4,
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn fill_and_verify(
    base: usize,
    words: usize,
    value: impl Fn(usize) -> u32,
) -> Result<(), MemTestError> {
    fill(base, words, &value);
    verify(base, words, value)
}

/// Walk a single set bit through every bit position, writing the
/// pattern to the whole region and reading it back.
///
/// # Safety
///
/// Destroys the region's contents; the region must be writable memory
/// not in use by anything else.
pub unsafe fn walking_one(region: &MemoryRegion) -> Result<(), MemTestError> {
    let words = check_region(region)?;
    for bit in 0..32 {
        fill_and_verify(region.base, words, |_| 1u32 << bit)?;
    }
    Ok(())
}

/// Walk a single cleared bit through every bit position.
///
/// # Safety
///
/// Destroys the region's contents; the region must be writable memory
/// not in use by anything else.
pub unsafe fn walking_zero(region: &MemoryRegion) -> Result<(), MemTestError> {
    let words = check_region(region)?;
    for bit in 0..32 {
        fill_and_verify(region.base, words, |_| !(1u32 << bit))?;
    }
    Ok(())
}

/// Alternate 0xAAAAAAAA / 0x55555555 between neighboring words, both
/// phases. Catches shorted or stuck address and data lines.
///
/// # Safety
///
/// Destroys the region's contents; the region must be writable memory
/// not in use by anything else.
pub unsafe fn checkerboard(region: &MemoryRegion) -> Result<(), MemTestError> {
    let words = check_region(region)?;
    for pattern in [0xAAAA_AAAAu32, 0x5555_5555u32] {
        fill_and_verify(region.base, words, |i| {
            if i % 2 == 0 {
                pattern
            } else {
                !pattern
            }
        })?;
    }
    Ok(())
}

/// Run all patterns over the region.
///
/// # Safety
///
/// Destroys the region's contents; the region must be writable memory
/// not in use by anything else.
pub unsafe fn run_all(region: &MemoryRegion) -> Result<(), MemTestError> {
    unsafe {
        walking_one(region)?;
        walking_zero(region)?;
        checkerboard(region)?;
    }
    info!(
        "memtest: {} bytes at {:#x} ok",
        region.size, region.base
    );
    Ok(())
}
