//! EMC branch clock configuration (CCU1 + CREG).
//!
//! The LPC4357 flash parts cannot run the external memory bus at the
//! full 204 MHz core clock. The supported configuration divides the
//! BASE_M4_CLK by two for the EMC: enable the EMC divider branch with
//! /2, select the divided clock in CREG6, then enable the EMC branch
//! clock itself.

use arbitrary_int::u3;

/// CCU1 register block base on the LPC43xx.
pub const CCU1_BASE: usize = 0x4005_1000;
/// CREG register block base on the LPC43xx.
pub const CREG_BASE: usize = 0x4004_3000;

/// Branch clock configuration register (CLK_*_CFG).
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct BranchClockConfig {
    /// Enable the branch clock.
    #[bit(0, rw)]
    run: bool,
    /// Auto low-power: gate the clock when the block is idle.
    #[bit(1, rw)]
    auto: bool,
    /// Wake the clock on a wake-up event.
    #[bit(2, rw)]
    wakeup: bool,
}

/// EMC divider branch configuration (CLK_M4_EMCDIV_CFG).
///
/// Same layout as [`BranchClockConfig`] plus the integer divider field.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct EmcDividerConfig {
    #[bit(0, rw)]
    run: bool,
    #[bit(1, rw)]
    auto: bool,
    #[bit(2, rw)]
    wakeup: bool,
    /// Integer divider selection: 0 = /1, 1 = /2.
    #[bits(5..=7, rw)]
    divider: u3,
}

/// CREG6 control register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Creg6 {
    /// EMC clock select: set = EMC runs from the divided M4 clock.
    #[bit(16, rw)]
    emc_clk_div2: bool,
}

/// Clock Control Unit 1, reduced to the registers the bring-up touches.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Ccu1 {
    /// Power mode register.
    pm: u32,
    /// Base clock status.
    #[mmio(PureRead)]
    base_stat: u32,
    _reserved0: [u32; 0x10A],
    /// CLK_M4_EMC branch configuration.
    clk_m4_emc_cfg: BranchClockConfig,
    #[mmio(PureRead)]
    clk_m4_emc_stat: u32,
    _reserved1: [u32; 0x10],
    /// CLK_M4_EMCDIV branch configuration.
    clk_m4_emcdiv_cfg: EmcDividerConfig,
    #[mmio(PureRead)]
    clk_m4_emcdiv_stat: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Ccu1>(), 0x480);

impl Ccu1 {
    /// Create the CCU1 MMIO instance at the fixed peripheral address.
    ///
    /// # Safety
    ///
    /// Creates a handle to a shared peripheral; the caller must ensure
    /// no concurrent conflicting access.
    pub const unsafe fn new_mmio_fixed() -> MmioCcu1<'static> {
        unsafe { Self::new_mmio_at(CCU1_BASE) }
    }
}

/// Configuration register block (CREG), reduced to CREG6.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Creg {
    _reserved0: [u32; 0x4B],
    /// CREG6 control register.
    creg6: Creg6,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Creg>(), 0x130);

impl Creg {
    /// Create the CREG MMIO instance at the fixed peripheral address.
    ///
    /// # Safety
    ///
    /// Creates a handle to a shared peripheral; the caller must ensure
    /// no concurrent conflicting access.
    pub const unsafe fn new_mmio_fixed() -> MmioCreg<'static> {
        unsafe { Self::new_mmio_at(CREG_BASE) }
    }
}

/// EMC clock divider selection.
///
/// Only /2 is electrically supported at full core clock, so it is the
/// only representable value. Running the EMC undivided would need a
/// different board design, not a different argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EmcClockDivider {
    Div2,
}

impl EmcClockDivider {
    const fn field_value(self) -> u3 {
        match self {
            EmcClockDivider::Div2 => u3::new(1),
        }
    }
}

/// Route the divided M4 clock to the EMC and start both branch clocks.
///
/// Order matters: the divider branch must be running and selected
/// before the EMC branch clock is enabled, so the controller never sees
/// the undivided clock.
pub fn configure_emc_clock(
    ccu: &mut MmioCcu1<'_>,
    creg: &mut MmioCreg<'_>,
    divider: EmcClockDivider,
) {
    ccu.modify_clk_m4_emcdiv_cfg(|mut cfg| {
        cfg.set_run(true);
        cfg.set_divider(divider.field_value());
        cfg
    });
    creg.modify_creg6(|mut creg6| {
        creg6.set_emc_clk_div2(true);
        creg6
    });
    ccu.modify_clk_m4_emc_cfg(|mut cfg| {
        cfg.set_run(true);
        cfg
    });
    debug!("emc clock: branch running, divider /2");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    #[test]
    fn emc_clock_register_values() {
        let mut ccu_mem = vec![0u32; 0x480 / 4];
        let mut creg_mem = vec![0u32; 0x130 / 4];
        let mut ccu = unsafe { Ccu1::new_mmio_at(ccu_mem.as_mut_ptr() as usize) };
        let mut creg = unsafe { Creg::new_mmio_at(creg_mem.as_mut_ptr() as usize) };

        configure_emc_clock(&mut ccu, &mut creg, EmcClockDivider::Div2);

        // EMCDIV: RUN | DIV=1 (/2)
        assert_eq!(ccu_mem[0x478 / 4], (1 << 0) | (1 << 5));
        // EMC branch: RUN
        assert_eq!(ccu_mem[0x430 / 4], 1 << 0);
        // CREG6: EMC clock select
        assert_eq!(creg_mem[0x12C / 4], 1 << 16);
    }
}
