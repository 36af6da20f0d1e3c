//! System Control Unit (SCU) pin multiplexing.
//!
//! Every LPC43xx pad has one 32-bit SFS (pin function select) register
//! choosing among up to eight alternate functions plus electrical
//! properties. Bring-up is a flat list of `(pin, function)` writes;
//! when a pin appears more than once the last entry wins, mirroring the
//! last-write-wins behavior of the register itself.

use arbitrary_int::{u2, u3};

/// SCU register block base on the LPC43xx.
pub const SCU_BASE: usize = 0x4008_6000;

/// Pseudo-port used to address the four dedicated EMC clock pads
/// (CLK0..CLK3). They live in a separate SFSCLK register bank but are
/// configured through the same table as ordinary pins.
pub const CLOCK_PAD_PORT: u8 = 0x18;

const SFSCLK_OFFSET: usize = 0xC00;
const EMCDELAYCLK_OFFSET: usize = 0xD00;

/// Pad function select value.
///
/// Matches the SFSP register layout; built once as a constant per pin
/// class and written verbatim.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct PinFunction {
    /// Alternate function number (0..=7).
    #[bits(0..=2, rw)]
    function: u3,
    /// Enable the on-pad pull-down.
    #[bit(3, rw)]
    pull_down: bool,
    /// Disable the on-pad pull-up (set = pull-up off).
    #[bit(4, rw)]
    disable_pull_up: bool,
    /// Fast slew rate.
    #[bit(5, rw)]
    fast_slew: bool,
    /// Enable the input buffer. Required for any pin the core reads,
    /// and for high-speed outputs like EMC clocks which the controller
    /// samples back.
    #[bit(6, rw)]
    input_buffer: bool,
    /// Disable the input glitch filter (set = filter off). High-speed
    /// signals need the filter bypassed.
    #[bit(7, rw)]
    disable_filter: bool,
    /// Drive strength (high-drive pads only).
    #[bits(8..=9, rw)]
    drive: u2,
}

impl PinFunction {
    /// EMC bus pad: pull-up off, fast slew, input buffer on, filter off.
    pub const fn emc(function: u8) -> Self {
        Self::new_with_raw_value(0)
            .with_function(u3::new(function))
            .with_disable_pull_up(true)
            .with_fast_slew(true)
            .with_input_buffer(true)
            .with_disable_filter(true)
    }

    /// GPIO input pad: pull-up left on, input buffer on.
    pub const fn gpio_input(function: u8) -> Self {
        Self::new_with_raw_value(0)
            .with_function(u3::new(function))
            .with_input_buffer(true)
    }

    /// UART transmit pad: plain output, pull-up off.
    pub const fn uart_tx(function: u8) -> Self {
        Self::new_with_raw_value(0)
            .with_function(u3::new(function))
            .with_disable_pull_up(true)
    }

    /// UART receive pad: input buffer on, pull-up off.
    pub const fn uart_rx(function: u8) -> Self {
        Self::new_with_raw_value(0)
            .with_function(u3::new(function))
            .with_disable_pull_up(true)
            .with_input_buffer(true)
    }

    /// Ethernet MII/MDIO pad: like an EMC pad but at normal slew.
    pub const fn ethernet(function: u8) -> Self {
        Self::new_with_raw_value(0)
            .with_function(u3::new(function))
            .with_disable_pull_up(true)
            .with_input_buffer(true)
            .with_disable_filter(true)
    }
}

/// A pad identified by SCU port and pin number.
///
/// `port` is the SCU group (P0..PF), not a GPIO port. The dedicated
/// clock pads use the [`CLOCK_PAD_PORT`] pseudo-port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId {
    pub port: u8,
    pub pin: u8,
}

impl PinId {
    pub const fn new(port: u8, pin: u8) -> Self {
        Self { port, pin }
    }
}

/// One entry of a pin configuration table.
#[derive(Debug, Clone, Copy)]
pub struct PinConfig {
    pub pin: PinId,
    pub function: PinFunction,
}

impl PinConfig {
    pub const fn new(port: u8, pin: u8, function: PinFunction) -> Self {
        Self {
            pin: PinId::new(port, pin),
            function,
        }
    }
}

/// SCU register bank accessor.
///
/// Plain base-plus-offset volatile writes; taking the base as a
/// parameter lets tests point it at host memory.
pub struct Scu {
    base: usize,
}

impl Scu {
    /// # Safety
    ///
    /// `base` must be the SCU register block (or, in tests, writable
    /// memory of at least 0xD04 bytes) for the lifetime of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn sfs_addr(&self, pin: PinId) -> *mut u32 {
        let offset = if pin.port == CLOCK_PAD_PORT {
            SFSCLK_OFFSET + pin.pin as usize * 4
        } else {
            pin.port as usize * 0x80 + pin.pin as usize * 4
        };
        (self.base + offset) as *mut u32
    }

    /// Program one pad.
    pub fn set_pin_function(&mut self, pin: PinId, function: PinFunction) {
        unsafe { self.sfs_addr(pin).write_volatile(function.raw_value()) }
    }

    /// Apply a pin table in order. Later entries for the same pad
    /// overwrite earlier ones.
    pub fn apply<'a>(&mut self, table: impl IntoIterator<Item = &'a PinConfig>) {
        let mut count = 0usize;
        for cfg in table {
            self.set_pin_function(cfg.pin, cfg.function);
            count += 1;
        }
        trace!("scu: applied {} pin configs", count);
    }

    /// Program the EMC clock output delay trim (EMCDELAYCLK).
    ///
    /// Four 4-bit fields, one per CLK pad, in ~0.5 ns steps.
    pub fn set_emc_clock_delay(&mut self, trim: u16) {
        unsafe {
            ((self.base + EMCDELAYCLK_OFFSET) as *mut u32).write_volatile(trim as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn host_scu() -> (vec::Vec<u32>, Scu) {
        let mut mem = vec![0u32; 0xD04 / 4];
        let scu = unsafe { Scu::new(mem.as_mut_ptr() as usize) };
        (mem, scu)
    }

    #[test]
    fn sfs_offset_per_port_and_pin() {
        let (mem, mut scu) = host_scu();
        scu.set_pin_function(PinId::new(1, 6), PinFunction::emc(3));
        assert_eq!(mem[(1 * 0x80 + 6 * 4) / 4], PinFunction::emc(3).raw_value());
    }

    #[test]
    fn clock_pads_use_sfsclk_bank() {
        let (mem, mut scu) = host_scu();
        scu.set_pin_function(PinId::new(CLOCK_PAD_PORT, 2), PinFunction::emc(0));
        assert_eq!(mem[(0xC00 + 2 * 4) / 4], PinFunction::emc(0).raw_value());
        // Ordinary bank untouched.
        assert!(mem[..0xC00 / 4].iter().all(|&w| w == 0));
    }

    #[test]
    fn last_write_wins() {
        let (mem, mut scu) = host_scu();
        let table = [
            PinConfig::new(2, 9, PinFunction::emc(3)),
            PinConfig::new(2, 9, PinFunction::gpio_input(0)),
        ];
        scu.apply(&table);
        assert_eq!(mem[(2 * 0x80 + 9 * 4) / 4], PinFunction::gpio_input(0).raw_value());
    }

    #[test]
    fn emc_delay_trim() {
        let (mem, mut scu) = host_scu();
        scu.set_emc_clock_delay(0x7777);
        assert_eq!(mem[0xD00 / 4], 0x7777);
    }

    #[test]
    fn emc_function_value() {
        // function | EPUN | EHS | EZI | ZIF
        assert_eq!(PinFunction::emc(3).raw_value(), 3 | 0x10 | 0x20 | 0x40 | 0x80);
    }
}
