//! External Memory Controller (EMC) driver.
//!
//! Covers the register-level interface: controller enable, endianness,
//! per-chip-select dynamic (SDRAM) and static (NOR) configuration, and
//! the shared dynamic timing registers. The SDRAM power-up sequencing
//! built on top of it lives in [`sdram`].
//!
//! The per-chip-select banks repeat at a fixed stride, so the block is
//! accessed through a base-plus-offset accessor rather than one flat
//! register struct.

use arbitrary_int::{u2, u11};

use crate::BringupError;

pub mod sdram;

/// EMC register block base on the LPC43xx.
pub const EMC_BASE: usize = 0x4000_5000;

/// Number of chip selects per bank type (dynamic and static alike).
pub const CHIP_SELECTS: u8 = 4;

const CONTROL: usize = 0x000;
const CONFIG: usize = 0x008;
const DYNAMIC_CONTROL: usize = 0x020;
const DYNAMIC_REFRESH: usize = 0x024;
const DYNAMIC_READ_CONFIG: usize = 0x028;
const DYNAMIC_TIMING: usize = 0x030;
const DYNAMIC_CS: usize = 0x100;
const DYNAMIC_CS_STRIDE: usize = 0x20;
const STATIC_CS: usize = 0x200;
const STATIC_CS_STRIDE: usize = 0x20;

/// EMC control register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Control {
    /// EMC enable.
    #[bit(0, rw)]
    enable: bool,
    /// Address mirror: map chip select 1 over chip select 0.
    #[bit(1, rw)]
    address_mirror: bool,
    /// Low-power mode.
    #[bit(2, rw)]
    low_power: bool,
}

/// EMC configuration register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Config {
    /// Big-endian mode. Cleared for little-endian operation.
    #[bit(0, rw)]
    big_endian: bool,
}

/// SDRAM initialization command, written to the dynamic control
/// register's command field while sequencing the chip out of power-up.
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum SdramCommand {
    /// Normal operation: issue commands from the bus interface.
    Normal = 0b00,
    /// Drive a mode-register-load cycle on the next memory access.
    Mode = 0b01,
    /// Precharge all banks.
    PrechargeAll = 0b10,
    /// No operation.
    Nop = 0b11,
}

/// Dynamic memory control register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DynamicControl {
    /// Memory clock enable (CE).
    #[bit(0, rw)]
    clock_enable: bool,
    /// Run the memory clock continuously (CS).
    #[bit(1, rw)]
    clock_run: bool,
    /// Self-refresh request.
    #[bit(2, rw)]
    self_refresh: bool,
    /// Initialization command (I).
    #[bits(7..=8, rw)]
    command: SdramCommand,
}

/// Per-chip-select dynamic memory configuration register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DynamicConfig {
    /// Memory device type; 0 selects SDRAM.
    #[bits(3..=4, rw)]
    memory_device: u2,
    /// Address mapping code: device width, density, row/bank/column
    /// order and external bus width packed per the controller manual.
    #[bits(7..=14, rw)]
    address_mapping: u8,
    /// Buffer enable.
    #[bit(19, rw)]
    buffer_enable: bool,
    /// Write protect.
    #[bit(20, rw)]
    write_protect: bool,
}

/// Per-chip-select dynamic RAS/CAS latency register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DynamicRasCas {
    /// RAS latency in clock cycles.
    #[bits(0..=1, rw)]
    ras: u2,
    /// CAS latency in clock cycles.
    #[bits(8..=9, rw)]
    cas: u2,
}

/// Read data capture strategy (dynamic read configuration register).
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Capture using the (delayed) memory clock.
    ClockDelayed = 0b00,
    /// Capture using a delayed version of the command signal.
    CommandDelayed = 0b01,
    CommandDelayedPlusOne = 0b10,
    CommandDelayedPlusTwo = 0b11,
}

/// Dynamic memory read configuration register.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DynamicReadConfig {
    #[bits(0..=1, rw)]
    strategy: ReadStrategy,
}

/// Shared dynamic memory timing values, in EMC clock cycles.
///
/// Field names follow JEDEC SDRAM nomenclature. These registers are
/// common to all dynamic chip selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicTiming {
    /// Precharge command period (tRP).
    pub t_rp: u8,
    /// Active to precharge period (tRAS).
    pub t_ras: u8,
    /// Self-refresh exit time (tSREX).
    pub t_srex: u8,
    /// Last data out to active time (tAPR).
    pub t_apr: u8,
    /// Data in to active time (tDAL).
    pub t_dal: u8,
    /// Write recovery time (tWR).
    pub t_wr: u8,
    /// Active to active period (tRC).
    pub t_rc: u8,
    /// Auto-refresh period (tRFC).
    pub t_rfc: u8,
    /// Exit self-refresh to active time (tXSR).
    pub t_xsr: u8,
    /// Bank A to bank B activation delay (tRRD).
    pub t_rrd: u8,
    /// Mode register load to active time (tMRD).
    pub t_mrd: u8,
}

impl DynamicTiming {
    /// Register write order matches the register map, tRP first.
    fn as_words(&self) -> [u32; 11] {
        [
            self.t_rp as u32,
            self.t_ras as u32,
            self.t_srex as u32,
            self.t_apr as u32,
            self.t_dal as u32,
            self.t_wr as u32,
            self.t_rc as u32,
            self.t_rfc as u32,
            self.t_xsr as u32,
            self.t_rrd as u32,
            self.t_mrd as u32,
        ]
    }
}

/// Static memory (NOR flash) per-chip-select timing.
///
/// Six wait-state counts plus the raw configuration word, copied
/// verbatim into the per-chip-select bank. Values come from the flash
/// datasheet for a given EMC clock and are not derived here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMemoryTiming {
    /// Static configuration word (width, page mode, polarity bits).
    pub config: u32,
    /// Delay from chip select to write enable.
    pub wait_write_enable: u8,
    /// Delay from chip select to output enable.
    pub wait_output_enable: u8,
    /// Read wait states.
    pub wait_read: u8,
    /// Page-mode sequential read wait states.
    pub wait_page: u8,
    /// Write wait states.
    pub wait_write: u8,
    /// Bus turnaround cycles.
    pub wait_turnaround: u8,
}

impl StaticMemoryTiming {
    /// Check every wait-state count against its register field width.
    pub fn validate(&self) -> Result<(), BringupError> {
        let ok = self.wait_write_enable < 16
            && self.wait_output_enable < 16
            && self.wait_read < 32
            && self.wait_page < 32
            && self.wait_write < 32
            && self.wait_turnaround < 16;
        if ok {
            Ok(())
        } else {
            Err(BringupError::InvalidTiming)
        }
    }
}

/// EMC register block accessor.
pub struct Emc {
    base: usize,
}

impl Emc {
    /// # Safety
    ///
    /// `base` must be the EMC register block (or, in tests, writable
    /// memory of at least 0x280 bytes) for the lifetime of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn write(&mut self, offset: usize, value: u32) {
        unsafe { ((self.base + offset) as *mut u32).write_volatile(value) }
    }

    fn read(&self, offset: usize) -> u32 {
        unsafe { ((self.base + offset) as *const u32).read_volatile() }
    }

    /// Enable the controller.
    pub fn enable(&mut self) {
        self.write(
            CONTROL,
            Control::new_with_raw_value(0).with_enable(true).raw_value(),
        );
    }

    /// Select little-endian operation.
    pub fn set_little_endian(&mut self) {
        self.write(CONFIG, Config::new_with_raw_value(0).raw_value());
    }

    /// Write the dynamic control register.
    pub fn set_dynamic_control(&mut self, ctrl: DynamicControl) {
        self.write(DYNAMIC_CONTROL, ctrl.raw_value());
    }

    /// Program the refresh timer (multiples of 16 EMC clocks).
    pub fn set_refresh_interval(&mut self, interval: u11) {
        self.write(DYNAMIC_REFRESH, interval.value() as u32);
    }

    /// Program the read capture strategy.
    pub fn set_read_strategy(&mut self, strategy: ReadStrategy) {
        self.write(
            DYNAMIC_READ_CONFIG,
            DynamicReadConfig::new_with_raw_value(0)
                .with_strategy(strategy)
                .raw_value(),
        );
    }

    /// Program the shared dynamic timing registers.
    pub fn set_dynamic_timing(&mut self, timing: &DynamicTiming) {
        for (i, word) in timing.as_words().into_iter().enumerate() {
            self.write(DYNAMIC_TIMING + i * 4, word);
        }
    }

    /// Write a dynamic chip select's configuration register.
    pub fn set_dynamic_config(&mut self, cs: u8, cfg: DynamicConfig) {
        debug_assert!(cs < CHIP_SELECTS);
        self.write(DYNAMIC_CS + cs as usize * DYNAMIC_CS_STRIDE, cfg.raw_value());
    }

    /// Read back a dynamic chip select's configuration register.
    pub fn dynamic_config(&self, cs: u8) -> DynamicConfig {
        debug_assert!(cs < CHIP_SELECTS);
        DynamicConfig::new_with_raw_value(self.read(DYNAMIC_CS + cs as usize * DYNAMIC_CS_STRIDE))
    }

    /// Write a dynamic chip select's RAS/CAS latency register.
    pub fn set_dynamic_ras_cas(&mut self, cs: u8, latency: DynamicRasCas) {
        debug_assert!(cs < CHIP_SELECTS);
        self.write(
            DYNAMIC_CS + cs as usize * DYNAMIC_CS_STRIDE + 0x4,
            latency.raw_value(),
        );
    }

    /// Copy a static chip select's timing set into its register bank.
    pub fn configure_static_memory(&mut self, cs: u8, timing: &StaticMemoryTiming) {
        debug_assert!(cs < CHIP_SELECTS);
        let bank = STATIC_CS + cs as usize * STATIC_CS_STRIDE;
        self.write(bank, timing.config);
        self.write(bank + 0x04, timing.wait_write_enable as u32);
        self.write(bank + 0x08, timing.wait_output_enable as u32);
        self.write(bank + 0x0C, timing.wait_read as u32);
        self.write(bank + 0x10, timing.wait_page as u32);
        self.write(bank + 0x14, timing.wait_write as u32);
        self.write(bank + 0x18, timing.wait_turnaround as u32);
        trace!("emc: static cs{} timing programmed", cs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    fn host_emc() -> (Vec<u32>, Emc) {
        let mut mem = vec![0u32; 0x280 / 4];
        let emc = unsafe { Emc::new(mem.as_mut_ptr() as usize) };
        (mem, emc)
    }

    #[test]
    fn control_and_config() {
        let (mem, mut emc) = host_emc();
        emc.enable();
        emc.set_little_endian();
        assert_eq!(mem[CONTROL / 4], 1);
        assert_eq!(mem[CONFIG / 4], 0);
    }

    #[test]
    fn dynamic_timing_register_order() {
        let (mem, mut emc) = host_emc();
        let timing = DynamicTiming {
            t_rp: 2,
            t_ras: 5,
            t_srex: 8,
            t_apr: 5,
            t_dal: 5,
            t_wr: 3,
            t_rc: 10,
            t_rfc: 10,
            t_xsr: 10,
            t_rrd: 3,
            t_mrd: 3,
        };
        emc.set_dynamic_timing(&timing);
        assert_eq!(
            &mem[DYNAMIC_TIMING / 4..DYNAMIC_TIMING / 4 + 11],
            &[2, 5, 8, 5, 5, 3, 10, 10, 10, 3, 3]
        );
    }

    #[test]
    fn dynamic_cs_banks_do_not_overlap() {
        let (mem, mut emc) = host_emc();
        let cfg = DynamicConfig::new_with_raw_value(0).with_address_mapping(0x8A);
        emc.set_dynamic_config(1, cfg);
        emc.set_dynamic_ras_cas(
            1,
            DynamicRasCas::new_with_raw_value(0)
                .with_ras(u2::new(3))
                .with_cas(u2::new(3)),
        );
        assert_eq!(mem[(DYNAMIC_CS + 0x20) / 4], 0x8A << 7);
        assert_eq!(mem[(DYNAMIC_CS + 0x24) / 4], 3 | (3 << 8));
        assert_eq!(mem[DYNAMIC_CS / 4], 0);
    }

    #[test]
    fn static_bank_copy() {
        let (mem, mut emc) = host_emc();
        let timing = StaticMemoryTiming {
            config: 0x81,
            wait_write_enable: 2,
            wait_output_enable: 2,
            wait_read: 8,
            wait_page: 8,
            wait_write: 8,
            wait_turnaround: 2,
        };
        timing.validate().unwrap();
        emc.configure_static_memory(2, &timing);
        let bank = (STATIC_CS + 2 * STATIC_CS_STRIDE) / 4;
        assert_eq!(mem[bank], 0x81);
        assert_eq!(&mem[bank + 1..bank + 7], &[2, 2, 8, 8, 8, 2]);
    }

    #[test]
    fn static_timing_limits() {
        let mut timing = StaticMemoryTiming {
            config: 0,
            wait_write_enable: 15,
            wait_output_enable: 15,
            wait_read: 31,
            wait_page: 31,
            wait_write: 31,
            wait_turnaround: 15,
        };
        assert!(timing.validate().is_ok());
        timing.wait_read = 32;
        assert_eq!(timing.validate(), Err(BringupError::InvalidTiming));
    }
}
