//! SDRAM power-up sequencing.
//!
//! JEDEC SDR SDRAM comes out of power-on in an undefined state and must
//! be walked through NOP, precharge-all, and mode-register-load cycles
//! with generous settle delays before normal operation. The sequence is
//! open loop: the chip gives no feedback, correctness rests entirely on
//! the per-chip constants and the delays between steps.
//!
//! Chip specifics live behind [`SdramChip`]; [`SEQUENCE`] is the fixed
//! step order and [`apply_step`] executes one step, which lets tests
//! observe controller state between steps.

use arbitrary_int::{u2, u11};
use embedded_hal::delay::DelayNs;

use crate::emc::{
    DynamicConfig, DynamicControl, DynamicRasCas, DynamicTiming, Emc, ReadStrategy, SdramCommand,
};
use crate::{BringupError, MemoryRegion};
use super::CHIP_SELECTS;

/// Address mapping description for a dynamic memory device.
///
/// Encodes into the controller's AM field: device width, density, the
/// row/bank/column ordering, and the external bus width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapping {
    /// Device data width code (2 = x32).
    pub width: u8,
    /// Device density code (2 = 128 Mbit).
    pub density: u8,
    /// 0 = bank-row-column, 1 = row-bank-column.
    pub row_bank_column: bool,
    /// External data bus is 32 bits wide.
    pub bus_32bit: bool,
}

impl AddressMapping {
    /// Pack into the 8-bit AM register field.
    pub const fn code(self) -> u8 {
        self.width
            | self.density << 2
            | (self.row_bank_column as u8) << 5
            | (self.bus_32bit as u8) << 7
    }
}

/// RAS/CAS latency and refresh values for one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdramLatency {
    /// RAS latency in clock cycles (1..=3).
    pub ras: u8,
    /// CAS latency in clock cycles (1..=3).
    pub cas: u8,
    /// Read data capture strategy.
    pub read: ReadStrategy,
}

/// Refresh timer values, in multiples of 16 EMC clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    /// Steady-state interval for normal operation.
    pub steady: u16,
    /// Accelerated interval used only while initializing.
    pub fast: u16,
}

/// Static description of one SDRAM chip.
///
/// Implementations are plain constant tables derived from the chip
/// datasheet at a fixed EMC clock.
pub trait SdramChip: Sync {
    /// Mode register payload (burst length, CAS latency).
    fn mode_register(&self) -> u16;
    /// Bit position the mode payload occupies in the latch address.
    /// Chip specific: column bits plus bus width scaling.
    fn mode_address_shift(&self) -> u8;
    /// Controller address mapping for this chip.
    fn address_mapping(&self) -> AddressMapping;
    /// RAS/CAS latency and read strategy.
    fn latency(&self) -> SdramLatency;
    /// Shared dynamic timing set, in EMC clock cycles.
    fn timing(&self) -> DynamicTiming;
    /// Refresh timer values.
    fn refresh(&self) -> RefreshTiming;
}

/// Micron MT48LC4M32B2: 128 Mbit (4M x 32), 4 banks, 12 row bits,
/// 8 column bits. Timings for a 102 MHz EMC clock, CL = 3.
pub struct Mt48lc4m32b2;

impl SdramChip for Mt48lc4m32b2 {
    fn mode_register(&self) -> u16 {
        // Burst length 4, sequential, CAS latency 3.
        (3 << 4) | 2
    }

    fn mode_address_shift(&self) -> u8 {
        // 8 column bits + 2 for the 32-bit bus, + 2 bank bits
        // (bank-row-column mapping puts the banks above the columns).
        12
    }

    fn address_mapping(&self) -> AddressMapping {
        AddressMapping {
            width: 2,
            density: 2,
            row_bank_column: false,
            bus_32bit: true,
        }
    }

    fn latency(&self) -> SdramLatency {
        SdramLatency {
            ras: 3,
            cas: 3,
            read: ReadStrategy::CommandDelayed,
        }
    }

    fn timing(&self) -> DynamicTiming {
        DynamicTiming {
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
        }
    }

    fn refresh(&self) -> RefreshTiming {
        // 64 ms / 4096 rows at 9.8 ns per EMC clock, in units of
        // 16 clocks. The fast value is only for initialization.
        RefreshTiming {
            steady: 118,
            fast: 2,
        }
    }
}

/// One SDRAM chip select to bring up.
#[derive(Clone, Copy)]
pub struct SdramConfig {
    /// Dynamic chip select index (0..=3).
    pub cs: u8,
    /// Bus region the chip select decodes to.
    pub region: MemoryRegion,
    /// Chip parameter table.
    pub chip: &'static dyn SdramChip,
}

impl SdramConfig {
    /// Reject values that do not fit their register fields, before any
    /// register is written.
    pub fn validate(&self) -> Result<(), BringupError> {
        if self.cs >= CHIP_SELECTS {
            return Err(BringupError::InvalidChipSelect);
        }
        let lat = self.chip.latency();
        if !(1..=3).contains(&lat.ras) || !(1..=3).contains(&lat.cas) {
            return Err(BringupError::InvalidTiming);
        }
        let t = self.chip.timing();
        let four_bit = [
            t.t_rp, t.t_ras, t.t_srex, t.t_apr, t.t_dal, t.t_wr, t.t_rrd, t.t_mrd,
        ];
        let five_bit = [t.t_rc, t.t_rfc, t.t_xsr];
        if four_bit.iter().any(|&v| v >= 16) || five_bit.iter().any(|&v| v >= 32) {
            return Err(BringupError::InvalidTiming);
        }
        let refresh = self.chip.refresh();
        if refresh.steady >= 2048 || refresh.fast >= 2048 {
            return Err(BringupError::InvalidTiming);
        }
        // The mode latch address must land inside the region.
        let latch = (self.chip.mode_register() as usize)
            .checked_shl(u32::from(self.chip.mode_address_shift()))
            .ok_or(BringupError::InvalidTiming)?;
        if latch >= self.region.size {
            return Err(BringupError::InvalidTiming);
        }
        Ok(())
    }
}

/// One step of the power-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdramStep {
    /// Program address mapping, latencies and timing registers.
    ProgramTiming,
    /// Issue the NOP command with the memory clock running.
    IssueNop,
    /// Issue precharge-all and switch to the accelerated refresh rate.
    PrechargeAllFastRefresh,
    /// Program the steady-state refresh interval.
    SetSteadyRefresh,
    /// Issue mode-register-load and latch the payload via a dummy read.
    LoadModeRegister,
    /// Return the command field to normal operation.
    NormalOperation,
    /// Enable the chip select's buffer, making the region usable.
    EnableBuffer,
}

/// The fixed power-up step order. Deviating from it leaves the chip in
/// an undefined state, so there is exactly one sequence.
pub const SEQUENCE: [SdramStep; 7] = [
    SdramStep::ProgramTiming,
    SdramStep::IssueNop,
    SdramStep::PrechargeAllFastRefresh,
    SdramStep::SetSteadyRefresh,
    SdramStep::LoadModeRegister,
    SdramStep::NormalOperation,
    SdramStep::EnableBuffer,
];

fn command(cmd: SdramCommand) -> DynamicControl {
    DynamicControl::new_with_raw_value(0)
        .with_clock_enable(true)
        .with_clock_run(true)
        .with_command(cmd)
}

/// Execute one sequence step, including its trailing settle delay.
///
/// `cfg` must have passed [`SdramConfig::validate`]. The delays busy
/// wait; on a system with a scheduler this call must not yield, the
/// chip needs real elapsed time between commands.
///
/// # Safety
///
/// The mode-register step reads from inside `cfg.region`, so the
/// region must be readable bus memory decoded by this chip select for
/// the whole call.
pub unsafe fn apply_step<D: DelayNs>(
    emc: &mut Emc,
    delay: &mut D,
    cfg: &SdramConfig,
    step: SdramStep,
) {
    let chip = cfg.chip;
    match step {
        SdramStep::ProgramTiming => {
            emc.set_dynamic_config(
                cfg.cs,
                DynamicConfig::new_with_raw_value(0)
                    .with_address_mapping(chip.address_mapping().code()),
            );
            let lat = chip.latency();
            emc.set_dynamic_ras_cas(
                cfg.cs,
                DynamicRasCas::new_with_raw_value(0)
                    .with_ras(u2::new(lat.ras))
                    .with_cas(u2::new(lat.cas)),
            );
            emc.set_read_strategy(lat.read);
            emc.set_dynamic_timing(&chip.timing());
            delay.delay_ms(100);
        }
        SdramStep::IssueNop => {
            emc.set_dynamic_control(command(SdramCommand::Nop));
            delay.delay_ms(100);
        }
        SdramStep::PrechargeAllFastRefresh => {
            emc.set_dynamic_control(command(SdramCommand::PrechargeAll));
            emc.set_refresh_interval(u11::new(chip.refresh().fast));
            delay.delay_ms(1);
        }
        SdramStep::SetSteadyRefresh => {
            emc.set_refresh_interval(u11::new(chip.refresh().steady));
            delay.delay_ms(100);
        }
        SdramStep::LoadModeRegister => {
            emc.set_dynamic_control(command(SdramCommand::Mode));
            // The read cycle itself carries the mode payload on the
            // address lines; the data read back is meaningless.
            let latch =
                cfg.region.base + ((chip.mode_register() as usize) << chip.mode_address_shift());
            unsafe {
                core::ptr::read_volatile(latch as *const u32);
            }
            delay.delay_us(100);
        }
        SdramStep::NormalOperation => {
            // Clears clock-enable and clock-run along with the command
            // field; the controller gates the clock itself from here.
            emc.set_dynamic_control(DynamicControl::new_with_raw_value(0));
        }
        SdramStep::EnableBuffer => {
            let current = emc.dynamic_config(cfg.cs);
            emc.set_dynamic_config(
                cfg.cs,
                current
                    .with_address_mapping(chip.address_mapping().code())
                    .with_buffer_enable(true),
            );
        }
    }
}

/// Run the complete power-up sequence for one chip select.
///
/// Must run exactly once per power cycle: re-issuing the command
/// sequence against a live chip select corrupts memory already in use.
///
/// # Safety
///
/// `cfg.region` must be readable bus memory decoded by this chip
/// select, see [`apply_step`].
pub unsafe fn initialize<D: DelayNs>(
    emc: &mut Emc,
    delay: &mut D,
    cfg: &SdramConfig,
) -> Result<MemoryRegion, BringupError> {
    cfg.validate()?;
    for step in SEQUENCE {
        unsafe { apply_step(emc, delay, cfg, step) };
    }
    info!(
        "sdram: cs{} ready, {} bytes at {:#x}",
        cfg.cs, cfg.region.size, cfg.region.base
    );
    Ok(cfg.region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    /// Host stand-in for the calibrated busy-wait; records durations.
    struct RecordingDelay {
        ns: Vec<u32>,
    }

    impl RecordingDelay {
        fn new() -> Self {
            Self { ns: Vec::new() }
        }
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns.push(ns);
        }
    }

    // Big enough that the mode latch read at base + (0x32 << 12) stays
    // in bounds.
    const RAM_WORDS: usize = 0x33000 / 4;

    struct Harness {
        emc_mem: Vec<u32>,
        ram: Vec<u32>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                emc_mem: vec![0u32; 0x280 / 4],
                ram: vec![0u32; RAM_WORDS],
            }
        }

        fn emc(&mut self) -> Emc {
            unsafe { Emc::new(self.emc_mem.as_mut_ptr() as usize) }
        }

        fn config(&self, cs: u8) -> SdramConfig {
            SdramConfig {
                cs,
                region: MemoryRegion::new(self.ram.as_ptr() as usize, RAM_WORDS * 4),
                chip: &Mt48lc4m32b2,
            }
        }

        fn dynamic_control(&self) -> u32 {
            self.emc_mem[0x020 / 4]
        }

        fn refresh(&self) -> u32 {
            self.emc_mem[0x024 / 4]
        }
    }

    #[test]
    fn command_order_is_nop_pall_mode_normal() {
        let mut h = Harness::new();
        let cfg = h.config(0);
        let mut emc = h.emc();
        let mut delay = RecordingDelay::new();
        let mut commands = vec![];
        for step in SEQUENCE {
            let before = h.emc_mem[0x020 / 4];
            unsafe { apply_step(&mut emc, &mut delay, &cfg, step) };
            let after = h.emc_mem[0x020 / 4];
            if before != after {
                commands.push(
                    DynamicControl::new_with_raw_value(after).command(),
                );
            }
        }
        assert_eq!(
            commands,
            vec![
                SdramCommand::Nop,
                SdramCommand::PrechargeAll,
                SdramCommand::Mode,
                SdramCommand::Normal,
            ]
        );
    }

    #[test]
    fn fast_refresh_set_with_precharge_then_steady() {
        let mut h = Harness::new();
        let cfg = h.config(0);
        let mut emc = h.emc();
        let mut delay = RecordingDelay::new();
        unsafe {
            apply_step(&mut emc, &mut delay, &cfg, SdramStep::ProgramTiming);
            apply_step(&mut emc, &mut delay, &cfg, SdramStep::IssueNop);
            apply_step(&mut emc, &mut delay, &cfg, SdramStep::PrechargeAllFastRefresh);
        }
        assert_eq!(h.refresh(), 2);
        unsafe { apply_step(&mut emc, &mut delay, &cfg, SdramStep::SetSteadyRefresh) };
        assert_eq!(h.refresh(), 118);
    }

    #[test]
    fn normal_operation_releases_clock_control() {
        let mut h = Harness::new();
        let cfg = h.config(0);
        let mut emc = h.emc();
        let mut delay = RecordingDelay::new();
        unsafe { apply_step(&mut emc, &mut delay, &cfg, SdramStep::IssueNop) };
        assert_eq!(h.dynamic_control() & 0x3, 0x3);
        unsafe { apply_step(&mut emc, &mut delay, &cfg, SdramStep::NormalOperation) };
        assert_eq!(h.dynamic_control(), 0);
    }

    #[test]
    fn full_init_ends_buffered_at_the_right_mapping() {
        let mut h = Harness::new();
        let cfg = h.config(0);
        let mut emc = h.emc();
        let mut delay = RecordingDelay::new();
        let region = unsafe { initialize(&mut emc, &mut delay, &cfg) }.unwrap();
        assert_eq!(region, cfg.region);
        let dyncfg = h.emc_mem[0x100 / 4];
        assert_eq!(dyncfg, (0x8A << 7) | (1 << 19));
        // Settle delays in ns: 100ms, 100ms, 1ms, 100ms, 100us.
        assert_eq!(
            delay.ns,
            vec![100_000_000, 100_000_000, 1_000_000, 100_000_000, 100_000]
        );
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        struct BadChip;
        impl SdramChip for BadChip {
            fn mode_register(&self) -> u16 {
                0x32
            }
            fn mode_address_shift(&self) -> u8 {
                12
            }
            fn address_mapping(&self) -> AddressMapping {
                Mt48lc4m32b2.address_mapping()
            }
            fn latency(&self) -> SdramLatency {
                Mt48lc4m32b2.latency()
            }
            fn timing(&self) -> DynamicTiming {
                DynamicTiming {
                    t_rc: 32,
                    ..Mt48lc4m32b2.timing()
                }
            }
            fn refresh(&self) -> RefreshTiming {
                Mt48lc4m32b2.refresh()
            }
        }
        static BAD: BadChip = BadChip;
        let h = Harness::new();
        let mut cfg = h.config(0);
        cfg.chip = &BAD;
        assert_eq!(cfg.validate(), Err(BringupError::InvalidTiming));

        let cfg = h.config(4);
        assert_eq!(cfg.validate(), Err(BringupError::InvalidChipSelect));
    }

    #[test]
    fn validation_keeps_the_mode_latch_inside_the_region() {
        struct ShiftedChip(u8);
        impl SdramChip for ShiftedChip {
            fn mode_register(&self) -> u16 {
                Mt48lc4m32b2.mode_register()
            }
            fn mode_address_shift(&self) -> u8 {
                self.0
            }
            fn address_mapping(&self) -> AddressMapping {
                Mt48lc4m32b2.address_mapping()
            }
            fn latency(&self) -> SdramLatency {
                Mt48lc4m32b2.latency()
            }
            fn timing(&self) -> DynamicTiming {
                Mt48lc4m32b2.timing()
            }
            fn refresh(&self) -> RefreshTiming {
                Mt48lc4m32b2.refresh()
            }
        }

        // A shift of a full word or more must not be allowed to reach
        // the latch address computation.
        static OVERFLOW: ShiftedChip = ShiftedChip(64);
        let h = Harness::new();
        let mut cfg = h.config(0);
        cfg.chip = &OVERFLOW;
        assert_eq!(cfg.validate(), Err(BringupError::InvalidTiming));

        // In range as a shift, but the latch lands past the region end.
        static PAST_END: ShiftedChip = ShiftedChip(20);
        cfg.chip = &PAST_END;
        assert_eq!(cfg.validate(), Err(BringupError::InvalidTiming));
    }

    #[test]
    fn mt48_constants() {
        assert_eq!(Mt48lc4m32b2.address_mapping().code(), 0x8A);
        assert_eq!(Mt48lc4m32b2.mode_register(), 0x32);
    }
}
