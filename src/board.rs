//! Keil MCB4300 (LPC4357) board bring-up.
//!
//! Ties the peripheral drivers together: the pin multiplex tables for
//! this board's routing, the EMC clock and controller setup, and the
//! SDRAM / NOR flash configuration. [`Mcb4300::bring_up`] composes an
//! explicit [`InitPlan`] from the board configuration and executes it,
//! returning a description of what was brought up.

use embedded_hal::delay::DelayNs;

use crate::bootsrc::{self, BootCode};
use crate::ccu::{self, EmcClockDivider, MmioCcu1, MmioCreg};
use crate::emc::sdram::{self, SdramConfig, SdramStep};
use crate::emc::{Emc, StaticMemoryTiming};
use crate::gpio::GpioPorts;
use crate::otp::MmioOtp;
use crate::scu::{PinConfig, PinFunction, Scu, CLOCK_PAD_PORT};
use crate::{BringupError, MemoryRegion};

/// SDRAM region decoded by dynamic chip select 0.
pub const SDRAM_BASE: usize = 0x2800_0000;
/// MT48LC4M32B2: 4M x 32 bits.
pub const SDRAM_SIZE: usize = 16 * 1024 * 1024;
/// Dynamic chip select wired to the SDRAM.
pub const SDRAM_CS: u8 = 0;

/// EMC clock output delay trim, ~3.5 ns on all four pads. The SDRAM
/// does not work without it.
pub const EMC_CLOCK_DELAY_TRIM: u16 = 0x7777;

/// Console USART pads.
pub const UART_PINS: [PinConfig; 2] = [
    PinConfig::new(2, 3, PinFunction::uart_tx(1)),
    PinConfig::new(2, 4, PinFunction::uart_rx(1)),
];

/// Ethernet MII and MDIO pads.
pub const ETHERNET_PINS: [PinConfig; 8] = [
    // PC.1 = ENET_MDC
    PinConfig::new(0xC, 1, PinFunction::ethernet(3)),
    // P1.17 = ENET_MDIO (high-drive pad)
    PinConfig::new(0x1, 17, PinFunction::ethernet(3)),
    // P1.18 = ENET_TXD0
    PinConfig::new(0x1, 18, PinFunction::ethernet(3)),
    // P1.20 = ENET_TXD1
    PinConfig::new(0x1, 20, PinFunction::ethernet(3)),
    // P0.1 = ENET_TX_EN
    PinConfig::new(0x0, 1, PinFunction::ethernet(6)),
    // P1.15 = ENET_RXD0
    PinConfig::new(0x1, 15, PinFunction::ethernet(3)),
    // P0.0 = ENET_RXD1
    PinConfig::new(0x0, 0, PinFunction::ethernet(2)),
    // P1.16 = ENET_RXDV
    PinConfig::new(0x1, 16, PinFunction::ethernet(7)),
];

/// EMC pads shared by the SDRAM and the NOR flash: write enable, the
/// low address lines, bank addresses and the low data half.
pub const EMC_SHARED_PINS: [PinConfig; 31] = [
    // P1.6 = WE#
    PinConfig::new(0x1, 6, PinFunction::emc(3)),
    // A0..A11
    PinConfig::new(0x2, 9, PinFunction::emc(3)),
    PinConfig::new(0x2, 10, PinFunction::emc(3)),
    PinConfig::new(0x2, 11, PinFunction::emc(3)),
    PinConfig::new(0x2, 12, PinFunction::emc(3)),
    PinConfig::new(0x2, 13, PinFunction::emc(3)),
    PinConfig::new(0x1, 0, PinFunction::emc(2)),
    PinConfig::new(0x1, 1, PinFunction::emc(2)),
    PinConfig::new(0x1, 2, PinFunction::emc(2)),
    PinConfig::new(0x2, 8, PinFunction::emc(3)),
    PinConfig::new(0x2, 7, PinFunction::emc(3)),
    PinConfig::new(0x2, 6, PinFunction::emc(2)),
    PinConfig::new(0x2, 2, PinFunction::emc(2)),
    // P2.0 = BA0 (A13), P6.8 = BA1 (A14)
    PinConfig::new(0x2, 0, PinFunction::emc(2)),
    PinConfig::new(0x6, 8, PinFunction::emc(1)),
    // D0..D15
    PinConfig::new(0x1, 7, PinFunction::emc(3)),
    PinConfig::new(0x1, 8, PinFunction::emc(3)),
    PinConfig::new(0x1, 9, PinFunction::emc(3)),
    PinConfig::new(0x1, 10, PinFunction::emc(3)),
    PinConfig::new(0x1, 11, PinFunction::emc(3)),
    PinConfig::new(0x1, 12, PinFunction::emc(3)),
    PinConfig::new(0x1, 13, PinFunction::emc(3)),
    PinConfig::new(0x1, 14, PinFunction::emc(3)),
    PinConfig::new(0x5, 4, PinFunction::emc(2)),
    PinConfig::new(0x5, 5, PinFunction::emc(2)),
    PinConfig::new(0x5, 6, PinFunction::emc(2)),
    PinConfig::new(0x5, 7, PinFunction::emc(2)),
    PinConfig::new(0x5, 0, PinFunction::emc(2)),
    PinConfig::new(0x5, 1, PinFunction::emc(2)),
    PinConfig::new(0x5, 2, PinFunction::emc(2)),
    PinConfig::new(0x5, 3, PinFunction::emc(2)),
];

/// EMC pads used only by the SDRAM: the four clock pads, clock enable,
/// chip select, RAS/CAS, byte masks and the high data half.
pub const SDRAM_PINS: [PinConfig; 28] = [
    // CLK0..CLK3; a 32-bit SDRAM interface needs all four clock pads
    // driven with their input buffers enabled.
    PinConfig::new(CLOCK_PAD_PORT, 0, PinFunction::emc(0)),
    PinConfig::new(CLOCK_PAD_PORT, 1, PinFunction::emc(0)),
    PinConfig::new(CLOCK_PAD_PORT, 2, PinFunction::emc(0)),
    PinConfig::new(CLOCK_PAD_PORT, 3, PinFunction::emc(0)),
    // P6.11 = CKE, P6.9 = nDYCS0
    PinConfig::new(0x6, 11, PinFunction::emc(3)),
    PinConfig::new(0x6, 9, PinFunction::emc(3)),
    // P6.5 = RAS#, P6.4 = CAS#
    PinConfig::new(0x6, 5, PinFunction::emc(3)),
    PinConfig::new(0x6, 4, PinFunction::emc(3)),
    // DQM0..DQM3
    PinConfig::new(0x6, 12, PinFunction::emc(3)),
    PinConfig::new(0x6, 10, PinFunction::emc(3)),
    PinConfig::new(0xD, 0, PinFunction::emc(2)),
    PinConfig::new(0xE, 13, PinFunction::emc(3)),
    // D16..D31
    PinConfig::new(0xD, 2, PinFunction::emc(2)),
    PinConfig::new(0xD, 3, PinFunction::emc(2)),
    PinConfig::new(0xD, 4, PinFunction::emc(2)),
    PinConfig::new(0xD, 5, PinFunction::emc(2)),
    PinConfig::new(0xD, 6, PinFunction::emc(2)),
    PinConfig::new(0xD, 7, PinFunction::emc(2)),
    PinConfig::new(0xD, 8, PinFunction::emc(2)),
    PinConfig::new(0xD, 9, PinFunction::emc(2)),
    PinConfig::new(0xE, 5, PinFunction::emc(3)),
    PinConfig::new(0xE, 6, PinFunction::emc(3)),
    PinConfig::new(0xE, 7, PinFunction::emc(3)),
    PinConfig::new(0xE, 8, PinFunction::emc(3)),
    PinConfig::new(0xE, 9, PinFunction::emc(3)),
    PinConfig::new(0xE, 10, PinFunction::emc(3)),
    PinConfig::new(0xE, 11, PinFunction::emc(3)),
    PinConfig::new(0xE, 12, PinFunction::emc(3)),
];

/// EMC pads used only by the NOR flash: output enable, chip select and
/// the high address lines. The flash reset line is not wired to the MCU.
pub const NOR_PINS: [PinConfig; 10] = [
    // P1.3 = OE#, P1.5 = CS0#
    PinConfig::new(0x1, 3, PinFunction::emc(3)),
    PinConfig::new(0x1, 5, PinFunction::emc(3)),
    // A12, A15, A17, A16, A18..A21
    PinConfig::new(0x2, 1, PinFunction::emc(2)),
    PinConfig::new(0x6, 7, PinFunction::emc(1)),
    PinConfig::new(0xD, 15, PinFunction::emc(2)),
    PinConfig::new(0xD, 16, PinFunction::emc(2)),
    PinConfig::new(0xE, 0, PinFunction::emc(3)),
    PinConfig::new(0xE, 1, PinFunction::emc(3)),
    PinConfig::new(0xE, 2, PinFunction::emc(3)),
    PinConfig::new(0xE, 3, PinFunction::emc(3)),
];

/// Boot strap pads, muxed to GPIO input before sampling.
pub const BOOT_STRAP_PINS: [PinConfig; 4] = [
    // P1.1 = GPIO0[8] - BOOT1
    PinConfig::new(0x1, 1, PinFunction::gpio_input(0)),
    // P1.2 = GPIO0[9] - BOOT2
    PinConfig::new(0x1, 2, PinFunction::gpio_input(0)),
    // P2.8 = GPIO5[7] - BOOT3
    PinConfig::new(0x2, 8, PinFunction::gpio_input(4)),
    // P2.9 = GPIO1[10] - BOOT4
    PinConfig::new(0x2, 9, PinFunction::gpio_input(0)),
];

/// GPIO (port, pin) sampled for boot code bits 0..=3.
pub const BOOT_STRAP_SAMPLES: [(u8, u8); 4] = [(0, 8), (0, 9), (5, 7), (1, 10)];

/// NOR flash attachment: which static chip select and what timing.
#[derive(Debug, Clone, Copy)]
pub struct NorConfig {
    pub cs: u8,
    pub timing: StaticMemoryTiming,
}

/// What to bring up on this board.
#[derive(Clone, Copy)]
pub struct BringupConfig {
    /// SDRAM attachment, if populated.
    pub dram: Option<SdramConfig>,
    /// NOR flash attachment, if populated.
    pub nor: Option<NorConfig>,
    /// Mux the Ethernet pads.
    pub ethernet: bool,
    /// EMC clock divider.
    pub emc_clock: EmcClockDivider,
    /// Board revision, reported in [`BoardInfo`].
    pub revision: &'static str,
}

impl BringupConfig {
    /// Stock MCB4300 configuration: on-board SDRAM on dynamic chip
    /// select 0 and Ethernet, no NOR flash fitted.
    pub const fn mcb4300() -> Self {
        Self {
            dram: Some(SdramConfig {
                cs: SDRAM_CS,
                region: MemoryRegion::new(SDRAM_BASE, SDRAM_SIZE),
                chip: &sdram::Mt48lc4m32b2,
            }),
            nor: None,
            ethernet: true,
            emc_clock: EmcClockDivider::Div2,
            revision: "1.0",
        }
    }

    fn validate(&self) -> Result<(), BringupError> {
        if let Some(dram) = &self.dram {
            dram.validate()?;
        }
        if let Some(nor) = &self.nor {
            if nor.cs >= crate::emc::CHIP_SELECTS {
                return Err(BringupError::InvalidChipSelect);
            }
            nor.timing.validate()?;
        }
        Ok(())
    }
}

/// One step of the composed bring-up plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStep {
    /// Apply every pin table the configuration calls for.
    ApplyPinConfigs,
    /// Route the divided M4 clock to the EMC.
    ConfigureEmcClock,
    /// Clock-pad delay trim, controller enable, little-endian mode.
    EnableController,
    /// Program the NOR chip select timing.
    ConfigureNorTiming,
    /// One step of the SDRAM power-up sequence.
    Sdram(SdramStep),
}

const MAX_PLAN_STEPS: usize = 4 + sdram::SEQUENCE.len();

/// The ordered steps a given [`BringupConfig`] requires.
///
/// Composed up front so the whole sequence is inspectable before a
/// single register is written.
pub struct InitPlan {
    steps: [InitStep; MAX_PLAN_STEPS],
    len: usize,
}

impl InitPlan {
    /// Compose the plan for `config`. The relative order of the steps
    /// that are present never varies; optional features only add or
    /// remove their own steps.
    pub fn compose(config: &BringupConfig) -> Self {
        let mut steps = [InitStep::ApplyPinConfigs; MAX_PLAN_STEPS];
        let mut len = 0;
        let mut push = |steps: &mut [InitStep; MAX_PLAN_STEPS], step| {
            steps[len] = step;
            len += 1;
        };
        push(&mut steps, InitStep::ApplyPinConfigs);
        if config.dram.is_some() {
            push(&mut steps, InitStep::ConfigureEmcClock);
        }
        push(&mut steps, InitStep::EnableController);
        if config.nor.is_some() {
            push(&mut steps, InitStep::ConfigureNorTiming);
        }
        if config.dram.is_some() {
            for step in sdram::SEQUENCE {
                push(&mut steps, InitStep::Sdram(step));
            }
        }
        Self { steps, len }
    }

    pub fn steps(&self) -> &[InitStep] {
        &self.steps[..self.len]
    }
}

/// What the bring-up produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardInfo {
    /// Board revision string from the configuration.
    pub revision: &'static str,
    /// The SDRAM region, when dynamic memory was brought up.
    pub dram: Option<MemoryRegion>,
}

/// The MCB4300 board, as a bundle of peripheral handles plus the delay
/// provider used for SDRAM settle times.
pub struct Mcb4300<'d, D> {
    scu: Scu,
    gpio: GpioPorts,
    ccu: MmioCcu1<'d>,
    creg: MmioCreg<'d>,
    otp: MmioOtp<'d>,
    emc: Emc,
    delay: D,
}

impl<D: DelayNs> Mcb4300<'static, D> {
    /// Create the board handle at the fixed LPC43xx peripheral
    /// addresses.
    ///
    /// # Safety
    ///
    /// Must be the only live handle to these peripherals. The returned
    /// value owns the bring-up window; nothing else may touch the SCU,
    /// CCU1, CREG, OTP, GPIO or EMC blocks while it is in use. Any
    /// [`SdramConfig::region`] later handed to [`Mcb4300::bring_up`]
    /// must be bus memory the EMC decodes for that chip select; the
    /// mode-register step reads from inside it.
    pub const unsafe fn new(delay: D) -> Self {
        unsafe {
            Self {
                scu: Scu::new(crate::scu::SCU_BASE),
                gpio: GpioPorts::new(crate::gpio::GPIO_BASE),
                ccu: crate::ccu::Ccu1::new_mmio_fixed(),
                creg: crate::ccu::Creg::new_mmio_fixed(),
                otp: crate::otp::Otp::new_mmio_fixed(),
                emc: Emc::new(crate::emc::EMC_BASE),
                delay,
            }
        }
    }
}

impl<'d, D: DelayNs> Mcb4300<'d, D> {
    /// Assemble a board from individual peripheral handles. This is how
    /// host tests point the drivers at plain memory.
    ///
    /// # Safety
    ///
    /// Any [`SdramConfig::region`] later handed to
    /// [`Mcb4300::bring_up`] must be readable through these handles,
    /// on hardware the EMC region for that chip select, on a host a
    /// live allocation.
    pub unsafe fn from_parts(
        scu: Scu,
        gpio: GpioPorts,
        ccu: MmioCcu1<'d>,
        creg: MmioCreg<'d>,
        otp: MmioOtp<'d>,
        emc: Emc,
        delay: D,
    ) -> Self {
        Self {
            scu,
            gpio,
            ccu,
            creg,
            otp,
            emc,
            delay,
        }
    }

    fn apply_pin_configs(&mut self, config: &BringupConfig) {
        self.scu.apply(&UART_PINS);
        if config.ethernet {
            self.scu.apply(&ETHERNET_PINS);
        }
        if config.dram.is_some() || config.nor.is_some() {
            self.scu.apply(&EMC_SHARED_PINS);
        }
        if config.dram.is_some() {
            self.scu.apply(&SDRAM_PINS);
        }
        if config.nor.is_some() {
            self.scu.apply(&NOR_PINS);
        }
    }

    fn apply(&mut self, config: &BringupConfig, step: InitStep) {
        match step {
            InitStep::ApplyPinConfigs => self.apply_pin_configs(config),
            InitStep::ConfigureEmcClock => {
                ccu::configure_emc_clock(&mut self.ccu, &mut self.creg, config.emc_clock);
            }
            InitStep::EnableController => {
                self.scu.set_emc_clock_delay(EMC_CLOCK_DELAY_TRIM);
                self.emc.enable();
                self.emc.set_little_endian();
            }
            InitStep::ConfigureNorTiming => {
                // Presence is part of plan composition.
                if let Some(nor) = &config.nor {
                    self.emc.configure_static_memory(nor.cs, &nor.timing);
                }
            }
            InitStep::Sdram(step) => {
                if let Some(dram) = &config.dram {
                    // Region readability is part of the constructor
                    // contract.
                    unsafe { sdram::apply_step(&mut self.emc, &mut self.delay, dram, step) };
                }
            }
        }
    }

    /// Run the board bring-up once, early in boot.
    ///
    /// Validates the configuration, composes the plan and executes it.
    /// No register is written if validation fails. Not re-runnable:
    /// the SDRAM sequence must happen once per power cycle.
    pub fn bring_up(&mut self, config: &BringupConfig) -> Result<BoardInfo, BringupError> {
        config.validate()?;
        let plan = InitPlan::compose(config);
        for &step in plan.steps() {
            self.apply(config, step);
        }
        info!("Board: Keil MCB4300 (LPC4357) rev {}", config.revision);
        Ok(BoardInfo {
            revision: config.revision,
            dram: config.dram.map(|d| d.region),
        })
    }

    /// Determine which interface the ROM booted from, the way the ROM
    /// does: OTP fuses first, strap pins as fallback.
    pub fn boot_source(&mut self) -> BootCode {
        bootsrc::detect(
            &mut self.otp,
            &mut self.scu,
            &self.gpio,
            &BOOT_STRAP_PINS,
            &BOOT_STRAP_SAMPLES,
        )
    }
}
