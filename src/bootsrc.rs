//! Boot source detection.
//!
//! The boot ROM chooses its boot interface from an OTP fuse field or,
//! when that is unprogrammed, from four strap pins sampled at reset.
//! Reproducing that choice at runtime lets the board code know where
//! the running image came from.

use crate::gpio::GpioPorts;
use crate::otp::MmioOtp;
use crate::scu::{PinConfig, Scu};

/// Boot interfaces the LPC43xx ROM knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootSource {
    Usart0,
    Spifi,
    EmcBoot8Bit,
    EmcBoot16Bit,
    EmcBoot32Bit,
    Usb0,
    Usb1,
    SpiFlash,
    Usart3,
}

/// Raw 4-bit boot selection code.
///
/// Strap pins are sampled without validation, so codes the ROM does not
/// define can and do occur on boards with floating straps. The raw
/// value is kept; [`BootCode::source`] maps only the defined ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootCode(pub u8);

impl BootCode {
    /// Decode the raw code, if it names a defined boot interface.
    pub fn source(self) -> Option<BootSource> {
        match self.0 {
            0 => Some(BootSource::Usart0),
            1 => Some(BootSource::Spifi),
            2 => Some(BootSource::EmcBoot8Bit),
            3 => Some(BootSource::EmcBoot16Bit),
            4 => Some(BootSource::EmcBoot32Bit),
            5 => Some(BootSource::Usb0),
            6 => Some(BootSource::Usb1),
            7 => Some(BootSource::SpiFlash),
            8 => Some(BootSource::Usart3),
            _ => None,
        }
    }
}

/// Determine the boot source the way the ROM does.
///
/// A nonzero OTP field wins outright and is reported as `field - 1`
/// without touching any pin state. Otherwise the strap pads are muxed
/// to GPIO input via `straps` and the four pins named by `samples` are
/// read into code bits 0..=3, low pin first.
pub fn detect(
    otp: &mut MmioOtp<'_>,
    scu: &mut Scu,
    gpio: &GpioPorts,
    straps: &[PinConfig],
    samples: &[(u8, u8); 4],
) -> BootCode {
    let fused = otp.read_ctrl().boot_src().value();
    if fused != 0 {
        trace!("boot source from otp: {}", fused - 1);
        return BootCode(fused - 1);
    }

    scu.apply(straps);
    let mut code = 0u8;
    for (bit, &(port, pin)) in samples.iter().enumerate() {
        if gpio.input_level(port, pin) {
            code |= 1 << bit;
        }
    }
    trace!("boot source from straps: {}", code);
    BootCode(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::Otp;
    use crate::scu::PinFunction;
    use std::vec;
    use std::vec::Vec;

    const STRAPS: [PinConfig; 4] = [
        PinConfig::new(1, 1, PinFunction::gpio_input(0)),
        PinConfig::new(1, 2, PinFunction::gpio_input(0)),
        PinConfig::new(2, 8, PinFunction::gpio_input(4)),
        PinConfig::new(2, 9, PinFunction::gpio_input(0)),
    ];
    const SAMPLES: [(u8, u8); 4] = [(0, 8), (0, 9), (5, 7), (1, 10)];

    struct Harness {
        otp_mem: Vec<u32>,
        scu_mem: Vec<u32>,
        gpio_mem: Vec<u8>,
    }

    impl Harness {
        fn new(fuse: u32) -> Self {
            let mut otp_mem = vec![0u32; 0x40 / 4];
            otp_mem[0x30 / 4] = fuse << 25;
            Self {
                otp_mem,
                scu_mem: vec![0u32; 0xD04 / 4],
                gpio_mem: vec![0u8; 8 * 32],
            }
        }

        fn strap(&mut self, port: u8, pin: u8) {
            self.gpio_mem[port as usize * 32 + pin as usize] = 1;
        }

        fn detect(&mut self) -> BootCode {
            let mut otp = unsafe { Otp::new_mmio_at(self.otp_mem.as_mut_ptr() as usize) };
            let mut scu = unsafe { Scu::new(self.scu_mem.as_mut_ptr() as usize) };
            let gpio = unsafe { GpioPorts::new(self.gpio_mem.as_ptr() as usize) };
            detect(&mut otp, &mut scu, &gpio, &STRAPS, &SAMPLES)
        }
    }

    #[test]
    fn fused_source_wins_and_skips_pins() {
        for fuse in 1u32..=15 {
            let mut h = Harness::new(fuse);
            // Straps say 0xF; the fuse must win anyway.
            for &(port, pin) in &SAMPLES {
                h.strap(port, pin);
            }
            assert_eq!(h.detect(), BootCode(fuse as u8 - 1));
            // No pin was muxed.
            assert!(h.scu_mem.iter().all(|&w| w == 0));
        }
    }

    #[test]
    fn strap_pins_sampled_low_bit_first() {
        for code in 0u8..16 {
            let mut h = Harness::new(0);
            for (bit, &(port, pin)) in SAMPLES.iter().enumerate() {
                if code & (1 << bit) != 0 {
                    h.strap(port, pin);
                }
            }
            assert_eq!(h.detect(), BootCode(code));
        }
    }

    #[test]
    fn strap_path_muxes_the_strap_pads() {
        let mut h = Harness::new(0);
        h.detect();
        assert_eq!(
            h.scu_mem[(2 * 0x80 + 8 * 4) / 4],
            PinFunction::gpio_input(4).raw_value()
        );
    }

    #[test]
    fn undefined_codes_pass_through() {
        for code in 9u8..16 {
            assert_eq!(BootCode(code).source(), None);
        }
        assert_eq!(BootCode(4).source(), Some(BootSource::EmcBoot32Bit));
        assert_eq!(BootCode(8).source(), Some(BootSource::Usart3));
    }
}
