//! GPIO input sampling.
//!
//! Bring-up only ever reads pins (boot strap sampling), so this is a
//! minimal accessor over the byte-addressed GPIO_B registers: one byte
//! per pin, bit 0 reflecting the pad level.

/// GPIO register block base on the LPC43xx.
pub const GPIO_BASE: usize = 0x400F_4000;

const PINS_PER_PORT: usize = 32;

/// GPIO port bank accessor.
pub struct GpioPorts {
    base: usize,
}

impl GpioPorts {
    /// # Safety
    ///
    /// `base` must be the GPIO register block (or, in tests, readable
    /// memory covering one byte per pin) for the lifetime of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Sample the input level of `GPIOn[pin]`.
    pub fn input_level(&self, port: u8, pin: u8) -> bool {
        let addr = self.base + port as usize * PINS_PER_PORT + pin as usize;
        unsafe { (addr as *const u8).read_volatile() & 1 != 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    #[test]
    fn byte_per_pin_addressing() {
        let mut mem = vec![0u8; 8 * PINS_PER_PORT];
        mem[5 * PINS_PER_PORT + 7] = 1;
        mem[1 * PINS_PER_PORT + 10] = 1;
        let gpio = unsafe { GpioPorts::new(mem.as_ptr() as usize) };
        assert!(gpio.input_level(5, 7));
        assert!(gpio.input_level(1, 10));
        assert!(!gpio.input_level(0, 8));
        assert!(!gpio.input_level(0, 9));
    }

    #[test]
    fn only_bit_zero_matters() {
        let mut mem = vec![0u8; PINS_PER_PORT];
        mem[3] = 0xFE;
        let gpio = unsafe { GpioPorts::new(mem.as_ptr() as usize) };
        assert!(!gpio.input_level(0, 3));
    }
}
