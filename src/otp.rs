//! OTP (one-time programmable) fuse bank, read side.
//!
//! Bring-up only needs the boot source field out of the control word;
//! the rest of the bank is mapped for completeness of the block layout.

use arbitrary_int::u4;

/// OTP register block base on the LPC43xx.
pub const OTP_BASE: usize = 0x4004_5000;

/// OTP bank 3 control word.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct OtpCtrl {
    /// Programmed boot source. Zero means "not programmed": the device
    /// then falls back to the boot strap pins.
    #[bits(25..=28, rw)]
    boot_src: u4,
}

/// OTP fuse bank register layout.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Otp {
    /// Bank 0: part identification.
    #[mmio(PureRead)]
    part_id0: u32,
    #[mmio(PureRead)]
    part_id1: u32,
    _reserved0: [u32; 2],
    /// Bank 1: unique device id.
    #[mmio(PureRead)]
    unique_id0: u32,
    #[mmio(PureRead)]
    unique_id1: u32,
    #[mmio(PureRead)]
    unique_id2: u32,
    #[mmio(PureRead)]
    unique_id3: u32,
    /// Bank 2: AES key storage (write-only hardware, reads as zero).
    _reserved1: [u32; 4],
    /// Bank 3 word 0: customer control word, including the boot source.
    #[mmio(PureRead)]
    ctrl: OtpCtrl,
    /// Bank 3 word 1: USB vendor/product id.
    #[mmio(PureRead)]
    usb_id: u32,
    /// Bank 3 words 2..3: general purpose fuses.
    #[mmio(PureRead)]
    user1: u32,
    #[mmio(PureRead)]
    user2: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Otp>(), 0x40);

impl Otp {
    /// Create the OTP MMIO instance at the fixed peripheral address.
    ///
    /// # Safety
    ///
    /// Creates a handle to a shared peripheral; the caller must ensure
    /// no concurrent conflicting access.
    pub const unsafe fn new_mmio_fixed() -> MmioOtp<'static> {
        unsafe { Self::new_mmio_at(OTP_BASE) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_word_offset() {
        assert_eq!(core::mem::offset_of!(Otp, ctrl), 0x30);
    }

    #[test]
    fn boot_src_field() {
        let ctrl = OtpCtrl::new_with_raw_value(0x5 << 25);
        assert_eq!(ctrl.boot_src().value(), 0x5);
        // Neighboring bits do not leak into the field.
        let ctrl = OtpCtrl::new_with_raw_value((1 << 24) | (1 << 29));
        assert_eq!(ctrl.boot_src().value(), 0);
    }
}
