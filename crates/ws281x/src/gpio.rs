//! GPIO alternate-function routing for the PWM outputs.

use crate::error::DriverError;
use crate::mmio::MmioRegion;
use crate::reg;

/// Pins carrying PWM0 and the alternate function that selects it.
const CHANNEL0_PINS: &[(u8, u8)] = &[(12, 0), (18, 5), (40, 0), (52, 1)];

/// Pins carrying PWM1.
const CHANNEL1_PINS: &[(u8, u8)] = &[(13, 0), (19, 5), (41, 0), (45, 0), (53, 1)];

/// Alternate-function number routing `pin` to the given PWM channel.
pub fn pwm_alt_fn(channel: usize, pin: u8) -> Option<u8> {
    let table = match channel {
        0 => CHANNEL0_PINS,
        1 => CHANNEL1_PINS,
        _ => return None,
    };
    table
        .iter()
        .find_map(|&(p, alt)| (p == pin).then_some(alt))
}

/// Switch `pin` to its PWM alternate function for `channel`.
///
/// Fails with [`DriverError::UnsupportedPin`] before touching any
/// register when the pin has no PWM function on that channel.
pub fn select_pwm(gpio: &MmioRegion, channel: usize, pin: u8) -> Result<(), DriverError> {
    let alt = pwm_alt_fn(channel, pin).ok_or(DriverError::UnsupportedPin { channel, pin })?;
    set_function(gpio, pin, reg::gpio::ALT_FN[alt as usize]);
    Ok(())
}

/// Write the 3-bit function-select field for `pin`.
fn set_function(gpio: &MmioRegion, pin: u8, code: u32) {
    let reg = (pin as usize / 10) * 4;
    let shift = (pin as u32 % 10) * 3;

    let mut fsel = gpio.read(reg);
    fsel &= !(0x7 << shift);
    fsel |= code << shift;
    gpio.write(reg, fsel);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_tables() {
        assert_eq!(pwm_alt_fn(0, 18), Some(5));
        assert_eq!(pwm_alt_fn(0, 12), Some(0));
        assert_eq!(pwm_alt_fn(0, 52), Some(1));
        assert_eq!(pwm_alt_fn(1, 13), Some(0));
        assert_eq!(pwm_alt_fn(1, 19), Some(5));
        assert_eq!(pwm_alt_fn(1, 53), Some(1));
    }

    #[test]
    fn test_unmapped_pins_are_rejected() {
        assert_eq!(pwm_alt_fn(0, 17), None);
        assert_eq!(pwm_alt_fn(0, 13), None, "13 is PWM1, not PWM0");
        assert_eq!(pwm_alt_fn(1, 18), None, "18 is PWM0, not PWM1");
        assert_eq!(pwm_alt_fn(2, 18), None);
    }

    #[test]
    fn test_unsupported_pin_leaves_registers_untouched() {
        let gpio = MmioRegion::anon(reg::gpio::LEN);
        gpio.write(4, 0x1234_5678);
        let err = select_pwm(&gpio, 0, 17).unwrap_err();
        assert!(matches!(
            err,
            DriverError::UnsupportedPin { channel: 0, pin: 17 }
        ));
        assert_eq!(gpio.read(4), 0x1234_5678);
    }

    #[test]
    fn test_function_select_field() {
        let gpio = MmioRegion::anon(reg::gpio::LEN);
        // Pin 18: FSEL1, bits 26:24; alt5 = 0b010.
        gpio.write(4, 0xffff_ffff);
        select_pwm(&gpio, 0, 18).unwrap();
        assert_eq!(gpio.read(4), (0xffff_ffff & !(0x7 << 24)) | (0b010 << 24));

        // Pin 12: FSEL1, bits 8:6; alt0 = 0b100.
        let gpio = MmioRegion::anon(reg::gpio::LEN);
        select_pwm(&gpio, 0, 12).unwrap();
        assert_eq!(gpio.read(4), 0b100 << 6);
    }
}
