//! PWM peripheral programming.
//!
//! The PWM block runs in serializer mode: it shifts each 32-bit FIFO word
//! out MSB-first at the symbol clock. With both channels enabled it pops
//! alternate FIFO words for the two outputs, which is why the bit buffer
//! interleaves channel words.

use std::thread::sleep;
use std::time::Duration;

use crate::mmio::MmioRegion;
use crate::reg::pwm::{self, Ctl};

/// Delay between control-register writes. The block is known to lock up
/// when reprogrammed without settling time.
const SETTLE: Duration = Duration::from_micros(10);

/// Bits serialized per FIFO word.
const BITS_PER_WORD: u32 = 32;

/// DMA pacing thresholds (FIFO words).
const PANIC_THRESHOLD: u32 = 7;
const DREQ_THRESHOLD: u32 = 3;

/// Per-channel settings the PWM block cares about.
#[derive(Debug, Clone, Copy, Default)]
pub struct PwmChannel {
    pub enabled: bool,
    pub invert: bool,
}

pub struct PwmEngine {
    regs: MmioRegion,
}

impl PwmEngine {
    pub fn new(regs: MmioRegion) -> Self {
        Self { regs }
    }

    /// Turn the peripheral off.
    pub fn stop(&self) {
        self.regs.write(pwm::CTL, 0);
        sleep(SETTLE);
    }

    /// Control word for the given channel setup: FIFO-sourced serializer
    /// mode with optional hardware polarity inversion, transmit enabled.
    fn control_word(channels: [PwmChannel; 2]) -> Ctl {
        let mut ctl = Ctl::empty();
        if channels[0].enabled {
            ctl |= Ctl::USEF1 | Ctl::MODE1;
            if channels[0].invert {
                ctl |= Ctl::POLA1;
            }
            ctl |= Ctl::PWEN1;
        }
        if channels[1].enabled {
            ctl |= Ctl::USEF2 | Ctl::MODE2;
            if channels[1].invert {
                ctl |= Ctl::POLA2;
            }
            ctl |= Ctl::PWEN2;
        }
        ctl
    }

    /// Program serializer mode on the enabled channels and start
    /// transmitting (the FIFO is empty until DMA feeds it).
    pub fn start(&self, channels: [PwmChannel; 2]) {
        self.regs.write(pwm::RNG1, BITS_PER_WORD);
        self.regs.write(pwm::RNG2, BITS_PER_WORD);
        sleep(SETTLE);

        self.regs.write(pwm::CTL, Ctl::CLRF1.bits());
        sleep(SETTLE);

        self.regs.write(
            pwm::DMAC,
            pwm::DMAC_ENAB | pwm::dmac_panic(PANIC_THRESHOLD) | pwm::dmac_dreq(DREQ_THRESHOLD),
        );
        sleep(SETTLE);

        self.regs.write(pwm::CTL, Self::control_word(channels).bits());
        sleep(SETTLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg;

    const BOTH: [PwmChannel; 2] = [
        PwmChannel {
            enabled: true,
            invert: false,
        },
        PwmChannel {
            enabled: true,
            invert: false,
        },
    ];

    #[test]
    fn test_control_word_single_channel() {
        let ctl = PwmEngine::control_word([
            PwmChannel {
                enabled: true,
                invert: false,
            },
            PwmChannel::default(),
        ]);
        assert_eq!(ctl, Ctl::USEF1 | Ctl::MODE1 | Ctl::PWEN1);
    }

    #[test]
    fn test_control_word_inverted() {
        let ctl = PwmEngine::control_word([
            PwmChannel {
                enabled: true,
                invert: true,
            },
            PwmChannel::default(),
        ]);
        assert!(ctl.contains(Ctl::POLA1));
        assert!(!ctl.contains(Ctl::POLA2));
    }

    #[test]
    fn test_start_programs_serializer() {
        let engine = PwmEngine::new(MmioRegion::anon(reg::pwm::LEN));
        engine.start(BOTH);

        assert_eq!(engine.regs.read(pwm::RNG1), 32);
        assert_eq!(engine.regs.read(pwm::RNG2), 32);
        assert_eq!(engine.regs.read(pwm::DMAC), pwm::DMAC_ENAB | 0x703);
        let ctl = Ctl::from_bits_truncate(engine.regs.read(pwm::CTL));
        assert!(ctl.contains(Ctl::USEF1 | Ctl::MODE1 | Ctl::PWEN1));
        assert!(ctl.contains(Ctl::USEF2 | Ctl::MODE2 | Ctl::PWEN2));
    }
}
