//! PWM clock manager.
//!
//! The PWM block is fed from the crystal oscillator divided down to three
//! times the LED bit rate: each data bit is emitted as a 3-bit symbol, so
//! the PWM serializer has to run at 3x.

use std::thread::sleep;
use std::time::Duration;

use tracing::debug;

use crate::mmio::MmioRegion;
use crate::reg::cm;

/// Settling delay between clock-manager writes. The block misbehaves when
/// reprogrammed back-to-back.
const SETTLE: Duration = Duration::from_micros(10);

/// Integer divider from the oscillator to the PWM bit clock.
fn divider(osc_freq: u32, freq: u32) -> u32 {
    osc_freq / (3 * freq)
}

pub struct ClockManager {
    regs: MmioRegion,
}

impl ClockManager {
    pub fn new(regs: MmioRegion) -> Self {
        Self { regs }
    }

    /// Kill a running clock and wait for the generator to go idle.
    pub fn stop(&self) {
        self.regs.write(cm::CTL, cm::PASSWD | cm::CTL_KILL);
        sleep(SETTLE);
        while self.regs.read(cm::CTL) & cm::CTL_BUSY != 0 {
            sleep(SETTLE);
        }
    }

    /// Program the divider for `3 * freq` from the oscillator and start
    /// the clock. Spins until the generator reports running.
    pub fn start(&self, osc_freq: u32, freq: u32) {
        let divi = divider(osc_freq, freq);
        debug!(osc_freq, freq, divi, "starting PWM clock");

        self.regs.write(cm::DIV, cm::PASSWD | cm::div_divi(divi));
        self.regs.write(cm::CTL, cm::PASSWD | cm::CTL_SRC_OSC);
        self.regs
            .write(cm::CTL, cm::PASSWD | cm::CTL_SRC_OSC | cm::CTL_ENAB);
        sleep(SETTLE);
        while self.regs.read(cm::CTL) & cm::CTL_BUSY == 0 {
            sleep(SETTLE);
        }
    }
}
