//! Signal backends.
//!
//! Every backend consumes the same encoder output; they differ in how the
//! words reach the wire. The controller talks to the tagged [`Transport`]
//! variant through `{words, submit, wait}` and never sees the hardware
//! underneath.

mod pwm_dma;
mod rp1;
mod spi;

pub use pwm_dma::PwmDma;
pub use rp1::Rp1Pwm;
pub use spi::FpgaSpi;

use crate::error::DriverError;

pub enum Transport {
    /// On-chip PWM serializer fed by DMA (Pi 1/2/3/4).
    PwmDma(PwmDma),
    /// RP1 kernel driver character device (Pi 5).
    Rp1(Rp1Pwm),
    /// External FPGA hat over spidev.
    Spi(FpgaSpi),
}

impl Transport {
    /// The bit-buffer words the encoder writes into.
    pub fn words(&mut self) -> &mut [u32] {
        match self {
            Transport::PwmDma(t) => t.words(),
            Transport::Rp1(t) => t.words(),
            Transport::Spi(t) => t.words(),
        }
    }

    /// Word stride between consecutive words of one channel.
    pub fn stride(&self) -> usize {
        match self {
            Transport::PwmDma(t) => t.stride(),
            Transport::Rp1(_) | Transport::Spi(_) => 1,
        }
    }

    /// Hand the current buffer to the hardware. Non-blocking.
    pub fn submit(&mut self) -> Result<(), DriverError> {
        match self {
            Transport::PwmDma(t) => t.submit(),
            Transport::Rp1(t) => t.submit(),
            Transport::Spi(t) => t.submit(),
        }
    }

    /// Block until the previous submission has left the hardware.
    pub fn wait(&mut self) -> Result<(), DriverError> {
        match self {
            Transport::PwmDma(t) => t.wait(),
            Transport::Rp1(t) => t.wait(),
            Transport::Spi(t) => t.wait(),
        }
    }

    /// Quiesce the output. Called once at teardown.
    pub fn shutdown(&mut self) {
        match self {
            Transport::PwmDma(t) => t.shutdown(),
            Transport::Rp1(_) => {}
            Transport::Spi(t) => t.shutdown(),
        }
    }
}
