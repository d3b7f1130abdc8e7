//! DMA engine control.
//!
//! One control block, read by the engine from the uncached buffer,
//! describes the whole transfer: bit buffer to PWM FIFO, paced by the
//! PWM DREQ line. The CPU's only involvement after start is polling the
//! status register.

use std::thread::sleep;
use std::time::Duration;

use crate::error::DriverError;
use crate::mmio::MmioRegion;
use crate::reg::dma::{self, Cs, Ti};
use crate::reg::PWM_FIFO_BUS_ADDR;

const SETTLE: Duration = Duration::from_micros(10);

/// In-memory DMA control block.
///
/// The engine requires the block to sit at a 256-byte-aligned bus
/// address; the driver places it at offset 0 of the page-aligned
/// uncached buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlBlock {
    pub ti: u32,
    pub source_ad: u32,
    pub dest_ad: u32,
    pub txfr_len: u32,
    pub stride: u32,
    pub nextconbk: u32,
    reserved: [u32; 2],
}

/// Bytes a control block occupies in the buffer.
pub const CONTROL_BLOCK_BYTES: usize = std::mem::size_of::<ControlBlock>();

impl ControlBlock {
    /// Describe the bit-buffer-to-FIFO transfer.
    ///
    /// 32-bit writes, source incrementing, destination fixed on the FIFO
    /// and paced by the PWM DREQ; each write waits for its bus
    /// acknowledgment so FIFO words land in order.
    pub fn for_pwm(source_bus: u32, byte_count: u32) -> Self {
        let ti = (Ti::NO_WIDE_BURSTS | Ti::WAIT_RESP | Ti::DEST_DREQ | Ti::SRC_INC).bits()
            | dma::ti_permap(dma::PERMAP_PWM);
        Self {
            ti,
            source_ad: source_bus,
            dest_ad: PWM_FIFO_BUS_ADDR,
            txfr_len: byte_count,
            stride: 0,
            nextconbk: 0,
            reserved: [0; 2],
        }
    }

    /// The block as raw words, in register order.
    pub fn to_words(self) -> [u32; 8] {
        [
            self.ti,
            self.source_ad,
            self.dest_ad,
            self.txfr_len,
            self.stride,
            self.nextconbk,
            0,
            0,
        ]
    }
}

pub struct DmaEngine {
    regs: MmioRegion,
}

impl DmaEngine {
    pub fn new(regs: MmioRegion) -> Self {
        Self { regs }
    }

    /// Reset the engine and leave it idle.
    pub fn reset(&self) {
        self.regs.write(dma::CS, Cs::RESET.bits());
        sleep(SETTLE);
    }

    /// Kick off the transfer described by the control block at bus
    /// address `cb_bus`. Returns immediately; the engine runs alone.
    pub fn start(&self, cb_bus: u32) {
        self.reset();
        self.regs.write(dma::CS, (Cs::INT | Cs::END).bits());
        self.regs.write(dma::CONBLK_AD, cb_bus);
        // Clear latched read/FIFO error flags.
        self.regs.write(dma::DEBUG, 7);
        self.regs.write(
            dma::CS,
            Cs::WAIT_OUTSTANDING_WRITES.bits()
                | dma::cs_panic_priority(15)
                | dma::cs_priority(15)
                | Cs::ACTIVE.bits(),
        );
    }

    /// True while a transfer is running without error.
    fn in_flight(&self) -> bool {
        let cs = Cs::from_bits_truncate(self.regs.read(dma::CS));
        cs.contains(Cs::ACTIVE) && !cs.contains(Cs::ERROR)
    }

    /// Block until the current transfer completes.
    ///
    /// A hardware-reported error surfaces as [`DriverError::Dma`] with
    /// the DEBUG register contents. The error state is consumed: the
    /// engine is reset so the caller can render again.
    pub fn wait(&self) -> Result<(), DriverError> {
        while self.in_flight() {
            sleep(SETTLE);
        }

        let cs = Cs::from_bits_truncate(self.regs.read(dma::CS));
        if cs.contains(Cs::ERROR) {
            let debug = self.regs.read(dma::DEBUG);
            self.regs.write(dma::DEBUG, 7);
            self.reset();
            return Err(DriverError::Dma { debug });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg;

    #[test]
    fn test_control_block_layout() {
        assert_eq!(CONTROL_BLOCK_BYTES, 32);
        let cb = ControlBlock::for_pwm(0xc012_3400, 512);
        assert_eq!(cb.dest_ad, 0x7e20_c018);
        assert_eq!(cb.txfr_len, 512);
        assert_eq!(cb.nextconbk, 0, "single-shot transfer");
        // no-wide-bursts | wait-resp | dest-dreq | src-inc | PERMAP=PWM
        assert_eq!(cb.ti, (1 << 26) | (1 << 3) | (1 << 6) | (1 << 8) | (5 << 16));
    }

    #[test]
    fn test_wait_returns_when_idle() {
        let engine = DmaEngine::new(MmioRegion::anon(reg::dma::LEN));
        engine.wait().unwrap();
    }

    #[test]
    fn test_wait_reports_dma_error_with_debug_register() {
        let engine = DmaEngine::new(MmioRegion::anon(reg::dma::LEN));
        engine.regs.write(dma::CS, (Cs::ACTIVE | Cs::ERROR).bits());
        engine.regs.write(dma::DEBUG, 0x42);

        match engine.wait() {
            Err(DriverError::Dma { debug }) => assert_eq!(debug, 0x42),
            other => panic!("expected DMA error, got {other:?}"),
        }

        // The error was consumed; the engine is usable again.
        engine.wait().unwrap();
        engine.start(0xc000_0100);
        assert_eq!(engine.regs.read(dma::CONBLK_AD), 0xc000_0100);
    }
}
