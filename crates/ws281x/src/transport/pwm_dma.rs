//! PWM + DMA backend.
//!
//! The original signal path: the encoder's bit buffer lives in uncached
//! memory, one DMA control block points it at the PWM FIFO, and the PWM
//! serializer shifts it out of the GPIO pin at the symbol clock. After
//! `submit` the CPU is out of the loop until the next render.

use board::BoardInfo;
use tracing::{debug, info};
use types::DriverConfig;

use crate::buffer::DmaBuffer;
use crate::clock::ClockManager;
use crate::dma::{ControlBlock, DmaEngine, CONTROL_BLOCK_BYTES};
use crate::encoder;
use crate::error::DriverError;
use crate::gpio;
use crate::mmio::MmioRegion;
use crate::pwm::{PwmChannel, PwmEngine};
use crate::reg;

pub struct PwmDma {
    // Held for the registers it keeps mapped; drop order does not matter
    // once the PWM is stopped.
    buffer: DmaBuffer,
    dma: DmaEngine,
    pwm: PwmEngine,
    clock: ClockManager,
    #[allow(dead_code)]
    gpio: MmioRegion,
    stride: usize,
    word_count: usize,
}

fn map_block(periph_base: u32, offset: u32, len: usize) -> Result<MmioRegion, DriverError> {
    MmioRegion::map(periph_base as u64 + offset as u64, len).map_err(DriverError::MapRegisters)
}

impl PwmDma {
    /// Acquire the peripheral blocks and bring the signal path up.
    ///
    /// On any failure everything acquired so far is released again in
    /// reverse order as the error propagates out.
    pub fn new(board: &BoardInfo, config: &DriverConfig) -> Result<Self, DriverError> {
        let active: Vec<usize> = (0..config.channels.len())
            .filter(|&i| config.channels[i].is_active())
            .collect();
        let stride = active.len().max(1);

        let max_count = config
            .channels
            .iter()
            .map(|ch| ch.count)
            .max()
            .unwrap_or(0);
        let bytes_per_channel = encoder::pwm_byte_count(max_count, config.freq);
        let word_count = bytes_per_channel * stride / 4;

        let dma_offset = reg::dma_engine_offset(config.dma_num).ok_or_else(|| {
            DriverError::PwmSetup(format!("no DMA engine {}", config.dma_num))
        })?;

        let mut buffer = DmaBuffer::alloc(
            board,
            CONTROL_BLOCK_BYTES + bytes_per_channel * stride,
        )?;

        let dma = DmaEngine::new(map_block(board.periph_base, dma_offset, reg::dma::LEN)?);
        let pwm = PwmEngine::new(map_block(board.periph_base, reg::PWM_OFFSET, reg::pwm::LEN)?);
        let gpio_regs = MmioRegion::map_gpio(
            board.periph_base as u64 + reg::GPIO_OFFSET as u64,
            reg::gpio::LEN,
        )
        .map_err(DriverError::MapRegisters)?;
        let clock = ClockManager::new(map_block(
            board.periph_base,
            reg::CM_PWM_OFFSET,
            reg::cm::LEN,
        )?);

        for (i, channel) in config.channels.iter().enumerate() {
            if channel.gpio_pin != 0 {
                gpio::select_pwm(&gpio_regs, i, channel.gpio_pin)?;
            }
        }

        // Quiesce whatever state the blocks were left in, then bring the
        // clock up before the serializer.
        pwm.stop();
        clock.stop();
        clock.start(board.osc_freq(), config.freq);

        let mut pwm_channels = [PwmChannel::default(); 2];
        for (i, channel) in config.channels.iter().enumerate() {
            pwm_channels[i] = PwmChannel {
                enabled: channel.is_active(),
                invert: channel.invert,
            };
        }
        pwm.start(pwm_channels);

        let cb = ControlBlock::for_pwm(
            buffer.data_bus_addr(),
            (bytes_per_channel * stride) as u32,
        );
        buffer.write_control_block(cb);
        dma.reset();

        info!(
            dma_num = config.dma_num,
            freq = config.freq,
            stride,
            bytes = bytes_per_channel * stride,
            "PWM/DMA signal path up"
        );

        Ok(Self {
            buffer,
            dma,
            pwm,
            clock,
            gpio: gpio_regs,
            stride,
            word_count,
        })
    }

    pub fn words(&mut self) -> &mut [u32] {
        let count = self.word_count;
        &mut self.buffer.data_words()[..count]
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn submit(&mut self) -> Result<(), DriverError> {
        self.dma.start(self.buffer.cb_bus_addr());
        Ok(())
    }

    pub fn wait(&mut self) -> Result<(), DriverError> {
        self.dma.wait()
    }

    /// Stop the output: drain the last transfer, kill the serializer and
    /// its clock.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.dma.wait() {
            debug!(error = %e, "DMA error during shutdown");
        }
        self.pwm.stop();
        self.clock.stop();
    }
}
