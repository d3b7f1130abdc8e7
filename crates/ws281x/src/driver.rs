//! Driver orchestration: init, render, wait, teardown.

use board::BoardInfo;
use tracing::info;
use types::{Backend, DriverConfig, Led, CHANNEL_COUNT, MIN_FREQ};

use crate::encoder;
use crate::error::DriverError;
use crate::gpio;
use crate::transport::{FpgaSpi, PwmDma, Rp1Pwm, Transport};

/// A configured LED chain controller.
///
/// Owns the LED arrays, the encoder's output buffer and the hardware
/// behind it. One driver claims one DMA engine, the PWM block and the
/// PWM clock for its lifetime; running two drivers on the same engine is
/// unsupported. At most one transfer is in flight per driver; `render`
/// waits out the previous one before touching the buffer.
pub struct Driver {
    config: DriverConfig,
    board: Option<BoardInfo>,
    leds: [Vec<Led>; CHANNEL_COUNT],
    transport: Transport,
    down: bool,
}

fn validate(config: &DriverConfig) -> Result<(), DriverError> {
    if config.freq < MIN_FREQ {
        return Err(DriverError::PwmSetup(format!(
            "bit rate {} Hz is below the {} Hz minimum",
            config.freq, MIN_FREQ
        )));
    }
    Ok(())
}

/// Reject unroutable pins before anything is allocated or mapped.
fn validate_pins(config: &DriverConfig) -> Result<(), DriverError> {
    for (channel, ch) in config.channels.iter().enumerate() {
        if ch.gpio_pin != 0 && gpio::pwm_alt_fn(channel, ch.gpio_pin).is_none() {
            return Err(DriverError::UnsupportedPin {
                channel,
                pin: ch.gpio_pin,
            });
        }
    }
    Ok(())
}

impl Driver {
    /// Bring the hardware up for the given configuration.
    ///
    /// Detects the board, allocates the LED arrays and the uncached bit
    /// buffer, maps the peripheral blocks, routes the GPIO pins and
    /// programs clock, PWM and DMA. Any failure releases what was
    /// acquired and returns the error; the value only exists fully
    /// initialized.
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        validate(&config)?;

        let mut board = None;
        let transport = match config.backend {
            Backend::PwmDma => {
                validate_pins(&config)?;
                let info = board::detect()?;
                let t = Transport::PwmDma(PwmDma::new(&info, &config)?);
                board = Some(info);
                t
            }
            Backend::Rp1Pwm => Transport::Rp1(Rp1Pwm::new(&config)?),
            Backend::FpgaSpi => Transport::Spi(FpgaSpi::new(&config)?),
            Backend::Auto => {
                validate_pins(&config)?;
                match board::detect() {
                    Ok(info) => {
                        let t = Transport::PwmDma(PwmDma::new(&info, &config)?);
                        board = Some(info);
                        t
                    }
                    Err(_) if Rp1Pwm::available() => {
                        info!("board not in the revision tables, using the RP1 kernel driver");
                        Transport::Rp1(Rp1Pwm::new(&config)?)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if !matches!(transport, Transport::PwmDma(_)) && config.channels[1].is_active() {
            return Err(DriverError::PwmSetup(
                "this backend drives a single chain; configure channel 0 only".into(),
            ));
        }

        let leds = [
            vec![0; config.channels[0].count],
            vec![0; config.channels[1].count],
        ];

        Ok(Self {
            config,
            board,
            leds,
            transport,
            down: false,
        })
    }

    /// The detected board, when a local-peripheral backend is in use.
    pub fn board(&self) -> Option<&BoardInfo> {
        self.board.as_ref()
    }

    /// One channel's LED array.
    pub fn leds(&self, channel: usize) -> &[Led] {
        &self.leds[channel]
    }

    /// Mutable access to one channel's LED array. Do not mutate while a
    /// transfer is in flight; `render` snapshots the array into the bit
    /// buffer, so changes between `render` and `wait` affect nothing
    /// until the next render.
    pub fn leds_mut(&mut self, channel: usize) -> &mut [Led] {
        &mut self.leds[channel]
    }

    /// Adjust a channel's brightness for subsequent renders.
    pub fn set_brightness(&mut self, channel: usize, brightness: u8) {
        self.config.channels[channel].brightness = brightness;
    }

    /// Encode the current LED arrays and hand the frame to the hardware.
    ///
    /// Blocks only while a previous transfer is still draining; the new
    /// transfer runs in the background. A [`DriverError::Dma`] error is
    /// non-fatal and the driver stays usable.
    pub fn render(&mut self) -> Result<(), DriverError> {
        self.transport.wait()?;

        let stride = self.transport.stride();
        let mut offset = 0;
        for channel in 0..CHANNEL_COUNT {
            let cfg = &self.config.channels[channel];
            if !cfg.is_active() {
                continue;
            }
            let words = self.transport.words();
            encoder::clear_channel(words, offset, stride);
            encoder::encode_channel(
                &self.leds[channel],
                cfg.brightness,
                cfg.strip.shifts(),
                cfg.gamma.as_deref(),
                words,
                offset,
                stride,
            );
            offset += 1;
        }

        self.transport.submit()
    }

    /// Block until the in-flight transfer (if any) completes.
    pub fn wait(&mut self) -> Result<(), DriverError> {
        self.transport.wait()
    }

    /// Quiesce the output and stop the peripherals. Runs automatically
    /// on drop; calling it twice is a no-op.
    pub fn shutdown(&mut self) {
        if self.down {
            return;
        }
        self.down = true;
        self.transport.shutdown();
        for leds in &mut self.leds {
            leds.clear();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ChannelConfig;

    #[test]
    fn test_low_frequency_is_rejected() {
        let config = DriverConfig {
            freq: 100_000,
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(DriverError::PwmSetup(_))));
    }

    #[test]
    fn test_unroutable_pin_is_rejected_before_any_device_access() {
        let mut config = DriverConfig::default();
        config.channels[0] = ChannelConfig {
            gpio_pin: 17,
            count: 8,
            ..Default::default()
        };
        match validate_pins(&config) {
            Err(DriverError::UnsupportedPin { channel: 0, pin: 17 }) => {}
            other => panic!("expected UnsupportedPin, got {other:?}"),
        }
    }
}
