//! Userspace WS281x / SK6812 LED chain driver.
//!
//! Converts an array of 32-bit color words into the self-clocking serial
//! waveform the chips expect and streams it out of a GPIO pin without CPU
//! involvement: the bit pattern is pre-rendered into an uncached,
//! physically contiguous buffer and clocked out by the PWM peripheral
//! under DMA.
//!
//! ```no_run
//! use types::{ChannelConfig, DriverConfig, StripFormat};
//!
//! let mut config = DriverConfig::default();
//! config.channels[0] = ChannelConfig {
//!     gpio_pin: 18,
//!     count: 64,
//!     strip: StripFormat::Grb,
//!     ..Default::default()
//! };
//!
//! let mut driver = ws281x::Driver::new(config)?;
//! driver.leds_mut(0)[0] = types::rgb(255, 0, 0);
//! driver.render()?;
//! driver.wait()?;
//! # Ok::<(), ws281x::DriverError>(())
//! ```

pub mod encoder;
pub mod transport;

mod buffer;
mod clock;
mod dma;
mod driver;
mod error;
mod gpio;
mod mmio;
mod pwm;
mod reg;

pub use driver::Driver;
pub use error::DriverError;
pub use types::{Backend, ChannelConfig, DriverConfig, Led, StripFormat};
