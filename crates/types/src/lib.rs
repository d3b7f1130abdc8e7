//! Shared color, strip-format and configuration types for strand.

use serde::{Deserialize, Serialize};

/// One LED color word, layout `0xWWRRGGBB`.
///
/// The white byte is only meaningful on 4-color (RGBW) strips and is
/// ignored everywhere else.
pub type Led = u32;

/// Build a 3-color LED word.
pub const fn rgb(r: u8, g: u8, b: u8) -> Led {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Build a 4-color LED word.
pub const fn rgbw(r: u8, g: u8, b: u8, w: u8) -> Led {
    ((w as u32) << 24) | rgb(r, g, b)
}

/// Canonical WS281x bit rate in Hz.
pub const TARGET_FREQ: u32 = 800_000;

/// Lowest supported bit rate in Hz (older 400 kHz chips).
pub const MIN_FREQ: u32 = 400_000;

/// Number of output channels a controller drives.
pub const CHANNEL_COUNT: usize = 2;

/// Strip color ordering.
///
/// Each variant corresponds to a packed word of four 8-bit shift amounts:
/// `(w << 24) | (r << 16) | (g << 8) | b`, naming which byte of the user
/// color word is emitted in each wire slot. A nonzero high byte marks a
/// 4-color strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripFormat {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
    Rgbw,
    Rbgw,
    Grbw,
    Gbrw,
    Brgw,
    Bgrw,
}

impl StripFormat {
    /// The packed shift word for this ordering.
    pub const fn word(self) -> u32 {
        match self {
            StripFormat::Rgb => 0x0010_0800,
            StripFormat::Rbg => 0x0010_0008,
            StripFormat::Grb => 0x0008_1000,
            StripFormat::Gbr => 0x0008_0010,
            StripFormat::Brg => 0x0000_1008,
            StripFormat::Bgr => 0x0000_0810,
            StripFormat::Rgbw => 0x1810_0800,
            StripFormat::Rbgw => 0x1810_0008,
            StripFormat::Grbw => 0x1808_1000,
            StripFormat::Gbrw => 0x1808_0010,
            StripFormat::Brgw => 0x1800_1008,
            StripFormat::Bgrw => 0x1800_0810,
        }
    }

    /// True for 4-color (RGBW) strips.
    pub const fn is_rgbw(self) -> bool {
        self.word() >> 24 != 0
    }

    /// The per-slot shift amounts for this ordering.
    pub const fn shifts(self) -> ColorShifts {
        ColorShifts::from_word(self.word())
    }
}

impl std::str::FromStr for StripFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "rbg" => Ok(Self::Rbg),
            "grb" => Ok(Self::Grb),
            "gbr" => Ok(Self::Gbr),
            "brg" => Ok(Self::Brg),
            "bgr" => Ok(Self::Bgr),
            "rgbw" => Ok(Self::Rgbw),
            "rbgw" => Ok(Self::Rbgw),
            "grbw" => Ok(Self::Grbw),
            "gbrw" => Ok(Self::Gbrw),
            "brgw" => Ok(Self::Brgw),
            "bgrw" => Ok(Self::Bgrw),
            other => Err(format!("'{other}' is not a strip format")),
        }
    }
}

/// Shift amounts extracting each wire slot's source byte from a [`Led`].
///
/// The slots are emitted in `r, g, b[, w]` order; a GRB strip is expressed
/// by pointing the first slot's shift at the green byte, not by reordering
/// the slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorShifts {
    pub r: u32,
    pub g: u32,
    pub b: u32,
    /// White-slot shift; zero means 3-color strip.
    pub w: u32,
}

impl ColorShifts {
    /// Decode a packed strip word. A zero word defaults to RGB.
    pub const fn from_word(word: u32) -> Self {
        if word == 0 {
            return StripFormat::Rgb.shifts();
        }
        Self {
            w: (word >> 24) & 0xff,
            r: (word >> 16) & 0xff,
            g: (word >> 8) & 0xff,
            b: word & 0xff,
        }
    }

    /// Color slots per pixel on the wire (3 or 4).
    pub const fn colors(&self) -> usize {
        if self.w != 0 { 4 } else { 3 }
    }
}

/// Configuration for one output channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// GPIO pin with a PWM alternate function; 0 marks the channel unused.
    pub gpio_pin: u8,
    /// Invert the output polarity in hardware (open-collector level
    /// shifters need this).
    pub invert: bool,
    /// Number of LEDs on the chain.
    pub count: usize,
    /// Brightness 0..=255, applied as `(component * (brightness + 1)) >> 8`.
    pub brightness: u8,
    /// Strip color ordering.
    pub strip: StripFormat,
    /// Optional 256-entry gamma lookup; identity when absent.
    #[serde(skip)]
    pub gamma: Option<Box<[u8; 256]>>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 0,
            invert: false,
            count: 0,
            brightness: 255,
            strip: StripFormat::default(),
            gamma: None,
        }
    }
}

impl ChannelConfig {
    /// True when this channel drives a strip.
    pub fn is_active(&self) -> bool {
        self.gpio_pin != 0 && self.count > 0
    }
}

/// Signal backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Pick from detected hardware: PWM+DMA when the board is known,
    /// the RP1 character device when its node exists.
    #[default]
    Auto,
    /// On-chip PWM fed by DMA (Pi 1/2/3/4).
    PwmDma,
    /// `/dev/ws281x_pwm` kernel driver (Pi 5 / RP1).
    Rp1Pwm,
    /// External FPGA hat over spidev.
    FpgaSpi,
}

/// Full controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Output bit rate in Hz. 800 kHz for WS2812/SK6812; can go as low
    /// as 400 kHz for first-generation WS2811 chips.
    pub freq: u32,
    /// DMA engine index, 0..=15. Engines 0, 1 and 15 are used by the
    /// firmware/graphics stack on some boards; choosing one of those is
    /// the caller's risk.
    pub dma_num: usize,
    /// Signal backend.
    pub backend: Backend,
    /// Output channels; channel 0 on even buffer words, channel 1 on odd.
    pub channels: [ChannelConfig; CHANNEL_COUNT],
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            freq: TARGET_FREQ,
            dma_num: 10,
            backend: Backend::default(),
            channels: [ChannelConfig::default(), ChannelConfig::default()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StripFormat; 12] = [
        StripFormat::Rgb,
        StripFormat::Rbg,
        StripFormat::Grb,
        StripFormat::Gbr,
        StripFormat::Brg,
        StripFormat::Bgr,
        StripFormat::Rgbw,
        StripFormat::Rbgw,
        StripFormat::Grbw,
        StripFormat::Gbrw,
        StripFormat::Brgw,
        StripFormat::Bgrw,
    ];

    #[test]
    fn test_shifts_are_permutations() {
        for format in ALL {
            let s = format.shifts();
            let mut shifts = if format.is_rgbw() {
                vec![s.r, s.g, s.b, s.w]
            } else {
                assert_eq!(s.w, 0);
                vec![s.r, s.g, s.b]
            };
            shifts.sort_unstable();
            if format.is_rgbw() {
                assert_eq!(shifts, vec![0, 8, 16, 24], "{format:?}");
            } else {
                assert_eq!(shifts, vec![0, 8, 16], "{format:?}");
            }
        }
    }

    #[test]
    fn test_zero_word_defaults_to_rgb() {
        assert_eq!(ColorShifts::from_word(0), StripFormat::Rgb.shifts());
    }

    #[test]
    fn test_grb_puts_green_first() {
        // First wire slot of a GRB strip sources the green byte.
        let s = StripFormat::Grb.shifts();
        assert_eq!(s.r, 8);
        assert_eq!(s.g, 16);
        assert_eq!(s.b, 0);
        assert_eq!(s.colors(), 3);
    }

    #[test]
    fn test_rgbw_flag() {
        assert!(StripFormat::Grbw.is_rgbw());
        assert!(!StripFormat::Grb.is_rgbw());
        assert_eq!(StripFormat::Grbw.shifts().colors(), 4);
        assert_eq!(StripFormat::Grbw.shifts().w, 24);
    }

    #[test]
    fn test_led_constructors() {
        assert_eq!(rgb(0x11, 0x22, 0x33), 0x0011_2233);
        assert_eq!(rgbw(0x11, 0x22, 0x33, 0x44), 0x4411_2233);
    }

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.freq, TARGET_FREQ);
        assert!(!config.channels[0].is_active());
        assert_eq!(config.channels[0].brightness, 255);
    }
}
