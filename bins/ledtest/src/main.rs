//! ledtest: animated test pattern for WS281x chains.
//!
//! Exit codes: 0 after a clean finite run, 1 when hardware init fails,
//! 255 when interrupted after successful init.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use types::{ChannelConfig, DriverConfig, Led, StripFormat};
use ws281x::Driver;

#[derive(Parser)]
#[command(name = "ledtest", about = "WS281x LED chain test pattern")]
struct Args {
    /// Path to a TOML driver configuration; overrides the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// GPIO pin with a PWM alternate function
    #[arg(short, long, default_value = "18")]
    gpio: u8,

    /// Number of LEDs on the chain
    #[arg(short, long, default_value = "64")]
    count: usize,

    /// DMA engine index
    #[arg(short, long, default_value = "10")]
    dma: usize,

    /// Strip color ordering (rgb, grb, grbw, ...)
    #[arg(short, long, default_value = "grb")]
    strip: StripFormat,

    /// Brightness 0-255
    #[arg(short, long, default_value = "64")]
    brightness: u8,

    /// Invert the output polarity (inverting level shifter)
    #[arg(short, long)]
    invert: bool,

    /// Bit rate in Hz
    #[arg(long, default_value = "800000")]
    freq: u32,

    /// Frames per second
    #[arg(long, default_value = "15")]
    fps: u32,

    /// Stop after this many frames (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    frames: u64,
}

fn load_config(args: &Args) -> Result<DriverConfig> {
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return toml::from_str(&text).with_context(|| format!("parsing {}", path.display()));
    }

    let mut config = DriverConfig {
        freq: args.freq,
        dma_num: args.dma,
        ..Default::default()
    };
    config.channels[0] = ChannelConfig {
        gpio_pin: args.gpio,
        invert: args.invert,
        count: args.count,
        brightness: args.brightness,
        strip: args.strip,
        ..Default::default()
    };
    Ok(config)
}

/// The classic dot-chase: eight colored dots crawling along the chain.
struct Chase {
    dots: [usize; 8],
    colors: [Led; 8],
}

impl Chase {
    fn new() -> Self {
        Self {
            dots: [0, 1, 2, 3, 4, 5, 6, 7],
            colors: [
                0x0020_0000, // red
                0x0020_1000, // orange
                0x0020_2000, // yellow
                0x0000_2000, // green
                0x0000_2020, // light blue
                0x0000_0020, // blue
                0x0010_0010, // purple
                0x0020_0010, // pink
            ],
        }
    }

    fn step(&mut self, leds: &mut [Led]) {
        if leds.is_empty() {
            return;
        }
        // Fade what is there, then repaint the dots one step on.
        for led in leds.iter_mut() {
            let (r, g, b) = (*led >> 16 & 0xff, *led >> 8 & 0xff, *led & 0xff);
            *led = (r * 3 / 4) << 16 | (g * 3 / 4) << 8 | (b * 3 / 4);
        }
        for (dot, color) in self.dots.iter_mut().zip(self.colors) {
            *dot = (*dot + 1) % leds.len();
            leds[*dot] = color;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ledtest=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bad configuration");
            std::process::exit(1);
        }
    };

    info!(
        gpio = config.channels[0].gpio_pin,
        count = config.channels[0].count,
        dma = config.dma_num,
        freq = config.freq,
        "starting"
    );

    let mut driver = match Driver::new(config) {
        Ok(driver) => driver,
        Err(e) => {
            error!(error = %e, "hardware init failed");
            std::process::exit(1);
        }
    };

    let mut chase = Chase::new();
    let mut frame_timer =
        tokio::time::interval(Duration::from_micros(1_000_000 / args.fps.max(1) as u64));
    let mut rendered: u64 = 0;
    let mut interrupted = false;
    let mut failed = false;

    loop {
        tokio::select! {
            _ = frame_timer.tick() => {
                chase.step(driver.leds_mut(0));
                if let Err(e) = driver.render() {
                    error!(error = %e, "render failed");
                    failed = true;
                    break;
                }
                rendered += 1;
                if args.frames != 0 && rendered >= args.frames {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                interrupted = true;
                break;
            }
        }
    }

    // Leave the chain dark.
    driver.leds_mut(0).fill(0);
    let _ = driver.render();
    let _ = driver.wait();
    driver.shutdown();

    if interrupted {
        std::process::exit(255);
    }
    if failed {
        std::process::exit(1);
    }
    info!(frames = rendered, "done");
}
