//! CLI tool for poking LED chains and checking board detection.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use types::{ChannelConfig, DriverConfig, StripFormat};
use ws281x::Driver;

#[derive(Parser)]
#[command(name = "ledctl", about = "strand command-line interface")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected board
    Detect,
    /// Set the whole chain to one color
    Fill {
        /// Color as hex RRGGBB or WWRRGGBB
        color: String,

        #[arg(short, long, default_value = "18")]
        gpio: u8,

        #[arg(short, long, default_value = "64")]
        count: usize,

        #[arg(short, long, default_value = "grb")]
        strip: StripFormat,

        #[arg(short, long, default_value = "255")]
        brightness: u8,

        #[arg(short, long, default_value = "10")]
        dma: usize,
    },
    /// Turn the chain off
    Off {
        #[arg(short, long, default_value = "18")]
        gpio: u8,

        #[arg(short, long, default_value = "64")]
        count: usize,

        #[arg(short, long, default_value = "10")]
        dma: usize,
    },
}

fn parse_color(s: &str) -> Result<u32> {
    let hex = s.trim_start_matches('#').trim_start_matches("0x");
    if hex.len() > 8 {
        bail!("'{s}' is not a hex color");
    }
    u32::from_str_radix(hex, 16).with_context(|| format!("'{s}' is not a hex color"))
}

fn chain_config(gpio: u8, count: usize, strip: StripFormat, brightness: u8, dma: usize) -> DriverConfig {
    let mut config = DriverConfig {
        dma_num: dma,
        ..Default::default()
    };
    config.channels[0] = ChannelConfig {
        gpio_pin: gpio,
        count,
        strip,
        brightness,
        ..Default::default()
    };
    config
}

fn fill(config: DriverConfig, color: u32) -> Result<()> {
    let mut driver = Driver::new(config)?;
    driver.leds_mut(0).fill(color);
    driver.render()?;
    driver.wait()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Detect => {
            let info = board::detect()?;
            println!("board          : {}", info.desc);
            println!("revision       : {:#010x}", info.revision);
            println!("family         : {:?}", info.family);
            println!("peripheral base: {:#010x}", info.periph_base);
            println!("videocore base : {:#010x}", info.videocore_base);
            println!("oscillator     : {} Hz", info.osc_freq());
        }
        Commands::Fill {
            color,
            gpio,
            count,
            strip,
            brightness,
            dma,
        } => {
            let color = parse_color(&color)?;
            fill(chain_config(gpio, count, strip, brightness, dma), color)?;
            println!("filled {count} LEDs with {color:#08x}");
        }
        Commands::Off { gpio, count, dma } => {
            fill(
                chain_config(gpio, count, StripFormat::Grb, 255, dma),
                0,
            )?;
            println!("chain off");
        }
    }

    Ok(())
}
