//! FPGA hat backend over spidev.
//!
//! The hat moves all bit timing into FPGA logic; the host talks a small
//! 32-bit register protocol over SPI. A command word selects read or
//! write and carries a 24-bit address, optionally auto-incrementing for
//! burst writes into the channel's bank memory. Encoded words go into
//! bank 0 and the bank-length write with the stop flag kicks the
//! serializer.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::thread::sleep;
use std::time::Duration;

use tracing::info;
use types::DriverConfig;

use crate::encoder;
use crate::error::DriverError;

pub const DEVICE: &str = "/dev/spidev0.0";

const SPI_MODE: u8 = 0;
const SPI_BITS: u8 = 8;
const SPI_SPEED_HZ: u32 = 40_000_000;

/// FPGA logic clock feeding the symbol divider.
const LOGIC_FREQ: u32 = 60_000_000;

const CMD_WRITE: u32 = 1 << 31;
const CMD_READ: u32 = 1 << 30;
const CMD_INCREMENT: u32 = 1 << 29;

/// Channel-0 register block.
const WS281X0_BASE: u32 = 0x00_0000;
const REG_CONF: u32 = WS281X0_BASE + 0x04;
const REG_DIVIDE: u32 = WS281X0_BASE + 0x08;
const REG_STOP_COUNT: u32 = WS281X0_BASE + 0x0c;
const REG_INT_STATUS: u32 = WS281X0_BASE + 0x10;
const REG_MEM0_LEN: u32 = WS281X0_BASE + 0x18;
const MEM0_BASE: u32 = WS281X0_BASE + 0x1000;

const CONF_OUTPUT_ENABLE: u32 = 1 << 9;
const INT_STATUS_BANK0: u32 = 1 << 0;
const MEM_LEN_STOP: u32 = 1 << 31;

const fn conf_bits_per_word(bits: u32) -> u32 {
    bits & 0x3f
}

// spidev ioctls: _IOW('k', nr, size)
const fn spi_iow(nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    (1 << 30) | ((size as libc::c_ulong) << 16) | (0x6b << 8) | nr
}

const SPI_IOC_WR_MODE: libc::c_ulong = spi_iow(1, 1);
const SPI_IOC_WR_BITS_PER_WORD: libc::c_ulong = spi_iow(3, 1);
const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = spi_iow(4, 4);
const SPI_IOC_MESSAGE_1: libc::c_ulong = spi_iow(0, std::mem::size_of::<SpiTransfer>());

// Mirrors struct spi_ioc_transfer; only the kernel reads it.
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct SpiTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

pub struct FpgaSpi {
    file: File,
    words: Vec<u32>,
    in_flight: bool,
}

impl FpgaSpi {
    pub fn new(config: &DriverConfig) -> Result<Self, DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(DEVICE)
            .map_err(|e| DriverError::PwmSetup(format!("cannot open {DEVICE}: {e}")))?;

        let spi = Self {
            file,
            words: vec![0u32; encoder::buffer_word_count(config.channels[0].count, config.freq, 1)],
            in_flight: false,
        };
        spi.setup_spidev()?;

        // Symbol clock from the logic clock, stop gap, serializer on.
        spi.write_reg(REG_DIVIDE, LOGIC_FREQ / (3 * config.freq))?;
        spi.write_reg(REG_STOP_COUNT, encoder::LED_RESET_US as u32)?;
        spi.write_reg(REG_CONF, conf_bits_per_word(32) | CONF_OUTPUT_ENABLE)?;

        info!(device = DEVICE, freq = config.freq, "FPGA SPI backend up");
        Ok(spi)
    }

    fn setup_spidev(&self) -> Result<(), DriverError> {
        self.spidev_ioctl(SPI_IOC_WR_MODE, &SPI_MODE as *const u8 as *const libc::c_void)?;
        self.spidev_ioctl(
            SPI_IOC_WR_BITS_PER_WORD,
            &SPI_BITS as *const u8 as *const libc::c_void,
        )?;
        self.spidev_ioctl(
            SPI_IOC_WR_MAX_SPEED_HZ,
            &SPI_SPEED_HZ as *const u32 as *const libc::c_void,
        )
    }

    fn spidev_ioctl(&self, request: libc::c_ulong, arg: *const libc::c_void) -> Result<(), DriverError> {
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            return Err(DriverError::PwmSetup(format!(
                "spidev ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn xfer(&self, tx: &[u8], rx: Option<&mut [u8]>) -> Result<(), DriverError> {
        let transfer = SpiTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_ref().map_or(0, |buf| buf.as_ptr() as u64),
            len: tx.len() as u32,
            speed_hz: SPI_SPEED_HZ,
            bits_per_word: SPI_BITS,
            ..Default::default()
        };
        self.spidev_ioctl(
            SPI_IOC_MESSAGE_1,
            &transfer as *const SpiTransfer as *const libc::c_void,
        )
    }

    fn write_reg(&self, addr: u32, value: u32) -> Result<(), DriverError> {
        let mut msg = [0u8; 8];
        msg[..4].copy_from_slice(&(CMD_WRITE | addr).to_le_bytes());
        msg[4..].copy_from_slice(&value.to_le_bytes());
        self.xfer(&msg, None)
    }

    fn read_reg(&self, addr: u32) -> Result<u32, DriverError> {
        // Command word, command echo, then the register contents.
        let mut tx = [0u8; 12];
        tx[..4].copy_from_slice(&(CMD_READ | addr).to_le_bytes());
        let mut rx = [0u8; 12];
        self.xfer(&tx, Some(&mut rx))?;
        Ok(u32::from_le_bytes(rx[8..].try_into().unwrap()))
    }

    pub fn words(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// Burst-write the frame into bank 0 and start the serializer.
    pub fn submit(&mut self) -> Result<(), DriverError> {
        let mut msg = Vec::with_capacity(4 + self.words.len() * 4);
        msg.extend_from_slice(&(CMD_WRITE | CMD_INCREMENT | MEM0_BASE).to_le_bytes());
        for word in &self.words {
            msg.extend_from_slice(&word.to_le_bytes());
        }
        self.xfer(&msg, None)?;

        self.write_reg(REG_MEM0_LEN, self.words.len() as u32 | MEM_LEN_STOP)?;
        self.in_flight = true;
        Ok(())
    }

    /// Poll the bank-done interrupt status, then acknowledge it.
    pub fn wait(&mut self) -> Result<(), DriverError> {
        if !self.in_flight {
            return Ok(());
        }
        self.in_flight = false;
        loop {
            let status = self.read_reg(REG_INT_STATUS)?;
            if status & INT_STATUS_BANK0 != 0 {
                self.write_reg(REG_INT_STATUS, INT_STATUS_BANK0)?;
                return Ok(());
            }
            sleep(Duration::from_micros(50));
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.write_reg(REG_CONF, 0);
    }
}
