//! RP1 character-device backend (Pi 5).
//!
//! On BCM2712 boards the PWM peripheral lives behind the RP1 south
//! bridge and userspace cannot own it; a small kernel module exposes
//! `/dev/ws281x_pwm` instead. The module owns clocking and DMA; this
//! side only encodes and writes the bit stream. Register peek/poke
//! ioctls exist for bring-up debugging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;

use tracing::info;
use types::DriverConfig;

use crate::encoder;
use crate::error::DriverError;

pub const DEVICE: &str = "/dev/ws281x_pwm";

const IOCTL_MAGIC: libc::c_ulong = 0x6a67;

const fn ioc(dir: libc::c_ulong, nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    (dir << 30) | ((size as libc::c_ulong) << 16) | (IOCTL_MAGIC << 8) | nr
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RegIo {
    flags: u32,
    reg_offset: u32,
    reg_value: u32,
}

// The kernel header builds these from pointer types, so the encoded size
// is the pointer width, not the struct size.
const IOCTL_REG_READ: libc::c_ulong = ioc(3, 0x1, std::mem::size_of::<*mut RegIo>());
const IOCTL_REG_WRITE: libc::c_ulong = ioc(1, 0x2, std::mem::size_of::<*mut RegIo>());

pub struct Rp1Pwm {
    file: File,
    words: Vec<u32>,
}

impl Rp1Pwm {
    /// True when the kernel module's device node exists.
    pub fn available() -> bool {
        std::path::Path::new(DEVICE).exists()
    }

    pub fn new(config: &DriverConfig) -> Result<Self, DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(DEVICE)
            .map_err(|e| DriverError::PwmSetup(format!("cannot open {DEVICE}: {e}")))?;

        let count = config.channels[0].count;
        let words = vec![0u32; encoder::buffer_word_count(count, config.freq, 1)];

        info!(device = DEVICE, words = words.len(), "RP1 PWM backend up");
        Ok(Self { file, words })
    }

    pub fn words(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// Push the encoded frame into the kernel driver. The write blocks
    /// until the module has queued the data for its own DMA.
    pub fn submit(&mut self) -> Result<(), DriverError> {
        let bytes = unsafe {
            std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.words.len() * 4)
        };
        self.file
            .write_all(bytes)
            .map_err(|e| DriverError::PwmSetup(format!("write to {DEVICE} failed: {e}")))
    }

    pub fn wait(&mut self) -> Result<(), DriverError> {
        // Completion is the kernel module's business; the write already
        // blocked until the frame was accepted.
        Ok(())
    }

    /// Debug register read through the module.
    #[allow(dead_code)]
    pub fn reg_read(&self, offset: u32) -> Result<u32, DriverError> {
        let mut reg = RegIo {
            reg_offset: offset,
            ..Default::default()
        };
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), IOCTL_REG_READ as _, &mut reg) };
        if rc < 0 {
            return Err(DriverError::PwmSetup(format!(
                "register read ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(reg.reg_value)
    }

    /// Debug register write through the module.
    #[allow(dead_code)]
    pub fn reg_write(&self, offset: u32, value: u32) -> Result<(), DriverError> {
        let reg = RegIo {
            flags: 0,
            reg_offset: offset,
            reg_value: value,
        };
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), IOCTL_REG_WRITE as _, &reg) };
        if rc < 0 {
            return Err(DriverError::PwmSetup(format!(
                "register write ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}
