//! Physical register windows.
//!
//! Maps whole pages of `/dev/mem` covering a peripheral block and hands
//! out volatile word access at byte offsets. Every register in this
//! driver is 32 bits wide.

use std::fs::OpenOptions;

use memmap2::{MmapOptions, MmapRaw};

/// A mapped peripheral register block.
pub struct MmioRegion {
    map: MmapRaw,
    /// Offset of the block within the mapped pages.
    offset: usize,
    len: usize,
}

// The raw pointer is to shared device memory; all access is volatile.
unsafe impl Send for MmioRegion {}

fn page_size() -> u64 {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

impl MmioRegion {
    /// Map `len` bytes of physical address space starting at `phys`.
    pub fn map(phys: u64, len: usize) -> std::io::Result<Self> {
        let page = page_size();
        let base = phys & !(page - 1);
        let offset = (phys - base) as usize;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/mem")?;
        let map = MmapOptions::new()
            .offset(base)
            .len(offset + len)
            .map_raw(&file)?;

        Ok(Self { map, offset, len })
    }

    /// Map the GPIO block, falling back to `/dev/gpiomem` when `/dev/mem`
    /// is off limits. The gpiomem device exposes exactly the GPIO page,
    /// unprivileged, at offset 0.
    pub fn map_gpio(phys: u64, len: usize) -> std::io::Result<Self> {
        match Self::map(phys, len) {
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open("/dev/gpiomem")?;
                let map = MmapOptions::new().len(len).map_raw(&file)?;
                Ok(Self {
                    map,
                    offset: 0,
                    len,
                })
            }
            other => other,
        }
    }

    /// An anonymous zeroed region standing in for a register block.
    /// Backs register-level tests on hosts without the hardware.
    #[cfg(test)]
    pub(crate) fn anon(len: usize) -> Self {
        let map = MmapRaw::from(MmapOptions::new().len(len).map_anon().unwrap());
        Self {
            map,
            offset: 0,
            len,
        }
    }

    fn word_ptr(&self, reg: usize) -> *mut u32 {
        debug_assert!(reg + 4 <= self.len && reg % 4 == 0);
        unsafe { self.map.as_mut_ptr().add(self.offset + reg) as *mut u32 }
    }

    /// Volatile read of the 32-bit register at byte offset `reg`.
    pub fn read(&self, reg: usize) -> u32 {
        unsafe { std::ptr::read_volatile(self.word_ptr(reg)) }
    }

    /// Volatile write of the 32-bit register at byte offset `reg`.
    pub fn write(&self, reg: usize, value: u32) {
        unsafe { std::ptr::write_volatile(self.word_ptr(reg), value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anon_region_read_write() {
        let region = MmioRegion::anon(0x100);
        assert_eq!(region.read(0x20), 0);
        region.write(0x20, 0xdead_beef);
        assert_eq!(region.read(0x20), 0xdead_beef);
        assert_eq!(region.read(0x24), 0);
    }
}
