//! Uncached DMA buffer with both a CPU view and a bus address.
//!
//! The DMA engine reads the bit buffer through the VideoCore interconnect
//! while the CPU writes it; the allocation therefore has to be physically
//! contiguous and mapped so CPU writes bypass the cache. On boards served
//! by the firmware allocator that is a mailbox allocation mapped through
//! `/dev/mem`; on Pi 4 it is a locked anonymous mapping whose bus address
//! comes from the kernel's pagemap (contiguity is only guaranteed within
//! a page there, which caps safe chain lengths on that board).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use board::{BoardInfo, SocFamily};
use memmap2::{MmapOptions, MmapRaw};
use mbox::Mailbox;
use tracing::{debug, warn};

use crate::dma::{ControlBlock, CONTROL_BLOCK_BYTES};
use crate::error::DriverError;

enum Backing {
    /// Firmware allocation: unmap, unlock, free, close, in that order.
    Mailbox {
        map: Option<MmapRaw>,
        mbox: Mailbox,
        handle: u32,
    },
    /// Locked anonymous pages (Pi 4).
    Anon { map: MmapRaw },
}

pub struct DmaBuffer {
    backing: Backing,
    bus_addr: u32,
    size: usize,
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

impl DmaBuffer {
    /// Allocate `size` bytes (rounded up to whole pages), zeroed.
    pub fn alloc(board: &BoardInfo, size: usize) -> Result<Self, DriverError> {
        let size = size.next_multiple_of(page_size());
        let mut buffer = match board.family {
            SocFamily::Pi4 => Self::alloc_anon(board, size)?,
            _ => Self::alloc_mailbox(board, size)?,
        };
        buffer.all_words().fill(0);
        debug!(
            size,
            bus_addr = buffer.bus_addr,
            "allocated DMA buffer"
        );
        Ok(buffer)
    }

    fn alloc_mailbox(board: &BoardInfo, size: usize) -> Result<Self, DriverError> {
        let mbox = Mailbox::open().map_err(|e| match e {
            mbox::MboxError::Open(io) => DriverError::MailboxOpen(io),
            _ => DriverError::MailboxAlloc,
        })?;

        // 0xC selects the L1/L2-coherent alias on boards whose bus view
        // of SDRAM starts at 0x40000000, 0x4 the uncached alias elsewhere.
        let flags = if board.videocore_base == 0x4000_0000 {
            mbox::MEM_FLAG_L1_NONALLOCATING
        } else {
            mbox::MEM_FLAG_DIRECT
        };

        let handle = mbox
            .mem_alloc(size as u32, page_size() as u32, flags)
            .map_err(|_| DriverError::MailboxAlloc)?;

        let bus_addr = match mbox.mem_lock(handle) {
            Ok(addr) => addr,
            Err(_) => {
                let _ = mbox.mem_free(handle);
                return Err(DriverError::MailboxLock);
            }
        };

        let map = match mbox::map_bus(bus_addr, size) {
            Ok(map) => map,
            Err(e) => {
                let _ = mbox.mem_unlock(handle);
                let _ = mbox.mem_free(handle);
                let io = match e {
                    mbox::MboxError::Map(io) => io,
                    other => std::io::Error::other(other.to_string()),
                };
                return Err(DriverError::MapMem(io));
            }
        };

        Ok(Self {
            backing: Backing::Mailbox {
                map: Some(map),
                mbox,
                handle,
            },
            bus_addr,
            size,
        })
    }

    fn alloc_anon(board: &BoardInfo, size: usize) -> Result<Self, DriverError> {
        let mut map = MmapOptions::new()
            .len(size)
            .map_anon()
            .map_err(|_| DriverError::OutOfMemory)?;

        // Fault every page in before asking the pagemap about it.
        map.fill(0);

        // Pin the pages so the pagemap translation stays valid.
        let rc = unsafe { libc::mlock(map.as_ptr() as *const libc::c_void, size) };
        if rc != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "mlock failed, DMA buffer pages are not pinned"
            );
        }

        let map = MmapRaw::from(map);
        let bus_addr = virt_to_bus(map.as_ptr() as usize, board.videocore_base)?;

        Ok(Self {
            backing: Backing::Anon { map },
            bus_addr,
            size,
        })
    }

    /// Bus address of the control block (buffer start).
    pub fn cb_bus_addr(&self) -> u32 {
        self.bus_addr
    }

    /// Bus address of the bit buffer.
    pub fn data_bus_addr(&self) -> u32 {
        self.bus_addr + CONTROL_BLOCK_BYTES as u32
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn ptr(&self) -> *mut u32 {
        let ptr = match &self.backing {
            Backing::Mailbox { map, .. } => map.as_ref().unwrap().as_mut_ptr(),
            Backing::Anon { map } => map.as_mut_ptr(),
        };
        ptr as *mut u32
    }

    fn all_words(&mut self) -> &mut [u32] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr(), self.size / 4) }
    }

    /// The bit-buffer words following the control block.
    pub fn data_words(&mut self) -> &mut [u32] {
        &mut self.all_words()[CONTROL_BLOCK_BYTES / 4..]
    }

    /// Store the control block at the buffer start where the engine will
    /// fetch it.
    pub fn write_control_block(&mut self, cb: ControlBlock) {
        let words = cb.to_words();
        let base = self.ptr();
        for (i, word) in words.iter().enumerate() {
            unsafe { std::ptr::write_volatile(base.add(i), *word) };
        }
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        if let Backing::Mailbox { map, mbox, handle } = &mut self.backing {
            drop(map.take());
            if let Err(e) = mbox.mem_unlock(*handle) {
                warn!(error = %e, "mailbox unlock failed");
            }
            if let Err(e) = mbox.mem_free(*handle) {
                warn!(error = %e, "mailbox free failed");
            }
        }
    }
}

/// Translate a virtual address to a bus address through the kernel
/// pagemap. Needs root; the page must be resident.
fn virt_to_bus(vaddr: usize, videocore_base: u32) -> Result<u32, DriverError> {
    let page = page_size();
    let mut file = File::open("/proc/self/pagemap").map_err(DriverError::MapMem)?;
    file.seek(SeekFrom::Start((vaddr / page * 8) as u64))
        .map_err(DriverError::MapMem)?;
    let mut entry = [0u8; 8];
    file.read_exact(&mut entry).map_err(DriverError::MapMem)?;

    let entry = u64::from_le_bytes(entry);
    let pfn = entry & ((1 << 55) - 1);
    if pfn == 0 {
        // Zero PFN means the kernel hid it (no CAP_SYS_ADMIN) or the page
        // is not resident.
        return Err(DriverError::MapMem(std::io::Error::other(
            "pagemap returned no frame number",
        )));
    }

    let phys = pfn * page as u64 + (vaddr % page) as u64;
    u32::try_from(phys)
        .map(|p| p | videocore_base)
        .map_err(|_| {
            DriverError::MapMem(std::io::Error::other(
                "DMA buffer landed above the 32-bit bus window",
            ))
        })
}
