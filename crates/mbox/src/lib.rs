//! VideoCore mailbox property interface.
//!
//! The GPU firmware owns a pool of physically contiguous memory that can
//! be handed to bus masters. This crate wraps the four property calls the
//! LED driver needs (`mem_alloc` / `mem_lock` / `mem_unlock` / `mem_free`)
//! plus the `/dev/mem` window onto a locked allocation.
//!
//! Allocations are identified by an opaque handle; `mem_lock` pins one and
//! returns its bus address. Teardown order matters: unmap the CPU window,
//! unlock, free, then close the mailbox.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

use memmap2::{MmapOptions, MmapRaw};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum MboxError {
    #[error("failed to open mailbox device: {0}")]
    Open(std::io::Error),
    #[error("mailbox property call failed: {0}")]
    Property(std::io::Error),
    #[error("firmware rejected {tag:#x} request (code {code:#x})")]
    Request { tag: u32, code: u32 },
    #[error("failed to map allocation through /dev/mem: {0}")]
    Map(std::io::Error),
}

const VCIO: &str = "/dev/vcio";

/// Property tags for the firmware memory allocator.
const TAG_MEM_ALLOC: u32 = 0x3000c;
const TAG_MEM_LOCK: u32 = 0x3000d;
const TAG_MEM_UNLOCK: u32 = 0x3000e;
const TAG_MEM_FREE: u32 = 0x3000f;

const REQUEST: u32 = 0;
const RESPONSE_SUCCESS: u32 = 0x8000_0000;

/// Allocation flag: L1/L2-coherent alias (boards whose VideoCore bus base
/// is `0x40000000`).
pub const MEM_FLAG_L1_NONALLOCATING: u32 = 0xc;
/// Allocation flag: uncached direct alias.
pub const MEM_FLAG_DIRECT: u32 = 0x4;

/// `_IOWR(100, 0, char *)`, for the native pointer width.
const MBOX_PROPERTY: libc::c_ulong = iowr(100, 0, std::mem::size_of::<*mut libc::c_void>());

const fn iowr(kind: libc::c_ulong, nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    const IOC_WRITE: libc::c_ulong = 1;
    const IOC_READ: libc::c_ulong = 2;
    ((IOC_READ | IOC_WRITE) << 30) | ((size as libc::c_ulong) << 16) | (kind << 8) | nr
}

/// Words in a property message buffer. All our calls fit with room to
/// spare; the firmware only reads what the header says.
const MSG_WORDS: usize = 32;

/// Build a single-tag property message.
///
/// Layout: total byte size, request code, tag, value-buffer byte size,
/// request indicator, arguments, end tag.
fn property_message(tag: u32, args: &[u32]) -> [u32; MSG_WORDS] {
    let mut msg = [0u32; MSG_WORDS];
    let value_bytes = (args.len().max(1) * 4) as u32;
    msg[0] = (6 + args.len().max(1) as u32) * 4;
    msg[1] = REQUEST;
    msg[2] = tag;
    msg[3] = value_bytes;
    msg[4] = 0;
    msg[5..5 + args.len()].copy_from_slice(args);
    // trailing end tag is the zero already there
    msg
}

/// Open mailbox channel to the VideoCore firmware.
pub struct Mailbox {
    file: File,
}

impl Mailbox {
    /// Open `/dev/vcio`. Requires membership of the `video` group or root.
    pub fn open() -> Result<Self, MboxError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(VCIO)
            .map_err(MboxError::Open)?;
        Ok(Self { file })
    }

    fn property(&self, tag: u32, args: &[u32]) -> Result<u32, MboxError> {
        let mut msg = property_message(tag, args);
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                MBOX_PROPERTY as _,
                msg.as_mut_ptr(),
            )
        };
        if rc < 0 {
            return Err(MboxError::Property(std::io::Error::last_os_error()));
        }
        if msg[1] != RESPONSE_SUCCESS {
            return Err(MboxError::Request { tag, code: msg[1] });
        }
        trace!(tag, result = msg[5], "mailbox property");
        Ok(msg[5])
    }

    /// Allocate `size` bytes of GPU memory. Returns the allocation handle.
    pub fn mem_alloc(&self, size: u32, align: u32, flags: u32) -> Result<u32, MboxError> {
        self.property(TAG_MEM_ALLOC, &[size, align, flags])
    }

    /// Pin an allocation and return its bus address.
    pub fn mem_lock(&self, handle: u32) -> Result<u32, MboxError> {
        self.property(TAG_MEM_LOCK, &[handle])
    }

    /// Unpin an allocation. The bus address becomes invalid.
    pub fn mem_unlock(&self, handle: u32) -> Result<u32, MboxError> {
        self.property(TAG_MEM_UNLOCK, &[handle])
    }

    /// Release an allocation back to the firmware pool.
    pub fn mem_free(&self, handle: u32) -> Result<u32, MboxError> {
        self.property(TAG_MEM_FREE, &[handle])
    }
}

/// Map a locked allocation's physical pages through `/dev/mem`.
///
/// The bus address carries the VideoCore alias in its top bits; the
/// physical address is the low 30 bits.
pub fn map_bus(bus_addr: u32, size: usize) -> Result<MmapRaw, MboxError> {
    let phys = (bus_addr & !0xc000_0000) as u64;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/mem")
        .map_err(MboxError::Map)?;
    MmapOptions::new()
        .offset(phys)
        .len(size)
        .map_raw(&file)
        .map_err(MboxError::Map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_message_layout() {
        let msg = property_message(TAG_MEM_ALLOC, &[4096, 4096, MEM_FLAG_DIRECT]);
        assert_eq!(msg[0], 9 * 4);
        assert_eq!(msg[1], REQUEST);
        assert_eq!(msg[2], TAG_MEM_ALLOC);
        assert_eq!(msg[3], 12);
        assert_eq!(msg[4], 0);
        assert_eq!(&msg[5..8], &[4096, 4096, MEM_FLAG_DIRECT]);
        assert_eq!(msg[8], 0, "end tag");
    }

    #[test]
    fn test_lock_message_layout() {
        let msg = property_message(TAG_MEM_LOCK, &[0x42]);
        assert_eq!(msg[0], 7 * 4);
        assert_eq!(msg[3], 4);
        assert_eq!(msg[5], 0x42);
        assert_eq!(msg[6], 0);
    }

    #[test]
    fn test_ioctl_request_word() {
        // _IOWR(100, 0, char *): read|write, pointer-sized payload.
        let expected_size = std::mem::size_of::<usize>() as libc::c_ulong;
        assert_eq!(MBOX_PROPERTY >> 30, 3);
        assert_eq!((MBOX_PROPERTY >> 16) & 0x3fff, expected_size);
        assert_eq!((MBOX_PROPERTY >> 8) & 0xff, 100);
        assert_eq!(MBOX_PROPERTY & 0xff, 0);
    }
}
