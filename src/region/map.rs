//! Mapping a [`Mappable`] object into the address space.

#![allow(unsafe_code)]

use std::io;
use std::ptr;

use tracing::trace;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::platform::alloc_granularity;
use crate::region::Mappable;

/// Protection and sharing mode for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemMode {
    /// Shared read-only view.
    ReadOnly,
    /// Private read-only view.
    ReadPrivate,
    /// Shared read-write view; writes are visible to every mapper.
    ReadWrite,
    /// Private read-write view; writes stay in this process.
    CopyOnWrite,
}

impl MemMode {
    fn prot_and_flags(self) -> (i32, i32) {
        match self {
            Self::ReadOnly => (libc::PROT_READ, libc::MAP_SHARED),
            Self::ReadPrivate => (libc::PROT_READ, libc::MAP_PRIVATE),
            Self::ReadWrite => (libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED),
            Self::CopyOnWrite => (libc::PROT_READ | libc::PROT_WRITE, libc::MAP_PRIVATE),
        }
    }
}

/// A mapped view of a named shared-memory object.
///
/// The mapping starts at an allocation-granularity boundary; when the caller
/// asks for an unaligned `offset`, the map covers the enclosing aligned range
/// and [`MemoryRegion::data`] exposes the slice the caller asked for.
/// Dropping the region unmaps it. The backing object is refcounted by the
/// kernel, so the bytes stay valid even if the name is destroyed first.
#[derive(Debug)]
pub struct MemoryRegion {
    base: *mut u8,
    mapped_len: usize,
    page_off: usize,
    size: usize,
}

// SAFETY: the mapping is plain process memory; all shared mutation goes
// through atomics in the sync layer or is externally serialized.
unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    /// Maps `size` bytes of `obj` starting at `offset`.
    ///
    /// Fails with `InvalidArgument` when the requested range runs past the
    /// end of the object; mapping more bytes than the object holds would
    /// fault on first touch instead of failing here.
    pub fn new(obj: &impl Mappable, mode: MemMode, offset: u64, size: usize) -> Result<Self> {
        let (prot, flags) = mode.prot_and_flags();
        if size == 0 {
            return Err(Error::new(ErrorKind::InvalidArgument).with_context("zero-size mapping"));
        }
        let obj_len = object_len(obj.fd()).context("checking object size")?;
        if obj_len > 0 && offset + size as u64 > obj_len {
            return Err(Error::new(ErrorKind::InvalidArgument).with_context(format!(
                "invalid mapping length: {size} bytes at {offset} into a {obj_len}-byte object"
            )));
        }
        let granularity = alloc_granularity() as u64;
        let page_off = (offset % granularity) as usize;
        let mapped_len = size + page_off;
        // SAFETY: fd is valid for the duration of the call and the range was
        // checked against the object length above.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                prot,
                flags,
                obj.fd(),
                (offset - page_off as u64) as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::last_os_error().with_context("mmap failed"));
        }
        trace!(size, offset, "mapped region");
        Ok(Self {
            base: base.cast(),
            mapped_len,
            page_off,
            size,
        })
    }

    /// The requested size of the region, not the page-rounded mapped length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Read view of the region, adjusted past the alignment fixup.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        // SAFETY: base+page_off..+size is inside the live mapping.
        unsafe { std::slice::from_raw_parts(self.base.add(self.page_off), self.size) }
    }

    /// Write view of the region, adjusted past the alignment fixup.
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `data`; &mut self keeps the view unique in-process.
        unsafe { std::slice::from_raw_parts_mut(self.base.add(self.page_off), self.size) }
    }

    /// Raw pointer to the first requested byte.
    ///
    /// The sync layer builds its atomic cells on top of this; the pointer is
    /// stable for the lifetime of the region.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: page_off is within the mapping by construction.
        unsafe { self.base.add(self.page_off) }
    }

    /// Flushes the mapping to the backing object.
    pub fn flush(&self, async_flush: bool) -> Result<()> {
        let flag = if async_flush {
            libc::MS_ASYNC
        } else {
            libc::MS_SYNC
        };
        // SAFETY: base/mapped_len describe the live mapping.
        let rc = unsafe { libc::msync(self.base.cast(), self.mapped_len, flag) };
        if rc != 0 {
            return Err(Error::last_os_error().with_context("msync failed"));
        }
        Ok(())
    }

    /// Unmaps the region. Further `data`/`as_ptr` calls are a logic error;
    /// `Drop` runs this automatically.
    pub fn close(&mut self) -> Result<()> {
        if self.base.is_null() {
            return Ok(());
        }
        // SAFETY: base/mapped_len describe a mapping we own and have not yet
        // unmapped; the null check above keeps this single-shot.
        let rc = unsafe { libc::munmap(self.base.cast(), self.mapped_len) };
        self.base = ptr::null_mut();
        self.mapped_len = 0;
        if rc != 0 {
            return Err(Error::last_os_error().with_context("munmap failed"));
        }
        Ok(())
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn object_len(fd: std::os::fd::RawFd) -> io::Result<u64> {
    // SAFETY: stat buffer is a plain output parameter.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fd is a valid descriptor owned by the caller.
    let rc = unsafe { libc::fstat(fd, &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.st_size as u64)
}
