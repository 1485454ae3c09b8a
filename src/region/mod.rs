//! Named shared-memory regions.
//!
//! A region is a fixed-size byte range backed by a named kernel object and
//! mapped into the caller's address space. Every process that opens the same
//! name sees the same bytes. The backing object and the mapping have separate
//! lifetimes: dropping a [`MemoryRegion`] unmaps, while
//! [`destroy_memory_object`] removes the name from the kernel namespace
//! (existing mappings stay valid until unmapped).
//!
//! Two interchangeable backings exist: [`posix::ShmObject`] over POSIX shared
//! memory, and [`file::FileObject`] over a regular file in the crate temp
//! directory for hosts without a POSIX shm namespace.

mod file;
mod map;
mod posix;

pub use file::FileObject;
pub use map::{MemMode, MemoryRegion};
pub use posix::ShmObject;

use std::os::fd::RawFd;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::flags::{OpenFlags, Perm};

/// The default backing for named regions.
pub type MemoryObject = ShmObject;

/// An object a [`MemoryRegion`] can map: anything with a stable file
/// descriptor whose length bounds the mapping.
pub trait Mappable {
    /// The descriptor to hand to `mmap`.
    fn fd(&self) -> RawFd;
}

/// Creates or opens the named object at exactly `size` bytes and maps the
/// whole range read-write.
///
/// The object handle is closed before returning; the mapping keeps the
/// backing alive. On any failure after a successful create, the object is
/// destroyed again so a half-built region never lingers in the namespace.
/// Returns the region and whether this call created the object.
pub fn create_writable_region(
    name: &str,
    flags: OpenFlags,
    perm: Perm,
    size: usize,
) -> Result<(MemoryRegion, bool)> {
    if size == 0 {
        return Err(Error::new(ErrorKind::InvalidArgument).with_context("zero-size region"));
    }
    let (obj, created) = MemoryObject::with_size(name, flags, perm, size as u64)
        .context("creating shm object")?;
    match MemoryRegion::new(&obj, MemMode::ReadWrite, 0, size) {
        Ok(region) => Ok((region, created)),
        Err(e) => {
            if created {
                let _ = MemoryObject::destroy(name);
            }
            Err(e).context("creating shm region")
        }
    }
}

/// Removes the named object from the kernel namespace.
///
/// Absence is not an error, so destroy is idempotent.
pub fn destroy_memory_object(name: &str) -> Result<()> {
    MemoryObject::destroy(name)
}
