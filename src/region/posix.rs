//! POSIX shared-memory backing for named regions.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tracing::debug;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::flags::{open_or_create, OpenAttempt, OpenFlags, Perm};
use crate::platform::validate_name;
use crate::region::Mappable;

/// A named POSIX shared-memory object (`shm_open`).
///
/// Holds only the descriptor; mapping is [`crate::region::MemoryRegion`]'s
/// job. The object outlives the handle: closing the descriptor does not
/// remove the name, [`ShmObject::destroy`] does.
#[derive(Debug)]
pub struct ShmObject {
    fd: OwnedFd,
    name: String,
}

impl ShmObject {
    /// Opens or creates the named object per `flags`.
    ///
    /// Returns the object and whether this call created it. A newly created
    /// object has zero length until truncated.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm) -> Result<(Self, bool)> {
        validate_name(name)?;
        let path = shm_path(name)?;
        let mut fd = None;
        let created = open_or_create(
            |attempt| {
                let oflags = match attempt {
                    OpenAttempt::CreateExclusive => libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                    OpenAttempt::OpenExisting => libc::O_RDWR,
                };
                fd = Some(shm_open(&path, oflags, perm.mode())?);
                Ok(())
            },
            flags,
        )
        .with_context(|| format!("opening shm object {name:?}"))?;
        debug!(name, created, "opened shm object");
        Ok((
            Self {
                fd: fd.expect("open_or_create succeeded without a descriptor"),
                name: name.to_owned(),
            },
            created,
        ))
    }

    /// Opens or creates the named object and, when created, grows it to
    /// `size` bytes.
    pub fn with_size(name: &str, flags: OpenFlags, perm: Perm, size: u64) -> Result<(Self, bool)> {
        let (obj, created) = Self::new(name, flags, perm)?;
        if created {
            if let Err(e) = obj.truncate(size) {
                let _ = Self::destroy(name);
                return Err(e).with_context(|| format!("sizing shm object {name:?}"));
            }
        }
        Ok((obj, created))
    }

    /// Resizes the backing object.
    pub fn truncate(&self, size: u64) -> Result<()> {
        // SAFETY: fd is owned and valid.
        let rc = unsafe { libc::ftruncate(self.fd.as_raw_fd(), size as libc::off_t) };
        if rc != 0 {
            return Err(Error::last_os_error().with_context("ftruncate failed"));
        }
        Ok(())
    }

    /// Current length of the backing object.
    pub fn len(&self) -> Result<u64> {
        // SAFETY: plain output parameter for fstat on an owned fd.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::fstat(self.fd.as_raw_fd(), &mut st) };
        if rc != 0 {
            return Err(Error::last_os_error().with_context("fstat failed"));
        }
        Ok(st.st_size as u64)
    }

    /// The name the object was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes `name` from the shm namespace. Absence is not an error.
    pub fn destroy(name: &str) -> Result<()> {
        validate_name(name)?;
        let path = shm_path(name)?;
        debug!(name, "destroying shm object");
        // SAFETY: path is a valid NUL-terminated string.
        let rc = unsafe { libc::shm_unlink(path.as_ptr()) };
        if rc == 0 {
            return Ok(());
        }
        let err = Error::last_os_error();
        if err.kind() == ErrorKind::NotExist {
            Ok(())
        } else {
            Err(err.with_context(format!("shm_unlink {name:?}")))
        }
    }
}

impl Mappable for ShmObject {
    fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

fn shm_path(name: &str) -> Result<CString> {
    CString::new(format!("/{name}"))
        .map_err(|_| Error::new(ErrorKind::InvalidArgument).with_context("name contains NUL"))
}

fn shm_open(path: &CString, oflags: i32, mode: u32) -> Result<OwnedFd> {
    // SAFETY: path is NUL-terminated; mode is only read for O_CREAT.
    let fd = unsafe { libc::shm_open(path.as_ptr(), oflags, mode as libc::mode_t) };
    if fd < 0 {
        return Err(Error::last_os_error().with_context("shm_open failed"));
    }
    // SAFETY: fd was just returned by shm_open and is owned by us alone.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(tag: &str) -> String {
        format!("procsync-shm-{tag}-{}", std::process::id())
    }

    #[test]
    fn created_object_is_sized() {
        let name = scratch("sized");
        let _ = ShmObject::destroy(&name);
        let (obj, created) =
            ShmObject::with_size(&name, OpenFlags::CREATE, Perm::DEFAULT, 128).expect("create");
        assert!(created);
        assert_eq!(obj.len().expect("len"), 128);
        drop(obj);
        ShmObject::destroy(&name).expect("cleanup");
    }

    #[test]
    fn reopen_keeps_existing_size() {
        let name = scratch("reopen");
        let _ = ShmObject::destroy(&name);
        let (first, _) =
            ShmObject::with_size(&name, OpenFlags::CREATE, Perm::DEFAULT, 64).expect("create");
        let (second, created) =
            ShmObject::with_size(&name, OpenFlags::CREATE, Perm::DEFAULT, 4096).expect("reopen");
        assert!(!created);
        assert_eq!(second.len().expect("len"), 64);
        drop((first, second));
        ShmObject::destroy(&name).expect("cleanup");
    }

    #[test]
    fn destroy_absent_name_is_ok() {
        ShmObject::destroy(&scratch("absent")).expect("idempotent destroy");
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(ShmObject::new("a/b", OpenFlags::CREATE, Perm::DEFAULT).is_err());
        assert!(ShmObject::new("", OpenFlags::CREATE, Perm::DEFAULT).is_err());
    }
}
