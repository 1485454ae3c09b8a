//! Regular-file emulation of shared-memory objects.
//!
//! For hosts without a POSIX shm namespace, a region can be backed by an
//! ordinary file under the crate temp directory: file name = region name,
//! grown by truncate, mapped exactly like the native backing. The service
//! surface matches [`super::ShmObject`].

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result, ResultExt};
use crate::flags::{open_or_create, OpenAttempt, OpenFlags, Perm};
use crate::platform::key::tmp_dir;
use crate::platform::validate_name;
use crate::region::Mappable;

/// A named region backing emulated by a regular file.
#[derive(Debug)]
pub struct FileObject {
    file: File,
    name: String,
}

impl FileObject {
    /// Opens or creates the named backing file per `flags`.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm) -> Result<(Self, bool)> {
        validate_name(name)?;
        let path = backing_path(name)?;
        let mut file = None;
        let created = open_or_create(
            |attempt| {
                let mut opts = OpenOptions::new();
                opts.read(true).write(true).mode(perm.mode());
                match attempt {
                    OpenAttempt::CreateExclusive => {
                        opts.create_new(true);
                    }
                    OpenAttempt::OpenExisting => {}
                }
                file = Some(opts.open(&path).map_err(Error::from)?);
                Ok(())
            },
            flags,
        )
        .with_context(|| format!("opening file-backed object {name:?}"))?;
        debug!(name, created, "opened file-backed object");
        Ok((
            Self {
                file: file.expect("open_or_create succeeded without a file"),
                name: name.to_owned(),
            },
            created,
        ))
    }

    /// Opens or creates the backing file and, when created, grows it to
    /// `size` bytes.
    pub fn with_size(name: &str, flags: OpenFlags, perm: Perm, size: u64) -> Result<(Self, bool)> {
        let (obj, created) = Self::new(name, flags, perm)?;
        if created {
            if let Err(e) = obj.file.set_len(size) {
                let _ = Self::destroy(name);
                return Err(Error::from(e))
                    .with_context(|| format!("sizing file-backed object {name:?}"));
            }
        }
        Ok((obj, created))
    }

    /// Current length of the backing file.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata().map_err(Error::from)?.len())
    }

    /// The name the object was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the backing file. Absence is not an error.
    pub fn destroy(name: &str) -> Result<()> {
        validate_name(name)?;
        let path = backing_path(name)?;
        debug!(name, "destroying file-backed object");
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)
                .with_context(format!("removing backing file {}", path.display()))),
        }
    }
}

impl Mappable for FileObject {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn backing_path(name: &str) -> Result<PathBuf> {
    let dir = tmp_dir()?.join("shm");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating backing dir {}", dir.display()))?;
    Ok(dir.join(name))
}
