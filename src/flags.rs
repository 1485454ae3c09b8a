//! Open-mode flags and permission bits shared by every named primitive.
//!
//! Constructors mirror the file-open set: `CREATE` opens the object or
//! creates it when absent, `CREATE | EXCLUSIVE` insists on creating it, and
//! empty flags open an existing object only.

use bitflags::bitflags;

use crate::error::{Error, ErrorKind, Result, ResultExt};

bitflags! {
    /// How a named object is opened or created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Create the object if it does not exist.
        const CREATE = 1;
        /// Combined with [`OpenFlags::CREATE`]: fail with `AlreadyExists`
        /// if the object is already there.
        const EXCLUSIVE = 2;
    }
}

impl OpenFlags {
    /// Open an existing object; fail with `NotExist` when absent.
    pub const OPEN_EXISTING: Self = Self::empty();
}

/// Validates a flag combination.
///
/// `EXCLUSIVE` is meaningless without `CREATE`; every constructor funnels
/// through this check before touching the kernel namespace.
pub fn ensure_open_flags(flags: OpenFlags) -> Result<()> {
    if flags.contains(OpenFlags::EXCLUSIVE) && !flags.contains(OpenFlags::CREATE) {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_context("EXCLUSIVE flag requires CREATE"));
    }
    Ok(())
}

/// Unix permission bits for a newly created object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perm(u32);

impl Perm {
    /// Owner/group/world read-write, the usual mode for host-wide primitives.
    pub const DEFAULT: Self = Self(0o666);

    /// Creates permission bits, masked to the 9 rwx bits.
    #[must_use]
    pub const fn new(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    /// Returns the raw mode bits.
    #[must_use]
    pub const fn mode(self) -> u32 {
        self.0
    }
}

/// Outcome of one attempt inside [`open_or_create`].
pub(crate) enum OpenAttempt {
    /// Try to create the object; fail if it exists.
    CreateExclusive,
    /// Open the object; fail if it is absent.
    OpenExisting,
}

/// Drives the create/open race shared by regions and SysV semaphores.
///
/// `attempt` performs one exclusive-create or plain-open try. With
/// `CREATE | EXCLUSIVE` there is a single create attempt; with `CREATE`
/// alone, create and open alternate until one of them wins, so two racing
/// processes both end up with the object no matter which of them created it.
/// Returns whether this call created the object.
pub(crate) fn open_or_create<F>(mut attempt: F, flags: OpenFlags) -> Result<bool>
where
    F: FnMut(OpenAttempt) -> Result<()>,
{
    const MAX_RACE_RETRIES: usize = 16;

    ensure_open_flags(flags)?;
    if flags.contains(OpenFlags::EXCLUSIVE) {
        attempt(OpenAttempt::CreateExclusive)?;
        return Ok(true);
    }
    if !flags.contains(OpenFlags::CREATE) {
        attempt(OpenAttempt::OpenExisting)?;
        return Ok(false);
    }
    for _ in 0..MAX_RACE_RETRIES {
        match attempt(OpenAttempt::CreateExclusive) {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
        match attempt(OpenAttempt::OpenExisting) {
            Ok(()) => return Ok(false),
            // Lost the race to a concurrent destroy; create again.
            Err(e) if e.kind() == ErrorKind::NotExist => {}
            Err(e) => return Err(e),
        }
    }
    Err(Error::new(ErrorKind::System)).context("lost the create/open race too many times")
}
