//! Named counting semaphores over SysV kernel objects.

use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorKind, Result, ResultExt};
use crate::flags::{open_or_create, OpenAttempt, OpenFlags, Perm};
use crate::platform::key::{key_for_name, remove_sidecar};
use crate::platform::{validate_name, Deadline};
use crate::sync::sysv;
use crate::sync::wait_waker::WaitWaker;

/// A named counting semaphore.
///
/// The value is a non-negative count held by the kernel. [`Semaphore::post`]
/// adds to it; [`Semaphore::wait`] blocks until it is positive and subtracts
/// one. The kernel object is addressed by a key derived from `name` through
/// a sidecar file, so every process naming the same semaphore reaches the
/// same count. Dropping the handle leaves the kernel object alive; removal
/// is [`Semaphore::destroy`] or [`destroy_semaphore`].
#[derive(Debug)]
pub struct Semaphore {
    name: String,
    id: i32,
}

impl Semaphore {
    /// Opens or creates the named semaphore. When created, the value is
    /// seeded with `initial`.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm, initial: u32) -> Result<Self> {
        validate_name(name)?;
        let key = key_for_name(name).context("deriving semaphore key")?;
        let mut id = 0;
        let created = open_or_create(
            |attempt| {
                let sem_flags = match attempt {
                    OpenAttempt::CreateExclusive => {
                        perm.mode() as i32 | libc::IPC_CREAT | libc::IPC_EXCL
                    }
                    OpenAttempt::OpenExisting => perm.mode() as i32,
                };
                id = sysv::sem_get(key, sem_flags)?;
                Ok(())
            },
            flags,
        )
        .with_context(|| format!("opening sysv semaphore {name:?}"))?;
        debug!(name, id, created, "opened semaphore");
        let result = Self {
            name: name.to_owned(),
            id,
        };
        if created && initial > 0 {
            if let Err(e) = seed(id, initial) {
                let _ = result.destroy_inner();
                return Err(e).context("seeding initial semaphore value");
            }
        }
        Ok(result)
    }

    /// Increases the value by `n`, releasing up to `n` waiters.
    pub fn post(&self, n: u32) {
        let mut left = n;
        while left > 0 {
            let chunk = left.min(i16::MAX as u32);
            if let Err(e) = sysv::sem_add(self.id, chunk as i16) {
                panic!("semaphore post failed: {e}");
            }
            left -= chunk;
        }
    }

    /// Blocks until the value is positive, then decrements it.
    pub fn wait(&self) {
        if let Err(e) = sysv::sem_add(self.id, -1) {
            panic!("semaphore wait failed: {e}");
        }
    }

    /// Like [`Semaphore::wait`], but gives up after `timeout`. Returns
    /// whether the semaphore was decremented.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match sysv::sem_add_deadline(self.id, -1, Deadline::after(Some(timeout))) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("semaphore timed wait failed: {e}"),
        }
    }

    /// One non-blocking decrement attempt.
    pub fn try_wait(&self) -> bool {
        match sysv::sem_try_add(self.id, -1) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("semaphore try-wait failed: {e}"),
        }
    }

    /// The name the semaphore was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> i32 {
        self.id
    }

    /// Removes the kernel object and the key sidecar.
    pub fn destroy(self) -> Result<()> {
        self.destroy_inner()
    }

    fn destroy_inner(&self) -> Result<()> {
        debug!(name = %self.name, "destroying semaphore");
        match sysv::sem_rmid(self.id) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotExist => {}
            Err(e) => return Err(e).context("removing sysv semaphore"),
        }
        remove_sidecar(&self.name)
    }
}

fn seed(id: i32, initial: u32) -> Result<()> {
    let mut left = initial;
    while left > 0 {
        let chunk = left.min(i16::MAX as u32);
        sysv::sem_add(id, chunk as i16)?;
        left -= chunk;
    }
    Ok(())
}

/// Removes the named semaphore. Absence is not an error.
pub fn destroy_semaphore(name: &str) -> Result<()> {
    validate_name(name)?;
    let key = key_for_name(name).context("deriving semaphore key")?;
    match sysv::sem_get(key, 0) {
        Ok(id) => match sysv::sem_rmid(id) {
            Ok(()) => {}
            // Lost a destroy race; the set is gone either way.
            Err(e) if matches!(e.kind(), ErrorKind::NotExist | ErrorKind::InvalidArgument) => {}
            Err(e) => return Err(e).context("removing sysv semaphore"),
        },
        Err(e) if e.kind() == ErrorKind::NotExist => {}
        Err(e) => return Err(e).context("resolving semaphore id"),
    }
    remove_sidecar(name)
}

/// [`WaitWaker`] adapter over a SysV semaphore (the blocking backend where
/// no address wait exists).
///
/// `expected` is ignored at the syscall level; the lightweight protocols
/// re-check their cell after every wake, which is what makes that sound.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SemaWaiter {
    id: i32,
}

impl SemaWaiter {
    pub(crate) fn new(sem: &Semaphore) -> Self {
        Self { id: sem.id() }
    }
}

impl WaitWaker for SemaWaiter {
    fn wait(&self, _expected: i32, timeout: Option<Duration>) -> Result<()> {
        sysv::sem_add_deadline(self.id, -1, Deadline::after(timeout))
    }

    fn wake(&self, n: i32) {
        if n <= 0 {
            return;
        }
        // A destroyed semaphore makes every later wake fail; that is the
        // steady-state panic policy, not a recoverable condition.
        if let Err(e) = sysv::sem_add(self.id, n.min(i32::from(i16::MAX)) as i16) {
            panic!("semaphore wake failed: {e}");
        }
    }
}
