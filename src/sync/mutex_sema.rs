//! A named mutex blocking on a SysV semaphore.
//!
//! The portable sibling of the futex mutex, for Unixes without an
//! address-based wait. The lock state still lives in a shared cell so the
//! uncontended paths stay syscall-free; only true contention touches the
//! semaphore.

use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorKind, Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::cell::SharedCell;
use crate::sync::lwmutex::{LwMutex, LWM_STATE_SIZE};
use crate::sync::semaphore::{destroy_semaphore, SemaWaiter, Semaphore};
use crate::sync::{mutex_state_name, Locker};

/// A named mutex over a shared cell plus a SysV semaphore for blocking.
#[derive(Debug)]
pub struct SemaMutex {
    name: String,
    lwm: LwMutex<SemaWaiter>,
    // The waiter needs the semaphore's kernel id alive; the region backs
    // the cell.
    _sem: Semaphore,
    _region: MemoryRegion,
}

impl SemaMutex {
    /// Opens or creates the named mutex.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm) -> Result<Self> {
        let (region, created) =
            create_writable_region(&mutex_state_name(name), flags, perm, LWM_STATE_SIZE)
                .context("creating shared state")?;
        let sem = match Semaphore::new(name, flags, perm, 1) {
            Ok(sem) => sem,
            Err(e) => {
                drop(region);
                if created {
                    let _ = destroy_memory_object(&mutex_state_name(name));
                }
                return Err(e).context("creating a semaphore");
            }
        };
        let cell = SharedCell::from_region(&region, 0);
        let lwm = LwMutex::new(cell, SemaWaiter::new(&sem));
        if created {
            lwm.init();
        }
        debug!(name, created, "opened sema mutex");
        Ok(Self {
            name: name.to_owned(),
            lwm,
            _sem: sem,
            _region: region,
        })
    }

    /// The name the mutex was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the mutex's kernel objects.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_sema_mutex(&name)
    }
}

impl Locker for SemaMutex {
    fn lock(&self) {
        self.lwm.lock();
    }

    fn unlock(&self) {
        self.lwm.unlock();
    }

    fn try_lock(&self) -> bool {
        self.lwm.try_lock()
    }

    fn lock_timeout(&self, timeout: Duration) -> bool {
        self.lwm.lock_timeout(timeout)
    }
}

/// Removes the named sema mutex: the state region, the semaphore and its
/// key sidecar. Absence of any piece is not an error.
pub fn destroy_sema_mutex(name: &str) -> Result<()> {
    destroy_memory_object(&mutex_state_name(name)).context("destroying shared state")?;
    match destroy_semaphore(name) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotExist => Ok(()),
        Err(e) => Err(e).context("destroying semaphore"),
    }
}
