//! A named mutex blocking on futexes.

use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::cell::SharedCell;
use crate::sync::futex::FutexWaiter;
use crate::sync::lwmutex::{LwMutex, LWM_STATE_SIZE};
use crate::sync::{mutex_state_name, Locker};

/// A named mutex whose state is a 4-byte shared region and whose blocking
/// is the kernel's address wait.
///
/// Any process opening the same name holds the same lock. Dropping the
/// handle unmaps the state; [`FutexMutex::destroy`] removes the name.
#[derive(Debug)]
pub struct FutexMutex {
    name: String,
    lwm: LwMutex<FutexWaiter>,
    // Keeps the cell's backing mapped; the lw-mutex points into it.
    _region: MemoryRegion,
}

impl FutexMutex {
    /// Opens or creates the named mutex.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm) -> Result<Self> {
        let (region, created) =
            create_writable_region(&mutex_state_name(name), flags, perm, LWM_STATE_SIZE)
                .context("creating shared state")?;
        let cell = SharedCell::from_region(&region, 0);
        let lwm = LwMutex::new(cell, FutexWaiter::new(cell));
        if created {
            lwm.init();
        }
        debug!(name, created, "opened futex mutex");
        Ok(Self {
            name: name.to_owned(),
            lwm,
            _region: region,
        })
    }

    /// The name the mutex was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the mutex's kernel objects. Other processes keep working on
    /// their mappings until they drop them.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_futex_mutex(&name)
    }
}

impl Locker for FutexMutex {
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

/// Removes the named futex mutex. Absence is not an error.
pub fn destroy_futex_mutex(name: &str) -> Result<()> {
    destroy_memory_object(&mutex_state_name(name)).context("destroying shared state")
}
