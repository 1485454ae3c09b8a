//! A named auto-reset event.

use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::cell::SharedCell;
use crate::sync::event_state_name;
use crate::sync::lwevent::{LwEvent, LWE_STATE_SIZE};

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::sync::futex::FutexWaiter;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use crate::sync::semaphore::{destroy_semaphore, SemaWaiter, Semaphore};

#[cfg(any(target_os = "linux", target_os = "android"))]
type EventWaiter = FutexWaiter;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
type EventWaiter = SemaWaiter;

/// A named auto-reset event shared between processes.
///
/// [`Event::set`] leaves the event signalled; the next (or one currently
/// blocked) [`Event::wait`] consumes the signal and resets it. `initial`
/// seeds the starting state when the event is created. Manual-reset
/// behavior, where needed, is a matter of the signaller calling `set` again
/// after each consumer.
#[derive(Debug)]
pub struct Event {
    name: String,
    lwe: LwEvent<EventWaiter>,
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    _sem: Semaphore,
    _region: MemoryRegion,
}

impl Event {
    /// Opens or creates the named event.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm, initial: bool) -> Result<Self> {
        let (region, created) =
            create_writable_region(&event_state_name(name), flags, perm, LWE_STATE_SIZE)
                .context("creating shared state")?;
        let cell = SharedCell::from_region(&region, 0);

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let lwe = LwEvent::new(cell, FutexWaiter::new(cell));

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let (sem, lwe) = {
            let sem = match Semaphore::new(name, flags, perm, 0) {
                Ok(sem) => sem,
                Err(e) => {
                    drop(region);
                    if created {
                        let _ = destroy_memory_object(&event_state_name(name));
                    }
                    return Err(e).context("creating a semaphore");
                }
            };
            let lwe = LwEvent::new(cell, SemaWaiter::new(&sem));
            (sem, lwe)
        };

        if created {
            lwe.init(initial);
        }
        debug!(name, created, initial, "opened event");
        Ok(Self {
            name: name.to_owned(),
            lwe,
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            _sem: sem,
            _region: region,
        })
    }

    /// Signals the event, waking one waiter if any are blocked.
    pub fn set(&self) {
        self.lwe.set();
    }

    /// Blocks until the event is signalled, consuming the signal.
    pub fn wait(&self) {
        let obtained = self.lwe.wait_timeout(None);
        debug_assert!(obtained, "infinite wait returned without the signal");
    }

    /// Like [`Event::wait`], but gives up after `timeout`. Returns whether
    /// the signal was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.lwe.wait_timeout(Some(timeout))
    }

    /// The name the event was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the event's kernel objects.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_event(&name)
    }
}

/// Removes the named event. Absence is not an error.
pub fn destroy_event(name: &str) -> Result<()> {
    destroy_memory_object(&event_state_name(name)).context("destroying shared state")?;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    destroy_semaphore(name).context("destroying semaphore")?;
    Ok(())
}
