//! Condition variable over a shared waiter table (no address-wait hosts).
//!
//! Each waiter parks on its own uniquely named [`Event`] and advertises the
//! event in a bounded table inside the shared region; signallers walk the
//! table and set events by name. An internal named mutex serializes the
//! table.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::event::Event;
use crate::sync::mutex::{destroy_mutex, Mutex};
use crate::sync::shared_array::SharedArray;
use crate::sync::{cond_mutex_name, cond_state_name, Locker, MAX_COND_WAITERS};

/// Per-process counter for waiter ids; the pid in the high half makes ids
/// unique host-wide.
static WAITER_SEQ: AtomicU32 = AtomicU32::new(0);

/// A named condition variable backed by a shared waiter table.
pub struct WaitlistCond<'a> {
    locker: &'a dyn Locker,
    name: String,
    list_lock: Mutex,
    waiters: SharedArray,
    _region: MemoryRegion,
}

impl std::fmt::Debug for WaitlistCond<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitlistCond")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<'a> WaitlistCond<'a> {
    /// Opens or creates the named condition variable, paired with `locker`.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm, locker: &'a dyn Locker) -> Result<Self> {
        let size = SharedArray::size_for(MAX_COND_WAITERS);
        let (region, created) = create_writable_region(&cond_state_name(name), flags, perm, size)
            .context("creating shared state")?;

        // A fresh region means any internal mutex under this name is a
        // leftover from a previous owner that never destroyed it (a crash,
        // typically). Clear it before recreating.
        if created {
            if let Err(e) = destroy_mutex(&cond_mutex_name(name)) {
                let _ = destroy_memory_object(&cond_state_name(name));
                return Err(e).context("cleaning up a stale internal mutex");
            }
        }

        let list_lock = match Mutex::new(&cond_mutex_name(name), flags, perm) {
            Ok(lock) => lock,
            Err(e) => {
                drop(region);
                if created {
                    let _ = destroy_memory_object(&cond_state_name(name));
                }
                return Err(e).context("obtaining the internal lock");
            }
        };

        let waiters = if created {
            SharedArray::new(&region, MAX_COND_WAITERS)
        } else {
            SharedArray::open(&region)
        };
        debug!(name, created, "opened waitlist cond");
        Ok(Self {
            locker,
            name: name.to_owned(),
            list_lock,
            waiters,
            _region: region,
        })
    }

    /// Wakes one waiter whose event can still be opened.
    pub fn signal(&self) {
        self.list_lock.lock();
        self.signal_n(1);
        self.list_lock.unlock();
    }

    /// Wakes every currently listed waiter.
    pub fn broadcast(&self) {
        self.list_lock.lock();
        self.signal_n(self.waiters.len());
        self.list_lock.unlock();
    }

    /// Releases the paired locker, blocks until signalled, reacquires the
    /// locker before returning.
    pub fn wait(&self) {
        self.do_wait(None);
    }

    /// Like [`WaitlistCond::wait`], bounded by `timeout`. The locker is
    /// held again on return either way; the result says whether a signal
    /// ended the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.do_wait(Some(timeout))
    }

    /// The name the condition variable was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn do_wait(&self, timeout: Option<Duration>) -> bool {
        let waiter = self.add_waiter();
        self.locker.unlock();
        let signalled = match timeout {
            Some(t) => waiter.event.wait_timeout(t),
            None => {
                waiter.event.wait();
                true
            }
        };
        self.locker.lock();
        // Success or timeout, the waiter leaves the table exactly once.
        self.remove_waiter(waiter);
        signalled
    }

    /// Registers a fresh waiter in the table. Must not hold the list lock.
    fn add_waiter(&self) -> Waiter {
        self.list_lock.lock();
        if self.waiters.len() >= self.waiters.capacity() {
            self.list_lock.unlock();
            panic!("{}", Error::new(ErrorKind::TooManyWaiters)
                .with_context(format!("cond {:?} waiter table is full", self.name)));
        }
        let waiter = Waiter::create();
        let pushed = self.waiters.push(waiter.id);
        self.list_lock.unlock();
        debug_assert!(pushed, "capacity checked under the list lock");
        waiter
    }

    fn remove_waiter(&self, waiter: Waiter) {
        self.list_lock.lock();
        for i in 0..self.waiters.len() {
            if self.waiters.at(i) == waiter.id {
                self.waiters.remove_at(i);
                break;
            }
        }
        self.list_lock.unlock();
        if let Err(e) = waiter.event.destroy() {
            trace!(id = waiter.id, "destroying waiter event failed: {e}");
        }
    }

    /// Wakes up to `count` waiters. Must hold the list lock.
    fn signal_n(&self, count: usize) {
        let mut signalled = 0;
        for i in 0..self.waiters.len() {
            if signalled >= count {
                break;
            }
            let id = self.waiters.at(i);
            match Event::new(&waiter_event_name(id), OpenFlags::OPEN_EXISTING, Perm::DEFAULT, false)
            {
                Ok(event) => {
                    event.set();
                    signalled += 1;
                }
                // The waiter is tearing down between our read and the open.
                Err(e) if e.kind() == ErrorKind::NotExist => {}
                Err(e) => panic!("cond signal failed: {e}"),
            }
        }
    }

    /// Removes the condition variable's kernel objects.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_waitlist_cond(&name)
    }
}

/// A parked caller: a table entry plus the event it sleeps on.
#[derive(Debug)]
struct Waiter {
    id: u64,
    event: Event,
}

impl Waiter {
    /// Creates a uniquely named event for this waiter, retrying the id on a
    /// create collision.
    fn create() -> Self {
        loop {
            let seq = WAITER_SEQ.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            let id = u64::from(std::process::id()) << 32 | u64::from(seq);
            match Event::new(
                &waiter_event_name(id),
                OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
                Perm::DEFAULT,
                false,
            ) {
                Ok(event) => return Self { id, event },
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => panic!("cond: failed to create a waiter event: {e}"),
            }
        }
    }
}

fn waiter_event_name(id: u64) -> String {
    format!("cev.{}.{}", id >> 32, id as u32)
}

/// Removes the named waitlist cond: its internal mutex and the table
/// region. Absence of either piece is not an error.
pub fn destroy_waitlist_cond(name: &str) -> Result<()> {
    destroy_mutex(&cond_mutex_name(name)).context("destroying cond list mutex")?;
    destroy_memory_object(&cond_state_name(name)).context("destroying shared cond state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiter_ids_are_unique_and_carry_the_pid() {
        let a = Waiter::create();
        let b = Waiter::create();
        assert_ne!(a.id, b.id);
        assert_eq!((a.id >> 32) as u32, std::process::id());
        assert_eq!((b.id >> 32) as u32, std::process::id());
        a.event.destroy().expect("destroy a");
        b.event.destroy().expect("destroy b");
    }

    #[test]
    fn waiter_event_name_splits_pid_and_seq() {
        let id = 0x0000_1234_0000_0042_u64;
        assert_eq!(waiter_event_name(id), "cev.4660.66");
    }
}
