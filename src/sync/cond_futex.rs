//! Condition variable over a shared sequence counter (address-wait hosts).

use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorKind, Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::cell::SharedCell;
use crate::sync::futex::FutexWaiter;
use crate::sync::wait_waker::WaitWaker;
use crate::sync::{cond_state_name, Locker};

/// A named condition variable backed by a 4-byte sequence counter.
///
/// Every signal strictly increments the counter before waking, so a waiter
/// that snapshotted the counter under its locker cannot miss a signal that
/// happens after it started waiting: the kernel compares the snapshot
/// against the current value before sleeping.
pub struct FutexCond<'a> {
    locker: &'a dyn Locker,
    name: String,
    seq: SharedCell,
    ftx: FutexWaiter,
    _region: MemoryRegion,
}

impl std::fmt::Debug for FutexCond<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutexCond")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<'a> FutexCond<'a> {
    /// Opens or creates the named condition variable, paired with `locker`.
    ///
    /// The freshly created counter region is zero-filled by the kernel, so
    /// no explicit init is needed.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm, locker: &'a dyn Locker) -> Result<Self> {
        let (region, created) =
            create_writable_region(&cond_state_name(name), flags, perm, SharedCell::SIZE)
                .context("creating shared state")?;
        let seq = SharedCell::from_region(&region, 0);
        debug!(name, created, "opened futex cond");
        Ok(Self {
            locker,
            name: name.to_owned(),
            seq,
            ftx: FutexWaiter::new(seq),
            _region: region,
        })
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        self.seq.fetch_add(1);
        self.ftx.wake(1);
    }

    /// Wakes every current waiter.
    pub fn broadcast(&self) {
        self.seq.fetch_add(1);
        self.ftx.wake_all();
    }

    /// Releases the paired locker, blocks until signalled, reacquires the
    /// locker before returning.
    pub fn wait(&self) {
        let seen = self.seq.load();
        self.locker.unlock();
        if let Err(e) = self.ftx.wait(seen, None) {
            panic!("cond wait failed: {e}");
        }
        self.locker.lock();
    }

    /// Like [`FutexCond::wait`], bounded by `timeout`. The locker is held
    /// again on return either way; the result says whether a signal (rather
    /// than the deadline) ended the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let seen = self.seq.load();
        self.locker.unlock();
        let signalled = match self.ftx.wait(seen, Some(timeout)) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("cond wait failed: {e}"),
        };
        self.locker.lock();
        signalled
    }

    /// The name the condition variable was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the condition variable's kernel objects.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_futex_cond(&name)
    }
}

/// Removes the named futex cond. Absence is not an error.
pub fn destroy_futex_cond(name: &str) -> Result<()> {
    destroy_memory_object(&cond_state_name(name)).context("destroying shared state")
}
