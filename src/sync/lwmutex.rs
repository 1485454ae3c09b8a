//! A lightweight mutex over one shared 32-bit cell.

use std::time::Duration;

use tracing::trace;

use crate::error::{ErrorKind, Result};
use crate::platform::Deadline;
use crate::sync::cell::SharedCell;
use crate::sync::wait_waker::WaitWaker;

/// Lock/unlock attempts made before and after blocking.
pub(crate) const SPIN_COUNT: usize = 100;

/// Bytes of shared state a lightweight mutex needs.
pub(crate) const LWM_STATE_SIZE: usize = SharedCell::SIZE;

const UNLOCKED: i32 = 0;
const LOCKED_NO_WAITERS: i32 = 1;
const LOCKED_HAVE_WAITERS: i32 = 2;

/// A mutex whose entire state is one shared cell.
///
/// The cell is always one of `UNLOCKED`, `LOCKED_NO_WAITERS`,
/// `LOCKED_HAVE_WAITERS` at quiescent points, and transitions only by CAS or
/// swap. Uncontended lock and unlock are a single CAS; the [`WaitWaker`] is
/// entered only when spinning loses. A return from the waker is a hint: the
/// swap loop re-establishes the truth before the caller proceeds.
#[derive(Debug)]
pub(crate) struct LwMutex<W: WaitWaker> {
    cell: SharedCell,
    ww: W,
}

impl<W: WaitWaker> LwMutex<W> {
    pub(crate) fn new(cell: SharedCell, ww: W) -> Self {
        Self { cell, ww }
    }

    /// Writes the initial unlocked state. Only the creator of the shared
    /// region calls this.
    pub(crate) fn init(&self) {
        self.cell.store(UNLOCKED);
    }

    pub(crate) fn lock(&self) {
        if let Err(e) = self.lock_deadline(Deadline::after(None)) {
            panic!("mutex lock failed: {e}");
        }
    }

    pub(crate) fn try_lock(&self) -> bool {
        self.cell.compare_exchange(UNLOCKED, LOCKED_NO_WAITERS)
    }

    pub(crate) fn lock_timeout(&self, timeout: Duration) -> bool {
        match self.lock_deadline(Deadline::after(Some(timeout))) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("mutex lock failed: {e}"),
        }
    }

    /// The full acquisition protocol against an absolute deadline, shared by
    /// the composites that splice a mutex stage into a longer timed wait.
    pub(crate) fn lock_deadline(&self, deadline: Deadline) -> Result<()> {
        for _ in 0..SPIN_COUNT {
            if self.try_lock() {
                return Ok(());
            }
            std::hint::spin_loop();
        }
        trace!("lw-mutex entering slow path");
        let mut old = self.cell.load();
        if old != LOCKED_HAVE_WAITERS {
            old = self.cell.swap(LOCKED_HAVE_WAITERS);
        }
        while old != UNLOCKED {
            self.ww.wait(LOCKED_HAVE_WAITERS, deadline.remaining())?;
            old = self.cell.swap(LOCKED_HAVE_WAITERS);
        }
        Ok(())
    }

    /// Releases the mutex. Panics if it is not locked.
    pub(crate) fn unlock(&self) {
        let old = self.cell.load();
        if old == LOCKED_HAVE_WAITERS {
            self.cell.store(UNLOCKED);
        } else {
            assert!(old != UNLOCKED, "unlock of unlocked mutex");
            if self.cell.swap(UNLOCKED) == LOCKED_NO_WAITERS {
                return;
            }
        }
        // Give an active locker a chance to grab the cell before paying for
        // a kernel wake; if someone does, they inherit the wake duty.
        for _ in 0..SPIN_COUNT {
            if self.cell.load() != UNLOCKED
                && self.cell.compare_exchange(LOCKED_NO_WAITERS, LOCKED_HAVE_WAITERS)
            {
                return;
            }
            std::hint::spin_loop();
        }
        self.ww.wake(1);
    }
}
