//! Named synchronization primitives shared between processes.
//!
//! # Primitives
//!
//! - [`Mutex`]: mutual exclusion with try/timeout variants
//! - [`RwMutex`]: many readers or one writer, writer starve-resistant
//! - [`CondVar`]: condition variable over any [`Locker`]
//! - [`Event`]: auto-reset signal
//! - [`Semaphore`]: counting semaphore
//!
//! All state lives in named shared-memory regions (or SysV kernel objects),
//! so any process that opens the same name operates on the same primitive.
//!
//! # Layering
//!
//! The composites assemble three small pieces: a [`crate::region`] mapping
//! holding the shared state, a lightweight primitive (`lw-mutex`,
//! `lw-event`) that keeps all of its state in one shared 32-bit cell, and a
//! wait/wake provider that puts callers to sleep when spinning is not
//! enough. Which provider backs a primitive is decided per platform at
//! compile time: futexes on Linux, SysV semaphores on the other Unixes, and
//! per-waiter events for the waiter-table condition variable.

mod cell;
mod cond;
mod cond_waitlist;
mod event;
mod lwevent;
mod lwmutex;
mod mutex;
mod mutex_sema;
mod rwmutex;
mod semaphore;
mod shared_array;
mod sysv;
mod wait_waker;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod cond_futex;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod futex;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod mutex_futex;

pub use cond::{destroy_cond, CondVar};
pub use cond_waitlist::{destroy_waitlist_cond, WaitlistCond};
pub use event::{destroy_event, Event};
pub use mutex::{destroy_mutex, Mutex};
pub use mutex_sema::{destroy_sema_mutex, SemaMutex};
pub use rwmutex::{destroy_rwmutex, RLocker, RwMutex};
pub use semaphore::{destroy_semaphore, Semaphore};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use cond_futex::{destroy_futex_cond, FutexCond};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use mutex_futex::{destroy_futex_mutex, FutexMutex};

use std::time::Duration;

/// Capacity of the condition-variable waiter table.
///
/// A `Broadcast` can cover at most this many concurrently blocked waiters on
/// platforms using the waiter-table variant; the one-past-capacity waiter
/// dies with a `TooManyWaiters` panic.
pub const MAX_COND_WAITERS: usize = 128;

/// The locking capability every mutex-like primitive offers.
///
/// Condition variables accept any `Locker`, so a [`CondVar`] can pair with a
/// [`Mutex`], the write side of a [`RwMutex`], or the read side via
/// [`RLocker`].
pub trait Locker {
    /// Acquires the lock, blocking as long as it takes.
    ///
    /// Panics on system errors: a failed syscall here means the primitive
    /// was destroyed or its memory corrupted.
    fn lock(&self);

    /// Releases the lock. Unlocking a lock that is not held is a
    /// programming error and panics.
    fn unlock(&self);

    /// One acquisition attempt, never blocking.
    fn try_lock(&self) -> bool;

    /// Acquires the lock, giving up after `timeout`. Returns whether the
    /// lock was acquired.
    fn lock_timeout(&self, timeout: Duration) -> bool;
}

/// Name of the auxiliary region holding a mutex's shared state.
pub(crate) fn mutex_state_name(name: &str) -> String {
    format!("{name}.s")
}

/// Name of the auxiliary region holding a condvar's shared state.
pub(crate) fn cond_state_name(name: &str) -> String {
    format!("{name}.st")
}

/// Name of a condvar's internal waiter-table mutex.
pub(crate) fn cond_mutex_name(name: &str) -> String {
    format!("{name}.m")
}

/// Name of the region holding an event's shared state.
pub(crate) fn event_state_name(name: &str) -> String {
    format!("{name}.e")
}
