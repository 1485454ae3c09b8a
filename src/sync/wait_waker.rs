//! The two-operation blocking abstraction behind every primitive.

use std::time::Duration;

use crate::error::Result;

/// Puts callers to sleep until a shared cell may have changed, and wakes
/// them again.
///
/// Implementations differ in what the kernel offers: futexes wait on the
/// cell's address directly, the semaphore adapter sleeps on a SysV
/// semaphore, and the waiter-table path parks each waiter on its own named
/// event. A return from [`WaitWaker::wait`] is only a hint — the value may
/// have changed and changed back — so callers always re-check the cell and
/// loop. That re-check also absorbs the semaphore adapter ignoring
/// `expected` entirely.
pub(crate) trait WaitWaker {
    /// Blocks until the cell's value is (or may no longer be) bit-equal to
    /// `expected`, or until `timeout` elapses. `None` waits forever.
    ///
    /// Fails with `TimedOut` on an elapsed deadline, or a system error if
    /// the kernel object went away underneath.
    fn wait(&self, expected: i32, timeout: Option<Duration>) -> Result<()>;

    /// Wakes at most `n` currently blocked waiters.
    ///
    /// Panics on system errors, in line with the steady-state policy: a
    /// failed wake means the primitive was destroyed mid-use.
    fn wake(&self, n: i32);
}
