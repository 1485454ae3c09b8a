//! A lightweight auto-reset event over one shared 32-bit cell.

use std::time::Duration;

use crate::platform::Deadline;
use crate::sync::cell::SharedCell;
use crate::sync::wait_waker::WaitWaker;

/// Bytes of shared state a lightweight event needs.
pub(crate) const LWE_STATE_SIZE: usize = SharedCell::SIZE;

const SIGNAL_BIT: i32 = i32::MIN;

/// An event whose entire state is one shared cell: the sign bit is the
/// signal, the low 31 bits count blocked waiters.
///
/// The waiter count never goes negative, and drains back to zero once no
/// new waiters arrive: a waiter removes its own count exactly once, whether
/// it consumed the signal or timed out.
#[derive(Debug)]
pub(crate) struct LwEvent<W: WaitWaker> {
    cell: SharedCell,
    ww: W,
}

impl<W: WaitWaker> LwEvent<W> {
    pub(crate) fn new(cell: SharedCell, ww: W) -> Self {
        Self { cell, ww }
    }

    /// Writes the initial state. Only the creator of the shared region
    /// calls this.
    pub(crate) fn init(&self, set: bool) {
        self.cell.store(if set { SIGNAL_BIT } else { 0 });
    }

    /// Signals the event. If waiters are blocked, exactly one is woken to
    /// consume the signal.
    pub(crate) fn set(&self) {
        let mut old;
        loop {
            old = self.cell.load();
            if old < 0 {
                // Already signalled.
                return;
            }
            if self.cell.compare_exchange(old, old | SIGNAL_BIT) {
                break;
            }
        }
        if old > 0 {
            self.ww.wake(1);
        }
    }

    /// Tries to consume the signal; otherwise applies the waiter-count
    /// deltas in one CAS.
    ///
    /// When the signal bit is set: clear it, add `on_obtain` to the count,
    /// and report the event as obtained. When it is clear: add `on_miss`.
    /// With `on_miss == 0` the miss case is a pure read. The two deltas are
    /// what lets one helper serve entry (`0, +1`), the post-wake re-check
    /// (`-1, 0`) and the timeout path (`-1, -1`), each adjusting the count
    /// for a waiter that is, respectively, not yet counted, counted and
    /// leaving on success, or counted and leaving either way.
    fn obtain_or_change(&self, on_obtain: i32, on_miss: i32) -> (i32, bool) {
        loop {
            let old = self.cell.load();
            let (new, obtained) = if old < 0 {
                ((old & !SIGNAL_BIT) + on_obtain, true)
            } else {
                if on_miss == 0 {
                    return (old, false);
                }
                (old + on_miss, false)
            };
            debug_assert!((new & !SIGNAL_BIT) >= 0, "event waiter count underflow");
            if self.cell.compare_exchange(old, new) {
                return (new, obtained);
            }
        }
    }

    /// Blocks until the event is signalled, consuming the signal. `None`
    /// waits forever. Returns whether the signal was obtained.
    pub(crate) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        // Catch the event if it is already set; otherwise become a waiter.
        let (mut seen, obtained) = self.obtain_or_change(0, 1);
        if obtained {
            return true;
        }
        let deadline = Deadline::after(timeout);
        loop {
            match self.ww.wait(seen, deadline.remaining()) {
                Ok(()) => {}
                Err(e) if e.is_timeout() => {
                    // Leave the waiter list; the same CAS tells us whether
                    // the signal arrived first.
                    let (_, obtained) = self.obtain_or_change(-1, -1);
                    return obtained;
                }
                Err(e) => panic!("event wait failed: {e}"),
            }
            let (now, obtained) = self.obtain_or_change(-1, 0);
            if obtained {
                return true;
            }
            seen = now;
        }
    }
}
