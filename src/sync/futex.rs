//! Address-based wait/wake on Linux futexes.

#![allow(unsafe_code)]

use std::time::Duration;

use tracing::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::platform::Deadline;
use crate::sync::cell::SharedCell;
use crate::sync::wait_waker::WaitWaker;

/// The fast-path [`WaitWaker`]: the kernel blocks directly on the shared
/// cell's address and compares against `expected` under its own lock, so
/// there is no window between the caller's last check and going to sleep.
///
/// The cell must stay 4-byte aligned at a stable address for the lifetime of
/// the primitive; [`SharedCell`] guarantees both.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FutexWaiter {
    cell: SharedCell,
}

impl FutexWaiter {
    pub(crate) fn new(cell: SharedCell) -> Self {
        Self { cell }
    }

    /// Wakes every waiter currently blocked on the cell.
    pub(crate) fn wake_all(&self) {
        self.wake(i32::MAX);
    }
}

impl WaitWaker for FutexWaiter {
    fn wait(&self, expected: i32, timeout: Option<Duration>) -> Result<()> {
        let deadline = Deadline::after(timeout);
        loop {
            if deadline.expired() {
                return Err(Error::new(ErrorKind::TimedOut));
            }
            let ts = deadline.remaining().map(|t| libc::timespec {
                tv_sec: t.as_secs() as libc::time_t,
                tv_nsec: i64::from(t.subsec_nanos()) as _,
            });
            let ts_ptr = ts
                .as_ref()
                .map_or(std::ptr::null(), std::ptr::from_ref::<libc::timespec>);
            // SAFETY: the cell address is valid and aligned; ts, when
            // present, outlives the call. No FUTEX_PRIVATE_FLAG: waiters
            // live in other processes.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    self.cell.as_ptr(),
                    libc::FUTEX_WAIT,
                    expected,
                    ts_ptr,
                )
            };
            if rc == 0 {
                return Ok(());
            }
            match std::io::Error::last_os_error().raw_os_error() {
                // Value already differed from `expected`: that is a wake.
                Some(libc::EAGAIN) => return Ok(()),
                Some(libc::ETIMEDOUT) => return Err(Error::new(ErrorKind::TimedOut)),
                // Interrupted by a signal: re-arm with the remaining budget.
                Some(libc::EINTR) => {
                    trace!("futex wait interrupted, re-arming");
                }
                Some(errno) => {
                    return Err(Error::from_errno(errno).with_context("futex wait failed"))
                }
                None => return Err(Error::new(ErrorKind::System).with_context("futex wait failed")),
            }
        }
    }

    fn wake(&self, n: i32) {
        // SAFETY: only the cell address crosses into the kernel.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.cell.as_ptr(),
                libc::FUTEX_WAKE,
                n,
                std::ptr::null::<libc::timespec>(),
            )
        };
        assert!(
            rc >= 0,
            "futex wake failed: {}",
            std::io::Error::last_os_error()
        );
    }
}
