//! Raw SysV semaphore syscalls.
//!
//! Thin wrappers around `semget`/`semop`/`semctl` with errno mapped into
//! crate errors and `EINTR` absorbed. Every set managed here has exactly one
//! semaphore; the crate derives the key from a name sidecar
//! ([`crate::platform::key`]).

#![allow(unsafe_code)]

use std::io;

use crate::error::{Error, ErrorKind, Result};
use crate::platform::{uninterrupted, Deadline};

/// Creates or opens the one-semaphore set for `key`.
///
/// `flags` carries the permission bits plus `IPC_CREAT`/`IPC_EXCL` when
/// creating.
pub(crate) fn sem_get(key: i32, flags: i32) -> Result<i32> {
    // SAFETY: no pointer arguments.
    let id = unsafe { libc::semget(key, 1, flags) };
    if id < 0 {
        return Err(Error::last_os_error().with_context("semget failed"));
    }
    Ok(id)
}

/// Atomically adds `delta` to the semaphore, blocking while the result
/// would go negative.
pub(crate) fn sem_add(id: i32, delta: i16) -> Result<()> {
    uninterrupted(|| op(id, delta, 0))
        .map_err(|e| Error::from(e).with_context("semop failed"))
}

/// One non-blocking attempt to add `delta`; would-block reports `TimedOut`.
pub(crate) fn sem_try_add(id: i32, delta: i16) -> Result<()> {
    match op(id, delta, libc::IPC_NOWAIT as i16) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Err(Error::new(ErrorKind::TimedOut)),
        Err(e) => Err(Error::from(e).with_context("semop failed")),
    }
}

/// Adds `delta`, blocking until it succeeds or `deadline` passes.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn sem_add_deadline(id: i32, delta: i16, deadline: Deadline) -> Result<()> {
    loop {
        let Some(remaining) = deadline.remaining() else {
            return sem_add(id, delta);
        };
        if remaining.is_zero() {
            return Err(Error::new(ErrorKind::TimedOut));
        }
        let ts = libc::timespec {
            tv_sec: remaining.as_secs() as libc::time_t,
            tv_nsec: i64::from(remaining.subsec_nanos()) as _,
        };
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: delta,
            sem_flg: 0,
        };
        // SAFETY: buf and ts live across the call; the set has one semaphore.
        // libc does not expose a `semtimedop` wrapper on this target, so the
        // syscall is invoked directly via its number.
        let rc = unsafe { libc::syscall(libc::SYS_semtimedop, id, &mut buf, 1, &ts) };
        if rc == 0 {
            return Ok(());
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(libc::EINTR) => {}
            Some(libc::EAGAIN) => return Err(Error::new(ErrorKind::TimedOut)),
            Some(errno) => return Err(Error::from_errno(errno).with_context("semtimedop failed")),
            None => return Err(Error::new(ErrorKind::System).with_context("semtimedop failed")),
        }
    }
}

/// Adds `delta`, blocking until it succeeds or `deadline` passes.
///
/// Without `semtimedop`, the timed path polls with `IPC_NOWAIT` and a capped
/// backoff sleep.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn sem_add_deadline(id: i32, delta: i16, deadline: Deadline) -> Result<()> {
    use std::time::Duration;

    const MAX_BACKOFF: Duration = Duration::from_millis(5);

    let mut backoff = Duration::from_micros(50);
    loop {
        let Some(remaining) = deadline.remaining() else {
            return sem_add(id, delta);
        };
        if remaining.is_zero() {
            return Err(Error::new(ErrorKind::TimedOut));
        }
        match sem_try_add(id, delta) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                std::thread::sleep(backoff.min(remaining));
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Removes the semaphore set.
pub(crate) fn sem_rmid(id: i32) -> Result<()> {
    // SAFETY: IPC_RMID ignores the value argument.
    let rc = unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
    if rc < 0 {
        return Err(Error::last_os_error().with_context("semctl(IPC_RMID) failed"));
    }
    Ok(())
}

/// Reads the current semaphore value.
pub(crate) fn sem_getval(id: i32) -> Result<i32> {
    // SAFETY: GETVAL takes no value argument.
    let val = unsafe { libc::semctl(id, 0, libc::GETVAL) };
    if val < 0 {
        return Err(Error::last_os_error().with_context("semctl(GETVAL) failed"));
    }
    Ok(val)
}

fn op(id: i32, delta: i16, flg: i16) -> io::Result<()> {
    let mut buf = libc::sembuf {
        sem_num: 0,
        sem_op: delta,
        sem_flg: flg,
    };
    // SAFETY: buf is a valid sembuf for a one-semaphore set.
    let rc = unsafe { libc::semop(id, &mut buf, 1) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
