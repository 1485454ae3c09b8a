//! Host queries and syscall plumbing shared by the region and sync layers.

#![allow(unsafe_code)]

pub mod key;

use std::io;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};

/// Returns the size of a virtual memory page in bytes.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf is async-signal-safe and has no memory arguments.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(sz).unwrap_or(4096)
    })
}

/// Returns the allocation granularity mappings must start at.
///
/// On Unix this is the page size; the distinction matters only to keep the
/// mapping arithmetic honest about which constant it depends on.
#[must_use]
pub fn alloc_granularity() -> usize {
    page_size()
}

/// Retries `f` while it fails with `EINTR`.
///
/// Syscalls that sleep (`semop`, `futex`) are routinely interrupted by
/// signals; every blocking call in the crate funnels through here or through
/// a deadline-aware equivalent.
pub(crate) fn uninterrupted<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

/// An absolute deadline derived from an optional relative timeout.
///
/// `None` means wait forever. Blocking loops re-arm their kernel waits from
/// `remaining()`, so a wait interrupted by a spurious wakeup or a signal
/// never extends the total time budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline `timeout` from now; infinite when `timeout` is `None`.
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|t| Instant::now() + t))
    }

    /// Time left until the deadline: `None` for infinite, zero when elapsed.
    pub(crate) fn remaining(self) -> Option<Duration> {
        self.0.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has elapsed.
    pub(crate) fn expired(self) -> bool {
        self.0.is_some_and(|d| Instant::now() >= d)
    }
}

/// Validates a user-supplied object name.
///
/// Names must work both as kernel object names and as file basenames under
/// the crate temp directory, so path separators and the empty string are
/// rejected up front.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgument).with_context("empty object name"));
    }
    if name.len() > 240 {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_context(format!("object name too long: {} bytes", name.len())));
    }
    if name.contains(['/', '\0']) {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_context(format!("object name {name:?} is not a valid basename")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let sz = page_size();
        assert!(sz >= 4096);
        assert!(sz.is_power_of_two());
        assert_eq!(alloc_granularity(), sz);
    }

    #[test]
    fn uninterrupted_retries_eintr() {
        let mut attempts = 0;
        let res: io::Result<i32> = uninterrupted(|| {
            attempts += 1;
            if attempts < 3 {
                Err(io::Error::from_raw_os_error(libc::EINTR))
            } else {
                Ok(7)
            }
        });
        assert_eq!(res.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn deadline_remaining_counts_down() {
        let d = Deadline::after(Some(Duration::from_millis(50)));
        assert!(!d.expired());
        let first = d.remaining().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let second = d.remaining().unwrap();
        assert!(second <= first);
    }

    #[test]
    fn infinite_deadline_never_expires() {
        let d = Deadline::after(None);
        assert!(!d.expired());
        assert!(d.remaining().is_none());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("plain-name").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("nul\0byte").is_err());
        assert!(validate_name(&"x".repeat(300)).is_err());
    }
}
