//! The platform's named condition variable.

use crate::error::Result;

/// The default named condition variable for this platform: a sequence
/// counter over futexes on Linux, a shared waiter table elsewhere.
///
/// Both variants give the same contract: on return from `wait` the paired
/// locker is held, and a signal (or a broadcast covering this waiter) that
/// happens after the wait started is never missed.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type CondVar<'a> = crate::sync::cond_futex::FutexCond<'a>;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub type CondVar<'a> = crate::sync::cond_waitlist::WaitlistCond<'a>;

/// Removes the named condition variable and everything it owns. Absence is
/// not an error.
pub fn destroy_cond(name: &str) -> Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        crate::sync::cond_futex::destroy_futex_cond(name)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        crate::sync::cond_waitlist::destroy_waitlist_cond(name)
    }
}
