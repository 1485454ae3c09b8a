//! The platform's named mutex.

use crate::error::Result;

/// The default named mutex for this platform: futex-backed on Linux,
/// semaphore-backed elsewhere.
///
/// Implements [`crate::sync::Locker`]; see the backing type for the exact
/// lifecycle. Whatever the backend, the contract is the same: one holder at
/// a time host-wide, `unlock` of an unheld mutex panics, `drop` unmaps,
/// destroy removes the name.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type Mutex = crate::sync::mutex_futex::FutexMutex;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub type Mutex = crate::sync::mutex_sema::SemaMutex;

/// Removes the named mutex and everything it owns. Absence is not an error.
pub fn destroy_mutex(name: &str) -> Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        crate::sync::mutex_futex::destroy_futex_mutex(name)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        crate::sync::mutex_sema::destroy_sema_mutex(name)
    }
}
