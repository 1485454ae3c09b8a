//! Procsync: named cross-process synchronization primitives for Unix.
//!
//! # Overview
//!
//! Procsync lets independent processes on the same host coordinate through
//! named, kernel-persistent primitives. Lock and event state lives in shared
//! memory; blocking is delegated to whatever the kernel offers: futexes on
//! Linux, SysV counting semaphores elsewhere, and per-waiter events where no
//! address-based wait exists.
//!
//! # Core Guarantees
//!
//! - **Mutual exclusion across processes**: a [`sync::Mutex`] admits one
//!   holder at a time, host-wide, not just within one process
//! - **Lock-free fast paths**: contention-free lock/unlock is a single CAS on
//!   a shared 32-bit cell; the kernel is only entered to sleep or wake
//! - **Explicit lifetimes**: dropping a primitive unmaps its state but leaves
//!   the kernel object alive; removal is always an explicit `destroy`
//! - **Bounded waits**: every blocking operation has a `*_timeout` variant
//!   that leaves shared state consistent when the deadline passes
//!
//! # Module Structure
//!
//! - [`region`]: named shared-memory regions (create, open, map, destroy)
//! - [`sync`]: mutexes, rw-mutexes, condition variables, events, semaphores
//! - [`flags`]: open-mode flags and permission bits shared by all constructors
//! - [`platform`]: page/granularity queries, key derivation, syscall retry
//! - [`error`]: error kinds and the context chain they carry
//!
//! # Example
//!
//! ```no_run
//! use procsync::flags::{OpenFlags, Perm};
//! use procsync::sync::{Locker, Mutex};
//!
//! let m = Mutex::new("app-lock", OpenFlags::CREATE, Perm::DEFAULT)?;
//! m.lock();
//! // ... touch shared data ...
//! m.unlock();
//! # Ok::<(), procsync::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod error;
pub mod flags;
pub mod platform;
pub mod region;
pub mod sync;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use flags::{OpenFlags, Perm};
pub use region::{create_writable_region, destroy_memory_object, MemoryObject, MemoryRegion};
pub use sync::{
    destroy_cond, destroy_event, destroy_mutex, destroy_rwmutex, destroy_semaphore, CondVar,
    Event, Locker, Mutex, RwMutex, Semaphore,
};
