//! A named read/write mutex.
//!
//! State is two shared cells: one encoding `(writer-active, writer-waiting,
//! reader-count)`, and one internal lightweight mutex that serializes writer
//! entry and reader admission. A writer holds the internal mutex for its
//! whole critical section, so once a writer is queued new readers are held
//! off until it finishes; readers take the internal mutex only long enough
//! to bump the count, so reads run in parallel.

use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorKind, Result, ResultExt};
use crate::flags::{OpenFlags, Perm};
use crate::sync::wait_waker::WaitWaker;
use crate::platform::Deadline;
use crate::region::{create_writable_region, destroy_memory_object, MemoryRegion};
use crate::sync::cell::SharedCell;
use crate::sync::lwmutex::LwMutex;
use crate::sync::{mutex_state_name, Locker};

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::sync::futex::FutexWaiter;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use crate::sync::semaphore::{destroy_semaphore, SemaWaiter, Semaphore};

#[cfg(any(target_os = "linux", target_os = "android"))]
type RwWaiter = FutexWaiter;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
type RwWaiter = SemaWaiter;

/// Set while a writer owns the lock.
const WRITER_BIT: i32 = i32::MIN;
/// Set while a writer is waiting for readers to drain.
const WAIT_BIT: i32 = 0x4000_0000;
/// Low bits: number of active readers.
const READER_MASK: i32 = 0x3fff_ffff;

/// State region: the rw cell plus the internal mutex cell.
const RW_STATE_SIZE: usize = 2 * SharedCell::SIZE;

/// A named many-readers/one-writer lock shared between processes.
///
/// [`Locker`] on the mutex itself is the write side; [`RwMutex::rlocker`]
/// hands out a [`Locker`] view of the read side, so either side can back a
/// [`crate::sync::CondVar`].
#[derive(Debug)]
pub struct RwMutex {
    name: String,
    state: SharedCell,
    drain: RwWaiter,
    lwm: LwMutex<RwWaiter>,
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    _lock_sem: Semaphore,
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    _drain_sem: Semaphore,
    _region: MemoryRegion,
}

impl RwMutex {
    /// Opens or creates the named rw-mutex.
    pub fn new(name: &str, flags: OpenFlags, perm: Perm) -> Result<Self> {
        let (region, created) =
            create_writable_region(&mutex_state_name(name), flags, perm, RW_STATE_SIZE)
                .context("creating shared state")?;
        let state = SharedCell::from_region(&region, 0);
        let lock_cell = SharedCell::from_region(&region, 1);

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let (drain, lwm) = (
            FutexWaiter::new(state),
            LwMutex::new(lock_cell, FutexWaiter::new(lock_cell)),
        );

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let (lock_sem, drain_sem) = {
            let lock_sem = match Semaphore::new(name, flags, perm, 1) {
                Ok(sem) => sem,
                Err(e) => {
                    drop(region);
                    if created {
                        let _ = destroy_memory_object(&mutex_state_name(name));
                    }
                    return Err(e).context("creating the lock semaphore");
                }
            };
            let drain_name = drain_sema_name(name);
            match Semaphore::new(&drain_name, flags, perm, 0) {
                Ok(sem) => (lock_sem, sem),
                Err(e) => {
                    drop(region);
                    if created {
                        let _ = destroy_memory_object(&mutex_state_name(name));
                        let _ = destroy_semaphore(name);
                    }
                    return Err(e).context("creating the drain semaphore");
                }
            }
        };
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let (drain, lwm) = (
            SemaWaiter::new(&drain_sem),
            LwMutex::new(lock_cell, SemaWaiter::new(&lock_sem)),
        );

        if created {
            state.store(0);
            lwm.init();
        }
        debug!(name, created, "opened rw-mutex");
        Ok(Self {
            name: name.to_owned(),
            state,
            drain,
            lwm,
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            _lock_sem: lock_sem,
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            _drain_sem: drain_sem,
            _region: region,
        })
    }

    /// The name the rw-mutex was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A [`Locker`] whose lock/unlock are read-lock/read-unlock of this
    /// mutex.
    #[must_use]
    pub fn rlocker(&self) -> RLocker<'_> {
        RLocker { rw: self }
    }

    /// Acquires the read side.
    pub fn read_lock(&self) {
        if let Err(e) = self.read_lock_deadline(Deadline::after(None)) {
            panic!("rwmutex read lock failed: {e}");
        }
    }

    /// One attempt at the read side.
    pub fn try_read_lock(&self) -> bool {
        if !self.lwm.try_lock() {
            return false;
        }
        self.enter_reader();
        self.lwm.unlock();
        true
    }

    /// Acquires the read side, giving up after `timeout`.
    pub fn read_lock_timeout(&self, timeout: Duration) -> bool {
        match self.read_lock_deadline(Deadline::after(Some(timeout))) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("rwmutex read lock failed: {e}"),
        }
    }

    /// Releases the read side. Panics if no reader holds the lock.
    pub fn read_unlock(&self) {
        loop {
            let v = self.state.load();
            assert!(v & READER_MASK > 0, "read-unlock of a reader-free rwmutex");
            let new = v - 1;
            if self.state.compare_exchange(v, new) {
                if new & READER_MASK == 0 && new & WAIT_BIT != 0 {
                    // Last reader out; a queued writer is asleep on the cell.
                    self.drain.wake(1);
                }
                return;
            }
        }
    }

    fn read_lock_deadline(&self, deadline: Deadline) -> Result<()> {
        self.lwm.lock_deadline(deadline)?;
        self.enter_reader();
        self.lwm.unlock();
        Ok(())
    }

    fn enter_reader(&self) {
        let prev = self.state.fetch_add(1);
        // The internal mutex is held for a writer's whole critical section,
        // so a reader that got this far cannot see the writer bit.
        debug_assert!(prev & WRITER_BIT == 0, "reader admitted past an active writer");
    }

    fn write_lock_deadline(&self, deadline: Deadline) -> Result<()> {
        self.lwm.lock_deadline(deadline)?;
        loop {
            let v = self.state.load();
            if v & READER_MASK == 0 {
                // Claiming also clears the wait bit.
                self.state.store(WRITER_BIT);
                return Ok(());
            }
            if self.state.compare_exchange(v, v | WAIT_BIT) {
                if let Err(e) = self.drain.wait(v | WAIT_BIT, deadline.remaining()) {
                    self.clear_wait_bit();
                    self.lwm.unlock();
                    return Err(e);
                }
            }
        }
    }

    fn clear_wait_bit(&self) {
        loop {
            let v = self.state.load();
            if v & WAIT_BIT == 0 || self.state.compare_exchange(v, v & !WAIT_BIT) {
                return;
            }
        }
    }

    /// Removes the rw-mutex's kernel objects.
    pub fn destroy(self) -> Result<()> {
        let name = self.name.clone();
        drop(self);
        destroy_rwmutex(&name)
    }
}

impl Locker for RwMutex {
    /// Acquires the write side.
    fn lock(&self) {
        if let Err(e) = self.write_lock_deadline(Deadline::after(None)) {
            panic!("rwmutex write lock failed: {e}");
        }
    }

    /// Releases the write side. Panics if no writer holds the lock.
    fn unlock(&self) {
        let old = self.state.swap(0);
        assert!(old == WRITER_BIT, "unlock of unlocked rwmutex");
        self.lwm.unlock();
    }

    fn try_lock(&self) -> bool {
        if !self.lwm.try_lock() {
            return false;
        }
        if self.state.load() & READER_MASK == 0 {
            self.state.store(WRITER_BIT);
            return true;
        }
        self.lwm.unlock();
        false
    }

    fn lock_timeout(&self, timeout: Duration) -> bool {
        match self.write_lock_deadline(Deadline::after(Some(timeout))) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::TimedOut => false,
            Err(e) => panic!("rwmutex write lock failed: {e}"),
        }
    }
}

/// The read side of a [`RwMutex`], as a standalone [`Locker`].
#[derive(Debug, Clone, Copy)]
pub struct RLocker<'a> {
    rw: &'a RwMutex,
}

impl Locker for RLocker<'_> {
    fn lock(&self) {
        self.rw.read_lock();
    }

    fn unlock(&self) {
        self.rw.read_unlock();
    }

    fn try_lock(&self) -> bool {
        self.rw.try_read_lock()
    }

    fn lock_timeout(&self, timeout: Duration) -> bool {
        self.rw.read_lock_timeout(timeout)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn drain_sema_name(name: &str) -> String {
    format!("{name}.r")
}

/// Removes the named rw-mutex and everything it owns. Absence is not an
/// error.
pub fn destroy_rwmutex(name: &str) -> Result<()> {
    destroy_memory_object(&mutex_state_name(name)).context("destroying shared state")?;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        destroy_semaphore(name).context("destroying lock semaphore")?;
        destroy_semaphore(&drain_sema_name(name)).context("destroying drain semaphore")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
    use std::sync::Arc;

    fn scratch(tag: &str) -> String {
        format!("procsync-rw-{tag}-{}", std::process::id())
    }

    fn fresh(name: &str) -> RwMutex {
        let _ = destroy_rwmutex(name);
        RwMutex::new(name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
            .expect("create rwmutex")
    }

    #[test]
    fn readers_share_writers_exclude() {
        let name = scratch("share");
        let rw = fresh(&name);

        rw.read_lock();
        assert!(rw.try_read_lock(), "second reader may enter");
        assert!(!rw.try_lock(), "writer must wait for readers");
        rw.read_unlock();
        rw.read_unlock();

        assert!(rw.try_lock());
        assert!(!rw.try_read_lock(), "reader must wait for the writer");
        rw.unlock();

        rw.destroy().expect("destroy");
    }

    #[test]
    fn writer_timeout_leaves_lock_usable() {
        let name = scratch("timeout");
        let rw = fresh(&name);

        rw.read_lock();
        assert!(!rw.lock_timeout(Duration::from_millis(80)), "reader blocks writer");
        rw.read_unlock();

        assert!(rw.lock_timeout(Duration::from_millis(80)));
        rw.unlock();
        rw.destroy().expect("destroy");
    }

    #[test]
    #[should_panic(expected = "unlock of unlocked rwmutex")]
    fn write_unlock_without_lock_panics() {
        let name = scratch("wpanic");
        let rw = fresh(&name);
        rw.unlock();
    }

    #[test]
    #[should_panic(expected = "read-unlock of a reader-free rwmutex")]
    fn read_unlock_without_lock_panics() {
        let name = scratch("rpanic");
        let rw = fresh(&name);
        rw.read_unlock();
    }

    #[test]
    fn writers_and_readers_see_consistent_data() {
        const WRITERS: usize = 2;
        const READERS: usize = 4;
        const ITERS: usize = 200;

        let name = scratch("consistent");
        let rw = Arc::new(fresh(&name));
        // Written only under the write lock; checked under either lock.
        let pair = Arc::new((AtomicI32::new(0), AtomicI32::new(0)));
        let torn_reads = Arc::new(AtomicU32::new(0));

        std::thread::scope(|scope| {
            for _ in 0..WRITERS {
                let rw = Arc::clone(&rw);
                let pair = Arc::clone(&pair);
                scope.spawn(move || {
                    for i in 0..ITERS {
                        rw.lock();
                        pair.0.store(i as i32, Ordering::Relaxed);
                        pair.1.store(i as i32, Ordering::Relaxed);
                        rw.unlock();
                    }
                });
            }
            for _ in 0..READERS {
                let rw = Arc::clone(&rw);
                let pair = Arc::clone(&pair);
                let torn_reads = Arc::clone(&torn_reads);
                scope.spawn(move || {
                    for _ in 0..ITERS {
                        rw.read_lock();
                        let a = pair.0.load(Ordering::Relaxed);
                        let b = pair.1.load(Ordering::Relaxed);
                        if a != b {
                            torn_reads.fetch_add(1, Ordering::SeqCst);
                        }
                        rw.read_unlock();
                    }
                });
            }
        });

        assert_eq!(torn_reads.load(Ordering::SeqCst), 0, "readers saw a half-write");
        Arc::try_unwrap(rw).expect("sole owner").destroy().expect("destroy");
    }

    #[test]
    fn rlocker_is_a_locker_view() {
        let name = scratch("rlocker");
        let rw = fresh(&name);
        let r = rw.rlocker();
        r.lock();
        assert!(!rw.try_lock());
        r.unlock();
        assert!(r.lock_timeout(Duration::from_millis(50)));
        r.unlock();
        rw.destroy().expect("destroy");
    }
}
