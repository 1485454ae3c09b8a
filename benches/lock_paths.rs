//! Microbenchmarks for the syscall-free fast paths.
//!
//! The interesting property of every primitive here is that the
//! uncontended case never enters the kernel; these benches keep that
//! honest over time.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use procsync::flags::{OpenFlags, Perm};
use procsync::sync::{destroy_event, destroy_mutex, destroy_semaphore, Event, Locker, Mutex, Semaphore};

fn bench_name(tag: &str) -> String {
    format!("procsync-bench-{tag}-{}", std::process::id())
}

fn mutex_uncontended(c: &mut Criterion) {
    let name = bench_name("mutex");
    let _ = destroy_mutex(&name);
    let mutex = Mutex::new(&name, OpenFlags::CREATE, Perm::DEFAULT).expect("create mutex");

    c.bench_function("mutex_lock_unlock_uncontended", |b| {
        b.iter(|| {
            mutex.lock();
            black_box(());
            mutex.unlock();
        });
    });

    c.bench_function("mutex_try_lock_uncontended", |b| {
        b.iter(|| {
            assert!(mutex.try_lock());
            mutex.unlock();
        });
    });

    mutex.destroy().expect("destroy mutex");
}

fn event_signalled_wait(c: &mut Criterion) {
    let name = bench_name("event");
    let _ = destroy_event(&name);
    let event = Event::new(&name, OpenFlags::CREATE, Perm::DEFAULT, false).expect("create event");

    c.bench_function("event_set_then_wait", |b| {
        b.iter(|| {
            event.set();
            assert!(event.wait_timeout(std::time::Duration::from_millis(1)));
        });
    });

    event.destroy().expect("destroy event");
}

fn semaphore_post_wait(c: &mut Criterion) {
    let name = bench_name("sem");
    let _ = destroy_semaphore(&name);
    let sem = Semaphore::new(&name, OpenFlags::CREATE, Perm::DEFAULT, 0).expect("create sem");

    c.bench_function("semaphore_post_then_try_wait", |b| {
        b.iter(|| {
            sem.post(1);
            assert!(sem.try_wait());
        });
    });

    sem.destroy().expect("destroy sem");
}

criterion_group!(
    benches,
    mutex_uncontended,
    event_signalled_wait,
    semaphore_post_wait
);
criterion_main!(benches);
