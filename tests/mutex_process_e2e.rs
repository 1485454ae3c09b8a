//! Cross-process mutex scenarios.
//!
//! Children are this same test binary re-executed with `PROCSYNC_TEST_CHILD`
//! set; the matching `#[test]` entry points return immediately in the
//! parent run.

mod common;

use std::process::{Child, Command};
use std::time::{Duration, Instant};

use common::{init_test_logging, unique_name};
use procsync::flags::{OpenFlags, Perm};
use procsync::sync::{destroy_event, destroy_mutex, Event, Locker, Mutex};
use procsync::{create_writable_region, destroy_memory_object};

const CHILD_ROLE: &str = "PROCSYNC_TEST_CHILD";
const CHILD_NAME: &str = "PROCSYNC_TEST_NAME";
const INCREMENTS: u64 = 10_000;

fn counter_name(name: &str) -> String {
    format!("{name}.ctr")
}

fn spawn_child(role: &str, entry: &str, name: &str) -> Child {
    Command::new(std::env::current_exe().expect("test binary path"))
        .env(CHILD_ROLE, role)
        .env(CHILD_NAME, name)
        .args([entry, "--exact", "--nocapture"])
        .spawn()
        .expect("spawning child process")
}

fn child_role() -> Option<(String, String)> {
    let role = std::env::var(CHILD_ROLE).ok()?;
    let name = std::env::var(CHILD_NAME).ok()?;
    Some((role, name))
}

fn read_counter(region: &procsync::MemoryRegion) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&region.data()[..8]);
    u64::from_ne_bytes(bytes)
}

fn write_counter(region: &mut procsync::MemoryRegion, value: u64) {
    region.data_mut()[..8].copy_from_slice(&value.to_ne_bytes());
}

/// Child entry: open the named mutex and bump the shared counter.
#[test]
fn child_increments_counter() {
    let Some((role, name)) = child_role() else {
        return;
    };
    if role != "increment" {
        return;
    }
    let mutex = Mutex::new(&name, OpenFlags::OPEN_EXISTING, Perm::DEFAULT).expect("open mutex");
    let (mut region, _) = create_writable_region(
        &counter_name(&name),
        OpenFlags::OPEN_EXISTING,
        Perm::DEFAULT,
        8,
    )
    .expect("open counter region");

    for _ in 0..INCREMENTS {
        mutex.lock();
        let v = read_counter(&region);
        write_counter(&mut region, v + 1);
        mutex.unlock();
    }
}

/// Child entry: hold the named mutex and report via an event until killed
/// by time.
#[test]
fn child_holds_mutex() {
    let Some((role, name)) = child_role() else {
        return;
    };
    if role != "hold" {
        return;
    }
    let mutex = Mutex::new(&name, OpenFlags::OPEN_EXISTING, Perm::DEFAULT).expect("open mutex");
    let held = Event::new(&format!("{name}.held"), OpenFlags::OPEN_EXISTING, Perm::DEFAULT, false)
        .expect("open event");
    mutex.lock();
    held.set();
    std::thread::sleep(Duration::from_millis(600));
    mutex.unlock();
}

#[test]
fn two_processes_count_to_twenty_thousand() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("count");
    let _ = destroy_mutex(&name);
    let _ = destroy_memory_object(&counter_name(&name));

    let mutex = Mutex::new(&name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
        .expect("create mutex");
    let (mut region, created) = create_writable_region(
        &counter_name(&name),
        OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
        Perm::DEFAULT,
        8,
    )
    .expect("create counter region");
    assert!(created);
    write_counter(&mut region, 0);

    let mut children = vec![
        spawn_child("increment", "child_increments_counter", &name),
        spawn_child("increment", "child_increments_counter", &name),
    ];
    for child in &mut children {
        let status = child.wait().expect("waiting for child");
        assert!(status.success(), "child failed: {status:?}");
    }

    mutex.lock();
    let total = read_counter(&region);
    mutex.unlock();
    assert_eq!(total, 2 * INCREMENTS, "no increment was lost");

    drop(region);
    destroy_memory_object(&counter_name(&name)).expect("destroy counter");
    mutex.destroy().expect("destroy mutex");
}

#[test]
fn lock_timeout_against_another_process() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("timeout");
    let _ = destroy_mutex(&name);
    let _ = destroy_event(&format!("{name}.held"));

    let mutex = Mutex::new(&name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
        .expect("create mutex");
    let held = Event::new(
        &format!("{name}.held"),
        OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
        Perm::DEFAULT,
        false,
    )
    .expect("create event");

    let mut child = spawn_child("hold", "child_holds_mutex", &name);
    assert!(
        held.wait_timeout(Duration::from_secs(10)),
        "child never reported holding the mutex"
    );

    let started = Instant::now();
    let acquired = mutex.lock_timeout(Duration::from_millis(100));
    let elapsed = started.elapsed();
    assert!(!acquired, "child still holds the mutex");
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(2000), "{elapsed:?}");

    let status = child.wait().expect("waiting for child");
    assert!(status.success(), "child failed: {status:?}");

    held.destroy().expect("destroy event");
    mutex.destroy().expect("destroy mutex");
}

#[test]
fn destroy_while_held_does_not_break_the_holder() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("destroy-in-use");
    let _ = destroy_mutex(&name);

    let holder = Mutex::new(&name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
        .expect("create mutex");
    holder.lock();

    // Another party removes the name while the lock is held.
    destroy_mutex(&name).expect("destroy by name");

    // The holder's mapping is still valid: unlock must not crash.
    holder.unlock();
    drop(holder);

    // A fresh primitive under the same name starts clean and excludes.
    let fresh = Mutex::new(&name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
        .expect("recreate mutex");
    fresh.lock();
    assert!(!fresh.try_lock(), "fresh mutex is a real lock");
    fresh.unlock();
    fresh.destroy().expect("destroy fresh mutex");
}
