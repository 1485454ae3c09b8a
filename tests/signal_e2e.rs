//! Cross-process event, semaphore, and condition-variable scenarios.

mod common;

use std::process::{Child, Command};
use std::time::Duration;

use common::{init_test_logging, unique_name};
use procsync::flags::{OpenFlags, Perm};
use procsync::sync::{
    destroy_cond, destroy_event, destroy_mutex, destroy_rwmutex, destroy_semaphore, CondVar,
    Event, Locker, Mutex, RwMutex, Semaphore,
};

const CHILD_ROLE: &str = "PROCSYNC_SIGNAL_CHILD";
const CHILD_NAME: &str = "PROCSYNC_SIGNAL_NAME";

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

/// Child entry: wait for the ping event, then post the pong semaphore.
#[test]
fn child_ping_pong() {
    let Some((role, name)) = child_role() else {
        return;
    };
    if role != "pingpong" {
        return;
    }
    let ping = Event::new(&format!("{name}.ping"), OpenFlags::OPEN_EXISTING, Perm::DEFAULT, false)
        .expect("open ping");
    let pong = Semaphore::new(&format!("{name}.pong"), OpenFlags::OPEN_EXISTING, Perm::DEFAULT, 0)
        .expect("open pong");
    assert!(ping.wait_timeout(Duration::from_secs(10)), "ping never arrived");
    pong.post(1);
}

/// Child entry: block on the cond until the shared flag region reads 1.
#[test]
fn child_cond_waiter() {
    let Some((role, name)) = child_role() else {
        return;
    };
    if role != "cond" {
        return;
    }
    let mutex = Mutex::new(&format!("{name}.mx"), OpenFlags::OPEN_EXISTING, Perm::DEFAULT)
        .expect("open mutex");
    let cond = CondVar::new(&name, OpenFlags::OPEN_EXISTING, Perm::DEFAULT, &mutex)
        .expect("open cond");
    let (flag, _) = procsync::create_writable_region(
        &format!("{name}.flag"),
        OpenFlags::OPEN_EXISTING,
        Perm::DEFAULT,
        1,
    )
    .expect("open flag region");

    mutex.lock();
    while flag.data()[0] == 0 {
        cond.wait();
    }
    mutex.unlock();
}

#[test]
fn event_and_semaphore_cross_process() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("pingpong");
    let _ = destroy_event(&format!("{name}.ping"));
    let _ = destroy_semaphore(&format!("{name}.pong"));

    let ping = Event::new(
        &format!("{name}.ping"),
        OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
        Perm::DEFAULT,
        false,
    )
    .expect("create ping");
    let pong = Semaphore::new(
        &format!("{name}.pong"),
        OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
        Perm::DEFAULT,
        0,
    )
    .expect("create pong");

    let mut child = spawn_child("pingpong", "child_ping_pong", &name);
    std::thread::sleep(Duration::from_millis(100));
    ping.set();
    assert!(
        pong.wait_timeout(Duration::from_secs(10)),
        "child never posted back"
    );

    let status = child.wait().expect("waiting for child");
    assert!(status.success(), "child failed: {status:?}");

    ping.destroy().expect("destroy ping");
    pong.destroy().expect("destroy pong");
}

#[test]
fn broadcast_releases_child_waiters() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("cond");
    let _ = destroy_cond(&name);
    let _ = destroy_mutex(&format!("{name}.mx"));
    let _ = procsync::destroy_memory_object(&format!("{name}.flag"));

    let mutex = Mutex::new(&format!("{name}.mx"), OpenFlags::CREATE, Perm::DEFAULT)
        .expect("create mutex");
    let cond = CondVar::new(&name, OpenFlags::CREATE, Perm::DEFAULT, &mutex).expect("create cond");
    let (mut flag, _) = procsync::create_writable_region(
        &format!("{name}.flag"),
        OpenFlags::CREATE,
        Perm::DEFAULT,
        1,
    )
    .expect("create flag region");
    flag.data_mut()[0] = 0;

    let mut children: Vec<_> = (0..3)
        .map(|_| spawn_child("cond", "child_cond_waiter", &name))
        .collect();

    // Let the children block, then flip the flag under the mutex and
    // broadcast.
    std::thread::sleep(Duration::from_millis(400));
    mutex.lock();
    flag.data_mut()[0] = 1;
    cond.broadcast();
    mutex.unlock();

    for child in &mut children {
        let status = child.wait().expect("waiting for child");
        assert!(status.success(), "child failed: {status:?}");
    }

    drop(cond);
    drop(flag);
    procsync::destroy_memory_object(&format!("{name}.flag")).expect("destroy flag");
    destroy_cond(&name).expect("destroy cond");
    destroy_mutex(&format!("{name}.mx")).expect("destroy mutex");
}

#[test]
fn rwmutex_handles_share_one_lock() {
    if child_role().is_some() {
        return;
    }
    init_test_logging();
    let name = unique_name("rw");
    let _ = destroy_rwmutex(&name);

    let a = RwMutex::new(&name, OpenFlags::CREATE | OpenFlags::EXCLUSIVE, Perm::DEFAULT)
        .expect("create");
    let b = RwMutex::new(&name, OpenFlags::OPEN_EXISTING, Perm::DEFAULT).expect("open");

    a.read_lock();
    assert!(b.try_read_lock(), "readers share across handles");
    assert!(!b.try_lock(), "writer blocked by readers on another handle");
    a.read_unlock();
    b.read_unlock();

    b.lock();
    assert!(!a.try_read_lock(), "reader blocked by writer on another handle");
    b.unlock();

    drop(b);
    a.destroy().expect("destroy");
}
