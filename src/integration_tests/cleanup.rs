//! Nothing spawned is left running once the spawner is done.

use nix::{
    sys::wait::{WaitStatus, waitpid},
    unistd::Pid,
};

use crate::{Command, ExitResult, SpawnConfig};

use super::util;

fn sleeper() -> Command {
    Command::new("sleep").arg("30")
}

#[test]
fn shutdown_terminates_running() {
    let spawner = util::spawner();
    let res = spawner.spawn(&sleeper(), SpawnConfig::new().return_handles(true));
    let handles = util::expect_running(res.expect("spawn"));
    assert!(!util::is_reaped(handles[0]));

    spawner.shutdown();
    assert!(spawner.registry().is_empty());
    assert!(util::is_reaped(handles[0]));
}

#[test]
fn drop_terminates_running() {
    let handles = {
        let spawner = util::spawner();
        let res = spawner.spawn(&sleeper(), SpawnConfig::new().return_handles(true));
        util::expect_running(res.expect("spawn"))
    };
    assert!(util::is_reaped(handles[0]));
}

/// A handle the caller already reaped does not trouble the shutdown.
#[test]
fn externally_reaped_is_ignored() {
    let spawner = util::spawner();
    let res = spawner.spawn(&Command::new("true"), SpawnConfig::new().return_handles(true));
    let handles = util::expect_running(res.expect("spawn"));

    let status = waitpid(Pid::from_raw(handles[0].pid()), None).expect("waitpid");
    assert!(matches!(status, WaitStatus::Exited(_, 0)));
    assert!(spawner.registry().contains(handles[0]));

    spawner.shutdown();
    assert!(spawner.registry().is_empty());
}

/// A wait on a handle that is gone reports an error but unregisters it.
#[test]
fn wait_on_reaped_handle() {
    let spawner = util::spawner();
    let res = spawner.spawn(&Command::new("true"), SpawnConfig::new().return_handles(true));
    let handles = util::expect_running(res.expect("spawn"));
    waitpid(Pid::from_raw(handles[0].pid()), None).expect("waitpid");

    assert!(spawner.wait(handles[0]).is_err());
    assert!(spawner.registry().is_empty());
}

/// Spawners sharing a registry are all covered by one shutdown.
#[test]
fn shared_registry() {
    let first = util::spawner();
    let second = crate::Spawner::with_registry(first.paths().clone(), first.registry().clone());
    let a = util::expect_running(
        first
            .spawn(&sleeper(), SpawnConfig::new().return_handles(true))
            .expect("spawn"),
    );
    let b = util::expect_running(
        second
            .spawn(&sleeper(), SpawnConfig::new().return_handles(true))
            .expect("spawn"),
    );
    assert_eq!(first.registry().len(), 2);

    drop(second);
    // The registry is still shared with the first spawner.
    assert!(!util::is_reaped(b[0]));
    first.shutdown();
    assert!(util::is_reaped(a[0]));
    assert!(util::is_reaped(b[0]));
}

#[test]
fn blocking_run_leaves_nothing_registered() {
    let spawner = util::spawner();
    let res = spawner.spawn_via_shell("exit 0", false, SpawnConfig::new());
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    assert!(spawner.registry().is_empty());
}
