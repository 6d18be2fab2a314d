//! Running single commands to completion, or handing them back to the caller.

use std::{ffi::OsStr, os::fd::AsRawFd};

use crate::{Command, DescriptorMap, ExitResult, SpawnConfig, Spawner, SystemPaths};

use super::util;

#[test]
fn success() {
    let spawner = util::spawner();
    let res = spawner.spawn(&Command::new("true"), SpawnConfig::new());
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    assert!(spawner.registry().is_empty());
}

#[test]
fn exit_code_propagates() {
    let spawner = util::spawner();
    let res = spawner.spawn_via_shell("exit 7", false, SpawnConfig::new());
    let outcome = res.expect("spawn");
    assert_eq!(outcome.exit_result().map(|r| r.code()), Some(7));
    util::assert_finished(outcome, ExitResult::Exited(7));
}

/// A signal death is encoded apart from an exit code with the same number.
#[test]
fn killed_by_signal() {
    let spawner = util::spawner();
    let res = spawner.spawn_via_shell("kill -9 $$", false, SpawnConfig::new());
    let outcome = res.expect("spawn");
    let result = outcome.exit_result().expect("finished");
    assert_eq!(result, ExitResult::Signaled(9));
    assert_eq!(result.code(), 9 << 8);
    assert_ne!(result.code(), ExitResult::Exited(9).code());
}

#[test]
fn not_found() {
    let spawner = util::spawner();
    let cmd = Command::parse("forkguard-no-such-program --help").expect("command");
    let res = spawner.spawn(&cmd, SpawnConfig::new());
    util::assert_finished(res.expect("spawn"), ExitResult::NotFound);
    assert!(spawner.registry().is_empty());
}

#[test]
fn absolute_and_bare_names_agree() {
    let spawner = util::spawner();
    let sh = crate::runtime::resolve::resolve_binary(OsStr::new("sh"), spawner.paths(), true)
        .expect("sh on the search path");
    for program in [sh.as_os_str().to_os_string(), "sh".into()] {
        let cmd = Command::new(program).arg("-c").arg("exit 5");
        let res = spawner.spawn(&cmd, SpawnConfig::new());
        util::assert_finished(res.expect("spawn"), ExitResult::Exited(5));
    }
}

/// Each permutation of stdout and stderr ends up exactly where it was asked.
#[test]
fn stdout_stderr_permutations() {
    let spawner = util::spawner();
    for swap in [false, true] {
        let mut a = util::capture();
        let mut b = util::capture();
        let fds = if swap {
            DescriptorMap::from_pairs([(1, b.as_raw_fd()), (2, a.as_raw_fd())])
        } else {
            DescriptorMap::from_pairs([(1, a.as_raw_fd()), (2, b.as_raw_fd())])
        };
        let res = spawner.spawn_via_shell(
            "echo to-out; echo to-err >&2",
            false,
            SpawnConfig::new().with_fds(fds),
        );
        util::assert_finished(res.expect("spawn"), ExitResult::Success);
        let (a, b) = (util::read_back(&mut a), util::read_back(&mut b));
        if swap {
            assert_eq!((a.as_str(), b.as_str()), ("to-err\n", "to-out\n"));
        } else {
            assert_eq!((a.as_str(), b.as_str()), ("to-out\n", "to-err\n"));
        }
    }
}

/// A descriptor that is open in the parent but not in the map is closed in
/// the child.
#[test]
fn unmapped_descriptors_are_closed() {
    let spawner = util::spawner();
    let extra = util::capture();
    let quiet = util::capture();
    let fd = extra.as_raw_fd();
    let probe = format!("true >&{fd}");

    let fds = DescriptorMap::from_pairs([(0, 0), (1, quiet.as_raw_fd()), (2, quiet.as_raw_fd())]);
    let res = spawner.spawn_via_shell(&probe, false, SpawnConfig::new().with_fds(fds.clone()));
    let result = res.expect("spawn").exit_result().expect("finished");
    assert!(!result.success(), "descriptor {fd} leaked into the child");

    let mut kept = fds;
    kept.set(fd, fd);
    let res = spawner.spawn_via_shell(&probe, false, SpawnConfig::new().with_fds(kept));
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
}

#[test]
fn environment_is_exactly_the_given_one() {
    let spawner = util::spawner();
    let mut out = util::capture();
    let config = SpawnConfig::new()
        .with_env("GREETING", "bar")
        .with_fds(util::outputs_to(&out));
    let res = spawner.spawn(&Command::new("env"), config);
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    assert_eq!(util::read_back(&mut out), "GREETING=bar\n");
}

#[test]
fn display_name_is_argv0() {
    let spawner = util::spawner();
    let mut out = util::capture();
    let config = SpawnConfig::new()
        .name("renamed")
        .with_fds(util::outputs_to(&out));
    let res = spawner.spawn(&Command::new("cat").arg("/proc/self/cmdline"), config);
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    assert_eq!(util::read_back(&mut out), "renamed\0/proc/self/cmdline\0");
}

#[test]
fn shell_debug_echoes_commands() {
    let spawner = util::spawner();
    let mut out = util::capture();
    let config = SpawnConfig::new().with_fds(util::outputs_to(&out));
    let res = spawner.spawn_via_shell("echo hi", true, config);
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    let text = util::read_back(&mut out);
    assert!(text.contains("+ echo hi"), "{text}");
    assert!(text.contains("hi\n"), "{text}");
}

#[test]
fn sandbox_falls_back_to_shell() {
    let spawner = Spawner::new(
        SystemPaths::default()
            .with_shell("/bin/sh")
            .with_sandbox("/nonexistent/forkguard-sandbox"),
    );
    assert!(!spawner.sandbox_capable());
    let res = spawner.spawn_sandboxed("exit 4", SpawnConfig::new());
    util::assert_finished(res.expect("spawn"), ExitResult::Exited(4));
}

/// With a sandbox tool present, the whole command line is its one argument.
#[test]
fn sandbox_wraps_command_line() {
    let paths = SystemPaths::default().with_shell("/bin/sh");
    let echo = crate::runtime::resolve::resolve_binary(OsStr::new("echo"), &paths, true)
        .expect("echo on the search path");
    let spawner = Spawner::new(paths.with_sandbox(echo));
    assert!(spawner.sandbox_capable());

    let mut out = util::capture();
    let config = SpawnConfig::new().with_fds(util::outputs_to(&out));
    let res = spawner.spawn_sandboxed("make  all", config);
    util::assert_finished(res.expect("spawn"), ExitResult::Success);
    assert_eq!(util::read_back(&mut out), "make  all\n");
}

#[test]
fn returned_handle_matches_blocking_result() {
    let spawner = util::spawner();
    let res = spawner.spawn_via_shell("exit 3", false, SpawnConfig::new().return_handles(true));
    let handles = util::expect_running(res.expect("spawn"));
    assert_eq!(handles.len(), 1);
    assert!(spawner.registry().contains(handles[0]));

    let result = spawner.wait(handles[0]).expect("wait");
    assert_eq!(result, ExitResult::Exited(3));
    assert!(spawner.registry().is_empty());

    let blocking = spawner.spawn_via_shell("exit 3", false, SpawnConfig::new());
    util::assert_finished(blocking.expect("spawn"), result);
}

#[test]
fn child_setup_failure_is_contained() {
    let spawner = util::spawner();
    let mut err = util::capture();
    // A source descriptor that is not open makes the remap fail in the child.
    let fds = DescriptorMap::from_pairs([(2, err.as_raw_fd()), (5, 1000)]);
    let res = spawner.spawn(&Command::new("true"), SpawnConfig::new().with_fds(fds));
    let result = res.expect("spawn").exit_result().expect("finished");
    assert_eq!(
        result,
        ExitResult::Exited(crate::runtime::SetupStep::Descriptors.exit_code())
    );
    // The remap stopped before any target was installed, so the report went
    // to the inherited stderr and the capture file stays untouched.
    assert_eq!(util::read_back(&mut err), "");
}
