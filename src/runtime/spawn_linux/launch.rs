// SPDX-License-Identifier: MIT

//! Launch the child process.

use std::{
    collections::HashMap,
    convert::Infallible,
    ffi::{CString, OsString},
    os::unix::ffi::OsStrExt as _,
    path::Path,
    ptr,
};

use nix::{
    errno::Errno,
    libc,
    sys::stat::{Mode, umask},
    unistd::{ForkResult, Gid, Uid, fork, setgid, setuid},
};
use tracing::debug;

use crate::runtime::{
    error::{Result, SpawnError},
    spawn::{Command, DescriptorMap, ProcessHandle, RawFd},
    spawn_linux::fd::DescriptorPlan,
};

/// The setup steps a child goes through before it replaces its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Descriptors,
    Group,
    Groups,
    User,
    Exec,
}

impl SetupStep {
    /// The reserved status the child exits with when the step fails.
    pub fn exit_code(&self) -> i32 {
        match self {
            SetupStep::Descriptors => 250,
            SetupStep::Group => 251,
            SetupStep::Groups => 252,
            SetupStep::User => 253,
            SetupStep::Exec => 254,
        }
    }

    fn label(&self) -> &'static [u8] {
        match self {
            SetupStep::Descriptors => b"descriptor remap",
            SetupStep::Group => b"setgid",
            SetupStep::Groups => b"setgroups",
            SetupStep::User => b"setuid",
            SetupStep::Exec => b"execve",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChildError {
    step: SetupStep,
    errno: Errno,
}

/// Privileges the child drops to before running the command.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub groups: Option<Vec<u32>>,
    pub umask: Option<u32>,
}

/// Everything the child needs, built before the fork.
///
/// According to the fork docs:
///
/// > In a multithreaded program, only [async-signal-safe] functions like `pause`
/// > and `_exit` may be called by the child (the parent isn't restricted) until
/// > a call of `execve(2)`. Note that memory allocation may **not** be
/// > async-signal-safe and thus must be prevented.
///
/// So every string, pointer array and message lives here already.
pub struct PreparedChild {
    exec_path: CString,
    // Owns the memory the pointer arrays point into.
    _args: Vec<CString>,
    _environ: Vec<CString>,
    argv: Vec<*const libc::c_char>,
    envp: Vec<*const libc::c_char>,
    plan: DescriptorPlan,
    uid: Option<Uid>,
    gid: Option<Gid>,
    groups: Option<Vec<libc::gid_t>>,
    umask: Option<Mode>,
    diagnostic: Vec<u8>,
}

impl PreparedChild {
    /// Prepare the child.  `name` is what the command sees as its own program
    /// name; it defaults to the binary's file name.
    pub fn new(
        binary: &Path,
        command: &Command,
        name: Option<&OsString>,
        env: &HashMap<OsString, OsString>,
        fds: &DescriptorMap,
        credentials: &Credentials,
        fd_limit: RawFd,
    ) -> Result<Self> {
        let exec_path = CString::new(binary.as_os_str().as_bytes())?;

        let name = match name {
            Some(n) => n.clone(),
            None => binary
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| binary.as_os_str().to_os_string()),
        };
        let mut args = vec![CString::new(name.as_bytes())?];
        for arg in command.arguments() {
            args.push(CString::new(arg.as_bytes())?);
        }

        let mut environ = Vec::with_capacity(env.len());
        for (key, val) in env.iter() {
            let mut entry = key.clone();
            entry.push("=");
            entry.push(val);
            environ.push(CString::new(entry.as_bytes())?);
        }

        let argv = null_terminated(&args);
        let envp = null_terminated(&environ);

        let mut diagnostic = b"\n   ".to_vec();
        diagnostic.extend_from_slice(command.to_string().as_bytes());
        diagnostic.push(b'\n');

        Ok(PreparedChild {
            exec_path,
            _args: args,
            _environ: environ,
            argv,
            envp,
            plan: DescriptorPlan::new(fds, fd_limit),
            uid: credentials.uid.map(Uid::from_raw),
            gid: credentials.gid.map(Gid::from_raw),
            groups: credentials.groups.clone(),
            umask: credentials
                .umask
                .map(|m| Mode::from_bits_truncate(m as libc::mode_t)),
            diagnostic,
        })
    }

    /// Fork, and run the child side in the new process.  Only the parent
    /// returns from here.
    pub fn launch(self) -> Result<ProcessHandle> {
        match unsafe { fork() } {
            Err(e) => Err(SpawnError::sys("fork", e)),
            Ok(ForkResult::Child) => self.run_child(),
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = child.as_raw(), binary = ?self.exec_path, "forked child");
                Ok(ProcessHandle::from_raw(child.as_raw()))
            }
        }
    }

    /// The child side.  Either the image is replaced or the process exits.
    fn run_child(mut self) -> ! {
        let err = match self.setup_and_exec() {
            Ok(never) => match never {},
            Err(e) => e,
        };
        abort_child(err, &self.diagnostic)
    }

    fn setup_and_exec(&mut self) -> std::result::Result<Infallible, ChildError> {
        self.plan.apply().map_err(fail(SetupStep::Descriptors))?;

        // Group changes need the privileges that setuid gives up, so they
        // come first.
        if let Some(gid) = self.gid {
            setgid(gid).map_err(fail(SetupStep::Group))?;
        }
        if let Some(groups) = &self.groups {
            let res = unsafe { libc::setgroups(groups.len() as _, groups.as_ptr()) };
            if res < 0 {
                return Err(fail(SetupStep::Groups)(Errno::last()));
            }
        }
        if let Some(uid) = self.uid {
            setuid(uid).map_err(fail(SetupStep::User))?;
        }
        if let Some(mask) = self.umask {
            umask(mask);
        }

        unsafe { libc::execve(self.exec_path.as_ptr(), self.argv.as_ptr(), self.envp.as_ptr()) };
        // To reach here means the exec failed.
        Err(fail(SetupStep::Exec)(Errno::last()))
    }
}

fn fail(step: SetupStep) -> impl FnOnce(Errno) -> ChildError {
    move |errno| ChildError { step, errno }
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
    ptrs.push(ptr::null());
    ptrs
}

/// Report the failure on the child's stderr and exit.
///
/// Writes go straight to descriptor 2 without allocating.  If stderr is not
/// mapped, the message is lost and only the exit status remains.
fn abort_child(err: ChildError, command: &[u8]) -> ! {
    write_stderr(err.step.label());
    write_stderr(b" failed: ");
    write_stderr(err.errno.desc().as_bytes());
    write_stderr(command);
    unsafe { libc::_exit(err.step.exit_code()) }
}

fn write_stderr(data: &[u8]) {
    let _ = unsafe { libc::write(2, data.as_ptr().cast(), data.len()) };
}
