// SPDX-License-Identifier: MIT

//! Bookkeeping of every live child, so that none is left running when the
//! owner goes away.

use std::sync::Mutex;

use nix::{
    errno::Errno,
    sys::{
        signal::{Signal, kill},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::Pid,
};
use tracing::{debug, warn};

use crate::runtime::spawn::ProcessHandle;

/// The set of spawned processes whose exit status has not been collected yet.
///
/// Handles are added when a child is created and removed when its status is
/// collected.  Whatever is left when `shutdown` runs (or the registry is
/// dropped) gets terminated and reaped.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    pids: Mutex<Vec<ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProcessHandle>> {
        // The list stays consistent even if a holder panicked.
        self.pids.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, handle: ProcessHandle) {
        self.lock().push(handle);
    }

    /// Remove the handle.  Returns false if it was not registered.
    pub fn unregister(&self, handle: ProcessHandle) -> bool {
        let mut pids = self.lock();
        match pids.iter().rposition(|h| *h == handle) {
            Some(i) => {
                pids.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: ProcessHandle) -> bool {
        self.lock().contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The registered handles, oldest first.
    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.lock().clone()
    }

    /// Terminate and reap everything still registered, newest first.
    pub fn shutdown(&self) {
        loop {
            // Don't hold the lock while waiting on a child.
            let next = self.lock().pop();
            match next {
                Some(handle) => terminate_and_reap(handle),
                None => break,
            }
        }
    }
}

impl Drop for ProcessRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// If the child is still running, send it SIGTERM and wait for it to exit.
///
/// A child that already exited is reaped by the status check.  One that was
/// reaped somewhere else makes the status check fail, which is treated the
/// same as already cleaned up.
pub(crate) fn terminate_and_reap(handle: ProcessHandle) {
    let pid = Pid::from_raw(handle.pid());
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => {
            debug!(pid = handle.pid(), "terminating child");
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!(pid = handle.pid(), error = %e, "failed to signal child");
                return;
            }
            if let Err(e) = wait_blocking(pid) {
                debug!(pid = handle.pid(), error = %e, "child vanished while terminating");
            }
        }
        Ok(_) => {}
        Err(e) => {
            debug!(pid = handle.pid(), error = %e, "child already reaped");
        }
    }
}

/// Block until the child exits or is killed.
pub(crate) fn wait_blocking(pid: Pid) -> Result<WaitStatus, Errno> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Ok(status),
            // Stopped and continued states don't end the process.
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}
