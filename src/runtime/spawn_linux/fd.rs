// SPDX-License-Identifier: MIT

//! Remap the parent's file descriptors onto the child's descriptor table.

use nix::{
    errno::Errno,
    libc,
    sys::resource::{Resource, getrlimit},
    unistd::{SysconfVar, sysconf},
};

use crate::runtime::spawn::{DescriptorMap, RawFd};

/// Used when the descriptor limit cannot be read.
const FALLBACK_FD_LIMIT: RawFd = 256;

/// The soft limit on open descriptors.  Every descriptor below it that is not
/// part of the child's map gets closed.  An unlimited soft limit falls back
/// to the system's `OPEN_MAX`.
pub fn max_fd_limit() -> RawFd {
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, _hard)) if soft != libc::RLIM_INFINITY => {
            RawFd::try_from(soft).unwrap_or(FALLBACK_FD_LIMIT)
        }
        _ => match sysconf(SysconfVar::OPEN_MAX) {
            Ok(Some(n)) => RawFd::try_from(n).unwrap_or(FALLBACK_FD_LIMIT),
            _ => FALLBACK_FD_LIMIT,
        },
    }
}

/// A descriptor remapping, computed before the fork so that applying it in
/// the child allocates no memory.
pub struct DescriptorPlan {
    /// `(target, source)` pairs.
    entries: Vec<(RawFd, RawFd)>,
    /// The temporary copy of each source, same index as `entries`.
    temps: Vec<RawFd>,
    /// Temporary copies are placed at or above this, so they can never sit
    /// on a target slot.
    floor: RawFd,
    limit: RawFd,
}

impl DescriptorPlan {
    pub fn new(map: &DescriptorMap, limit: RawFd) -> Self {
        let entries = map.entries().to_vec();
        let floor = entries.iter().map(|(t, _)| *t + 1).max().unwrap_or(0);
        DescriptorPlan {
            temps: vec![-1; entries.len()],
            entries,
            floor,
            limit,
        }
    }

    /// The descriptors the child keeps open.
    pub fn targets(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    fn is_target(&self, fd: RawFd) -> bool {
        self.targets().any(|t| t == fd)
    }

    /// Apply the plan to the current process.
    ///
    /// Must only run in the forked child.  It calls libc directly and never
    /// allocates.  Descriptors that are not targets are closed, ignoring
    /// errors for the ones that were not open.
    pub fn apply(&mut self) -> Result<(), Errno> {
        // Duplicate every source first, so that a swap such as {1: 2, 2: 1}
        // does not overwrite a source before it is copied.
        for (i, (_, source)) in self.entries.iter().enumerate() {
            let fd = unsafe { libc::fcntl(*source, libc::F_DUPFD_CLOEXEC, self.floor) };
            if fd < 0 {
                return Err(Errno::last());
            }
            self.temps[i] = fd;
        }
        // dup2 clears close-on-exec on the target.
        for (i, (target, _)) in self.entries.iter().enumerate() {
            if unsafe { libc::dup2(self.temps[i], *target) } < 0 {
                return Err(Errno::last());
            }
        }
        for fd in 0..self.limit {
            if !self.is_target(fd) {
                let _ = unsafe { libc::close(fd) };
            }
        }
        Ok(())
    }
}
