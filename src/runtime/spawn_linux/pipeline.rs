// SPDX-License-Identifier: MIT

//! Insert a log copier in front of a command's stdout and stderr.
//!
//! The copier reads from a pipe, appends everything to the log file, and
//! mirrors it to the caller's original stdout and stderr.  The command writes
//! both of its output streams into the pipe instead.

use std::{
    os::fd::{AsRawFd, OwnedFd},
    path::Path,
};

use nix::{fcntl::OFlag, unistd::pipe2};
use tracing::debug;

use crate::runtime::{
    config::SystemPaths,
    error::{Result, SpawnError},
    spawn::{Command, DescriptorMap},
};

pub struct LogPipeline {
    /// Held until the copier has been forked with it.
    read: Option<OwnedFd>,
    /// Held until the command has been forked with it.
    write: OwnedFd,
    copier_fds: DescriptorMap,
    command_fds: DescriptorMap,
}

impl LogPipeline {
    /// Build the pipe and the two descriptor maps.  The caller's map must carry
    /// both stdout and stderr.
    pub fn new(fds: &DescriptorMap) -> Result<Self> {
        let (Some(stdout), Some(stderr)) = (fds.get(1), fds.get(2)) else {
            return Err(SpawnError::MissingLogStreams);
        };
        // Close-on-exec, so no unrelated exec'd process keeps the pipe alive.
        let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(|e| SpawnError::sys("pipe", e))?;

        let copier_fds = DescriptorMap::from_pairs([(0, read.as_raw_fd()), (1, stdout), (2, stderr)]);
        let mut command_fds = fds.clone();
        command_fds.set(1, write.as_raw_fd()).set(2, write.as_raw_fd());
        debug!(
            read = read.as_raw_fd(),
            write = write.as_raw_fd(),
            "created log pipe"
        );

        Ok(LogPipeline {
            read: Some(read),
            write,
            copier_fds,
            command_fds,
        })
    }

    /// The copier invocation: append to the log, ignore interrupts.
    pub fn copier_command(paths: &SystemPaths, log_file: &Path) -> Command {
        Command::new(paths.log_utility.as_str())
            .arg("-i")
            .arg("-a")
            .arg(log_file.as_os_str())
    }

    pub fn copier_fds(&self) -> &DescriptorMap {
        &self.copier_fds
    }

    pub fn command_fds(&self) -> &DescriptorMap {
        &self.command_fds
    }

    /// The copier owns the read end now; drop the parent's copy.
    pub fn release_reader(&mut self) {
        self.read = None;
    }

    /// The command owns the write end now.  Once the parent's copy is closed,
    /// the copier sees end-of-stream when the command's last writer exits.
    pub fn release_writer(self) {
        drop(self.write);
    }
}
