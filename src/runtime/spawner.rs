// SPDX-License-Identifier: MIT

//! The public entry point: resolve, wire up, launch, and optionally wait.

use std::{collections::VecDeque, ffi::OsString, path::Path, sync::Arc};

use nix::{sys::wait::WaitStatus, unistd::Pid};
use tracing::{debug, warn};

use crate::runtime::{
    config::SystemPaths,
    error::{Result, SpawnError},
    registry::{ProcessRegistry, terminate_and_reap, wait_blocking},
    resolve::{is_executable_file, resolve_binary},
    spawn::{Command, ExitResult, ProcessHandle, RawFd, SpawnConfig, SpawnOutcome},
    spawn_linux::{Credentials, LogPipeline, PreparedChild, max_fd_limit},
};

/// Launches commands and keeps track of the processes it created.
///
/// Dropping the spawner drops its handle on the registry; when the last
/// handle goes, any process still registered is terminated.
pub struct Spawner {
    paths: SystemPaths,
    registry: Arc<ProcessRegistry>,
    sandbox_capable: bool,
    fd_limit: RawFd,
}

impl Spawner {
    pub fn new(paths: SystemPaths) -> Self {
        Self::with_registry(paths, Arc::new(ProcessRegistry::new()))
    }

    /// Share a registry with other spawners.
    pub fn with_registry(paths: SystemPaths, registry: Arc<ProcessRegistry>) -> Self {
        let sandbox_capable = is_executable_file(&paths.sandbox);
        let fd_limit = max_fd_limit();
        debug!(
            sandbox = %paths.sandbox.display(),
            sandbox_capable,
            fd_limit,
            "spawner ready"
        );
        Spawner {
            paths,
            registry,
            sandbox_capable,
            fd_limit,
        }
    }

    pub fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Whether the sandbox tool was found when the spawner was created.
    pub fn sandbox_capable(&self) -> bool {
        self.sandbox_capable
    }

    /// Run the command.
    ///
    /// If the binary cannot be found, nothing is started and the outcome is
    /// `ExitResult::NotFound`.  With `return_handles`, the created processes
    /// are returned right away and the caller must `wait` on them.
    /// Otherwise this blocks until the command is done.
    pub fn spawn(&self, command: &Command, config: SpawnConfig) -> Result<SpawnOutcome> {
        let Some(binary) = resolve_binary(command.program(), &self.paths, config.path_lookup)
        else {
            debug!(command = %command, "binary not resolved");
            return Ok(SpawnOutcome::Finished(ExitResult::NotFound));
        };

        let mut fds = config.fds.clone().unwrap_or_default();
        let mut handles = Vec::with_capacity(2);

        let pipeline = match &config.log_file {
            Some(log_file) => {
                let mut pipeline = LogPipeline::new(&fds)?;
                let copier = self.launch_copier(&pipeline, log_file)?;
                handles.push(copier);
                pipeline.release_reader();
                fds = pipeline.command_fds().clone();
                Some(pipeline)
            }
            None => None,
        };

        let credentials = Credentials {
            uid: config.uid,
            gid: config.gid,
            groups: config.groups.clone(),
            umask: config.umask,
        };
        let launched = PreparedChild::new(
            &binary,
            command,
            config.name.as_ref(),
            &config.env,
            &fds,
            &credentials,
            self.fd_limit,
        )
        .and_then(PreparedChild::launch);
        if let Some(pipeline) = pipeline {
            pipeline.release_writer();
        }
        let handle = match launched {
            Ok(h) => h,
            Err(e) => {
                // The copier sees end-of-stream now that the write end is closed.
                for h in handles {
                    let _ = self.wait(h);
                }
                return Err(e);
            }
        };
        self.registry.register(handle);
        handles.push(handle);
        debug!(pid = handle.pid(), binary = %binary.display(), "spawned");

        if config.return_handles {
            return Ok(SpawnOutcome::Running(handles));
        }
        self.collect(handles).map(SpawnOutcome::Finished)
    }

    /// Run the command line through the configured shell.  With `debug`,
    /// the shell echoes each command before running it.
    pub fn spawn_via_shell(
        &self,
        command: &str,
        debug: bool,
        mut config: SpawnConfig,
    ) -> Result<SpawnOutcome> {
        let mut shell = Command::new(self.paths.shell.as_os_str());
        if debug {
            shell = shell.arg("-x");
        }
        let shell = shell.arg("-c").arg(command);
        if config.name.is_none() {
            config.name = display_name(command);
        }
        self.spawn(&shell, config)
    }

    /// Run the command line inside the sandbox tool, or through the shell if
    /// the tool is not installed.
    pub fn spawn_sandboxed(&self, command: &str, mut config: SpawnConfig) -> Result<SpawnOutcome> {
        if !self.sandbox_capable {
            debug!("sandbox not available, using the shell");
            return self.spawn_via_shell(command, false, config);
        }
        if config.name.is_none() {
            config.name = display_name(command);
        }
        let sandboxed = Command::new(self.paths.sandbox.as_os_str()).arg(command);
        self.spawn(&sandboxed, config)
    }

    /// Block until the process exits and collect its status.
    pub fn wait(&self, handle: ProcessHandle) -> Result<ExitResult> {
        let status = wait_blocking(Pid::from_raw(handle.pid()));
        self.registry.unregister(handle);
        match status {
            Ok(WaitStatus::Exited(_, code)) => Ok(ExitResult::from_exit_code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => Ok(ExitResult::Signaled(signal as i32)),
            Ok(other) => {
                warn!(pid = handle.pid(), status = ?other, "unexpected wait status");
                Err(SpawnError::Sys {
                    op: "waitpid",
                    source: std::io::Error::other(format!("unexpected wait status: {other:?}")),
                })
            }
            Err(e) => Err(SpawnError::sys("waitpid", e)),
        }
    }

    /// Terminate every process still registered.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    /// Wait on the handles in creation order.  The first failure stops the
    /// wait; the processes after it are terminated and its status returned.
    /// A failed wait also terminates the rest before the error is returned.
    fn collect(&self, handles: Vec<ProcessHandle>) -> Result<ExitResult> {
        let mut pending = VecDeque::from(handles);
        while let Some(handle) = pending.pop_front() {
            let result = match self.wait(handle) {
                Ok(r) => r,
                Err(e) => {
                    warn!(pid = handle.pid(), error = %e, "wait failed, stopping the rest");
                    self.terminate_pending(&mut pending);
                    return Err(e);
                }
            };
            debug!(pid = handle.pid(), %result, "collected");
            if !result.success() {
                self.terminate_pending(&mut pending);
                return Ok(result);
            }
        }
        Ok(ExitResult::Success)
    }

    fn terminate_pending(&self, pending: &mut VecDeque<ProcessHandle>) {
        for rest in pending.drain(..) {
            terminate_and_reap(rest);
            self.registry.unregister(rest);
        }
    }

    fn launch_copier(&self, pipeline: &LogPipeline, log_file: &Path) -> Result<ProcessHandle> {
        let copier = LogPipeline::copier_command(&self.paths, log_file);
        let binary = resolve_binary(copier.program(), &self.paths, true)
            .ok_or_else(|| SpawnError::LogUtilityNotFound(self.paths.log_utility.clone()))?;
        let handle = PreparedChild::new(
            &binary,
            &copier,
            None,
            &Default::default(),
            pipeline.copier_fds(),
            &Credentials::default(),
            self.fd_limit,
        )?
        .launch()?;
        self.registry.register(handle);
        debug!(pid = handle.pid(), log = %log_file.display(), "started log copier");
        Ok(handle)
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new(SystemPaths::default())
    }
}

/// The file name of the first word of a command line.
fn display_name(command: &str) -> Option<OsString> {
    let first = command.split_whitespace().next()?;
    Path::new(first).file_name().map(|n| n.to_os_string())
}
