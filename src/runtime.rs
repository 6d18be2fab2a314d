// SPDX-License-Identifier: MIT

//! Manages the launching of child processes and the collection of their
//! exit status.
//!
//! The `Spawner` is the main entry point.  It takes a `Command` and a
//! `SpawnConfig` that describes the environment, the file descriptor
//! mapping, the privileges to drop to, and whether the output should also be
//! copied into a log file.  Depending on the configuration it either waits
//! for the command and returns its `ExitResult`, or hands the process handles
//! back to the caller.  Every process it creates is tracked in a
//! `ProcessRegistry`, which terminates stragglers when the spawner shuts down.

pub mod config;
pub mod error;
pub mod spawn;

#[cfg(target_os = "linux")]
pub mod registry;
#[cfg(target_os = "linux")]
pub mod resolve;
#[cfg(target_os = "linux")]
pub mod spawner;

#[cfg(target_os = "linux")]
mod spawn_linux;

pub use config::SystemPaths;
pub use error::SpawnError;
pub use spawn::{Command, DescriptorMap, ExitResult, ProcessHandle, SpawnConfig, SpawnOutcome};

#[cfg(target_os = "linux")]
pub use registry::ProcessRegistry;
#[cfg(target_os = "linux")]
pub use spawn_linux::SetupStep;
#[cfg(target_os = "linux")]
pub use spawner::Spawner;
