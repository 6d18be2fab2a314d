//! # forkguard
//!
//! The library that launches external commands with exact control over their
//! file descriptors and privileges, and makes sure none of them outlive the
//! program that started them.

pub mod runtime;


pub use runtime::{
    Command, DescriptorMap, ExitResult, ProcessHandle, SpawnConfig, SpawnError, SpawnOutcome,
    SystemPaths,
};

#[cfg(target_os = "linux")]
pub use runtime::{ProcessRegistry, SetupStep, Spawner};
